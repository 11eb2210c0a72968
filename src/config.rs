// Copyright (C) 2026 Core Services Team This program is free software: you
// can redistribute it and/or modify it under the terms of the GNU General
// Public License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Process-wide configuration, threaded explicitly rather than stashed in a
//! global singleton (see DESIGN.md, "global singleton configuration").

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable, process-wide configuration. Constructed once at startup by
/// [`crate::args::Args::load_config`] and passed by reference/clone to every
/// component that needs it; nothing here is mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `sdms-core-key.pub` / `sdms-core-key.priv`.
    pub cred_dir: PathBuf,
    pub db_url: String,
    pub db_user: String,
    pub db_pass: String,
    pub glob_oauth_url: String,
    pub glob_xfr_url: String,
    pub client_id: String,
    pub client_secret: String,

    /// Secure frontend binds `tcp://*:port`; the cleartext frontend binds
    /// `tcp://*:port+1`.
    pub port: u16,
    pub timeout: u32,
    pub num_client_worker_threads: u32,
    pub num_task_worker_threads: u32,
    pub task_purge_age: u32,
    pub task_purge_period: u32,
    pub task_retry_time_fail: u32,
    pub task_retry_time_init: u32,
    pub task_retry_backoff_max: u32,
    pub repo_chunk_size: u32,
    pub repo_timeout: u32,
    pub note_purge_age: u32,
    pub note_purge_period: u32,
    pub metrics_period: u32,
    pub metrics_purge_period: u32,
    pub metrics_purge_age: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cred_dir: PathBuf::new(),
            db_url: String::new(),
            db_user: String::new(),
            db_pass: String::new(),
            glob_oauth_url: "https://auth.globus.org/v2/oauth2/".to_string(),
            glob_xfr_url: "https://transfer.api.globus.org/v0.10/".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            port: 7512,
            timeout: 5,
            num_client_worker_threads: 4,
            num_task_worker_threads: 10,
            task_purge_age: 14 * 24 * 3600,
            task_purge_period: 6 * 3600,
            task_retry_time_fail: 3600,
            task_retry_time_init: 30,
            task_retry_backoff_max: 4,
            repo_chunk_size: 100,
            repo_timeout: 60_000,
            note_purge_age: 7 * 24 * 3600,
            note_purge_period: 6 * 3600,
            metrics_period: 300,
            metrics_purge_period: 3600,
            metrics_purge_age: 24 * 3600,
        }
    }
}

impl Config {
    /// Cleartext frontend port, always the secure port plus one.
    pub fn insecure_port(&self) -> u16 {
        self.port + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 7512);
        assert_eq!(config.timeout, 5);
        assert_eq!(config.num_client_worker_threads, 4);
        assert_eq!(config.num_task_worker_threads, 10);
        assert_eq!(config.task_retry_time_init, 30);
        assert_eq!(config.task_retry_backoff_max, 4);
        assert_eq!(config.repo_chunk_size, 100);
        assert_eq!(config.repo_timeout, 60_000);
        assert_eq!(config.insecure_port(), 7513);
    }
}
