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

//! Command-line parsing and config-file/environment merging.
//!
//! CLI argument parsing itself is treated as ambient plumbing (not a
//! designed subsystem), but the merge order it establishes — defaults,
//! then config file, then environment, then explicit flags — is load-bearing
//! for every other module, so it lives here rather than in `main`.

use clap::{Parser, builder::ValueHint};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(name = "repofed-core")]
#[command(about = "Federation control server: CURVE-authenticated client router and repository control plane")]
#[command(version)]
pub struct Args {
    #[arg(
        short,
        long,
        value_name = "config-file",
        help = "Path to a JSON or YAML configuration file; overrides built-in defaults, is itself overridden by environment variables and explicit flags",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[arg(
        long,
        value_name = "cred-dir",
        help = "Directory containing sdms-core-key.pub / sdms-core-key.priv and the repository directory source"
    )]
    pub cred_dir: Option<PathBuf>,

    #[arg(long, value_name = "port", help = "Secure frontend port; cleartext frontend binds port+1")]
    pub port: Option<u16>,

    #[arg(long, value_name = "timeout", help = "Default request timeout, seconds")]
    pub timeout: Option<u32>,

    #[arg(
        long,
        value_name = "num-client-worker-threads",
        help = "Number of worker threads in the internal fan-out"
    )]
    pub num_client_worker_threads: Option<u32>,

    #[arg(
        long,
        help = "Generate a fresh CURVE keypair into cred-dir if one is not already present, then exit",
        default_value = "false"
    )]
    pub generate_keypair: bool,

    #[arg(long, help = "Run the cleartext frontend on the calling thread instead of a spawned one (synchronous start)", default_value = "false")]
    pub foreground: bool,

    #[arg(long, help = "Enable debug-level logging", default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Merge defaults, an optional config file, environment variables
    /// (`REPOFED_*`), and the parsed CLI flags into one immutable [`Config`].
    pub fn load_config(&self) -> eyre::Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = &self.config_file {
            let path_str = path.to_string_lossy();
            if path_str.ends_with(".json") {
                figment = figment.merge(Json::file(path));
            } else {
                figment = figment.merge(Yaml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("REPOFED_"));

        // Explicit flags take precedence over everything else, but only the
        // ones the caller actually set (`None` means "don't override").
        let mut overrides = serde_json::Map::new();
        if let Some(cred_dir) = &self.cred_dir {
            overrides.insert(
                "cred_dir".to_string(),
                serde_json::Value::String(cred_dir.to_string_lossy().to_string()),
            );
        }
        if let Some(port) = self.port {
            overrides.insert("port".to_string(), serde_json::Value::from(port));
        }
        if let Some(timeout) = self.timeout {
            overrides.insert("timeout".to_string(), serde_json::Value::from(timeout));
        }
        if let Some(n) = self.num_client_worker_threads {
            overrides.insert(
                "num_client_worker_threads".to_string(),
                serde_json::Value::from(n),
            );
        }
        if !overrides.is_empty() {
            figment = figment.merge(Json::string(&serde_json::Value::Object(overrides).to_string()));
        }

        figment
            .extract()
            .map_err(|e| eyre::eyre!("Failed to assemble configuration: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_applies_cli_overrides() {
        let args = Args {
            config_file: None,
            cred_dir: Some(PathBuf::from("/tmp/creds")),
            port: Some(9000),
            timeout: None,
            num_client_worker_threads: None,
            generate_keypair: false,
            foreground: false,
            debug: false,
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cred_dir, PathBuf::from("/tmp/creds"));
        // Untouched fields keep their documented defaults.
        assert_eq!(config.timeout, 5);
    }

    #[test]
    fn load_config_defaults_without_overrides() {
        let args = Args {
            config_file: None,
            cred_dir: None,
            port: None,
            timeout: None,
            num_client_worker_threads: None,
            generate_keypair: false,
            foreground: false,
            debug: false,
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.port, 7512);
    }
}
