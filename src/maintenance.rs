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

//! The periodic reconciler: expires transient grants and drains the three
//! repo-control queues against a per-repo dealer connection.
//!
//! The drain loop preserves a known defect verbatim: a recv timeout aborts
//! the drain for that queue, but the queue is cleared unconditionally
//! afterward, so entries past the timeout are silently lost. Do not "fix" this without
//! explicit direction — it changes observable behavior that real deployments
//! may already be compensating for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::auth::transient::TransientGrantTable;
use crate::repo::RepoDescriptor;
use crate::security::SecurityContext;
use crate::wire::{RepoControlRequest, RepoDataDeleteRequest, RepoPathCreateRequest, RepoPathDeleteRequest};

const TICK_PERIOD: Duration = Duration::from_secs(5);
const DATA_DELETE_TIMEOUT_MS: i64 = 10_000;
const PATH_OP_TIMEOUT_MS: i64 = 5_000;

/// Three ordered `(repo_id, payload)` queues, appended to by worker threads
/// and drained wholesale by the maintenance tick.
#[derive(Debug, Default)]
pub struct PendingQueues {
    pub data_delete: Vec<(String, String)>,
    pub path_create: Vec<(String, String)>,
    pub path_delete: Vec<(String, String)>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("failed to create control socket for repo {repo_id}: {source}")]
    CreateSocket { repo_id: String, source: zmq::Error },
    #[error("failed to apply CURVE client keys for repo {repo_id}: {source}")]
    Curve { repo_id: String, source: zmq::Error },
    #[error("failed to connect control socket for repo {repo_id}: {source}")]
    Connect { repo_id: String, source: zmq::Error },
}

/// Resolve the on-repo path for a path-create/delete id: `u…` is a user
/// scope, anything else is a project scope.
fn translate_path(repo_path: &str, id: &str) -> String {
    let scope = if id.starts_with('u') { "user/" } else { "project/" };
    let suffix = id.get(2..).unwrap_or("");
    format!("{repo_path}{scope}{suffix}")
}

/// Open one authenticated dealer socket per repository, using the shared
/// security context. Called once at maintenance-loop entry.
fn open_repo_sockets(
    zmq_context: &zmq::Context,
    repos: &[RepoDescriptor],
    security: &SecurityContext,
) -> Result<HashMap<String, zmq::Socket>, MaintenanceError> {
    let mut sockets = HashMap::with_capacity(repos.len());
    for repo in repos {
        let socket = zmq_context
            .socket(zmq::DEALER)
            .map_err(|source| MaintenanceError::CreateSocket { repo_id: repo.id.clone(), source })?;
        socket
            .set_curve_serverkey(repo.public_key.as_bytes())
            .and_then(|_| socket.set_curve_publickey(security.public_key.as_bytes()))
            .and_then(|_| socket.set_curve_secretkey(security.private_key.as_bytes()))
            .map_err(|source| MaintenanceError::Curve { repo_id: repo.id.clone(), source })?;
        socket
            .connect(&repo.address)
            .map_err(|source| MaintenanceError::Connect { repo_id: repo.id.clone(), source })?;
        sockets.insert(repo.id.clone(), socket);
    }
    Ok(sockets)
}

/// Send `request` to `repo_id`'s control socket and block for a reply within
/// `timeout_ms`. Returns `Ok(true)` on a timely reply, `Ok(false)` if the
/// repo is unknown, `Err` on a timeout.
fn dispatch(
    sockets: &HashMap<String, zmq::Socket>,
    repo_id: &str,
    request: RepoControlRequest,
    timeout_ms: i64,
) -> Result<bool, ()> {
    let Some(socket) = sockets.get(repo_id) else {
        error!(repo_id, "unknown repo in control queue entry");
        return Ok(false);
    };

    let frames = match request.encode() {
        Ok(frames) => frames,
        Err(e) => {
            error!(repo_id, error = ?e, "failed to encode repo-control request");
            return Ok(false);
        }
    };

    if let Err(e) = socket.send_multipart(frames, 0) {
        error!(repo_id, error = ?e, "failed to send repo-control request");
        return Err(());
    }

    match socket.poll(zmq::POLLIN, timeout_ms) {
        Ok(0) => {
            error!(repo_id, "timed out waiting for repo-control reply");
            Err(())
        }
        Ok(_) => {
            if let Err(e) = socket.recv_multipart(0) {
                error!(repo_id, error = ?e, "failed to receive repo-control reply");
            }
            Ok(true)
        }
        Err(e) => {
            error!(repo_id, error = ?e, "poll failed while awaiting repo-control reply");
            Err(())
        }
    }
}

/// Drain `queue` entirely. On a dispatch timeout, the remaining entries are
/// abandoned but `queue` is still cleared at the end — the documented lossy
/// behavior.
fn drain_data_delete(sockets: &HashMap<String, zmq::Socket>, queue: &mut Vec<(String, String)>) {
    let entries = std::mem::take(queue);
    for (repo_id, path) in entries {
        debug!(repo_id = %repo_id, path = %path, "draining data-delete entry");
        let request = RepoControlRequest::DataDelete(RepoDataDeleteRequest { path });
        if dispatch(sockets, &repo_id, request, DATA_DELETE_TIMEOUT_MS).is_err() {
            break;
        }
    }
}

fn drain_path_create(
    sockets: &HashMap<String, zmq::Socket>,
    repos: &HashMap<String, RepoDescriptor>,
    queue: &mut Vec<(String, String)>,
) {
    let entries = std::mem::take(queue);
    for (repo_id, id) in entries {
        let Some(repo) = repos.get(&repo_id) else {
            error!(repo_id, "unknown repo in path-create queue entry");
            continue;
        };
        let path = translate_path(&repo.path, &id);
        debug!(repo_id = %repo_id, path = %path, "draining path-create entry");
        let request = RepoControlRequest::PathCreate(RepoPathCreateRequest { path });
        if dispatch(sockets, &repo_id, request, PATH_OP_TIMEOUT_MS).is_err() {
            break;
        }
    }
}

fn drain_path_delete(
    sockets: &HashMap<String, zmq::Socket>,
    repos: &HashMap<String, RepoDescriptor>,
    queue: &mut Vec<(String, String)>,
) {
    let entries = std::mem::take(queue);
    for (repo_id, id) in entries {
        let Some(repo) = repos.get(&repo_id) else {
            error!(repo_id, "unknown repo in path-delete queue entry");
            continue;
        };
        let path = translate_path(&repo.path, &id);
        debug!(repo_id = %repo_id, path = %path, "draining path-delete entry");
        let request = RepoControlRequest::PathDelete(RepoPathDeleteRequest { path });
        if dispatch(sockets, &repo_id, request, PATH_OP_TIMEOUT_MS).is_err() {
            break;
        }
    }
}

/// Run the maintenance loop until `kill_switch` is set, checked once per
/// tick after the sleep.
pub fn run(
    zmq_context: zmq::Context,
    kill_switch: Arc<AtomicBool>,
    repos: Vec<RepoDescriptor>,
    security: SecurityContext,
    transient: Arc<RwLock<TransientGrantTable>>,
    queues: Arc<Mutex<PendingQueues>>,
) {
    info!("confirming repository server connections");
    let sockets = match open_repo_sockets(&zmq_context, &repos, &security) {
        Ok(sockets) => sockets,
        Err(e) => {
            error!(error = ?e, "failed to open repository control sockets, maintenance loop exiting");
            return;
        }
    };
    let repos_by_id: HashMap<String, RepoDescriptor> =
        repos.into_iter().map(|r| (r.id.clone(), r)).collect();

    info!("maintenance loop started");
    while !kill_switch.load(Ordering::Relaxed) {
        std::thread::sleep(TICK_PERIOD);
        if kill_switch.load(Ordering::Relaxed) {
            break;
        }

        let expired = transient.write().unwrap().expire(std::time::Instant::now());
        if expired > 0 {
            debug!(expired, "purged expired transient grants");
        }

        let mut queues = queues.lock().unwrap();
        drain_data_delete(&sockets, &mut queues.data_delete);
        drain_path_create(&sockets, &repos_by_id, &mut queues.path_create);
        drain_path_delete(&sockets, &repos_by_id, &mut queues.path_delete);
    }

    info!("maintenance loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_path_routes_user_scope() {
        assert_eq!(translate_path("/mnt/a/", "u/bob"), "/mnt/a/user/bob");
    }

    #[test]
    fn translate_path_routes_project_scope() {
        assert_eq!(translate_path("/mnt/a/", "p/proj1"), "/mnt/a/project/proj1");
    }

    #[test]
    fn drain_clears_queue_even_when_repo_unknown() {
        let sockets = HashMap::new();
        let mut queue = vec![("missing-repo".to_string(), "/x".to_string())];
        drain_data_delete(&sockets, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn path_create_drain_skips_unknown_repo_and_clears_queue() {
        let sockets = HashMap::new();
        let repos = HashMap::new();
        let mut queue = vec![("missing-repo".to_string(), "u/bob".to_string())];
        drain_path_create(&sockets, &repos, &mut queue);
        assert!(queue.is_empty());
    }
}
