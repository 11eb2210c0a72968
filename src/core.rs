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

//! The lifecycle controller: owns every thread the process runs and the
//! shutdown control channel, and is the capability surface workers hold a
//! non-owning reference to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{error, info};

use crate::auth::credentials::CredentialStore;
use crate::auth::directory::DirectoryOracle;
use crate::auth::transient::TransientGrantTable;
use crate::auth::zap::ZapHandler;
use crate::config::Config;
use crate::frontend::{self, ControlChannel, FrontendError};
use crate::maintenance::{self, PendingQueues};
use crate::repo::RepoDescriptor;
use crate::security::SecurityContext;
use crate::transfer::{TransferJob, TransferManager};
use crate::worker::{self, RequestHandler};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("start() called while the server is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Frontend(#[from] FrontendError),
}

/// The small capability interface passed to workers by shared, non-owning
/// reference: everything a request handler needs from the server without
/// owning it.
pub trait ServerCapability: Send + Sync {
    fn enqueue_data_delete(&self, repo_id: &str, path: &str);
    fn enqueue_path_create(&self, repo_id: &str, id: &str);
    fn enqueue_path_delete(&self, repo_id: &str, id: &str);
    fn authorize_transient(&self, cert_uid: &str, identity: &str);
    fn hand_off_transfer(&self, job: TransferJob);
    fn get_repo_address(&self, repo_id: &str) -> Option<String>;
}

pub struct Core {
    config: Config,
    zmq_context: zmq::Context,
    security: SecurityContext,
    repos: HashMap<String, RepoDescriptor>,
    transient: Arc<RwLock<TransientGrantTable>>,
    queues: Arc<Mutex<PendingQueues>>,
    transfer: Arc<dyn TransferManager>,
    request_handler: Arc<dyn RequestHandler>,
    running: AtomicBool,
    kill_switch: Arc<AtomicBool>,
    zap_handle: Mutex<Option<JoinHandle<()>>>,
    control: Mutex<Option<ControlChannel>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Core {
    /// Build the server and start the ZAP handler thread immediately — it
    /// must be answering handshakes before any CURVE-enabled socket binds.
    pub fn new(
        config: Config,
        security: SecurityContext,
        repos: Vec<RepoDescriptor>,
        credentials: CredentialStore,
        directory: Arc<dyn DirectoryOracle>,
        transfer: Arc<dyn TransferManager>,
        request_handler: Arc<dyn RequestHandler>,
    ) -> Arc<Self> {
        let zmq_context = zmq::Context::new();
        let kill_switch = Arc::new(AtomicBool::new(false));
        let transient = Arc::new(RwLock::new(TransientGrantTable::new()));

        let zap_handler = ZapHandler::new(
            zmq_context.clone(),
            kill_switch.clone(),
            credentials,
            transient.clone(),
            directory,
        );
        let zap_handle = std::thread::Builder::new()
            .name("repofed-zap".to_string())
            .spawn(move || {
                if let Err(e) = zap_handler.run() {
                    error!(error = ?e, "ZAP handler exited with an error");
                }
            })
            .expect("failed to spawn ZAP handler thread");

        let repos_by_id = repos.into_iter().map(|r| (r.id.clone(), r)).collect();

        Arc::new(Self {
            config,
            zmq_context,
            security,
            repos: repos_by_id,
            transient,
            queues: Arc::new(Mutex::new(PendingQueues::new())),
            transfer,
            request_handler,
            running: AtomicBool::new(false),
            kill_switch,
            zap_handle: Mutex::new(Some(zap_handle)),
            control: Mutex::new(None),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Start the transfer manager, the maintenance thread, the proxy thread,
    /// the secure frontend thread, and the cleartext frontend thread. When
    /// `async_mode` is false, the calling thread blocks until every thread
    /// this call started has joined.
    pub fn start(self: &Arc<Self>, async_mode: bool) -> Result<(), CoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::AlreadyRunning);
        }

        self.transfer.start();

        let maintenance_handle = {
            let zmq_context = self.zmq_context.clone();
            let kill_switch = self.kill_switch.clone();
            let repos: Vec<RepoDescriptor> = self.repos.values().cloned().collect();
            let security = self.security.clone();
            let transient = self.transient.clone();
            let queues = self.queues.clone();
            std::thread::Builder::new()
                .name("repofed-maintenance".to_string())
                .spawn(move || maintenance::run(zmq_context, kill_switch, repos, security, transient, queues))
                .expect("failed to spawn maintenance thread")
        };

        let control = ControlChannel::bind(&self.zmq_context)?;
        let proxy_handle = frontend::spawn_internal_fanout(self.zmq_context.clone())?;

        let capability: Arc<dyn ServerCapability> = self.clone();
        let worker_handles = worker::spawn_workers(
            self.zmq_context.clone(),
            self.kill_switch.clone(),
            worker::DEFAULT_NUM_WORKERS,
            self.request_handler.clone(),
            capability,
        );

        let secure_handle = frontend::spawn_secure_frontend(
            self.zmq_context.clone(),
            self.config.port,
            self.security.clone(),
        )?;
        let cleartext_handle =
            frontend::spawn_cleartext_frontend(self.zmq_context.clone(), self.config.insecure_port())?;

        *self.control.lock().unwrap() = Some(control);

        let mut threads = self.threads.lock().unwrap();
        threads.push(maintenance_handle);
        threads.push(proxy_handle);
        threads.push(secure_handle);
        threads.extend(worker_handles);

        if async_mode {
            threads.push(cleartext_handle);
            Ok(())
        } else {
            drop(threads);
            cleartext_handle.join().expect("cleartext frontend thread panicked");
            self.join_remaining();
            Ok(())
        }
    }

    /// Publish on the control channel to stop the proxy fabric and flip the
    /// cooperative kill switch for every poll-based loop; optionally block
    /// until every owned thread has joined.
    pub fn stop(&self, wait: bool) -> Result<(), CoreError> {
        self.kill_switch.store(true, Ordering::SeqCst);
        if let Some(control) = self.control.lock().unwrap().as_ref() {
            control.terminate()?;
        }
        if wait {
            self.join_remaining();
            if let Some(handle) = self.zap_handle.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
        Ok(())
    }

    /// Block the calling thread until every thread this server owns has
    /// joined. Used after an async `start` when the caller still wants to
    /// park on the running server rather than return immediately.
    pub fn wait(&self) {
        self.join_remaining();
    }

    fn join_remaining(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.threads.lock().unwrap());
        for handle in handles {
            if let Err(e) = handle.join() {
                error!(?e, "a server thread panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl ServerCapability for Core {
    /// Deliberately does not verify `repo_id` against the repo map — the
    /// reference implementation never did, and nothing downstream depends
    /// on it erroring out.
    fn enqueue_data_delete(&self, repo_id: &str, path: &str) {
        self.queues
            .lock()
            .unwrap()
            .data_delete
            .push((repo_id.to_string(), path.to_string()));
    }

    fn enqueue_path_create(&self, repo_id: &str, id: &str) {
        if !self.repos.contains_key(repo_id) {
            return;
        }
        self.queues
            .lock()
            .unwrap()
            .path_create
            .push((repo_id.to_string(), id.to_string()));
    }

    fn enqueue_path_delete(&self, repo_id: &str, id: &str) {
        if !self.repos.contains_key(repo_id) {
            return;
        }
        self.queues
            .lock()
            .unwrap()
            .path_delete
            .push((repo_id.to_string(), id.to_string()));
    }

    fn authorize_transient(&self, cert_uid: &str, identity: &str) {
        let Some(public_key) = cert_uid.strip_prefix("anon_") else {
            return;
        };
        self.transient
            .write()
            .unwrap()
            .insert(public_key.to_string(), identity.to_string());
    }

    fn hand_off_transfer(&self, job: TransferJob) {
        self.transfer.hand_off(job);
    }

    fn get_repo_address(&self, repo_id: &str) -> Option<String> {
        self.repos.get(repo_id).map(|r| r.address.clone())
    }
}

/// Minimal test fixtures for exercising [`RequestHandler`] implementations
/// without a full [`Core`].
#[cfg(test)]
pub mod test_support {
    use super::*;

    #[derive(Debug, Default)]
    pub struct NoopCapability;

    impl ServerCapability for NoopCapability {
        fn enqueue_data_delete(&self, _repo_id: &str, _path: &str) {}
        fn enqueue_path_create(&self, _repo_id: &str, _id: &str) {}
        fn enqueue_path_delete(&self, _repo_id: &str, _id: &str) {}
        fn authorize_transient(&self, _cert_uid: &str, _identity: &str) {}
        fn hand_off_transfer(&self, _job: TransferJob) {}
        fn get_repo_address(&self, _repo_id: &str) -> Option<String> {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::NoopCapability;
    use super::*;
    use crate::auth::directory::NullDirectoryOracle;
    use crate::transfer::NoopTransferManager;
    use crate::worker::EchoRequestHandler;

    fn repo(id: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            address: "tcp://repo.example:9000".to_string(),
            public_key: "a".repeat(40),
            endpoint: "01234567-0123-0123-0123-0123456789ab".to_string(),
            path: "/mnt/a/".to_string(),
        }
    }

    fn make_core() -> Arc<Core> {
        Core::new(
            Config::default(),
            SecurityContext::server("srv-pub".repeat(5), "srv-priv".repeat(5)),
            vec![repo("repo/a")],
            CredentialStore::from_repositories(&[repo("repo/a")]),
            Arc::new(NullDirectoryOracle),
            Arc::new(NoopTransferManager),
            Arc::new(EchoRequestHandler),
        )
    }

    #[test]
    fn authorize_transient_requires_anon_prefix() {
        let core = make_core();
        core.authorize_transient("bob", "u/alice");
        assert!(core.transient.read().unwrap().is_empty());

        core.authorize_transient("anon_XYZ", "u/alice");
        assert_eq!(core.transient.read().unwrap().identity_for("XYZ"), Some("u/alice"));

        core.stop(true).unwrap();
    }

    #[test]
    fn enqueue_data_delete_does_not_verify_repo_existence() {
        let core = make_core();
        core.enqueue_data_delete("no-such-repo", "/x");
        assert_eq!(core.queues.lock().unwrap().data_delete.len(), 1);
        core.stop(true).unwrap();
    }

    #[test]
    fn enqueue_path_create_requires_known_repo() {
        let core = make_core();
        core.enqueue_path_create("no-such-repo", "u/bob");
        assert!(core.queues.lock().unwrap().path_create.is_empty());

        core.enqueue_path_create("repo/a", "u/bob");
        assert_eq!(core.queues.lock().unwrap().path_create.len(), 1);
        core.stop(true).unwrap();
    }

    #[test]
    fn get_repo_address_resolves_known_repo_only() {
        let core = make_core();
        assert_eq!(core.get_repo_address("repo/a"), Some("tcp://repo.example:9000".to_string()));
        assert_eq!(core.get_repo_address("no-such-repo"), None);
        core.stop(true).unwrap();
    }

    #[test]
    fn noop_capability_is_inert() {
        let capability = NoopCapability;
        capability.enqueue_data_delete("x", "y");
        assert_eq!(capability.get_repo_address("x"), None);
    }
}
