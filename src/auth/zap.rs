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

//! ZAP (ZeroMQ Authentication Protocol) handler.
//!
//! Binds `inproc://zeromq.zap.01` and answers every handshake with a
//! resolved identity. Authentication never fails here — the identity string
//! itself carries the trust level downstream, so anonymous peers can still
//! execute a limited operation set before being upgraded via a transient
//! grant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::auth::credentials::CredentialStore;
use crate::auth::directory::DirectoryOracle;
use crate::auth::transient::TransientGrantTable;

const ZAP_ENDPOINT: &str = "inproc://zeromq.zap.01";
const POLL_TIMEOUT_MS: i64 = 2000;
const ZAP_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ZapError {
    #[error("failed to create ZAP socket: {0}")]
    CreateSocket(zmq::Error),
    #[error("failed to bind ZAP endpoint: {0}")]
    Bind(zmq::Error),
    #[error("poll on ZAP socket failed: {0}")]
    Poll(zmq::Error),
    #[error("recv of {frame} frame failed: {source}")]
    Recv { frame: &'static str, source: zmq::Error },
    #[error("{frame} frame was not valid UTF-8")]
    NotUtf8 { frame: &'static str },
    #[error("client-key frame was {got} bytes, expected 32")]
    BadKeyLength { got: usize },
    #[error("Z85 encode of client key failed: {0}")]
    Encode(zmq::EncodeError),
    #[error("send of reply failed: {0}")]
    Send(zmq::Error),
}

pub struct ZapHandler {
    zmq_context: zmq::Context,
    kill_switch: Arc<AtomicBool>,
    credentials: CredentialStore,
    transient: Arc<RwLock<TransientGrantTable>>,
    directory: Arc<dyn DirectoryOracle>,
}

impl ZapHandler {
    pub fn new(
        zmq_context: zmq::Context,
        kill_switch: Arc<AtomicBool>,
        credentials: CredentialStore,
        transient: Arc<RwLock<TransientGrantTable>>,
        directory: Arc<dyn DirectoryOracle>,
    ) -> Self {
        Self {
            zmq_context,
            kill_switch,
            credentials,
            transient,
            directory,
        }
    }

    /// Blocking call that runs until the kill switch is set. Must be running
    /// before any CURVE-enabled socket is bound.
    pub fn run(&self) -> Result<(), ZapError> {
        let socket = self
            .zmq_context
            .socket(zmq::REP)
            .map_err(ZapError::CreateSocket)?;
        socket.bind(ZAP_ENDPOINT).map_err(ZapError::Bind)?;

        info!("ZAP authentication handler started");

        while !self.kill_switch.load(Ordering::Relaxed) {
            let poll_result = socket
                .poll(zmq::POLLIN, POLL_TIMEOUT_MS)
                .map_err(ZapError::Poll)?;

            if poll_result == 0 {
                continue;
            }

            if let Err(e) = self.handle_one(&socket) {
                error!(error = ?e, "Error handling ZAP request");
            }
        }

        info!("ZAP authentication handler shutting down");
        Ok(())
    }

    fn handle_one(&self, socket: &zmq::Socket) -> Result<(), ZapError> {
        let version = recv_string(socket, "version")?;
        let request_id = recv_string(socket, "request_id")?;
        let domain = recv_string(socket, "domain")?;
        let address = recv_string(socket, "address")?;
        let _identity_property = recv_string(socket, "identity_property")?;
        let mechanism = recv_string(socket, "mechanism")?;
        let client_key = socket
            .recv_bytes(0)
            .map_err(|source| ZapError::Recv { frame: "client_key", source })?;

        debug!(
            version = %version,
            request_id = %request_id,
            domain = %domain,
            address = %address,
            mechanism = %mechanism,
            "ZAP request received"
        );

        if client_key.len() != 32 {
            return Err(ZapError::BadKeyLength {
                got: client_key.len(),
            });
        }

        let client_key_z85 = zmq::z85_encode(&client_key).map_err(ZapError::Encode)?;
        let identity = self.resolve_identity(&client_key_z85);

        self.send_reply(socket, &request_id, &identity)
    }

    /// First match wins: pre-authorized repo, then transient grant, then the
    /// directory oracle, then the anonymous fallback.
    fn resolve_identity(&self, client_key_z85: &str) -> String {
        if let Some(identity) = self.credentials.identity_for(client_key_z85) {
            debug!(identity, "ZAP: pre-authorized repository");
            return identity.to_string();
        }

        // Deliberately unlocked-in-spirit: a read lock that never blocks a
        // writer for longer than the maintenance tick's brief critical
        // section, tolerating a momentarily stale view.
        if let Some(identity) = self
            .transient
            .read()
            .unwrap()
            .identity_for(client_key_z85)
            .map(str::to_string)
        {
            debug!(identity, "ZAP: transient grant");
            return identity;
        }

        if let Some(identity) = self.directory.lookup(client_key_z85) {
            debug!(identity, "ZAP: directory oracle");
            return identity;
        }

        let identity = format!("anon_{client_key_z85}");
        debug!(identity, "ZAP: unknown client, falling back to anonymous");
        identity
    }

    fn send_reply(&self, socket: &zmq::Socket, request_id: &str, identity: &str) -> Result<(), ZapError> {
        socket
            .send(ZAP_VERSION, zmq::SNDMORE)
            .map_err(ZapError::Send)?;
        socket
            .send(request_id, zmq::SNDMORE)
            .map_err(ZapError::Send)?;
        socket.send("200", zmq::SNDMORE).map_err(ZapError::Send)?;
        socket.send("", zmq::SNDMORE).map_err(ZapError::Send)?;
        socket
            .send(identity, zmq::SNDMORE)
            .map_err(ZapError::Send)?;
        socket.send("", 0).map_err(ZapError::Send)?;
        Ok(())
    }
}

fn recv_string(socket: &zmq::Socket, frame: &'static str) -> Result<String, ZapError> {
    socket
        .recv_string(0)
        .map_err(|source| ZapError::Recv { frame, source })?
        .map_err(|_| ZapError::NotUtf8 { frame })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::{NullDirectoryOracle, StaticDirectoryOracle};
    use crate::repo::RepoDescriptor;
    use std::collections::HashMap;

    fn make_repo(id: &str, public_key: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            address: "tcp://repo.example:9000".to_string(),
            public_key: public_key.to_string(),
            endpoint: "01234567-0123-0123-0123-0123456789ab".to_string(),
            path: "/mnt/a/".to_string(),
        }
    }

    fn handler(
        credentials: CredentialStore,
        transient: Arc<RwLock<TransientGrantTable>>,
        directory: Arc<dyn DirectoryOracle>,
    ) -> ZapHandler {
        ZapHandler::new(
            zmq::Context::new(),
            Arc::new(AtomicBool::new(false)),
            credentials,
            transient,
            directory,
        )
    }

    #[test]
    fn resolves_pre_authorized_repo_first() {
        let credentials = CredentialStore::from_repositories(&[make_repo("repo/a", &"K".repeat(40))]);
        let h = handler(
            credentials,
            Arc::new(RwLock::new(TransientGrantTable::new())),
            Arc::new(NullDirectoryOracle),
        );
        assert_eq!(h.resolve_identity(&"K".repeat(40)), "repo/a");
    }

    #[test]
    fn resolves_transient_grant_when_no_pre_authorization() {
        let table = Arc::new(RwLock::new(TransientGrantTable::new()));
        table
            .write()
            .unwrap()
            .insert("XYZ".to_string(), "u/alice".to_string());
        let h = handler(
            CredentialStore::default(),
            table,
            Arc::new(NullDirectoryOracle),
        );
        assert_eq!(h.resolve_identity("XYZ"), "u/alice");
    }

    #[test]
    fn falls_back_to_directory_oracle() {
        let mut entries = HashMap::new();
        entries.insert("K".to_string(), "user/carol".to_string());
        let h = handler(
            CredentialStore::default(),
            Arc::new(RwLock::new(TransientGrantTable::new())),
            Arc::new(StaticDirectoryOracle::new(entries)),
        );
        assert_eq!(h.resolve_identity("K"), "user/carol");
    }

    #[test]
    fn unknown_key_falls_back_to_anon_prefix() {
        let h = handler(
            CredentialStore::default(),
            Arc::new(RwLock::new(TransientGrantTable::new())),
            Arc::new(NullDirectoryOracle),
        );
        let key = "Q".repeat(40);
        assert_eq!(h.resolve_identity(&key), format!("anon_{key}"));
    }

    #[test]
    fn bad_key_length_is_rejected_before_resolution() {
        assert!(matches!(
            validate_key_len(&[0u8; 31]),
            Err(ZapError::BadKeyLength { got: 31 })
        ));
        assert!(validate_key_len(&[0u8; 32]).is_ok());
    }

    fn validate_key_len(key: &[u8]) -> Result<(), ZapError> {
        if key.len() != 32 {
            Err(ZapError::BadKeyLength { got: key.len() })
        } else {
            Ok(())
        }
    }
}
