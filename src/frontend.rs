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

//! The router/dealer proxy fabric: two external frontends feeding one
//! internal fan-out, all steerable from a single control publisher.
//!
//! Every socket this module opens is linger-bounded to 100ms so shutdown
//! never stalls on an undelivered frame.

use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{error, info};

use crate::security::SecurityContext;

const MSG_PROC_ENDPOINT: &str = "inproc://msg_proc";
const WORKERS_ENDPOINT: &str = "inproc://workers";
const CONTROL_ENDPOINT: &str = "inproc://control";
const LINGER_MS: i32 = 100;
const TERMINATE_COMMAND: &str = "TERMINATE";

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("failed to create {role} socket: {source}")]
    CreateSocket { role: &'static str, source: zmq::Error },
    #[error("failed to bind {role} socket to {endpoint}: {source}")]
    Bind {
        role: &'static str,
        endpoint: String,
        source: zmq::Error,
    },
    #[error("failed to connect {role} socket to {endpoint}: {source}")]
    Connect {
        role: &'static str,
        endpoint: String,
        source: zmq::Error,
    },
    #[error("failed to apply CURVE server keys: {0}")]
    Curve(zmq::Error),
    #[error("failed to subscribe control socket: {0}")]
    Subscribe(zmq::Error),
    #[error("failed to set linger on {role} socket: {0}")]
    Linger { role: &'static str, source: zmq::Error },
    #[error("failed to publish control command: {0}")]
    Publish(zmq::Error),
    #[error("steerable proxy failed: {0}")]
    Proxy(zmq::Error),
    #[error("plain proxy failed: {0}")]
    PlainProxy(zmq::Error),
}

fn set_linger(socket: &zmq::Socket, role: &'static str) -> Result<(), FrontendError> {
    socket
        .set_linger(LINGER_MS)
        .map_err(|source| FrontendError::Linger { role, source })
}

fn control_subscriber(
    zmq_context: &zmq::Context,
    role: &'static str,
) -> Result<zmq::Socket, FrontendError> {
    let control = zmq_context
        .socket(zmq::SUB)
        .map_err(|source| FrontendError::CreateSocket { role, source })?;
    set_linger(&control, role)?;
    control
        .connect(CONTROL_ENDPOINT)
        .map_err(|source| FrontendError::Connect {
            role,
            endpoint: CONTROL_ENDPOINT.to_string(),
            source,
        })?;
    control.set_subscribe(b"").map_err(FrontendError::Subscribe)?;
    Ok(control)
}

/// The publisher half of the shutdown control channel. Owned by the
/// lifecycle controller; every proxy leg below holds a SUB socket connected
/// to the same endpoint.
pub struct ControlChannel {
    publisher: zmq::Socket,
}

impl ControlChannel {
    /// Binds the control publisher. Must happen before any proxy leg is
    /// spawned, since inproc sockets require the bind side to exist first.
    pub fn bind(zmq_context: &zmq::Context) -> Result<Self, FrontendError> {
        let publisher = zmq_context
            .socket(zmq::PUB)
            .map_err(|source| FrontendError::CreateSocket { role: "control", source })?;
        set_linger(&publisher, "control")?;
        publisher
            .bind(CONTROL_ENDPOINT)
            .map_err(|source| FrontendError::Bind {
                role: "control",
                endpoint: CONTROL_ENDPOINT.to_string(),
                source,
            })?;
        Ok(Self { publisher })
    }

    /// Publish the termination command. Every proxy leg's SUB socket is
    /// subscribed to everything, so a single publish stops all three.
    pub fn terminate(&self) -> Result<(), FrontendError> {
        self.publisher
            .send(TERMINATE_COMMAND, 0)
            .map_err(FrontendError::Publish)
    }
}

/// Spawn the internal router-to-dealer fan-out: `inproc://msg_proc` (router)
/// to `inproc://workers` (dealer), steered by the control channel.
pub fn spawn_internal_fanout(zmq_context: zmq::Context) -> Result<JoinHandle<()>, FrontendError> {
    let frontend = zmq_context
        .socket(zmq::ROUTER)
        .map_err(|source| FrontendError::CreateSocket { role: "msg_proc", source })?;
    set_linger(&frontend, "msg_proc")?;
    frontend
        .bind(MSG_PROC_ENDPOINT)
        .map_err(|source| FrontendError::Bind {
            role: "msg_proc",
            endpoint: MSG_PROC_ENDPOINT.to_string(),
            source,
        })?;

    let backend = zmq_context
        .socket(zmq::DEALER)
        .map_err(|source| FrontendError::CreateSocket { role: "workers", source })?;
    set_linger(&backend, "workers")?;
    backend
        .bind(WORKERS_ENDPOINT)
        .map_err(|source| FrontendError::Bind {
            role: "workers",
            endpoint: WORKERS_ENDPOINT.to_string(),
            source,
        })?;

    let mut control = control_subscriber(&zmq_context, "msg_proc-control")?;
    let mut frontend = frontend;
    let mut backend = backend;

    let handle = std::thread::Builder::new()
        .name("repofed-msg-router".to_string())
        .spawn(move || {
            info!("internal message fan-out started");
            if let Err(e) = zmq::proxy_steerable(&mut frontend, &mut backend, &mut control) {
                error!(error = ?e, "internal message fan-out failed");
            }
            info!("internal message fan-out stopped");
        })
        .expect("failed to spawn msg-router thread");

    Ok(handle)
}

/// Spawn the secure (CURVE) frontend: an authenticated router bound at
/// `tcp://*:{port}`, proxied into the internal fan-out.
pub fn spawn_secure_frontend(
    zmq_context: zmq::Context,
    port: u16,
    security: SecurityContext,
) -> Result<JoinHandle<()>, FrontendError> {
    let frontend = zmq_context
        .socket(zmq::ROUTER)
        .map_err(|source| FrontendError::CreateSocket { role: "secure-frontend", source })?;
    set_linger(&frontend, "secure-frontend")?;
    frontend
        .set_curve_server(true)
        .map_err(FrontendError::Curve)?;
    frontend
        .set_curve_publickey(security.public_key.as_bytes())
        .map_err(FrontendError::Curve)?;
    frontend
        .set_curve_secretkey(security.private_key.as_bytes())
        .map_err(FrontendError::Curve)?;
    let endpoint = format!("tcp://*:{port}");
    frontend
        .bind(&endpoint)
        .map_err(|source| FrontendError::Bind {
            role: "secure-frontend",
            endpoint: endpoint.clone(),
            source,
        })?;

    let backend = zmq_context
        .socket(zmq::DEALER)
        .map_err(|source| FrontendError::CreateSocket { role: "secure-frontend-backend", source })?;
    set_linger(&backend, "secure-frontend-backend")?;
    backend
        .connect(MSG_PROC_ENDPOINT)
        .map_err(|source| FrontendError::Connect {
            role: "secure-frontend-backend",
            endpoint: MSG_PROC_ENDPOINT.to_string(),
            source,
        })?;

    let mut control = control_subscriber(&zmq_context, "secure-frontend-control")?;
    let mut frontend = frontend;
    let mut backend = backend;

    let handle = std::thread::Builder::new()
        .name("repofed-io-secure".to_string())
        .spawn(move || {
            info!(%endpoint, "secure frontend started");
            if let Err(e) = zmq::proxy_steerable(&mut frontend, &mut backend, &mut control) {
                error!(error = ?e, "secure frontend failed");
            }
            info!("secure frontend stopped");
        })
        .expect("failed to spawn secure frontend thread");

    Ok(handle)
}

/// Spawn the cleartext frontend: an unauthenticated router bound at
/// `tcp://*:{port}`, proxied into the internal fan-out.
pub fn spawn_cleartext_frontend(
    zmq_context: zmq::Context,
    port: u16,
) -> Result<JoinHandle<()>, FrontendError> {
    let frontend = zmq_context
        .socket(zmq::ROUTER)
        .map_err(|source| FrontendError::CreateSocket { role: "cleartext-frontend", source })?;
    set_linger(&frontend, "cleartext-frontend")?;
    let endpoint = format!("tcp://*:{port}");
    frontend
        .bind(&endpoint)
        .map_err(|source| FrontendError::Bind {
            role: "cleartext-frontend",
            endpoint: endpoint.clone(),
            source,
        })?;

    let backend = zmq_context
        .socket(zmq::DEALER)
        .map_err(|source| FrontendError::CreateSocket {
            role: "cleartext-frontend-backend",
            source,
        })?;
    set_linger(&backend, "cleartext-frontend-backend")?;
    backend
        .connect(MSG_PROC_ENDPOINT)
        .map_err(|source| FrontendError::Connect {
            role: "cleartext-frontend-backend",
            endpoint: MSG_PROC_ENDPOINT.to_string(),
            source,
        })?;

    let mut control = control_subscriber(&zmq_context, "cleartext-frontend-control")?;
    let mut frontend = frontend;
    let mut backend = backend;

    let handle = std::thread::Builder::new()
        .name("repofed-io-insecure".to_string())
        .spawn(move || {
            info!(%endpoint, "cleartext frontend started");
            if let Err(e) = zmq::proxy_steerable(&mut frontend, &mut backend, &mut control) {
                error!(error = ?e, "cleartext frontend failed");
            }
            info!("cleartext frontend stopped");
        })
        .expect("failed to spawn cleartext frontend thread");

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn control_channel_publish_is_received_by_subscriber() {
        let ctx = zmq::Context::new();
        let channel = ControlChannel::bind(&ctx).unwrap();

        let sub = ctx.socket(zmq::SUB).unwrap();
        sub.connect(CONTROL_ENDPOINT).unwrap();
        sub.set_subscribe(b"").unwrap();
        // Give the subscriber a moment to complete its subscription before
        // the publish races ahead of it (PUB/SUB has no connect handshake).
        std::thread::sleep(Duration::from_millis(50));

        channel.terminate().unwrap();

        let got = sub.recv_string(0).unwrap().unwrap();
        assert_eq!(got, TERMINATE_COMMAND);
    }

    #[test]
    fn internal_fanout_stops_on_terminate() {
        let ctx = zmq::Context::new();
        let channel = ControlChannel::bind(&ctx).unwrap();
        let handle = spawn_internal_fanout(ctx).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        channel.terminate().unwrap();

        handle.join().unwrap();
    }
}
