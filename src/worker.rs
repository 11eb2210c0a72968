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

//! The worker pool: `W` dealer sockets fed by the internal fan-out. Request
//! handling itself is external to this crate; [`RequestHandler`] is the seam
//! a real deployment plugs its wire-level dispatch into.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, error, info};

use crate::core::ServerCapability;

pub const DEFAULT_NUM_WORKERS: u32 = 8;
const POLL_TIMEOUT_MS: i64 = 200;

/// Handles one fully-framed client request and produces the reply frames
/// that get routed back to the same peer. `identity` is the ZAP-assigned
/// frame the router prepended; it is not part of `request`.
pub trait RequestHandler: Send + Sync {
    fn handle(
        &self,
        identity: &[u8],
        request: Vec<Vec<u8>>,
        capability: &dyn ServerCapability,
    ) -> Vec<Vec<u8>>;
}

/// Echoes the request back unchanged. Used only by tests; a real deployment
/// supplies its own handler.
#[derive(Debug, Default)]
pub struct EchoRequestHandler;

impl RequestHandler for EchoRequestHandler {
    fn handle(
        &self,
        _identity: &[u8],
        request: Vec<Vec<u8>>,
        _capability: &dyn ServerCapability,
    ) -> Vec<Vec<u8>> {
        request
    }
}

/// Spawn `num_workers` worker threads, each owning a dealer socket connected
/// to the internal fan-out. Stopping relies solely on the kill switch
/// observed between polls, never on another thread closing this socket.
pub fn spawn_workers(
    zmq_context: zmq::Context,
    kill_switch: Arc<AtomicBool>,
    num_workers: u32,
    handler: Arc<dyn RequestHandler>,
    capability: Arc<dyn ServerCapability>,
) -> Vec<JoinHandle<()>> {
    (1..=num_workers)
        .map(|worker_id| {
            let zmq_context = zmq_context.clone();
            let kill_switch = kill_switch.clone();
            let handler = handler.clone();
            let capability = capability.clone();

            std::thread::Builder::new()
                .name(format!("repofed-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &zmq_context, &kill_switch, handler.as_ref(), capability.as_ref()))
                .expect("failed to spawn worker thread")
        })
        .collect()
}

fn worker_loop(
    worker_id: u32,
    zmq_context: &zmq::Context,
    kill_switch: &AtomicBool,
    handler: &dyn RequestHandler,
    capability: &dyn ServerCapability,
) {
    let socket = match zmq_context.socket(zmq::DEALER) {
        Ok(socket) => socket,
        Err(e) => {
            error!(worker_id, error = ?e, "failed to create worker socket");
            return;
        }
    };
    if let Err(e) = socket.connect("inproc://workers") {
        error!(worker_id, error = ?e, "failed to connect worker socket");
        return;
    }

    info!(worker_id, "worker started");

    while !kill_switch.load(Ordering::Relaxed) {
        let poll_result = match socket.poll(zmq::POLLIN, POLL_TIMEOUT_MS) {
            Ok(n) => n,
            Err(e) => {
                error!(worker_id, error = ?e, "worker poll failed");
                continue;
            }
        };
        if poll_result == 0 {
            continue;
        }

        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                error!(worker_id, error = ?e, "worker recv failed");
                continue;
            }
        };

        let Some((identity, request)) = frames.split_first() else {
            error!(worker_id, "worker received an empty multipart message");
            continue;
        };
        let identity = identity.clone();
        let request = request.to_vec();

        debug!(worker_id, frame_count = request.len(), "handling request");
        let reply = handler.handle(&identity, request, capability);

        let mut message = Vec::with_capacity(reply.len() + 1);
        message.push(identity);
        message.extend(reply);

        if let Err(e) = socket.send_multipart(message, 0) {
            error!(worker_id, error = ?e, "worker reply send failed");
        }
    }

    info!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::NoopCapability;
    use std::time::Duration;

    #[test]
    fn echo_handler_returns_request_unchanged() {
        let handler = EchoRequestHandler;
        let capability = NoopCapability;
        let request = vec![b"hello".to_vec()];
        let reply = handler.handle(b"peer-id", request.clone(), &capability);
        assert_eq!(reply, request);
    }

    #[test]
    fn worker_pool_stops_on_kill_switch() {
        let ctx = zmq::Context::new();
        let fanout_backend = ctx.socket(zmq::ROUTER).unwrap();
        fanout_backend.bind("inproc://workers").unwrap();

        let kill_switch = Arc::new(AtomicBool::new(false));
        let handles = spawn_workers(
            ctx.clone(),
            kill_switch.clone(),
            2,
            Arc::new(EchoRequestHandler),
            Arc::new(NoopCapability),
        );

        std::thread::sleep(Duration::from_millis(50));
        kill_switch.store(true, Ordering::Relaxed);

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
