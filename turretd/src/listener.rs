// SPDX-License-Identifier: BSD-3-Clause

//! Socket listeners (C8): generalizes the teacher's `Listener<S>` trait
//! (`rpc_protocol::server::Listener`, implemented for both `TcpListener`
//! and `UnixListener`) down to just `UnixListener`, since non-local
//! transport is an explicit Non-goal. Unlike the teacher's single
//! request-reply-per-call loop, a connection here stays open for the whole
//! engagement and carries traffic in both directions concurrently, so each
//! accepted connection gets a read half driven by the accept-loop thread and
//! a write half pumped by a dedicated thread draining that connection's
//! outbox channel.

use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};

use dispatch::{Dispatcher, ListenerClass, Outcome};
use wire::frame;

/// Binds and runs the accept loop for one socket class. Blocks the calling
/// thread; callers run this on a dedicated thread per socket.
pub fn run(listener: UnixListener, listener_class: ListenerClass, dispatcher: Arc<Mutex<Dispatcher>>) {
    info!("listening for {listener_class:?} connections");
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || handle_connection(stream, listener_class, dispatcher));
            }
            Err(e) => warn!("error accepting {listener_class:?} connection: {e}"),
        }
    }
}

fn handle_connection(stream: UnixStream, listener_class: ListenerClass, dispatcher: Arc<Mutex<Dispatcher>>) {
    let writer_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("could not clone connection for writer half: {e}");
            return;
        }
    };

    let (outbox_tx, outbox_rx) = channel();
    let Some(connection_id) = dispatcher.lock().unwrap().connect(listener_class, outbox_tx) else {
        warn!("refusing {listener_class:?} connection: at MAX_CONNECTIONS");
        return;
    };

    let writer = thread::spawn(move || pump_outbox(writer_stream, outbox_rx));

    let mut reader = stream;
    loop {
        let payload = match frame::read_frame(&mut reader) {
            Ok(p) => p,
            Err(_) => break,
        };

        let now_ms = now_ms();
        let (outcome, result) = dispatcher.lock().unwrap().on_envelope(connection_id, &payload, now_ms);
        if let Err(e) = result {
            debug!("connection {connection_id} ({listener_class:?}): {e}");
        }
        if outcome == Outcome::Close {
            break;
        }
    }

    dispatcher.lock().unwrap().disconnect(connection_id);
    let _ = writer.join();
}

fn pump_outbox(mut stream: UnixStream, outbox: Receiver<wire::Envelope>) {
    while let Ok(envelope) = outbox.recv() {
        if let Err(e) = frame::write_frame(&mut stream, &envelope.encode()) {
            warn!("error writing envelope to connection: {e}");
            break;
        }
        let _ = stream.flush();
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use base64::Engine;
    use bunker::document::{Operators, PermissionEntry, PrincipalEntry};
    use bunker::{validate, BunkerDocument};
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use wire::{sign, Body, Envelope, MessageType};

    fn keypair() -> (SigningKey, String) {
        let key = SigningKey::generate(&mut OsRng);
        let b64 = base64::engine::general_purpose::STANDARD.encode(key.verifying_key().as_bytes());
        (key, b64)
    }

    #[test]
    fn happy_path_over_real_unix_sockets() {
        let (agent_key, agent_pub) = keypair();
        let (repeater_key, repeater_pub) = keypair();

        let mut agents = BTreeMap::new();
        agents.insert("corvus".to_string(), PrincipalEntry { ed25519_pubkey_b64: agent_pub });
        let mut repeaters = BTreeMap::new();
        repeaters.insert("rep-1".to_string(), PrincipalEntry { ed25519_pubkey_b64: repeater_pub });
        let mut actions = BTreeMap::new();
        actions.insert("echo".to_string(), "rep-1".to_string());
        let mut permissions = BTreeMap::new();
        permissions.insert("corvus".to_string(), PermissionEntry { allow: vec!["echo".to_string()] });

        let document = BunkerDocument {
            version: 1,
            operators: Operators { recipients: vec!["age1example".to_string()] },
            agents,
            repeaters,
            actions,
            permissions,
            secrets: BTreeMap::new(),
        };
        let validated = validate::validate(&document).unwrap();
        let dispatcher = Arc::new(Mutex::new(Dispatcher::new(validated)));

        let dir = tempfile::tempdir().unwrap();
        let agent_sock_path = dir.path().join("agent.sock");
        let repeater_sock_path = dir.path().join("repeater.sock");

        let agent_listener = UnixListener::bind(&agent_sock_path).unwrap();
        let repeater_listener = UnixListener::bind(&repeater_sock_path).unwrap();

        {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || run(agent_listener, ListenerClass::Agent, dispatcher));
        }
        {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || run(repeater_listener, ListenerClass::Repeater, dispatcher));
        }

        let mut repeater_conn = UnixStream::connect(&repeater_sock_path).unwrap();
        let register_body = Body::Register {
            repeater_id: b"rep-1".to_vec(),
            actions: vec![b"echo".to_vec()],
        }
        .encode();
        let canonical = sign::canonical_bytes(b"rep-1", 1_000, b"n1", &register_body);
        let sig = sign::sign(&repeater_key, &canonical);
        let register = Envelope {
            version: 1,
            msg_type: MessageType::Register,
            principal: b"rep-1".to_vec(),
            ts_ms: 1_000,
            nonce: b"n1".to_vec(),
            body: register_body,
            sig: sig.to_vec(),
        };
        frame::write_frame(&mut repeater_conn, &register.encode()).unwrap();

        let mut agent_conn = UnixStream::connect(&agent_sock_path).unwrap();
        let invoke_body = Body::Invoke {
            request_id: b"r1".to_vec(),
            action: b"echo".to_vec(),
            params: b"hi".to_vec(),
        }
        .encode();
        let canonical = sign::canonical_bytes(b"corvus", 1_000, b"n2", &invoke_body);
        let sig = sign::sign(&agent_key, &canonical);
        let invoke = Envelope {
            version: 1,
            msg_type: MessageType::Invoke,
            principal: b"corvus".to_vec(),
            ts_ms: 1_000,
            nonce: b"n2".to_vec(),
            body: invoke_body,
            sig: sig.to_vec(),
        };
        frame::write_frame(&mut agent_conn, &invoke.encode()).unwrap();

        let forwarded_payload = frame::read_frame(&mut repeater_conn).unwrap();
        let forwarded = Envelope::decode(&forwarded_payload).unwrap();
        let request_id = match Body::decode(forwarded.msg_type, &forwarded.body).unwrap() {
            Body::Invoke { request_id, .. } => request_id,
            other => panic!("expected invoke, got {other:?}"),
        };

        let result_body = Body::Result {
            request_id,
            result: b"hi".to_vec(),
        }
        .encode();
        let canonical = sign::canonical_bytes(b"rep-1", 1_000, b"n3", &result_body);
        let sig = sign::sign(&repeater_key, &canonical);
        let result = Envelope {
            version: 1,
            msg_type: MessageType::Result,
            principal: b"rep-1".to_vec(),
            ts_ms: 1_000,
            nonce: b"n3".to_vec(),
            body: result_body,
            sig: sig.to_vec(),
        };
        frame::write_frame(&mut repeater_conn, &result.encode()).unwrap();

        let delivered_payload = frame::read_frame(&mut agent_conn).unwrap();
        let delivered = Envelope::decode(&delivered_payload).unwrap();
        match Body::decode(delivered.msg_type, &delivered.body).unwrap() {
            Body::Result { request_id, result } => {
                assert_eq!(request_id, b"r1");
                assert_eq!(result, b"hi");
            }
            other => panic!("expected result, got {other:?}"),
        }
    }
}
