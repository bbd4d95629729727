// SPDX-License-Identifier: BSD-3-Clause

//! The lifecycle controller (C10), spec §4.9: an explicit finite state
//! machine gating `turretd` between a cold, unconfigured process and one
//! serving both sockets. Modeled as a `State` enum plus a `Supervisor`
//! owning the transition methods, the way the teacher separates mountd's
//! "not yet registered with rpcbind" and "serving" phases rather than
//! folding both into one ad hoc flag.

use std::os::unix::net::UnixListener;
use std::sync::{Arc, Mutex};
use std::thread;

use bunker::unlock::UnlockSource;
use bunker::BunkerStore;
use dispatch::{Dispatcher, ListenerClass};
use log::info;

use crate::config::Config;
use crate::errors::TurretError;
use crate::listener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No bunker loaded, no sockets bound.
    Cold,
    /// Bunker decrypted and validated, sockets not yet bound.
    Unlocking,
    /// Both sockets bound and accepting connections.
    Engaged,
    /// Tearing down; transient, collapses back to `Cold`.
    Disengaging,
}

pub struct Supervisor {
    config: Config,
    state: State,
    dispatcher: Option<Arc<Mutex<Dispatcher>>>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: State::Cold,
            dispatcher: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Decrypts and validates the bunker, building the dispatcher state but
    /// not yet binding any socket. A validation failure leaves the
    /// supervisor in `Cold` (spec §4.4: "aborts fire-up entirely").
    pub fn fire_up(&mut self, unlock: &dyn UnlockSource) -> Result<(), TurretError> {
        if self.state != State::Cold {
            return Err(TurretError::NotCold(self.state));
        }

        let store = BunkerStore::load(
            &self.config.bunker_path,
            self.config.host_identity_path.as_deref(),
            unlock,
        )?;
        info!("bunker loaded and validated");

        self.dispatcher = Some(Arc::new(Mutex::new(Dispatcher::new(store.validated))));
        self.state = State::Unlocking;
        Ok(())
    }

    /// Binds both sockets, spawns their accept loops, and writes the pid
    /// file the `status`/`stop` CLI verbs key off of.
    pub fn engage(&mut self) -> Result<(), TurretError> {
        if self.state != State::Unlocking {
            return Err(TurretError::NotUnlocking(self.state));
        }

        if self.config.pid_file_path.exists() {
            return Err(TurretError::AlreadyRunning(self.config.pid_file_path.clone()));
        }

        let dispatcher = self
            .dispatcher
            .clone()
            .expect("fire_up populates the dispatcher before entering Unlocking");

        // Stale socket files from an unclean prior exit would otherwise
        // fail the bind below.
        let _ = std::fs::remove_file(&self.config.agent_socket_path);
        let _ = std::fs::remove_file(&self.config.repeater_socket_path);

        let agent_listener = UnixListener::bind(&self.config.agent_socket_path).map_err(|source| TurretError::Bind {
            path: self.config.agent_socket_path.clone(),
            source,
        })?;
        let repeater_listener =
            UnixListener::bind(&self.config.repeater_socket_path).map_err(|source| TurretError::Bind {
                path: self.config.repeater_socket_path.clone(),
                source,
            })?;

        {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || listener::run(agent_listener, ListenerClass::Agent, dispatcher));
        }
        {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || listener::run(repeater_listener, ListenerClass::Repeater, dispatcher));
        }
        {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || deadline_sweep_loop(dispatcher));
        }

        std::fs::write(&self.config.pid_file_path, std::process::id().to_string())?;

        info!("engaged: serving agent and repeater sockets");
        self.state = State::Engaged;
        Ok(())
    }

    /// Tears down sockets, the pid file, and the dispatcher. Dropping the
    /// dispatcher drops the `ValidatedBunker` it owns, which zeroizes every
    /// loaded secret (`bunker::secrets::SecretStore`'s `Drop` impl).
    /// Listener threads are not joined: the caller is expected to exit the
    /// process shortly after this returns, per the teacher's fire-and-forget
    /// thread-per-connection model having no shutdown channel of its own.
    pub fn disengage(&mut self) {
        self.state = State::Disengaging;

        let _ = std::fs::remove_file(&self.config.pid_file_path);
        let _ = std::fs::remove_file(&self.config.agent_socket_path);
        let _ = std::fs::remove_file(&self.config.repeater_socket_path);
        self.dispatcher = None;

        info!("disengaged");
        self.state = State::Cold;
    }
}

/// Drives `Dispatcher::sweep_deadlines` once a second for the life of the
/// process, per that method's own doc comment. Like the listener threads,
/// this is never joined; it dies with the process on disengage.
fn deadline_sweep_loop(dispatcher: Arc<Mutex<Dispatcher>>) {
    loop {
        thread::sleep(std::time::Duration::from_secs(1));
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        dispatcher.lock().unwrap().sweep_deadlines(now_ms);
    }
}
