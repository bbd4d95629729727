// SPDX-License-Identifier: BSD-3-Clause

//! Filesystem layout for one engagement: where the bunker lives, where the
//! two sockets get bound, and where the pid file for `status`/`stop` goes.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub bunker_path: PathBuf,
    /// Path to an `age` X25519 identity file tried before falling back to
    /// an operator unlock (spec §4.4). `None` skips straight to the
    /// fallback.
    pub host_identity_path: Option<PathBuf>,
    pub agent_socket_path: PathBuf,
    pub repeater_socket_path: PathBuf,
    pub pid_file_path: PathBuf,
}

impl Config {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            bunker_path: state_dir.join("bunker.age"),
            host_identity_path: Some(state_dir.join("host.identity")),
            agent_socket_path: state_dir.join("agent.sock"),
            repeater_socket_path: state_dir.join("repeater.sock"),
            pid_file_path: state_dir.join("turretd.pid"),
        }
    }
}
