// SPDX-License-Identifier: BSD-3-Clause

//! Wires the wire/bunker/dispatch crates together into a running daemon:
//! filesystem layout (`config`), the lifecycle state machine (`lifecycle`),
//! and the Unix-socket accept loops (`listener`).

pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod listener;

pub use config::Config;
pub use errors::TurretError;
pub use lifecycle::{Supervisor, State};
