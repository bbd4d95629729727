// SPDX-License-Identifier: BSD-3-Clause

//! Resource bounds (spec §5): implementation-defined, but finite and
//! documented here rather than left open.

/// Maximum number of simultaneously accepted connections across both
/// sockets.
pub const MAX_CONNECTIONS: usize = 1024;

/// Maximum number of pending (in-flight) requests a single agent
/// connection may have outstanding at once.
pub const MAX_PENDING_PER_AGENT: usize = 256;

/// How long an invoke may sit in the pending-request map before the
/// dispatcher gives up on it and fails it to the agent with `INTERNAL`
/// (spec §4.8 step 8).
pub const PENDING_REQUEST_TIMEOUT_MS: u64 = 30_000;
