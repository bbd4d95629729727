// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurretError {
    #[error("loading bunker: {0}")]
    Bunker(#[from] bunker::BunkerError),

    #[error("binding socket at {path}: {source}")]
    Bind {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fire-up attempted from state {0:?}, expected Cold")]
    NotCold(crate::lifecycle::State),

    #[error("engage attempted from state {0:?}, expected Unlocking")]
    NotUnlocking(crate::lifecycle::State),

    #[error("already engaged: another turretd appears to be running (pid file {0:?} present)")]
    AlreadyRunning(std::path::PathBuf),
}
