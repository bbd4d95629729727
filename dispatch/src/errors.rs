// SPDX-License-Identifier: BSD-3-Clause

//! Dispatcher-level errors, each carrying the `wire::ErrorCode` it becomes
//! in an `error` envelope back to the agent (spec §4.8, §7).

use wire::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("signature did not verify, or principal unknown")]
    Unauthenticated,

    #[error("replay: {0}")]
    Replay(&'static str),

    #[error("agent not permitted to invoke this action")]
    Denied,

    #[error("no such action in the bunker")]
    UnknownAction,

    #[error("action has no repeater currently registered")]
    NoRepeater,

    #[error("malformed request: {0}")]
    BadRequest(&'static str),

    #[error("internal dispatcher fault: {0}")]
    Internal(&'static str),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::Replay(_) => ErrorCode::Replay,
            Self::Denied => ErrorCode::Denied,
            Self::UnknownAction => ErrorCode::UnknownAction,
            Self::NoRepeater => ErrorCode::NoRepeater,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
