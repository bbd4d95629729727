// SPDX-License-Identifier: BSD-3-Clause

//! Wire-level pieces of the turret protocol: frame length-prefixing,
//! envelope encode/decode, canonical-bytes signing, and the replay window.
//!
//! Everything here is synchronous and allocation-based; callers own the
//! stream and the thread. This mirrors the blocking, per-connection style
//! the rest of this workspace uses throughout.

pub mod envelope;
pub mod frame;
pub mod replay;
pub mod sign;

use std::fmt;

pub use envelope::{Body, Envelope, MessageType};
pub use replay::ReplayWindow;

/// Maximum size, in bytes, of a single frame payload (the envelope plus its
/// 4-byte length prefix is bounded by this on the payload side).
pub const MAX_FRAME_BYTES: usize = 262_144;

/// The eight numeric error codes carried in `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Unauthenticated = 1,
    Replay = 2,
    Denied = 3,
    UnknownAction = 4,
    NoRepeater = 5,
    BadRequest = 6,
    Internal = 7,
}

impl ErrorCode {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Unauthenticated,
            2 => Self::Replay,
            3 => Self::Denied,
            4 => Self::UnknownAction,
            5 => Self::NoRepeater,
            6 => Self::BadRequest,
            7 => Self::Internal,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Replay => "REPLAY",
            Self::Denied => "DENIED",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::NoRepeater => "NO_REPEATER",
            Self::BadRequest => "BAD_REQUEST",
            Self::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Errors that can arise decoding a frame or envelope off the wire.
#[derive(Debug)]
pub enum Error {
    /// A frame or envelope failed to decode. Always maps to `BAD_REQUEST`
    /// when a `request_id` can be recovered, per spec; otherwise the
    /// connection is dropped without a reply.
    Protocol(ProtocolError),

    /// I/O failure reading or writing the underlying stream.
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProtocolError {
    BadMagic,
    BadVersion,
    UnknownType,
    Truncated,
    /// A `bstr` length header claimed more bytes than remain in the frame.
    LengthExceedsFrame,
    /// Bytes remained in the frame after decoding the last field (`sig`).
    TrailingBytes,
    /// The frame's declared length (or a `bstr` within it) exceeds
    /// `MAX_FRAME_BYTES`.
    FrameTooLarge,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadMagic => "bad magic",
            Self::BadVersion => "unsupported version",
            Self::UnknownType => "unknown envelope type",
            Self::Truncated => "truncated envelope",
            Self::LengthExceedsFrame => "bstr length exceeds frame",
            Self::TrailingBytes => "trailing bytes after sig",
            Self::FrameTooLarge => "frame exceeds maximum size",
        };
        write!(f, "{s}")
    }
}

/// A unix-socketpair-backed pipe, handy for exercising client/server
/// behavior in tests without touching the filesystem.
#[cfg(test)]
pub mod pipe {
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

    pub struct Endpoint {
        fd: std::os::fd::OwnedFd,
    }

    pub fn pipe() -> std::io::Result<(Endpoint, Endpoint)> {
        let (a, b) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::empty(),
        )?;

        Ok((Endpoint { fd: a }, Endpoint { fd: b }))
    }

    impl std::io::Read for Endpoint {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(nix::unistd::read(&self.fd, buf)?)
        }
    }

    impl std::io::Write for Endpoint {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(nix::unistd::write(&self.fd, buf)?)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
