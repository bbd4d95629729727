// SPDX-License-Identifier: BSD-3-Clause

//! Frame-level length prefixing: a 4-byte big-endian length followed by
//! that many bytes of payload. This is the outermost layer; envelope
//! decoding (`crate::envelope`) operates on the payload once it has been
//! read off the wire whole.

use std::io::{Read, Write};

use log::{trace, warn};

use crate::{Error, ProtocolError, MAX_FRAME_BYTES};

/// Reads one length-prefixed frame from `stream` and returns its payload.
///
/// A declared length greater than [`MAX_FRAME_BYTES`] is a fatal protocol
/// violation on the connection (the caller should close it, not try to
/// resynchronize).
pub fn read_frame<S: Read>(stream: &mut S) -> Result<Vec<u8>, Error> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).inspect_err(|e| {
        if e.kind() != std::io::ErrorKind::UnexpectedEof {
            warn!("error reading frame length: {e}");
        }
    })?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    trace!("incoming frame, declared length {len}");

    if len > MAX_FRAME_BYTES {
        return Err(Error::Protocol(ProtocolError::FrameTooLarge));
    }

    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .inspect_err(|e| warn!("error reading frame payload: {e}"))?;

    Ok(payload)
}

/// Writes `payload` to `stream` prefixed with its big-endian length.
///
/// Callers are expected to have already checked `payload.len() <=
/// MAX_FRAME_BYTES`; this function trusts that and will produce a frame no
/// peer following the protocol should send, rather than silently truncate.
pub fn write_frame<S: Write>(stream: &mut S, payload: &[u8]) -> Result<(), Error> {
    if payload.len() > MAX_FRAME_BYTES {
        return Err(Error::Protocol(ProtocolError::FrameTooLarge));
    }

    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(payload)?;

    Ok(())
}
