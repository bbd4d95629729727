// SPDX-License-Identifier: BSD-3-Clause

//! Envelope encode/decode: the `TRT1` binary layout from spec §4.1.
//!
//! Integer fields are little-endian except `bstr` length prefixes, which
//! are big-endian (matching common network byte order for lengths while
//! keeping scalar fields in the host-natural little-endian form the
//! original project used throughout).

use crate::{Error, ProtocolError, MAX_FRAME_BYTES};

const MAGIC: &[u8; 4] = b"TRT1";
const VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    Register = 1,
    Invoke = 2,
    Result = 3,
    Error = 4,
}

impl MessageType {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Self::Register,
            2 => Self::Invoke,
            3 => Self::Result,
            4 => Self::Error,
            _ => return None,
        })
    }
}

/// A decoded envelope. `body` is kept as opaque bytes here: the exact
/// decoded bytes are what canonical signing operates over (§4.2), and it is
/// up to the caller to further decode it as a [`Body`] once the type has
/// been classified and (for register/invoke) authorization has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u16,
    pub msg_type: MessageType,
    pub principal: Vec<u8>,
    pub ts_ms: u64,
    pub nonce: Vec<u8>,
    pub body: Vec<u8>,
    pub sig: Vec<u8>,
}

impl Envelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            4 + 2 + 2 + 4 + self.principal.len() + 8 + 4 + self.nonce.len() + 4 + self.body.len() + 4 + self.sig.len(),
        );
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.msg_type as u16).to_le_bytes());
        write_bstr(&mut out, &self.principal);
        out.extend_from_slice(&self.ts_ms.to_le_bytes());
        write_bstr(&mut out, &self.nonce);
        write_bstr(&mut out, &self.body);
        write_bstr(&mut out, &self.sig);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut rest = buf;

        take(&mut rest, 4)
            .filter(|m| m == MAGIC)
            .ok_or(ProtocolError::BadMagic)?;

        let version = take_u16_le(&mut rest)?;
        if version != VERSION {
            return Err(ProtocolError::BadVersion.into());
        }

        let msg_type_raw = take_u16_le(&mut rest)?;
        let msg_type = MessageType::from_u16(msg_type_raw).ok_or(ProtocolError::UnknownType)?;

        let principal = read_bstr(&mut rest)?;
        let ts_ms = take_u64_le(&mut rest)?;
        let nonce = read_bstr(&mut rest)?;
        let body = read_bstr(&mut rest)?;
        let sig = read_bstr(&mut rest)?;

        if !rest.is_empty() {
            return Err(ProtocolError::TrailingBytes.into());
        }

        Ok(Envelope {
            version,
            msg_type,
            principal,
            ts_ms,
            nonce,
            body,
            sig,
        })
    }
}

/// The per-type body layouts from spec §4.1. These are encoded/decoded
/// independently of the envelope: the envelope only ever carries `body` as
/// an opaque `bstr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Register {
        repeater_id: Vec<u8>,
        actions: Vec<Vec<u8>>,
    },
    Invoke {
        request_id: Vec<u8>,
        action: Vec<u8>,
        params: Vec<u8>,
    },
    Result {
        request_id: Vec<u8>,
        result: Vec<u8>,
    },
    Error {
        request_id: Vec<u8>,
        code: u16,
        message: Vec<u8>,
    },
}

impl Body {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Body::Register {
                repeater_id,
                actions,
            } => {
                write_bstr(&mut out, repeater_id);
                out.extend_from_slice(&(actions.len() as u32).to_le_bytes());
                for action in actions {
                    write_bstr(&mut out, action);
                }
            }
            Body::Invoke {
                request_id,
                action,
                params,
            } => {
                write_bstr(&mut out, request_id);
                write_bstr(&mut out, action);
                write_bstr(&mut out, params);
            }
            Body::Result { request_id, result } => {
                write_bstr(&mut out, request_id);
                write_bstr(&mut out, result);
            }
            Body::Error {
                request_id,
                code,
                message,
            } => {
                write_bstr(&mut out, request_id);
                out.extend_from_slice(&code.to_le_bytes());
                write_bstr(&mut out, message);
            }
        }
        out
    }

    pub fn decode(msg_type: MessageType, buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut rest = buf;

        let decoded = match msg_type {
            MessageType::Register => {
                let repeater_id = read_bstr(&mut rest)?;
                let count = take_u32_le(&mut rest)?;
                let mut actions = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    actions.push(read_bstr(&mut rest)?);
                }
                Body::Register {
                    repeater_id,
                    actions,
                }
            }
            MessageType::Invoke => {
                let request_id = read_bstr(&mut rest)?;
                let action = read_bstr(&mut rest)?;
                let params = read_bstr(&mut rest)?;
                Body::Invoke {
                    request_id,
                    action,
                    params,
                }
            }
            MessageType::Result => {
                let request_id = read_bstr(&mut rest)?;
                let result = read_bstr(&mut rest)?;
                Body::Result { request_id, result }
            }
            MessageType::Error => {
                let request_id = read_bstr(&mut rest)?;
                let code = take_u16_le(&mut rest)?;
                let message = read_bstr(&mut rest)?;
                Body::Error {
                    request_id,
                    code,
                    message,
                }
            }
        };

        if !rest.is_empty() {
            return Err(ProtocolError::TrailingBytes);
        }

        Ok(decoded)
    }

    /// Best-effort extraction of the `request_id`, used to build a reply
    /// when full decoding fails partway through (spec §4.8 step 1: "reply
    /// `error{request_id=∅, code=BAD_REQUEST}` if a request_id is
    /// recoverable").
    pub fn request_id(&self) -> Option<&[u8]> {
        match self {
            Body::Register { .. } => None,
            Body::Invoke { request_id, .. }
            | Body::Result { request_id, .. }
            | Body::Error { request_id, .. } => Some(request_id),
        }
    }
}

fn write_bstr(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn read_bstr(rest: &mut &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = take_u32_be(rest)? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge);
    }
    if len > rest.len() {
        return Err(ProtocolError::LengthExceedsFrame);
    }
    let data = rest[..len].to_vec();
    *rest = &rest[len..];
    Ok(data)
}

fn take<'a>(rest: &mut &'a [u8], n: usize) -> Option<&'a [u8]> {
    if rest.len() < n {
        return None;
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Some(head)
}

fn take_u16_le(rest: &mut &[u8]) -> Result<u16, ProtocolError> {
    let bytes = take(rest, 2).ok_or(ProtocolError::Truncated)?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn take_u32_le(rest: &mut &[u8]) -> Result<u32, ProtocolError> {
    let bytes = take(rest, 4).ok_or(ProtocolError::Truncated)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn take_u32_be(rest: &mut &[u8]) -> Result<u32, ProtocolError> {
    let bytes = take(rest, 4).ok_or(ProtocolError::Truncated)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn take_u64_le(rest: &mut &[u8]) -> Result<u64, ProtocolError> {
    let bytes = take(rest, 8).ok_or(ProtocolError::Truncated)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}
