//! The on-wire container for every command, response and event.
//!
//! One envelope per WebSocket binary frame. Correlation id 0 is reserved
//! for push messages; responses echo the id of the command they answer.

use crate::error::ApiError;
use crate::wire::{Wire, WireError};
use crate::{impl_wire, impl_wire_enum};

/// Correlation id carried by broadcast (push) envelopes.
pub const PUSH_CORRELATION_ID: u64 = 0;

/// What the payload of an envelope is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Response,
    Event,
}

impl_wire_enum!(MessageKind {
    0 => Command,
    1 => Response,
    2 => Event,
});

/// The envelope: `(correlation_id, kind, name, payload)`.
///
/// `payload` is the structural encoding of the named command, response or
/// event type; the envelope itself never inspects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub correlation_id: u64,
    pub kind: MessageKind,
    pub name: String,
    pub payload: Vec<u8>,
}

impl_wire!(Envelope {
    correlation_id,
    kind,
    name,
    payload
});

impl Envelope {
    /// Wrap an encoded command payload.
    pub fn command(correlation_id: u64, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            correlation_id,
            kind: MessageKind::Command,
            name: name.into(),
            payload,
        }
    }

    /// Wrap an encoded response payload, echoing the command's id.
    pub fn response(correlation_id: u64, name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            correlation_id,
            kind: MessageKind::Response,
            name: name.into(),
            payload,
        }
    }

    /// Wrap an encoded event payload for broadcast.
    pub fn push(name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            correlation_id: PUSH_CORRELATION_ID,
            kind: MessageKind::Event,
            name: name.into(),
            payload,
        }
    }

    /// Build a response envelope carrying `Result<Okay, ApiError>`.
    pub fn response_result<T: Wire>(
        correlation_id: u64,
        name: impl Into<String>,
        result: &Result<T, ApiError>,
    ) -> Self {
        Self::response(correlation_id, name, encode_result(result))
    }

    /// Decode the payload as `Result<Okay, ApiError>`.
    pub fn decode_result<T: Wire>(&self) -> Result<Result<T, ApiError>, WireError> {
        decode_result(&self.payload)
    }
}

/// Encode a handler result. Discriminator 0 = okay, 1 = error; the
/// transport never carries success out-of-band.
pub fn encode_result<T: Wire>(result: &Result<T, ApiError>) -> Vec<u8> {
    let mut out = Vec::new();
    match result {
        Ok(value) => {
            0u32.encode(&mut out);
            value.encode(&mut out);
        }
        Err(err) => {
            1u32.encode(&mut out);
            err.encode(&mut out);
        }
    }
    out
}

/// Decode a handler result produced by [`encode_result`].
pub fn decode_result<T: Wire>(mut bytes: &[u8]) -> Result<Result<T, ApiError>, WireError> {
    let buf = &mut bytes;
    let discriminant = u32::decode(buf)?;
    let value = match discriminant {
        0 => Ok(T::decode(buf)?),
        1 => Err(ApiError::decode(buf)?),
        other => {
            return Err(WireError::UnknownDiscriminant {
                type_name: "Result",
                value: other,
            })
        }
    };
    if !buf.is_empty() {
        return Err(WireError::TrailingBytes(buf.len()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn envelope_roundtrip() {
        let envelope = Envelope::command(7, "StatusGet", vec![1, 2, 3]);
        let bytes = envelope.to_wire_bytes();
        assert_eq!(Envelope::from_wire_bytes(&bytes).unwrap(), envelope);
    }

    #[test]
    fn push_uses_reserved_correlation_id() {
        let envelope = Envelope::push("RenderMessageFull", Vec::new());
        assert_eq!(envelope.correlation_id, PUSH_CORRELATION_ID);
        assert_eq!(envelope.kind, MessageKind::Event);
    }

    #[test]
    fn short_frame_is_a_decode_error() {
        assert!(Envelope::from_wire_bytes(&[0, 1, 2]).is_err());
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let mut envelope = Envelope::command(1, "X", Vec::new()).to_wire_bytes();
        // kind discriminator sits right after the 8-byte correlation id
        envelope[8] = 0xAA;
        assert!(matches!(
            Envelope::from_wire_bytes(&envelope),
            Err(WireError::UnknownDiscriminant {
                type_name: "MessageKind",
                ..
            })
        ));
    }

    #[test]
    fn result_roundtrip_okay() {
        let result: Result<u32, ApiError> = Ok(11);
        let decoded = decode_result::<u32>(&encode_result(&result)).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn result_roundtrip_error() {
        let result: Result<u32, ApiError> = Err(ApiError::new("no such scenario"));
        let decoded = decode_result::<u32>(&encode_result(&result)).unwrap();
        assert_eq!(decoded, result);
    }
}
