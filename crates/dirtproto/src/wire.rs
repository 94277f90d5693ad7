//! Structural binary codec for the DirtSim wire protocol.
//!
//! Every command, response and event type declares its field order once via
//! [`impl_wire!`] (structs) or [`impl_wire_enum!`] (tagged variants); the
//! JSON side of the same types is driven by serde derives, so the shape of
//! each message exists in exactly one place.
//!
//! ## Encoding rules
//!
//! - scalars are little-endian; `bool` is a single byte (0 or 1)
//! - `String` and sequences carry a `u32` count prefix
//! - aggregates concatenate their fields in declaration order
//! - tagged variants write a `u32` discriminator, then the active arm
//! - `Option<T>` writes a presence `bool`, then the payload if present
//!
//! The codec is structural, not self-describing: both peers must agree on
//! the declared layout of every named message.

use thiserror::Error;

/// Errors raised while decoding wire bytes.
#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("Buffer truncated: needed {needed} more bytes for {what}")]
    Truncated { what: &'static str, needed: usize },
    #[error("Invalid bool byte: {0:#04x}")]
    InvalidBool(u8),
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,
    #[error("Unknown discriminant {value} for {type_name}")]
    UnknownDiscriminant {
        type_name: &'static str,
        value: u32,
    },
    #[error("Trailing bytes after decode: {0}")]
    TrailingBytes(usize),
    #[error("Length prefix {0} exceeds remaining buffer")]
    LengthOverrun(u32),
}

/// Field-order structural encoding.
///
/// Implemented for primitives here and for every protocol type through the
/// declaration macros. `decode` consumes from the front of the slice so
/// aggregate impls can chain field decodes.
pub trait Wire: Sized {
    fn encode(&self, out: &mut Vec<u8>);
    fn decode(buf: &mut &[u8]) -> Result<Self, WireError>;

    /// Encode into a fresh buffer.
    fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Decode a complete buffer, rejecting trailing bytes.
    fn from_wire_bytes(mut bytes: &[u8]) -> Result<Self, WireError> {
        let value = Self::decode(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(WireError::TrailingBytes(bytes.len()));
        }
        Ok(value)
    }
}

fn take<'a>(buf: &mut &'a [u8], n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
    if buf.len() < n {
        return Err(WireError::Truncated {
            what,
            needed: n - buf.len(),
        });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

macro_rules! impl_wire_scalar {
    ($($ty:ty),*) => {
        $(
            impl Wire for $ty {
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
                    let bytes = take(buf, std::mem::size_of::<$ty>(), stringify!($ty))?;
                    Ok(<$ty>::from_le_bytes(bytes.try_into().expect("sized slice")))
                }
            }
        )*
    };
}

impl_wire_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Wire for bool {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        match take(buf, 1, "bool")?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

impl Wire for String {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        out.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let len = u32::decode(buf)?;
        if buf.len() < len as usize {
            return Err(WireError::LengthOverrun(len));
        }
        let bytes = take(buf, len as usize, "string body")?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        (self.len() as u32).encode(out);
        for item in self {
            item.encode(out);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        let len = u32::decode(buf)?;
        // A 4-byte prefix can claim more elements than the buffer holds.
        if (len as usize) > buf.len() {
            return Err(WireError::LengthOverrun(len));
        }
        let mut items = Vec::with_capacity(len as usize);
        for _ in 0..len {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Some(value) => {
                true.encode(out);
                value.encode(out);
            }
            None => false.encode(out),
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self, WireError> {
        if bool::decode(buf)? {
            Ok(Some(T::decode(buf)?))
        } else {
            Ok(None)
        }
    }
}

impl Wire for () {
    fn encode(&self, _out: &mut Vec<u8>) {}

    fn decode(_buf: &mut &[u8]) -> Result<Self, WireError> {
        Ok(())
    }
}

/// Declare the wire layout of a struct: fields encode/decode in the listed
/// order. The listing is the single statement of the binary layout.
#[macro_export]
macro_rules! impl_wire {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::wire::Wire for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                $( $crate::wire::Wire::encode(&self.$field, out); )*
            }

            fn decode(buf: &mut &[u8]) -> Result<Self, $crate::wire::WireError> {
                Ok(Self {
                    $( $field: $crate::wire::Wire::decode(buf)?, )*
                })
            }
        }
    };
}

/// Declare the wire layout of a tagged variant: each arm gets an explicit
/// `u32` discriminator, followed by its fields in the listed order.
#[macro_export]
macro_rules! impl_wire_enum {
    ($ty:ident { $($idx:literal => $variant:ident $({ $($field:ident),* $(,)? })? ),* $(,)? }) => {
        impl $crate::wire::Wire for $ty {
            fn encode(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        Self::$variant $({ $($field),* })? => {
                            $crate::wire::Wire::encode(&($idx as u32), out);
                            $( $( $crate::wire::Wire::encode($field, out); )* )?
                        }
                    )*
                }
            }

            fn decode(buf: &mut &[u8]) -> Result<Self, $crate::wire::WireError> {
                let discriminant = <u32 as $crate::wire::Wire>::decode(buf)?;
                match discriminant {
                    $(
                        $idx => Ok(Self::$variant $({
                            $( $field: $crate::wire::Wire::decode(buf)?, )*
                        })?),
                    )*
                    other => Err($crate::wire::WireError::UnknownDiscriminant {
                        type_name: stringify!($ty),
                        value: other,
                    }),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scalar_roundtrip() {
        let mut out = Vec::new();
        42u32.encode(&mut out);
        (-7i16).encode(&mut out);
        1.5f64.encode(&mut out);
        assert_eq!(out.len(), 4 + 2 + 8);

        let mut buf = out.as_slice();
        assert_eq!(u32::decode(&mut buf).unwrap(), 42);
        assert_eq!(i16::decode(&mut buf).unwrap(), -7);
        assert_eq!(f64::decode(&mut buf).unwrap(), 1.5);
        assert!(buf.is_empty());
    }

    #[test]
    fn scalars_are_little_endian() {
        let mut out = Vec::new();
        0x0102_0304u32.encode(&mut out);
        assert_eq!(out, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn string_has_u32_count_prefix() {
        let bytes = "dirt".to_string().to_wire_bytes();
        assert_eq!(&bytes[..4], &4u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"dirt");
    }

    #[test]
    fn bool_rejects_garbage() {
        let mut buf: &[u8] = &[2];
        assert_eq!(bool::decode(&mut buf), Err(WireError::InvalidBool(2)));
    }

    #[test]
    fn option_roundtrip() {
        let present: Option<u32> = Some(9);
        let absent: Option<u32> = None;
        assert_eq!(
            Option::<u32>::from_wire_bytes(&present.to_wire_bytes()).unwrap(),
            present
        );
        assert_eq!(
            Option::<u32>::from_wire_bytes(&absent.to_wire_bytes()).unwrap(),
            absent
        );
        assert_eq!(absent.to_wire_bytes(), vec![0]);
    }

    #[test]
    fn vec_roundtrip() {
        let values = vec![1u16, 2, 3];
        let bytes = values.to_wire_bytes();
        assert_eq!(bytes.len(), 4 + 3 * 2);
        assert_eq!(Vec::<u16>::from_wire_bytes(&bytes).unwrap(), values);
    }

    #[test]
    fn truncated_buffer_is_an_error() {
        let mut buf: &[u8] = &[1, 2];
        assert!(matches!(
            u32::decode(&mut buf),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn hostile_length_prefix_is_an_error() {
        let mut bytes = Vec::new();
        u32::MAX.encode(&mut bytes);
        assert!(matches!(
            Vec::<u8>::from_wire_bytes(&bytes),
            Err(WireError::LengthOverrun(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = 5u32.to_wire_bytes();
        bytes.push(0xff);
        assert_eq!(
            u32::from_wire_bytes(&bytes),
            Err(WireError::TrailingBytes(1))
        );
    }

    #[derive(Debug, PartialEq)]
    struct Probe {
        id: u64,
        label: String,
        tags: Vec<u8>,
    }
    impl_wire!(Probe { id, label, tags });

    #[test]
    fn struct_fields_encode_in_declaration_order() {
        let probe = Probe {
            id: 1,
            label: "x".into(),
            tags: vec![7],
        };
        let bytes = probe.to_wire_bytes();
        // id (8) + label prefix (4) + "x" (1) + tags prefix (4) + one tag (1)
        assert_eq!(bytes.len(), 18);
        assert_eq!(Probe::from_wire_bytes(&bytes).unwrap(), probe);
    }

    #[derive(Debug, PartialEq)]
    enum ProbeKind {
        Quiet,
        Loud { gain: f32, label: String },
    }
    impl_wire_enum!(ProbeKind {
        0 => Quiet,
        1 => Loud { gain, label },
    });

    #[test]
    fn enum_discriminant_is_u32() {
        let quiet = ProbeKind::Quiet.to_wire_bytes();
        assert_eq!(quiet, 0u32.to_le_bytes());

        let loud = ProbeKind::Loud {
            gain: 0.5,
            label: "hi".into(),
        };
        let bytes = loud.to_wire_bytes();
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(ProbeKind::from_wire_bytes(&bytes).unwrap(), loud);
    }

    #[test]
    fn unknown_discriminant_names_the_type() {
        let bytes = 9u32.to_wire_bytes();
        match ProbeKind::from_wire_bytes(&bytes) {
            Err(WireError::UnknownDiscriminant { type_name, value }) => {
                assert_eq!(type_name, "ProbeKind");
                assert_eq!(value, 9);
            }
            other => panic!("expected UnknownDiscriminant, got {other:?}"),
        }
    }
}
