//! Wire encoding of [`Datum`] values.
//!
//! The encoding carries no type tag: the reader decodes according to the
//! dataset's declared [`ValueType`].
//!
//! | type      | encoding                  |
//! |-----------|---------------------------|
//! | `bytes`   | raw bytes                 |
//! | `text`    | UTF-8                     |
//! | `int64`   | 8 bytes, big endian       |
//! | `float64` | 8 bytes, big endian bits  |
//! | `bool`    | 1 byte, `0` or `1`        |
//! | `json`    | `serde_json` document     |

use flowrun_core::{Datum, ValueType};

use crate::error::CodecError;

/// Encode a value into its wire bytes.
pub fn encode(datum: &Datum) -> Result<Vec<u8>, CodecError> {
    let bytes = match datum {
        Datum::Bytes(b) => b.clone(),
        Datum::Text(s) => s.as_bytes().to_vec(),
        Datum::Int64(v) => v.to_be_bytes().to_vec(),
        Datum::Float64(v) => v.to_bits().to_be_bytes().to_vec(),
        Datum::Bool(v) => vec![u8::from(*v)],
        Datum::Json(v) => serde_json::to_vec(v)?,
    };
    Ok(bytes)
}

/// Encode a value written to a channel of the declared type.
///
/// Readers decode by the declared type, so a value of another type is refused.
pub fn encode_as(value_type: ValueType, datum: &Datum) -> Result<Vec<u8>, CodecError> {
    if datum.value_type() != value_type {
        return Err(CodecError::TypeMismatch {
            expected: value_type,
            actual: datum.value_type(),
        });
    }
    encode(datum)
}

/// Decode wire bytes as a value of the declared type.
pub fn decode(value_type: ValueType, bytes: &[u8]) -> Result<Datum, CodecError> {
    let datum = match value_type {
        ValueType::Bytes => Datum::Bytes(bytes.to_vec()),
        ValueType::Text => Datum::Text(String::from_utf8(bytes.to_vec())?),
        ValueType::Int64 => Datum::Int64(i64::from_be_bytes(fixed_width(value_type, bytes)?)),
        ValueType::Float64 => Datum::Float64(f64::from_bits(u64::from_be_bytes(fixed_width(
            value_type, bytes,
        )?))),
        ValueType::Bool => match bytes {
            [0] => Datum::Bool(false),
            [1] => Datum::Bool(true),
            [other] => return Err(CodecError::InvalidBool(*other)),
            _ => {
                return Err(CodecError::WrongLength {
                    value_type,
                    expected: 1,
                    actual: bytes.len(),
                })
            }
        },
        ValueType::Json => Datum::Json(serde_json::from_slice(bytes)?),
    };
    Ok(datum)
}

fn fixed_width(value_type: ValueType, bytes: &[u8]) -> Result<[u8; 8], CodecError> {
    bytes.try_into().map_err(|_| CodecError::WrongLength {
        value_type,
        expected: 8,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int64_is_big_endian() {
        let bytes = encode(&Datum::Int64(258)).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(decode(ValueType::Int64, &bytes).unwrap(), Datum::Int64(258));
    }

    #[test]
    fn test_text_and_json() {
        let text = encode(&Datum::from("héllo")).unwrap();
        assert_eq!(decode(ValueType::Text, &text).unwrap(), Datum::from("héllo"));

        let doc = json!({"word": "flow", "count": 3});
        let bytes = encode(&Datum::Json(doc.clone())).unwrap();
        assert_eq!(decode(ValueType::Json, &bytes).unwrap(), Datum::Json(doc));
    }

    #[test]
    fn test_float_keeps_bits() {
        let bytes = encode(&Datum::Float64(-0.5)).unwrap();
        assert_eq!(decode(ValueType::Float64, &bytes).unwrap(), Datum::Float64(-0.5));
    }

    #[test]
    fn test_decode_follows_declared_type() {
        // The same bytes mean different things under different declarations.
        let bytes = encode(&Datum::from("12345678")).unwrap();
        assert_eq!(decode(ValueType::Bytes, &bytes).unwrap(), Datum::Bytes(bytes.clone()));
        assert!(matches!(decode(ValueType::Int64, &bytes).unwrap(), Datum::Int64(_)));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode(ValueType::Int64, &[1, 2, 3]),
            Err(CodecError::WrongLength { expected: 8, actual: 3, .. })
        ));
        assert!(matches!(decode(ValueType::Bool, &[7]), Err(CodecError::InvalidBool(7))));
        assert!(matches!(decode(ValueType::Text, &[0xff, 0xfe]), Err(CodecError::Utf8(_))));
        assert!(matches!(decode(ValueType::Json, b"{"), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_encode_as_checks_declared_type() {
        assert_eq!(
            encode_as(ValueType::Int64, &Datum::Int64(1)).unwrap(),
            1i64.to_be_bytes().to_vec()
        );
        assert!(matches!(
            encode_as(ValueType::Int64, &Datum::from("1")),
            Err(CodecError::TypeMismatch {
                expected: ValueType::Int64,
                actual: ValueType::Text,
            })
        ));
    }
}
