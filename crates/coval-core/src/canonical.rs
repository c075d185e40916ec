//! Canonical CBOR for everything that is hashed, signed or encrypted.
//!
//! Values go through ciborium's value model, every map is re-ordered by
//! the encoded bytes of its keys, and ciborium writes the result. Its
//! writer already uses the shortest integer and exact float widths and
//! definite lengths, so the sort is the only thing left to do.

use std::fmt::Display;

use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, Result};

fn encoding_error(e: impl Display) -> CoreError {
    CoreError::EncodingError(e.to_string())
}

/// Encode any serializable value to canonical CBOR bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = Value::serialized(value).map_err(encoding_error)?;
    write(&sorted(value)?)
}

/// Decode CBOR bytes (canonical or not) into a value.
pub fn from_canonical_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

fn write(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(encoding_error)?;
    Ok(buf)
}

/// Sort the maps of `value`, innermost first. Duplicate keys are an error.
fn sorted(value: Value) -> Result<Value> {
    Ok(match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect::<Result<_>>()?),
        Value::Tag(tag, inner) => Value::Tag(tag, Box::new(sorted(*inner)?)),
        Value::Map(entries) => {
            let mut keyed = entries
                .into_iter()
                .map(|(k, v)| {
                    let k = sorted(k)?;
                    Ok((write(&k)?, k, sorted(v)?))
                })
                .collect::<Result<Vec<_>>>()?;
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            if keyed.windows(2).any(|pair| pair[0].0 == pair[1].0) {
                return Err(CoreError::EncodingError("duplicate map key".into()));
            }
            Value::Map(keyed.into_iter().map(|(_, k, v)| (k, v)).collect())
        }
        leaf => leaf,
    })
}
