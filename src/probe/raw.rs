//! What the sandbox runner prints: a map of variant name to fields.
//!
//! The FACT image pickles a dict with `bytes` and `int` values. Runners
//! speaking json send byte strings as arrays of integers in `0..=255`.
//! Anything that isn't bytes only ever gets turned into text.

use memchr::memmem;
use serde_json::{Map, Value};
use serde_pickle::{DeOptions, HashableValue, Value as PickleValue};
use thiserror::Error;

use crate::host::WireFormat;

/// Qemu prints these when the guest couldn't actually be run
pub const EMULATOR_ERRORS: [&[u8]; 3] = [
    b"Unsupported syscall",
    b"Invalid ELF",
    b"uncaught target signal",
];

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pickle: {0}")]
    Pickle(#[from] serde_pickle::Error),
    #[error("unexpected layout: {0}")]
    Shape(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawValue {
    Bytes(Vec<u8>),
    /// Text form of a non-byte value
    Other(String),
}

impl RawValue {
    fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                let bytes: Option<Vec<u8>> = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                    .collect();

                match bytes {
                    Some(bytes) => RawValue::Bytes(bytes),
                    None => RawValue::Other(Value::Array(items).to_string()),
                }
            }
            Value::String(s) => RawValue::Other(s),
            other => RawValue::Other(other.to_string()),
        }
    }

    /// Same text python's `str()` would give
    fn from_pickle(value: PickleValue) -> Self {
        match value {
            PickleValue::Bytes(bytes) => RawValue::Bytes(bytes),
            PickleValue::String(s) => RawValue::Other(s),
            PickleValue::I64(n) => RawValue::Other(n.to_string()),
            PickleValue::Int(n) => RawValue::Other(n.to_string()),
            PickleValue::Bool(true) => RawValue::Other("True".into()),
            PickleValue::Bool(false) => RawValue::Other("False".into()),
            PickleValue::None => RawValue::Other("None".into()),
            other => RawValue::Other(format!("{other:?}")),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            RawValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            RawValue::Other(text) => text.clone(),
        }
    }
}

/// Fields of a single variant, in the order the runner sent them
pub type RawRecord = Vec<(String, RawValue)>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub variants: Vec<(String, RawRecord)>,
}

impl RawOutput {
    pub fn decode(format: WireFormat, data: &[u8]) -> Result<Self, ProbeError> {
        match format {
            WireFormat::Json => Self::from_json(data),
            WireFormat::Pickle => Self::from_pickle(data),
        }
    }

    /// Dicts come back sorted by key, the pickled insertion order is lost
    pub fn from_pickle(data: &[u8]) -> Result<Self, ProbeError> {
        let top = match serde_pickle::value_from_slice(data, DeOptions::new())? {
            PickleValue::Dict(top) => top,
            other => {
                return Err(ProbeError::Shape(format!(
                    "expected a dict, got {other:?}"
                )))
            }
        };

        let variants: Vec<(String, RawRecord)> = top
            .into_iter()
            .map(|(variant, record)| {
                let variant = pickle_key(variant)?;
                match record {
                    PickleValue::Dict(fields) => {
                        let fields = fields
                            .into_iter()
                            .map(|(name, value)| {
                                Ok((pickle_key(name)?, RawValue::from_pickle(value)))
                            })
                            .collect::<Result<_, ProbeError>>()?;
                        Ok((variant, fields))
                    }
                    other => Err(ProbeError::Shape(format!(
                        "variant {variant:?} is {other:?}, not a dict"
                    ))),
                }
            })
            .collect::<Result<_, ProbeError>>()?;

        Ok(Self { variants })
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ProbeError> {
        let top = match serde_json::from_slice::<Value>(data)? {
            Value::Object(top) => top,
            other => {
                return Err(ProbeError::Shape(format!(
                    "expected an object, got {}",
                    kind(&other)
                )))
            }
        };

        let variants: Vec<(String, RawRecord)> = top
            .into_iter()
            .map(|(variant, record)| match record {
                Value::Object(fields) => Ok((variant, Self::record(fields))),
                other => Err(ProbeError::Shape(format!(
                    "variant {variant:?} is {}, not an object",
                    kind(&other)
                ))),
            })
            .collect::<Result<_, ProbeError>>()?;

        Ok(Self { variants })
    }

    fn record(fields: Map<String, Value>) -> RawRecord {
        fields
            .into_iter()
            .map(|(name, value)| (name, RawValue::from_json(value)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Any byte value of any variant mentions a qemu failure
    pub fn contains_emulator_error(&self) -> bool {
        self.variants
            .iter()
            .flat_map(|(_, record)| record.iter())
            .any(|(_, value)| match value {
                RawValue::Bytes(bytes) => EMULATOR_ERRORS
                    .iter()
                    .any(|needle| memmem::find(bytes, needle).is_some()),
                RawValue::Other(_) => false,
            })
    }
}

fn pickle_key(key: HashableValue) -> Result<String, ProbeError> {
    match key {
        HashableValue::String(s) => Ok(s),
        HashableValue::Bytes(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        other => Err(ProbeError::Shape(format!("unexpected key {other:?}"))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
