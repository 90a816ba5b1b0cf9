//! Archive traits used by [`snapshot`](crate::snapshot), plus a JSON codec.
//!
//! A snapshot is a flat stream of unsigned 32-bit numbers and opaque
//! component payloads. The archive decides how both are encoded; the writer
//! and loader only decide their order. Any codec implementing
//! [`OutputArchive`] / [`InputArchive`] can be plugged in.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced by archive implementations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A read ran past the end of the archive.
    #[error("unexpected end of archive")]
    UnexpectedEnd,

    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The underlying reader or writer failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            ArchiveError::Io(err.into())
        } else {
            ArchiveError::Codec(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Sink for snapshot output.
pub trait OutputArchive {
    /// Append an unsigned number (counts, indices, generations).
    fn write_u32(&mut self, value: u32) -> Result<(), ArchiveError>;

    /// Append one component payload.
    fn write_value<T: Serialize>(&mut self, value: &T) -> Result<(), ArchiveError>;
}

/// Source for snapshot input. Reads happen in the order things were written.
pub trait InputArchive {
    /// Read the next unsigned number.
    fn read_u32(&mut self) -> Result<u32, ArchiveError>;

    /// Read the next component payload.
    fn read_value<T: DeserializeOwned>(&mut self) -> Result<T, ArchiveError>;
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Writes a snapshot as a flat JSON array.
#[derive(Debug, Default, Clone)]
pub struct JsonOutputArchive {
    values: Vec<Value>,
}

impl JsonOutputArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of array elements written so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The written array.
    pub fn into_value(self) -> Value {
        Value::Array(self.values)
    }

    /// The written array as compact JSON text.
    pub fn to_json_string(&self) -> Result<String, ArchiveError> {
        Ok(serde_json::to_string(&self.values)?)
    }

    /// Serialize the written array into `writer`.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ArchiveError> {
        serde_json::to_writer(writer, &self.values)?;
        Ok(())
    }
}

impl OutputArchive for JsonOutputArchive {
    fn write_u32(&mut self, value: u32) -> Result<(), ArchiveError> {
        self.values.push(Value::from(value));
        Ok(())
    }

    fn write_value<T: Serialize>(&mut self, value: &T) -> Result<(), ArchiveError> {
        self.values.push(serde_json::to_value(value)?);
        Ok(())
    }
}

/// Reads a snapshot back from the array produced by [`JsonOutputArchive`].
#[derive(Debug)]
pub struct JsonInputArchive {
    values: std::vec::IntoIter<Value>,
}

impl JsonInputArchive {
    /// Wrap an already parsed JSON array.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Codec`] if `value` is not an array.
    pub fn from_value(value: Value) -> Result<Self, ArchiveError> {
        match value {
            Value::Array(values) => Ok(Self {
                values: values.into_iter(),
            }),
            other => Err(ArchiveError::Codec(format!(
                "expected a JSON array, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse JSON text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, ArchiveError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Parse JSON from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ArchiveError> {
        Self::from_value(serde_json::from_reader(reader)?)
    }

    /// Number of array elements not yet consumed.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    fn next_value(&mut self) -> Result<Value, ArchiveError> {
        self.values.next().ok_or(ArchiveError::UnexpectedEnd)
    }
}

impl InputArchive for JsonInputArchive {
    fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        let value = self.next_value()?;
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ArchiveError::Codec(format!("expected u32, found {value}")))
    }

    fn read_value<T: DeserializeOwned>(&mut self) -> Result<T, ArchiveError> {
        Ok(serde_json::from_value(self.next_value()?)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn numbers_and_payloads_interleave() {
        let mut out = JsonOutputArchive::new();
        out.write_u32(2).unwrap();
        out.write_value(&Position { x: 1.0, y: -1.0 }).unwrap();
        out.write_u32(u32::MAX).unwrap();
        assert_eq!(out.len(), 3);

        let text = out.to_json_string().unwrap();
        assert_eq!(text, r#"[2,{"x":1.0,"y":-1.0},4294967295]"#);

        let mut input = JsonInputArchive::from_str(&text).unwrap();
        assert_eq!(input.read_u32().unwrap(), 2);
        assert_eq!(
            input.read_value::<Position>().unwrap(),
            Position { x: 1.0, y: -1.0 }
        );
        assert_eq!(input.read_u32().unwrap(), u32::MAX);
        assert_eq!(input.remaining(), 0);
        assert!(matches!(input.read_u32(), Err(ArchiveError::UnexpectedEnd)));
    }

    #[test]
    fn rejects_out_of_range_and_wrong_kinds() {
        let mut input = JsonInputArchive::from_str(r#"[4294967296, -1, "7", {"x":1}]"#).unwrap();
        assert!(matches!(input.read_u32(), Err(ArchiveError::Codec(_))));
        assert!(matches!(input.read_u32(), Err(ArchiveError::Codec(_))));
        assert!(matches!(input.read_u32(), Err(ArchiveError::Codec(_))));
        assert!(matches!(
            input.read_value::<Position>(),
            Err(ArchiveError::Codec(_))
        ));
    }

    #[test]
    fn top_level_must_be_array() {
        assert!(matches!(
            JsonInputArchive::from_str(r#"{"count": 1}"#),
            Err(ArchiveError::Codec(_))
        ));
        assert!(matches!(
            JsonInputArchive::from_str("[1, 2"),
            Err(ArchiveError::Codec(_))
        ));
    }

    #[test]
    fn reader_and_writer_round_trip() {
        let mut out = JsonOutputArchive::new();
        out.write_u32(7).unwrap();
        let mut buf = Vec::new();
        out.write_to(&mut buf).unwrap();

        let mut input = JsonInputArchive::from_reader(buf.as_slice()).unwrap();
        assert_eq!(input.read_u32().unwrap(), 7);
    }
}
