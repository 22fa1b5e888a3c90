// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Entry envelope codec for Tidemark.
//
// Every stored value is wrapped in an envelope carrying the library format
// version and the write timestamp (plus the expiry when TTLs are inline) and
// rendered as JSON text:
//
// ```text
// {"value":{...},"version":"1.0.0","timestamp":1700000000000,"expires_at":1700000060000}
// ```
//
// Values are converted to a JSON tree through a depth-bounded serializer so
// a self-referential object graph fails with a serialization error instead
// of overflowing the stack. The optional ASCII-safe rendering escapes every
// non-ASCII code point; it decodes to exactly the same tree.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::ser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::clock::Clock;
use crate::error::{StorageError, StorageResult};

/// serde_json refuses to parse a document once containers nest this deep.
const PARSER_DEPTH_LIMIT: usize = 128;

/// Maximum container nesting accepted when encoding a value. The envelope
/// object takes one level and the parser gives up on reaching its limit, so
/// anything deeper would be written but never read back.
pub const MAX_NESTING_DEPTH: usize = PARSER_DEPTH_LIMIT - 2;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The unit persisted per logical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The caller's value.
    pub value: Value,
    /// Library format version at write time. Diagnostic only.
    pub version: String,
    /// Write time, Unix milliseconds.
    pub timestamp: i64,
    /// Absolute expiry, Unix milliseconds, when the entry carries an inline
    /// TTL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Whether an entry expiring at `expires_at` is expired at `now_millis`.
/// Expiry is strict: an entry is still live at its exact expiry instant.
pub fn is_expired(expires_at: Option<i64>, now_millis: i64) -> bool {
    expires_at.is_some_and(|at| now_millis > at)
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Serializes values into envelopes and back.
pub struct Codec {
    format_version: String,
    ascii_safe: bool,
    clock: Arc<dyn Clock>,
    /// Highest timestamp handed out so far; keeps write times monotonic.
    last_timestamp: AtomicI64,
}

impl Codec {
    /// Create a codec stamping `format_version` into every envelope.
    pub fn new(format_version: impl Into<String>, ascii_safe: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            format_version: format_version.into(),
            ascii_safe,
            clock,
            last_timestamp: AtomicI64::new(i64::MIN),
        }
    }

    /// The format version written into envelopes.
    pub fn format_version(&self) -> &str {
        &self.format_version
    }

    /// Current time according to the codec's clock.
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Convert `value` into a JSON tree, rejecting cycles and
    /// non-representable content.
    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> StorageResult<Value> {
        to_value_bounded(value, MAX_NESTING_DEPTH)
    }

    /// Wrap an already-encoded tree in a fresh envelope and render it.
    ///
    /// Trees built outside [`Codec::encode_value`] (migration output, for
    /// instance) are held to the same nesting limit.
    pub fn seal(&self, value: Value, expires_at: Option<i64>) -> StorageResult<String> {
        if nesting_depth(&value) > MAX_NESTING_DEPTH {
            return Err(StorageError::Serialization(format!(
                "value nests deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        let envelope = Envelope {
            value,
            version: self.format_version.clone(),
            timestamp: self.next_timestamp(),
            expires_at,
        };
        self.render(&envelope)
    }

    /// Encode `value` and wrap it in an envelope without expiry.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> StorageResult<String> {
        let tree = self.encode_value(value)?;
        self.seal(tree, None)
    }

    /// Render an envelope to its transport string.
    pub fn render(&self, envelope: &Envelope) -> StorageResult<String> {
        if !self.ascii_safe {
            return serde_json::to_string(envelope)
                .map_err(|e| StorageError::Serialization(e.to_string()));
        }

        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, AsciiFormatter);
        envelope
            .serialize(&mut serializer)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        // The formatter only ever emits ASCII.
        String::from_utf8(buffer).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parse a transport string into its full envelope.
    pub fn decode_envelope(&self, text: &str) -> StorageResult<Envelope> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|e| {
            StorageError::Deserialization(format!("not a valid entry envelope: {e}"))
        })?;
        trace!(
            format_version = %envelope.version,
            written_at = envelope.timestamp,
            "decoded entry envelope"
        );
        Ok(envelope)
    }

    /// Parse a transport string and return only the inner value.
    pub fn deserialize(&self, text: &str) -> StorageResult<Value> {
        Ok(self.decode_envelope(text)?.value)
    }

    fn next_timestamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        now.max(previous)
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("format_version", &self.format_version)
            .field("ascii_safe", &self.ascii_safe)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ASCII-safe rendering
// ---------------------------------------------------------------------------

/// Compact JSON formatter that escapes every non-ASCII code point as
/// `\uXXXX` (UTF-16 surrogate pairs above the BMP).
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiFormatter;

impl serde_json::ser::Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Depth-bounded value serializer
// ---------------------------------------------------------------------------

/// Convert any `Serialize` value into a JSON tree, failing once containers
/// nest deeper than `max_depth`.
pub fn to_value_bounded<T: Serialize + ?Sized>(value: &T, max_depth: usize) -> StorageResult<Value> {
    value
        .serialize(ValueSerializer { depth: 0, max_depth })
        .map_err(|e| StorageError::Serialization(e.0))
}

/// Deepest container nesting inside `value`. Scalars count as 0.
fn nesting_depth(value: &Value) -> usize {
    let mut deepest = 0;
    let mut pending = vec![(value, 0usize)];
    while let Some((node, depth)) = pending.pop() {
        match node {
            Value::Array(items) => {
                deepest = deepest.max(depth + 1);
                pending.extend(items.iter().map(|child| (child, depth + 1)));
            }
            Value::Object(map) => {
                deepest = deepest.max(depth + 1);
                pending.extend(map.values().map(|child| (child, depth + 1)));
            }
            _ => {}
        }
    }
    deepest
}

#[derive(Debug)]
struct EncodeError(String);

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EncodeError {}

impl ser::Error for EncodeError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        EncodeError(msg.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
struct ValueSerializer {
    depth: usize,
    max_depth: usize,
}

impl ValueSerializer {
    fn nested(self) -> Result<Self, EncodeError> {
        if self.depth >= self.max_depth {
            return Err(EncodeError(format!(
                "value nests deeper than {} levels (circular reference?)",
                self.max_depth
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
            max_depth: self.max_depth,
        })
    }
}

fn key_to_string(key: Value) -> Result<String, EncodeError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EncodeError(format!(
            "map keys must be strings, numbers or booleans, got {other}"
        ))),
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = EncodeError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, EncodeError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, EncodeError> {
        Ok(Value::from(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, EncodeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, EncodeError> {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| EncodeError(format!("non-finite number {v} cannot be stored")))
    }

    fn serialize_char(self, v: char) -> Result<Value, EncodeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, EncodeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, EncodeError> {
        Ok(Value::Array(v.iter().map(|b| Value::from(*b)).collect()))
    }

    fn serialize_none(self) -> Result<Value, EncodeError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, EncodeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, EncodeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, EncodeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, EncodeError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, EncodeError> {
        value.serialize(self.nested()?)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, EncodeError> {
        let inner = value.serialize(self.nested()?)?;
        let mut map = Map::new();
        map.insert(variant.to_string(), inner);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, EncodeError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            inner: self.nested()?,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, EncodeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, EncodeError> {
        Ok(VariantSeqBuilder {
            variant,
            seq: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, EncodeError> {
        Ok(MapBuilder {
            map: Map::new(),
            next_key: None,
            inner: self.nested()?,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, EncodeError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantMapBuilder, EncodeError> {
        Ok(VariantMapBuilder {
            variant,
            fields: self.serialize_map(Some(len))?,
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
    inner: ValueSerializer,
}

impl SeqBuilder {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.items.push(value.serialize(self.inner)?);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        Ok(Value::Array(self.items))
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    seq: SeqBuilder,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        self.seq.push(value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Array(self.seq.items));
        Ok(Value::Object(map))
    }
}

struct MapBuilder {
    map: Map<String, Value>,
    next_key: Option<String>,
    inner: ValueSerializer,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), EncodeError> {
        self.next_key = Some(key_to_string(key.serialize(self.inner)?)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| EncodeError("map value serialized before its key".to_string()))?;
        self.map.insert(key, value.serialize(self.inner)?);
        Ok(())
    }

    fn end(self) -> Result<Value, EncodeError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        self.map.insert(key.to_string(), value.serialize(self.inner)?);
        Ok(())
    }

    fn end(self) -> Result<Value, EncodeError> {
        Ok(Value::Object(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    fields: MapBuilder,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = EncodeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), EncodeError> {
        ser::SerializeStruct::serialize_field(&mut self.fields, key, value)
    }

    fn end(self) -> Result<Value, EncodeError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Object(self.fields.map));
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn codec_at(millis: i64, ascii_safe: bool) -> (Codec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(millis));
        (Codec::new("1.0.0", ascii_safe, clock.clone()), clock)
    }

    /// A linked node that can point back at itself.
    struct Node {
        name: String,
        next: RefCell<Option<Rc<Node>>>,
    }

    impl Serialize for Node {
        fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeStruct;
            let next = self.next.borrow();
            let mut state = serializer.serialize_struct("Node", 2)?;
            state.serialize_field("name", &self.name)?;
            state.serialize_field("next", &next.as_deref())?;
            state.end()
        }
    }

    #[test]
    fn test_envelope_wraps_value_version_and_timestamp() {
        let (codec, _clock) = codec_at(1_700_000_000_000, false);
        let text = codec.serialize(&json!({"hours": 7.5})).unwrap();

        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["value"], json!({"hours": 7.5}));
        assert_eq!(raw["version"], "1.0.0");
        assert_eq!(raw["timestamp"], 1_700_000_000_000i64);
        assert!(raw.get("expires_at").is_none());

        assert_eq!(codec.deserialize(&text).unwrap(), json!({"hours": 7.5}));
    }

    #[test]
    fn test_typed_values_encode_like_serde_json() {
        #[derive(Serialize)]
        enum Shape {
            Unit,
            Circle(f64),
            Rect { w: u32, h: u32 },
            Pair(i8, i8),
        }

        let (codec, _clock) = codec_at(0, false);
        let mut counts = BTreeMap::new();
        counts.insert(3u32, "three");
        let values = (
            Shape::Unit,
            Shape::Circle(1.5),
            Shape::Rect { w: 2, h: 3 },
            Shape::Pair(-1, 1),
            counts,
            Some('x'),
        );

        let bounded = codec.encode_value(&values).unwrap();
        assert_eq!(bounded, serde_json::to_value(&values).unwrap());
    }

    #[test]
    fn test_circular_reference_is_rejected() {
        let (codec, _clock) = codec_at(0, false);
        let node = Rc::new(Node {
            name: "loop".into(),
            next: RefCell::new(None),
        });
        *node.next.borrow_mut() = Some(node.clone());

        let err = codec.serialize(&*node).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(err.to_string().contains("circular reference"));

        // Break the cycle so the test does not leak.
        node.next.borrow_mut().take();
    }

    #[test]
    fn test_acyclic_chain_is_accepted() {
        let (codec, _clock) = codec_at(0, false);
        let tail = Rc::new(Node {
            name: "tail".into(),
            next: RefCell::new(None),
        });
        let head = Node {
            name: "head".into(),
            next: RefCell::new(Some(tail)),
        };

        let tree = codec.encode_value(&head).unwrap();
        assert_eq!(tree, json!({"name": "head", "next": {"name": "tail", "next": null}}));
    }

    fn nested_array(depth: usize) -> Value {
        (0..depth).fold(json!(1), |inner, _| Value::Array(vec![inner]))
    }

    #[test]
    fn test_deepest_encodable_value_still_parses() {
        let (codec, _clock) = codec_at(0, false);
        let deepest = nested_array(MAX_NESTING_DEPTH);

        let text = codec.serialize(&deepest).unwrap();
        assert_eq!(codec.deserialize(&text).unwrap(), deepest);

        let err = codec.serialize(&nested_array(MAX_NESTING_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_seal_rejects_over_deep_trees() {
        let (codec, _clock) = codec_at(0, false);
        assert_eq!(nesting_depth(&json!(3)), 0);
        assert_eq!(nesting_depth(&json!({"a": [1, {"b": []}]})), 3);

        assert!(codec.seal(nested_array(MAX_NESTING_DEPTH), None).is_ok());
        assert!(matches!(
            codec.seal(nested_array(MAX_NESTING_DEPTH + 1), None),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let (codec, _clock) = codec_at(0, false);
        let err = codec.serialize(&f64::NAN).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn test_non_string_map_key_is_rejected() {
        let (codec, _clock) = codec_at(0, false);
        let mut map = BTreeMap::new();
        map.insert(vec![1, 2], "listed");
        assert!(matches!(
            codec.serialize(&map),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        let (codec, _clock) = codec_at(0, false);
        for text in ["not json", "\"bare string\"", "{\"version\":\"1.0.0\",\"timestamp\":1}", "[1,2]"] {
            assert!(
                matches!(codec.deserialize(text), Err(StorageError::Deserialization(_))),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_ascii_safe_rendering_round_trips() {
        let (codec, _clock) = codec_at(0, true);
        let value = json!({"note": "café ☕ 𝄞", "plain": "ok"});
        let text = codec.serialize(&value).unwrap();

        assert!(text.is_ascii());
        assert!(text.contains("\\u00e9"));
        // U+1D11E encodes as a surrogate pair.
        assert!(text.contains("\\ud834\\udd1e"));
        assert_eq!(codec.deserialize(&text).unwrap(), value);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let (codec, clock) = codec_at(5_000, false);
        let first = codec.decode_envelope(&codec.serialize(&1).unwrap()).unwrap();

        clock.set(1_000);
        let second = codec.decode_envelope(&codec.serialize(&2).unwrap()).unwrap();

        assert_eq!(first.timestamp, 5_000);
        assert_eq!(second.timestamp, 5_000);
    }

    #[test]
    fn test_inline_expiry() {
        let (codec, _clock) = codec_at(0, false);
        let text = codec.seal(json!("v"), Some(100)).unwrap();
        let envelope = codec.decode_envelope(&text).unwrap();

        assert_eq!(envelope.expires_at, Some(100));
        assert!(!is_expired(envelope.expires_at, 100));
        assert!(is_expired(envelope.expires_at, 101));
        assert!(!is_expired(None, i64::MAX));
    }
}
