//! The persisted JSON form of a mask.
//!
//! Each node serializes as `{"path": <marker>, "type": <kind>, "children":
//! [...]}`: the root's marker is `"$"`, a shared element child's is `"*"`,
//! and keyed children carry their field ID, index or key. A node with no
//! children omits `children` entirely (that is the terminal
//! "whole subtree" form), and an empty mask is just `{}`.
//!
//! Decoding rebuilds the tree without a descriptor; a later
//! [`Mask::extend`] against the wrong shape fails then. Markers are
//! validated structurally: the root must be `"$"`, children must fit the
//! parent's kind, and nesting is capped at [`MAX_NESTING_DEPTH`].

use std::cell::RefCell;
use std::convert::TryFrom;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_derive::Deserialize;
use thiserror::Error;

use super::{Mask, MaskKind, MAX_NESTING_DEPTH};

/// Errors raised while encoding or decoding the JSON form.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// The payload is not the JSON this crate writes.
    #[error("malformed mask JSON: {0}")]
    Json(#[from] serde_path_to_error::Error<serde_json::Error>),

    /// Writing JSON failed.
    #[error("mask JSON could not be written: {0}")]
    Encode(#[from] serde_json::Error),

    /// A `type` tag naming no mask kind.
    #[error("unknown mask kind tag `{tag}`")]
    UnknownKind { tag: String },

    /// A root node whose `path` marker is not `"$"`.
    #[error("root marker must be `$`, found {marker}")]
    BadRoot { marker: String },

    /// A child `path` marker incompatible with its parent's kind.
    #[error("marker {marker} cannot sit under a {parent} node")]
    BadMarker { marker: String, parent: MaskKind },

    /// A child carrying data but no `path` marker.
    #[error("mask JSON child lacks a `path` marker")]
    MissingMarker,

    /// The serialized tree nests deeper than the shared bound.
    #[error("mask JSON exceeds the nesting limit of {limit}")]
    DepthExceeded { limit: usize },
}

/// The `path` marker of one serialized node.
#[derive(Clone, Copy)]
enum Marker<'m> {
    Root,
    Any,
    Int(i64),
    Str(&'m str),
}

impl Serialize for Marker<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Marker::Root => serializer.serialize_str("$"),
            Marker::Any => serializer.serialize_str("*"),
            Marker::Int(value) => serializer.serialize_i64(value),
            Marker::Str(value) => serializer.serialize_str(value),
        }
    }
}

struct Entry<'m> {
    marker: Marker<'m>,
    node: &'m Mask,
}

impl Serialize for Entry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.node.is_empty() {
            let map = serializer.serialize_map(Some(0))?;
            return map.end();
        }
        let leaf = self.node.no_children();
        let mut map = serializer.serialize_map(Some(if leaf { 2 } else { 3 }))?;
        map.serialize_entry("path", &self.marker)?;
        map.serialize_entry("type", self.node.kind().as_str())?;
        if !leaf {
            map.serialize_entry("children", &Children { node: self.node })?;
        }
        map.end()
    }
}

struct Children<'m> {
    node: &'m Mask,
}

impl Serialize for Children<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        if let Some(elem) = self.node.elem() {
            seq.serialize_element(&Entry {
                marker: Marker::Any,
                node: elem,
            })?;
        }
        if let Some(fields) = &self.node.fields {
            for (id, child) in fields.iter() {
                if child.exists() {
                    seq.serialize_element(&Entry {
                        marker: Marker::Int(i64::from(id)),
                        node: child,
                    })?;
                }
            }
        }
        if let Some(entries) = &self.node.entries {
            for (key, child) in entries.iter() {
                if child.exists() {
                    seq.serialize_element(&Entry {
                        marker: Marker::Int(key),
                        node: child,
                    })?;
                }
            }
        }
        if let Some(keys) = &self.node.keys {
            for (key, child) in keys.iter() {
                if child.exists() {
                    seq.serialize_element(&Entry {
                        marker: Marker::Str(key),
                        node: child,
                    })?;
                }
            }
        }
        seq.end()
    }
}

impl Serialize for Mask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Entry {
            marker: Marker::Root,
            node: self,
        }
        .serialize(serializer)
    }
}

// Marshal buffers are reused per thread; serialization is CPU-bound and
// short-lived, so a tiny free list is enough to stop the common
// encode-send-drop cycle from allocating every time.
const MARSHAL_KEEP: usize = 4;
const MARSHAL_SEED_CAPACITY: usize = 256;

thread_local! {
    static MARSHAL_BUFFERS: RefCell<Vec<Vec<u8>>> = RefCell::new(Vec::new());
}

fn with_marshal_buffer<T>(serialize: impl FnOnce(&mut Vec<u8>) -> T) -> T {
    let mut buffer = MARSHAL_BUFFERS
        .with(|pool| pool.borrow_mut().pop())
        .unwrap_or_else(|| Vec::with_capacity(MARSHAL_SEED_CAPACITY));
    let out = serialize(&mut buffer);
    buffer.clear();
    MARSHAL_BUFFERS.with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < MARSHAL_KEEP {
            pool.push(buffer);
        }
    });
    out
}

/// Decode-side mirror of one wire node.
#[derive(Deserialize)]
struct Shadow {
    #[serde(default)]
    path: Option<ShadowMarker>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    children: Vec<Shadow>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShadowMarker {
    Int(i64),
    Str(String),
}

impl ShadowMarker {
    fn describe(&self) -> String {
        match self {
            ShadowMarker::Int(value) => value.to_string(),
            ShadowMarker::Str(value) => format!("`{}`", value),
        }
    }
}

impl Mask {
    /// Serialize to the JSON wire form. An empty mask marshals as `{}`.
    pub fn marshal(&self) -> Result<Vec<u8>, SerializationError> {
        with_marshal_buffer(|buffer| {
            serde_json::to_writer(&mut *buffer, self)?;
            Ok(buffer.as_slice().to_vec())
        })
    }

    /// Decode a mask from its JSON wire form.
    ///
    /// `{}` decodes to the empty mask. The payload is validated
    /// structurally only; compile the result further with
    /// [`Mask::extend`] to bind it to a descriptor.
    pub fn unmarshal(bytes: &[u8]) -> Result<Mask, SerializationError> {
        let mut deserializer = serde_json::Deserializer::from_slice(bytes);
        let shadow: Shadow = serde_path_to_error::deserialize(&mut deserializer)?;
        match &shadow.path {
            None => {}
            Some(ShadowMarker::Str(marker)) if marker.as_str() == "$" => {}
            Some(other) => {
                return Err(SerializationError::BadRoot {
                    marker: other.describe(),
                })
            }
        }
        node_from(shadow, 0)
    }
}

fn node_from(shadow: Shadow, depth: usize) -> Result<Mask, SerializationError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(SerializationError::DepthExceeded {
            limit: MAX_NESTING_DEPTH,
        });
    }
    let mut mask = Mask::new();
    let tag = match &shadow.kind {
        None => return Ok(mask),
        Some(tag) => tag,
    };
    mask.kind = kind_from_tag(tag)?;
    for mut child in shadow.children {
        let marker = match child.path.take() {
            Some(marker) => marker,
            // `{}` carries nothing; skip it the way the encoder never
            // writes it.
            None if child.kind.is_none() => continue,
            None => return Err(SerializationError::MissingMarker),
        };
        let sub = node_from(child, depth + 1)?;
        if sub.is_empty() {
            continue;
        }
        attach(&mut mask, &marker, sub)?;
    }
    Ok(mask)
}

fn attach(mask: &mut Mask, marker: &ShadowMarker, sub: Mask) -> Result<(), SerializationError> {
    match (marker, mask.kind) {
        (
            ShadowMarker::Str(key),
            MaskKind::List | MaskKind::Set | MaskKind::IntMap | MaskKind::StrMap,
        ) if key.as_str() == "*" => {
            mask.elem = Some(Box::new(sub));
        }
        (ShadowMarker::Int(id), MaskKind::Struct) => match i32::try_from(*id) {
            Ok(id) => *mask.fields_mut().get_or_insert(id) = sub,
            Err(_) => return Err(bad_marker(marker, MaskKind::Struct)),
        },
        (
            ShadowMarker::Int(key),
            MaskKind::List | MaskKind::Set | MaskKind::IntMap,
        ) => {
            *mask.entries_mut().get_or_insert(*key) = sub;
        }
        (ShadowMarker::Str(key), MaskKind::StrMap) => {
            *mask.keys_mut().get_or_insert(key) = sub;
        }
        _ => return Err(bad_marker(marker, mask.kind)),
    }
    Ok(())
}

fn kind_from_tag(tag: &str) -> Result<MaskKind, SerializationError> {
    match tag {
        "Scalar" => Ok(MaskKind::Scalar),
        "Struct" => Ok(MaskKind::Struct),
        "List" => Ok(MaskKind::List),
        "Set" => Ok(MaskKind::Set),
        "IntMap" => Ok(MaskKind::IntMap),
        "StrMap" => Ok(MaskKind::StrMap),
        _ => Err(SerializationError::UnknownKind {
            tag: tag.to_owned(),
        }),
    }
}

fn bad_marker(marker: &ShadowMarker, parent: MaskKind) -> SerializationError {
    SerializationError::BadMarker {
        marker: marker.describe(),
        parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, StructDescriptor, TypeDescriptor};

    fn wrapper() -> TypeDescriptor {
        TypeDescriptor::struct_(StructDescriptor::new(
            "demo.Wrapper",
            vec![
                FieldDescriptor::new(1, "name", TypeDescriptor::Scalar),
                FieldDescriptor::new(2, "attrs", TypeDescriptor::str_map(TypeDescriptor::Scalar)),
            ],
        ))
    }

    #[test]
    fn empty_mask_marshals_as_the_empty_object() {
        let empty = Mask::new();
        assert_eq!(empty.marshal().unwrap(), b"{}");
        let back = Mask::unmarshal(b"{}").unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn wire_shape_carries_path_type_and_children() {
        let mask = Mask::compile(&wrapper(), &["$.attrs{\"x\"}"]).unwrap();
        let bytes = mask.marshal().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["path"], "$");
        assert_eq!(value["type"], "Struct");
        let attrs = &value["children"][0];
        assert_eq!(attrs["path"], 2);
        assert_eq!(attrs["type"], "StrMap");
        let key = &attrs["children"][0];
        assert_eq!(key["path"], "x");
        assert_eq!(key["type"], "Scalar");
        // Terminal nodes omit `children` entirely.
        assert!(key.get("children").is_none());
    }

    #[test]
    fn elem_children_round_trip_through_the_star_marker() {
        let list = TypeDescriptor::list(wrapper());
        let mask = Mask::compile(&list, &["$[*].name"]).unwrap();
        let bytes = mask.marshal().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["children"][0]["path"], "*");

        let back = Mask::unmarshal(&bytes).unwrap();
        assert!(back.int_in_mask(40));
        assert!(back.elem().unwrap().field_in_mask(1));
        assert!(!back.elem().unwrap().field_in_mask(2));
    }

    #[test]
    fn unknown_kind_tags_are_rejected() {
        let error = Mask::unmarshal(br#"{"path":"$","type":"Blob"}"#).unwrap_err();
        match error {
            SerializationError::UnknownKind { tag } => assert_eq!(tag, "Blob"),
            other => panic!("unexpected: {:?}", other),
        }
        // `Invalid` is never written, so it does not decode either.
        assert!(matches!(
            Mask::unmarshal(br#"{"path":"$","type":"Invalid"}"#),
            Err(SerializationError::UnknownKind { .. })
        ));
    }

    #[test]
    fn bad_markers_are_rejected() {
        assert!(matches!(
            Mask::unmarshal(br#"{"path":7,"type":"Struct"}"#),
            Err(SerializationError::BadRoot { .. })
        ));
        assert!(matches!(
            Mask::unmarshal(
                br#"{"path":"$","type":"Struct","children":[{"path":"name","type":"Scalar"}]}"#
            ),
            Err(SerializationError::BadMarker { .. })
        ));
        // The elem marker only makes sense under a container kind.
        assert!(matches!(
            Mask::unmarshal(
                br#"{"path":"$","type":"Struct","children":[{"path":"*","type":"Scalar"}]}"#
            ),
            Err(SerializationError::BadMarker { .. })
        ));
        assert!(matches!(
            Mask::unmarshal(
                br#"{"path":"$","type":"Scalar","children":[{"path":1,"type":"Scalar"}]}"#
            ),
            Err(SerializationError::BadMarker { .. })
        ));
        // Struct field markers must fit a field ID.
        assert!(matches!(
            Mask::unmarshal(
                br#"{"path":"$","type":"Struct","children":[{"path":4294967296,"type":"Scalar"}]}"#
            ),
            Err(SerializationError::BadMarker { .. })
        ));
        assert!(matches!(
            Mask::unmarshal(br#"{"path":"$","type":"Struct","children":[{"type":"Scalar"}]}"#),
            Err(SerializationError::MissingMarker)
        ));
    }

    #[test]
    fn malformed_json_reports_the_failing_path() {
        let error = Mask::unmarshal(br#"{"path":"$","type":17}"#).unwrap_err();
        match error {
            SerializationError::Json(inner) => {
                assert_eq!(inner.path().to_string(), "type");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn absurdly_deep_payloads_fail_to_decode() {
        // Both guards sit on this road: serde_json's recursion limit and
        // the node depth bound. Either way the payload must not decode.
        let mut json = String::from(r#"{"path":"$","type":"Struct""#);
        for _ in 0..=MAX_NESTING_DEPTH {
            json.push_str(r#","children":[{"path":1,"type":"Struct""#);
        }
        json.push_str(&"}]".repeat(MAX_NESTING_DEPTH + 1));
        json.push('}');
        assert!(Mask::unmarshal(json.as_bytes()).is_err());
    }

    #[test]
    fn marshal_reuses_thread_local_buffers() {
        let mask = Mask::compile(&wrapper(), &["$.name"]).unwrap();
        let first = mask.marshal().unwrap();
        let second = mask.marshal().unwrap();
        assert_eq!(first, second);
    }
}
