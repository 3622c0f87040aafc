// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical encoding of request parameters into cache keys.
//!
//! Two structurally equal values always encode to the same string, no matter in which
//! order their fields or map entries were inserted. The output is compact JSON in which
//! the keys of every object are sorted by their UTF-8 bytes:
//!
//! ```
//! use std::collections::HashMap;
//! use heighliner_cache::encode;
//!
//! let mut a = HashMap::new();
//! a.insert("b", 2);
//! a.insert("a", 1);
//!
//! assert_eq!(encode(&a)?, r#"{"a":1,"b":2}"#);
//! # Ok::<(), heighliner_cache::EncodingError>(())
//! ```
//!
//! Structs encode like maps, so a struct and a map with the same entries share a key.
//! Enum variants follow serde's externally tagged layout.

mod serializer;

use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use serializer::NodeSerializer;

/// Nesting deeper than this is rejected. Only cyclic or pathological values get here.
pub const MAX_DEPTH: usize = 128;

/// Why a value could not be encoded.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// A map key was not a string, char, bool or integer.
    #[error("map keys must be strings, chars, bools or integers")]
    KeyMustBeScalar,

    /// Two keys of one map encode to the same string, e.g. `1` and `"1"`.
    #[error("duplicate map key `{0}`")]
    DuplicateKey(String),

    /// Floats must be finite to have a canonical form.
    #[error("floats must be finite to be encoded")]
    NonFiniteFloat,

    /// The value nests deeper than [`MAX_DEPTH`], which is what a cyclic value produces.
    #[error("value nests deeper than {0} levels")]
    DepthExceeded(usize),

    /// The value's `Serialize` implementation reported an error.
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for EncodingError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Intermediate form: objects are kept sorted so writing them out is canonical.
#[derive(Debug, PartialEq)]
pub(crate) enum Node {
    Null,
    Bool(bool),
    Int(i128),
    UInt(u128),
    Float(f64),
    Str(String),
    Seq(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

/// Encodes `value` into its canonical string form.
///
/// # Errors
///
/// Returns an [`EncodingError`] if the value has no canonical form; see the variants for
/// the individual reasons.
pub fn encode<T>(value: &T) -> Result<String, EncodingError>
where
    T: Serialize + ?Sized,
{
    let node = value.serialize(NodeSerializer::new())?;
    let mut out = String::new();
    write_node(&node, &mut out);
    Ok(out)
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Null => out.push_str("null"),
        Node::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Node::Int(i) => out.push_str(&i.to_string()),
        Node::UInt(u) => out.push_str(&u.to_string()),
        Node::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(number) => out.push_str(&number.to_string()),
            // Non-finite floats are rejected by the serializer.
            None => out.push_str("null"),
        },
        Node::Str(s) => write_str(s, out),
        Node::Seq(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_node(item, out);
            }
            out.push(']');
        }
        Node::Map(entries) => {
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_str(key, out);
                out.push(':');
                write_node(value, out);
            }
            out.push('}');
        }
    }
}

fn write_str(s: &str, out: &mut String) {
    out.push_str(&serde_json::Value::from(s).to_string());
}

/// A cache key built from an identifier and canonically encoded parameters.
///
/// Parameters are appended with `:` as separator.
///
/// # Examples
///
/// ```
/// use heighliner_cache::CacheKey;
/// use serde_json::json;
///
/// let key = CacheKey::new("People").param(&json!({ "take": 1, "email": "ada@example.com" }))?;
/// assert_eq!(key.as_str(), r#"People:{"email":"ada@example.com","take":1}"#);
/// # Ok::<(), heighliner_cache::EncodingError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Starts a key from a plain identifier such as an endpoint or a record type.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Appends the canonical encoding of `value`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if `value` has no canonical form.
    pub fn param<T>(mut self, value: &T) -> Result<Self, EncodingError>
    where
        T: Serialize + ?Sized,
    {
        let encoded = encode(value)?;
        self.0.push(':');
        self.0.push_str(&encoded);
        Ok(self)
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the builder and returns the finished key.
    #[must_use]
    pub fn finish(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_objects_are_sorted() {
        let value = serde_json::json!({ "z": { "b": [3, 1], "a": null }, "a": true });
        assert_eq!(encode(&value).unwrap(), r#"{"a":true,"z":{"a":null,"b":[3,1]}}"#);
    }

    #[test]
    fn keys_sort_by_bytes() {
        let value = serde_json::json!({ "b": 1, "B": 2, "a": 3, "é": 4, "10": 5, "9": 6 });
        assert_eq!(encode(&value).unwrap(), r#"{"10":5,"9":6,"B":2,"a":3,"b":1,"é":4}"#);
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(encode("line\n\"quoted\"").unwrap(), r#""line\n\"quoted\"""#);
    }

    #[test]
    fn negative_zero_is_normalized() {
        assert_eq!(encode(&-0.0_f64).unwrap(), encode(&0.0_f64).unwrap());
    }

    #[test]
    fn cache_key_appends_params() {
        let key = CacheKey::new("BinaryFiles").param(&7).unwrap().param("thumb").unwrap();
        assert_eq!(key.to_string(), r#"BinaryFiles:7:"thumb""#);
        assert_eq!(String::from(key), r#"BinaryFiles:7:"thumb""#);
    }
}
