// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `serde::Serializer` that builds a sorted [`Node`] tree.
//!
//! Every nested `serialize` call goes one level deeper, including `Some` and newtype
//! wrappers, so a value that refers back to itself runs into [`MAX_DEPTH`] instead of
//! overflowing the stack.

use std::collections::BTreeMap;

use serde::{
    Serialize,
    ser::{self, Impossible},
};

use super::{EncodingError, MAX_DEPTH, Node};

type Result<T> = std::result::Result<T, EncodingError>;

#[derive(Clone, Copy, Debug)]
pub(crate) struct NodeSerializer {
    depth: usize,
}

impl NodeSerializer {
    pub(crate) fn new() -> Self {
        Self { depth: 0 }
    }

    fn nested(self) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > MAX_DEPTH {
            return Err(EncodingError::DepthExceeded(MAX_DEPTH));
        }
        Ok(Self { depth })
    }

    fn float(v: f64) -> Result<Node> {
        if !v.is_finite() {
            return Err(EncodingError::NonFiniteFloat);
        }
        // -0.0 and 0.0 compare equal, so both get one spelling.
        Ok(Node::Float(if v.to_bits() == (-0.0_f64).to_bits() { 0.0 } else { v }))
    }
}

fn tagged(variant: &'static str, payload: Node) -> Node {
    let mut map = BTreeMap::new();
    map.insert(variant.to_owned(), payload);
    Node::Map(map)
}

impl ser::Serializer for NodeSerializer {
    type Ok = Node;
    type Error = EncodingError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = SeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = MapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Node> {
        Ok(Node::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Node> {
        Ok(Node::Int(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Node> {
        Ok(Node::Int(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Node> {
        Ok(Node::Int(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Node> {
        Ok(Node::Int(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Node> {
        Ok(Node::Int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Node> {
        Ok(Node::UInt(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Node> {
        Ok(Node::UInt(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Node> {
        Ok(Node::UInt(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Node> {
        Ok(Node::UInt(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Node> {
        Ok(Node::UInt(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Node> {
        Self::float(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<Node> {
        Self::float(v)
    }

    fn serialize_char(self, v: char) -> Result<Node> {
        Ok(Node::Str(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Node> {
        Ok(Node::Str(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Node> {
        Ok(Node::Seq(v.iter().map(|b| Node::UInt((*b).into())).collect()))
    }

    fn serialize_none(self) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Node>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self.nested()?)
    }

    fn serialize_unit(self) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Node> {
        Ok(Node::Null)
    }

    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str) -> Result<Node> {
        Ok(Node::Str(variant.to_owned()))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Node>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self.nested()?)
    }

    fn serialize_newtype_variant<T>(self, _name: &'static str, _variant_index: u32, variant: &'static str, value: &T) -> Result<Node>
    where
        T: ?Sized + Serialize,
    {
        Ok(tagged(variant, value.serialize(self.nested()?)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(self.nested()?, len, None))
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(self.nested()?, Some(len), None))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(self.nested()?, Some(len), None))
    }

    fn serialize_tuple_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str, len: usize) -> Result<SeqBuilder> {
        Ok(SeqBuilder::new(self.nested()?, Some(len), Some(variant)))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder::new(self.nested()?, None))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<MapBuilder> {
        Ok(MapBuilder::new(self.nested()?, None))
    }

    fn serialize_struct_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str, _len: usize) -> Result<MapBuilder> {
        Ok(MapBuilder::new(self.nested()?, Some(variant)))
    }
}

pub(crate) struct SeqBuilder {
    inner: NodeSerializer,
    items: Vec<Node>,
    variant: Option<&'static str>,
}

impl SeqBuilder {
    fn new(inner: NodeSerializer, len: Option<usize>, variant: Option<&'static str>) -> Self {
        Self {
            inner,
            items: Vec::with_capacity(len.unwrap_or_default()),
            variant,
        }
    }

    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.items.push(value.serialize(self.inner)?);
        Ok(())
    }

    fn finish(self) -> Node {
        let seq = Node::Seq(self.items);
        match self.variant {
            Some(variant) => tagged(variant, seq),
            None => seq,
        }
    }
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleVariant for SeqBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.push(value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

pub(crate) struct MapBuilder {
    inner: NodeSerializer,
    entries: BTreeMap<String, Node>,
    pending_key: Option<String>,
    variant: Option<&'static str>,
}

impl MapBuilder {
    fn new(inner: NodeSerializer, variant: Option<&'static str>) -> Self {
        Self {
            inner,
            entries: BTreeMap::new(),
            pending_key: None,
            variant,
        }
    }

    fn insert<T>(&mut self, key: String, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let node = value.serialize(self.inner)?;
        if self.entries.contains_key(&key) {
            return Err(EncodingError::DuplicateKey(key));
        }
        self.entries.insert(key, node);
        Ok(())
    }

    fn finish(self) -> Node {
        let map = Node::Map(self.entries);
        match self.variant {
            Some(variant) => tagged(variant, map),
            None => map,
        }
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.pending_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| EncodingError::Custom("map value serialized before its key".to_owned()))?;
        self.insert(key, value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.insert(key.to_owned(), value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

impl ser::SerializeStructVariant for MapBuilder {
    type Ok = Node;
    type Error = EncodingError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.insert(key.to_owned(), value)
    }

    fn end(self) -> Result<Node> {
        Ok(self.finish())
    }
}

/// Turns scalar map keys into strings; everything else is rejected.
struct KeySerializer;

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = EncodingError;

    type SerializeSeq = Impossible<String, EncodingError>;
    type SerializeTuple = Impossible<String, EncodingError>;
    type SerializeTupleStruct = Impossible<String, EncodingError>;
    type SerializeTupleVariant = Impossible<String, EncodingError>;
    type SerializeMap = Impossible<String, EncodingError>;
    type SerializeStruct = Impossible<String, EncodingError>;
    type SerializeStructVariant = Impossible<String, EncodingError>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i128(self, v: i128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u128(self, v: u128) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_owned())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_none(self) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_some<T>(self, _value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str) -> Result<String> {
        Ok(variant.to_owned())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(self, _name: &'static str, _variant_index: u32, _variant: &'static str, _value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(EncodingError::KeyMustBeScalar)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(EncodingError::KeyMustBeScalar)
    }
}
