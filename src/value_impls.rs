// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Serializer/Deserializer implementations for `value::Value`.
//!
//! This is the bridge between the value graph and arbitrary Rust types:
//! [`to_value`] runs any `Serialize` type through a `Value`-building
//! serializer, [`from_value`] feeds a `Value` into any `Deserialize` type.
//! Enum values use the tuple representation `("Variant", payload)`; plain
//! strings and single-entry dicts are also accepted for enums when reading.
//!
//! The bridge walks values as trees.  Graphs with shared structure are
//! copied per reference, and cyclic graphs do not terminate; keep those on
//! the `Value` API.

use std::collections::{btree_map, BTreeMap};
use std::rc::Rc;
use std::result::Result as StdResult;
use std::vec;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::de::{self, Visitor};
use serde::ser::{self, Serialize};

use crate::error::{Error, Result};
use crate::value::{HashableValue, Value};

impl ser::Serialize for Value {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        match *self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(b),
            Value::I64(i) => serializer.serialize_i64(i),
            Value::Int(ref i) => serialize_bigint(i, serializer),
            Value::F64(f) => serializer.serialize_f64(f),
            Value::Bytes(ref b) => serializer.serialize_bytes(b),
            Value::String(ref s) => serializer.serialize_str(s),
            Value::Tuple(ref items) => serializer.collect_seq(items.iter()),
            Value::List(ref cell) => serializer.collect_seq(cell.borrow().iter()),
            Value::Dict(ref cell) => serializer.collect_map(cell.borrow().iter()),
            Value::Global(_) | Value::Object(_) | Value::Reducible(_) =>
                Err(ser::Error::custom(format!("cannot serialize {} values through serde",
                                               self.kind_name()))),
        }
    }
}

impl ser::Serialize for HashableValue {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        match *self {
            HashableValue::None => serializer.serialize_unit(),
            HashableValue::Bool(b) => serializer.serialize_bool(b),
            HashableValue::I64(i) => serializer.serialize_i64(i),
            HashableValue::Int(ref i) => serialize_bigint(i, serializer),
            HashableValue::F64(f) => serializer.serialize_f64(f),
            HashableValue::Bytes(ref b) => serializer.serialize_bytes(b),
            HashableValue::String(ref s) => serializer.serialize_str(s),
            HashableValue::Tuple(ref items) => serializer.collect_seq(items.iter()),
        }
    }
}

fn serialize_bigint<S: ser::Serializer>(i: &BigInt, serializer: S) -> StdResult<S::Ok, S::Error> {
    if let Some(v) = i.to_i64() {
        serializer.serialize_i64(v)
    } else if let Some(v) = i.to_u64() {
        serializer.serialize_u64(v)
    } else {
        Err(ser::Error::custom("integer too large for serde"))
    }
}

impl<'de> de::Deserialize<'de> for Value {
    #[inline]
    fn deserialize<D: de::Deserializer<'de>>(deser: D) -> StdResult<Value, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
                fmt.write_str("any value")
            }

            #[inline]
            fn visit_bool<E>(self, value: bool) -> StdResult<Value, E> {
                Ok(Value::Bool(value))
            }

            #[inline]
            fn visit_i64<E>(self, value: i64) -> StdResult<Value, E> {
                Ok(Value::I64(value))
            }

            #[inline]
            fn visit_u64<E>(self, value: u64) -> StdResult<Value, E> {
                if value < 0x8000_0000_0000_0000 {
                    Ok(Value::I64(value as i64))
                } else {
                    Ok(Value::Int(BigInt::from(value)))
                }
            }

            #[inline]
            fn visit_f64<E>(self, value: f64) -> StdResult<Value, E> {
                Ok(Value::F64(value))
            }

            #[inline]
            fn visit_str<E: de::Error>(self, value: &str) -> StdResult<Value, E> {
                self.visit_string(String::from(value))
            }

            #[inline]
            fn visit_string<E>(self, value: String) -> StdResult<Value, E> {
                Ok(Value::String(value))
            }

            #[inline]
            fn visit_bytes<E: de::Error>(self, value: &[u8]) -> StdResult<Value, E> {
                self.visit_byte_buf(value.to_vec())
            }

            #[inline]
            fn visit_byte_buf<E: de::Error>(self, value: Vec<u8>) -> StdResult<Value, E> {
                Ok(Value::Bytes(value))
            }

            #[inline]
            fn visit_none<E>(self) -> StdResult<Value, E> {
                Ok(Value::None)
            }

            #[inline]
            fn visit_some<D: de::Deserializer<'de>>(self, deser: D) -> StdResult<Value, D::Error> {
                de::Deserialize::deserialize(deser)
            }

            #[inline]
            fn visit_unit<E>(self) -> StdResult<Value, E> {
                Ok(Value::None)
            }

            #[inline]
            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> StdResult<Value, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::list(items))
            }

            #[inline]
            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> StdResult<Value, A::Error> {
                let mut entries = BTreeMap::new();
                while let Some((key, value)) = map.next_entry()? {
                    entries.insert(key, value);
                }
                Ok(Value::dict(entries))
            }
        }

        deser.deserialize_any(ValueVisitor)
    }
}

impl<'de> de::Deserialize<'de> for HashableValue {
    #[inline]
    fn deserialize<D: de::Deserializer<'de>>(deser: D) -> StdResult<HashableValue, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = HashableValue;

            fn expecting(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
                fmt.write_str("any hashable value")
            }

            #[inline]
            fn visit_bool<E>(self, value: bool) -> StdResult<HashableValue, E> {
                Ok(HashableValue::Bool(value))
            }

            #[inline]
            fn visit_i64<E>(self, value: i64) -> StdResult<HashableValue, E> {
                Ok(HashableValue::I64(value))
            }

            #[inline]
            fn visit_u64<E>(self, value: u64) -> StdResult<HashableValue, E> {
                if value < 0x8000_0000_0000_0000 {
                    Ok(HashableValue::I64(value as i64))
                } else {
                    Ok(HashableValue::Int(BigInt::from(value)))
                }
            }

            #[inline]
            fn visit_f64<E>(self, value: f64) -> StdResult<HashableValue, E> {
                Ok(HashableValue::F64(value))
            }

            #[inline]
            fn visit_str<E: de::Error>(self, value: &str) -> StdResult<HashableValue, E> {
                self.visit_string(String::from(value))
            }

            #[inline]
            fn visit_string<E>(self, value: String) -> StdResult<HashableValue, E> {
                Ok(HashableValue::String(value))
            }

            #[inline]
            fn visit_bytes<E: de::Error>(self, value: &[u8]) -> StdResult<HashableValue, E> {
                self.visit_byte_buf(value.to_vec())
            }

            #[inline]
            fn visit_byte_buf<E: de::Error>(self, value: Vec<u8>) -> StdResult<HashableValue, E> {
                Ok(HashableValue::Bytes(value))
            }

            #[inline]
            fn visit_none<E>(self) -> StdResult<HashableValue, E> {
                Ok(HashableValue::None)
            }

            #[inline]
            fn visit_some<D: de::Deserializer<'de>>(self, deser: D)
                                                    -> StdResult<HashableValue, D::Error> {
                de::Deserialize::deserialize(deser)
            }

            #[inline]
            fn visit_unit<E>(self) -> StdResult<HashableValue, E> {
                Ok(HashableValue::None)
            }

            #[inline]
            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A)
                                                -> StdResult<HashableValue, A::Error> {
                let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(HashableValue::Tuple(items))
            }
        }

        deser.deserialize_any(ValueVisitor)
    }
}

/// Deserializes a decoded value into any serde supported type.
pub struct Deserializer {
    value: Value,
}

impl Deserializer {
    /// Creates a new deserializer instance consuming the given value.
    pub fn new(value: Value) -> Deserializer {
        Deserializer { value }
    }
}

fn take_tuple(rc: Rc<Vec<Value>>) -> Vec<Value> {
    Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone())
}

impl<'de> de::Deserializer<'de> for Deserializer {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::None => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(v),
            Value::I64(v) => visitor.visit_i64(v),
            Value::Int(v) => {
                if let Some(i) = v.to_i64() {
                    visitor.visit_i64(i)
                } else if let Some(u) = v.to_u64() {
                    visitor.visit_u64(u)
                } else {
                    Err(de::Error::custom("integer too large"))
                }
            }
            Value::F64(v) => visitor.visit_f64(v),
            Value::Bytes(v) => visitor.visit_byte_buf(v),
            Value::String(v) => visitor.visit_string(v),
            Value::Tuple(rc) => visitor.visit_seq(SeqDeserializer {
                iter: take_tuple(rc).into_iter(),
            }),
            Value::List(rc) => {
                let items = match Rc::try_unwrap(rc) {
                    Ok(cell) => cell.into_inner(),
                    Err(rc) => rc.borrow().clone(),
                };
                visitor.visit_seq(SeqDeserializer { iter: items.into_iter() })
            }
            Value::Dict(rc) => {
                let entries = match Rc::try_unwrap(rc) {
                    Ok(cell) => cell.into_inner(),
                    Err(rc) => rc.borrow().clone(),
                };
                visitor.visit_map(MapDeserializer {
                    iter: entries.into_iter(),
                    value: None,
                })
            }
            ref other @ Value::Global(_) |
            ref other @ Value::Object(_) |
            ref other @ Value::Reducible(_) =>
                Err(de::Error::custom(format!("cannot deserialize from {} values",
                                              other.kind_name()))),
        }
    }

    #[inline]
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.value {
            Value::None => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    #[inline]
    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str,
                                                   visitor: V) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(self, _name: &'static str,
                                         _variants: &'static [&'static str],
                                         visitor: V) -> Result<V::Value> {
        let (variant, payload) = match self.value {
            Value::Tuple(rc) => {
                let mut items = take_tuple(rc);
                match items.len() {
                    1 => (items.remove(0), None),
                    2 => {
                        let payload = items.pop();
                        (items.remove(0), payload)
                    }
                    _ => return Err(de::Error::custom("enums must be 1- or 2-tuples")),
                }
            }
            // Also accepted: a bare variant name, and the single-entry
            // mapping form other formats commonly produce.
            Value::String(s) => (Value::String(s), None),
            Value::Dict(rc) => {
                let entries = match Rc::try_unwrap(rc) {
                    Ok(cell) => cell.into_inner(),
                    Err(rc) => rc.borrow().clone(),
                };
                if entries.len() != 1 {
                    return Err(de::Error::custom("enum dicts must have one entry"));
                }
                match entries.into_iter().next() {
                    Some((key, value)) => (key.into_value(), Some(value)),
                    None => return Err(de::Error::custom("enum dicts must have one entry")),
                }
            }
            _ => return Err(de::Error::custom("enums must be tuples, strings or dicts")),
        };
        visitor.visit_enum(EnumDeserializer { variant, payload })
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string bytes
        byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

struct SeqDeserializer {
    iter: vec::IntoIter<Value>,
}

impl<'de> de::SeqAccess<'de> for SeqDeserializer {
    type Error = Error;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(&mut self, seed: T)
                                                      -> Result<Option<T::Value>> {
        match self.iter.next() {
            Some(value) => seed.deserialize(Deserializer::new(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDeserializer {
    iter: btree_map::IntoIter<HashableValue, Value>,
    value: Option<Value>,
}

impl<'de> de::MapAccess<'de> for MapDeserializer {
    type Error = Error;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(&mut self, seed: K)
                                                  -> Result<Option<K::Value>> {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(Deserializer::new(key.into_value())).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        match self.value.take() {
            Some(value) => seed.deserialize(Deserializer::new(value)),
            None => Err(de::Error::custom("map value missing")),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDeserializer {
    variant: Value,
    payload: Option<Value>,
}

impl<'de> de::EnumAccess<'de> for EnumDeserializer {
    type Error = Error;
    type Variant = VariantDeserializer;

    fn variant_seed<V: de::DeserializeSeed<'de>>(self, seed: V)
                                                 -> Result<(V::Value, VariantDeserializer)> {
        let variant = seed.deserialize(Deserializer::new(self.variant))?;
        Ok((variant, VariantDeserializer { payload: self.payload }))
    }
}

struct VariantDeserializer {
    payload: Option<Value>,
}

impl<'de> de::VariantAccess<'de> for VariantDeserializer {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.payload {
            None | Some(Value::None) => Ok(()),
            Some(_) => Err(de::Error::custom("unexpected payload for unit variant")),
        }
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        match self.payload {
            Some(value) => seed.deserialize(Deserializer::new(value)),
            None => Err(de::Error::custom("missing payload for newtype variant")),
        }
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        match self.payload {
            Some(value) => de::Deserializer::deserialize_any(Deserializer::new(value), visitor),
            None => Err(de::Error::custom("missing payload for tuple variant")),
        }
    }

    fn struct_variant<V: Visitor<'de>>(self, _fields: &'static [&'static str],
                                       visitor: V) -> Result<V::Value> {
        match self.payload {
            Some(value) => de::Deserializer::deserialize_any(Deserializer::new(value), visitor),
            None => Err(de::Error::custom("missing payload for struct variant")),
        }
    }
}

/// A `serde::Serializer` that serializes a `Serialize`e into a `Value`.
pub struct Serializer;

impl ser::Serializer for Serializer {
    type Ok = Value;
    type Error = Error;
    type SerializeSeq = SerializeVec;
    type SerializeTuple = SerializeTupleValue;
    type SerializeTupleStruct = SerializeTupleValue;
    type SerializeTupleVariant = SerializeTupleVariantValue;
    type SerializeMap = SerializeDict;
    type SerializeStruct = SerializeDict;
    type SerializeStructVariant = SerializeStructVariantValue;

    #[inline]
    fn serialize_bool(self, value: bool) -> Result<Value> {
        Ok(Value::Bool(value))
    }

    #[inline]
    fn serialize_i8(self, value: i8) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i16(self, value: i16) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i32(self, value: i32) -> Result<Value> {
        self.serialize_i64(value as i64)
    }

    #[inline]
    fn serialize_i64(self, value: i64) -> Result<Value> {
        Ok(Value::I64(value))
    }

    #[inline]
    fn serialize_u8(self, value: u8) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u16(self, value: u16) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u32(self, value: u32) -> Result<Value> {
        self.serialize_u64(value as u64)
    }

    #[inline]
    fn serialize_u64(self, value: u64) -> Result<Value> {
        if value < 0x8000_0000_0000_0000 {
            Ok(Value::I64(value as i64))
        } else {
            Ok(Value::Int(BigInt::from(value)))
        }
    }

    #[inline]
    fn serialize_f32(self, value: f32) -> Result<Value> {
        self.serialize_f64(value as f64)
    }

    #[inline]
    fn serialize_f64(self, value: f64) -> Result<Value> {
        Ok(Value::F64(value))
    }

    #[inline]
    fn serialize_char(self, value: char) -> Result<Value> {
        Ok(Value::String(value.to_string()))
    }

    #[inline]
    fn serialize_str(self, value: &str) -> Result<Value> {
        Ok(Value::String(value.to_owned()))
    }

    #[inline]
    fn serialize_bytes(self, value: &[u8]) -> Result<Value> {
        Ok(Value::Bytes(value.to_vec()))
    }

    #[inline]
    fn serialize_none(self) -> Result<Value> {
        self.serialize_unit()
    }

    #[inline]
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    #[inline]
    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::None)
    }

    #[inline]
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::tuple(vec![]))
    }

    #[inline]
    fn serialize_unit_variant(self, _name: &'static str, _index: u32,
                              variant: &'static str) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(variant.into())]))
    }

    #[inline]
    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str,
                                                       value: &T) -> Result<Value> {
        value.serialize(self)
    }

    #[inline]
    fn serialize_newtype_variant<T: ?Sized + Serialize>(self, _name: &'static str, _index: u32,
                                                        variant: &'static str,
                                                        value: &T) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(variant.into()), to_value(value)?]))
    }

    #[inline]
    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeVec> {
        Ok(SerializeVec { items: Vec::with_capacity(len.unwrap_or(0)) })
    }

    #[inline]
    fn serialize_tuple(self, len: usize) -> Result<SerializeTupleValue> {
        Ok(SerializeTupleValue { items: Vec::with_capacity(len) })
    }

    #[inline]
    fn serialize_tuple_struct(self, _name: &'static str, len: usize)
                              -> Result<SerializeTupleValue> {
        self.serialize_tuple(len)
    }

    #[inline]
    fn serialize_tuple_variant(self, _name: &'static str, _index: u32,
                               variant: &'static str, len: usize)
                               -> Result<SerializeTupleVariantValue> {
        Ok(SerializeTupleVariantValue { variant, items: Vec::with_capacity(len) })
    }

    #[inline]
    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeDict> {
        Ok(SerializeDict { entries: BTreeMap::new(), next_key: None })
    }

    #[inline]
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<SerializeDict> {
        self.serialize_map(None)
    }

    #[inline]
    fn serialize_struct_variant(self, _name: &'static str, _index: u32,
                                variant: &'static str, _len: usize)
                                -> Result<SerializeStructVariantValue> {
        Ok(SerializeStructVariantValue { variant, entries: BTreeMap::new() })
    }
}

pub struct SerializeVec {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SerializeVec {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::list(self.items))
    }
}

pub struct SerializeTupleValue {
    items: Vec<Value>,
}

impl ser::SerializeTuple for SerializeTupleValue {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(self.items))
    }
}

impl ser::SerializeTupleStruct for SerializeTupleValue {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        ser::SerializeTuple::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeTuple::end(self)
    }
}

pub struct SerializeTupleVariantValue {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariantValue {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.items.push(to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(self.variant.into()),
                             Value::tuple(self.items)]))
    }
}

pub struct SerializeDict {
    entries: BTreeMap<HashableValue, Value>,
    next_key: Option<HashableValue>,
}

impl ser::SerializeMap for SerializeDict {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        match to_value(key)?.into_hashable() {
            Ok(key) => {
                self.next_key = Some(key);
                Ok(())
            }
            Err(key) => Err(ser::Error::custom(format!("key of kind {} is not hashable",
                                                       key.kind_name()))),
        }
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let key = match self.next_key.take() {
            Some(key) => key,
            None => return Err(ser::Error::custom("map value without a key")),
        };
        self.entries.insert(key, to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::dict(self.entries))
    }
}

impl ser::SerializeStruct for SerializeDict {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str,
                                              value: &T) -> Result<()> {
        self.entries.insert(HashableValue::String(key.into()), to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::dict(self.entries))
    }
}

pub struct SerializeStructVariantValue {
    variant: &'static str,
    entries: BTreeMap<HashableValue, Value>,
}

impl ser::SerializeStructVariant for SerializeStructVariantValue {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str,
                                              value: &T) -> Result<()> {
        self.entries.insert(HashableValue::String(key.into()), to_value(value)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::tuple(vec![Value::String(self.variant.into()),
                             Value::dict(self.entries)]))
    }
}

/// Serialize any serde serializable object into a `value::Value`.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value.serialize(Serializer)
}

/// Deserialize a `value::Value` into any serde deserializable object.
pub fn from_value<T: de::DeserializeOwned>(value: Value) -> Result<T> {
    de::Deserialize::deserialize(Deserializer::new(value))
}
