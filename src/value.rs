// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The object-graph value type.
//!
//! Mutable aggregates (lists, dicts, objects) are reference-counted cells,
//! so a `Value` is really a handle into a graph: cloning a value clones the
//! handle, not the aggregate.  The writer keys its memo on these handles'
//! pointer identity, and the reader hands out clones of memoized handles,
//! which is what makes shared and cyclic structure survive a round trip.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

pub use crate::value_impls::{to_value, from_value};

use crate::object::{ClassDef, Object, Reduce};

/// A value in the object graph.
///
/// Note on integers: everything that fits into an `i64` decodes as `I64`;
/// `Int` holds the rest.  The two compare equal when numerically equal.
#[derive(Clone)]
pub enum Value {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Short integer
    I64(i64),
    /// Long integer (unbounded length)
    Int(BigInt),
    /// Float
    F64(f64),
    /// Bytestring
    Bytes(Vec<u8>),
    /// Unicode string
    String(String),
    /// Tuple; immutable, but shared, so back references can point at it
    Tuple(Rc<Vec<Value>>),
    /// List
    List(Rc<RefCell<Vec<Value>>>),
    /// Dictionary (map)
    Dict(Rc<RefCell<BTreeMap<HashableValue, Value>>>),
    /// A resolved constructor reference
    Global(Rc<ClassDef>),
    /// A reconstructed instance of a registered class
    Object(Rc<RefCell<Object>>),
    /// An opaque kind serialized through its [`Reduce`] implementation
    Reducible(Rc<dyn Reduce>),
}

/// The subset of values that can appear as dictionary keys.
///
/// The type is *not* hashed in Rust; keys live in B-tree maps, using the
/// consistent total ordering defined below.
#[derive(Clone, Debug)]
pub enum HashableValue {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Short integer
    I64(i64),
    /// Long integer
    Int(BigInt),
    /// Float
    F64(f64),
    /// Bytestring
    Bytes(Vec<u8>),
    /// Unicode string
    String(String),
    /// Tuple
    Tuple(Vec<HashableValue>),
}

impl Value {
    /// Make a list value from its elements.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Make a tuple value from its elements.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    /// Make a dict value from its entries.
    pub fn dict(entries: BTreeMap<HashableValue, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Wrap an [`Object`] instance.
    pub fn object(obj: Object) -> Value {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Wrap a reducible kind.
    pub fn reducible(obj: Rc<dyn Reduce>) -> Value {
        Value::Reducible(obj)
    }

    /// A short name for the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match *self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::I64(_) | Value::Int(_) => "int",
            Value::F64(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Global(_) => "global",
            Value::Object(_) => "object",
            Value::Reducible(_) => "reducible",
        }
    }

    /// The memo identity of this value, if it has one.
    ///
    /// Only handle-like values carry identity; plain scalars are copied
    /// freely and are never deduplicated.  The empty tuple has no identity
    /// either: it gets a dedicated zero-operand opcode instead.
    pub(crate) fn identity(&self) -> Option<usize> {
        match *self {
            Value::Tuple(ref rc) if !rc.is_empty() => Some(Rc::as_ptr(rc) as usize),
            Value::List(ref rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Dict(ref rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Global(ref rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Object(ref rc) => Some(Rc::as_ptr(rc) as usize),
            Value::Reducible(ref rc) => Some(Rc::as_ptr(rc) as *const () as usize),
            _ => None,
        }
    }

    /// Convert the value into a hashable version, if possible.  If not,
    /// the value is handed back unchanged in the `Err`.
    pub fn into_hashable(self) -> Result<HashableValue, Value> {
        match self {
            Value::None => Ok(HashableValue::None),
            Value::Bool(b) => Ok(HashableValue::Bool(b)),
            Value::I64(i) => Ok(HashableValue::I64(i)),
            Value::Int(i) => Ok(HashableValue::Int(i)),
            Value::F64(f) => Ok(HashableValue::F64(f)),
            Value::Bytes(b) => Ok(HashableValue::Bytes(b)),
            Value::String(s) => Ok(HashableValue::String(s)),
            Value::Tuple(rc) => {
                let items = Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone());
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    match item.into_hashable() {
                        Ok(h) => result.push(h),
                        Err(_) => return Err(Value::None),
                    }
                }
                Ok(HashableValue::Tuple(result))
            }
            other => Err(other),
        }
    }
}

impl HashableValue {
    /// Convert the value into its non-hashable version.  This always works.
    pub fn into_value(self) -> Value {
        match self {
            HashableValue::None => Value::None,
            HashableValue::Bool(b) => Value::Bool(b),
            HashableValue::I64(i) => Value::I64(i),
            HashableValue::Int(i) => Value::Int(i),
            HashableValue::F64(f) => Value::F64(f),
            HashableValue::Bytes(b) => Value::Bytes(b),
            HashableValue::String(s) => Value::String(s),
            HashableValue::Tuple(v) =>
                Value::tuple(v.into_iter().map(HashableValue::into_value).collect()),
        }
    }
}

/// Structural equality.
///
/// Handles are compared by pointer first, then by contents, so comparing a
/// value with itself is always cheap.  Comparing two distinct cyclic graphs
/// recurses; use pointer identity for those.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::I64(a), Value::Int(b)) | (Value::Int(b), Value::I64(a)) =>
                BigInt::from(*a) == *b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Global(a), Value::Global(b)) =>
                a.module() == b.module() && a.name() == b.name(),
            (Value::Object(a), Value::Object(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Reducible(a), Value::Reducible(b)) =>
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const (),
            _ => false,
        }
    }
}

fn write_elements<'a, I, T>(f: &mut fmt::Formatter, it: I,
                            prefix: &'static str, suffix: &'static str,
                            len: usize, always_comma: bool) -> fmt::Result
    where I: Iterator<Item=&'a T>, T: fmt::Display + 'a
{
    f.write_str(prefix)?;
    for (i, item) in it.enumerate() {
        if i < len - 1 || always_comma {
            write!(f, "{}, ", item)?;
        } else {
            write!(f, "{}", item)?;
        }
    }
    f.write_str(suffix)
}

fn write_dict(f: &mut fmt::Formatter,
              d: &BTreeMap<HashableValue, Value>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (key, value)) in d.iter().enumerate() {
        if i < d.len() - 1 {
            write!(f, "{}: {}, ", key, value)?;
        } else {
            write!(f, "{}: {}", key, value)?;
        }
    }
    write!(f, "}}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if b { "True" } else { "False" }),
            Value::I64(i) => write!(f, "{}", i),
            Value::Int(ref i) => write!(f, "{}", i),
            Value::F64(v) => write!(f, "{}", v),
            Value::Bytes(ref b) => write!(f, "b{:?}", b),
            Value::String(ref s) => write!(f, "{:?}", s),
            Value::Tuple(ref v) =>
                write_elements(f, v.iter(), "(", ")", v.len(), v.len() == 1),
            Value::List(ref v) => {
                let v = v.borrow();
                write_elements(f, v.iter(), "[", "]", v.len(), false)
            }
            Value::Dict(ref v) => write_dict(f, &v.borrow()),
            Value::Global(ref def) =>
                write!(f, "<class '{}.{}'>", def.module(), def.name()),
            Value::Object(ref obj) => {
                let obj = obj.borrow();
                write!(f, "<{}.{} object>", obj.class.module(), obj.class.name())
            }
            Value::Reducible(_) => write!(f, "<reducible object>"),
        }
    }
}

// Debug cannot be derived (trait objects, closures in ClassDef); the
// Display form is the more useful rendering anyway.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for HashableValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            HashableValue::None => write!(f, "None"),
            HashableValue::Bool(b) => write!(f, "{}", if b { "True" } else { "False" }),
            HashableValue::I64(i) => write!(f, "{}", i),
            HashableValue::Int(ref i) => write!(f, "{}", i),
            HashableValue::F64(v) => write!(f, "{}", v),
            HashableValue::Bytes(ref b) => write!(f, "b{:?}", b),
            HashableValue::String(ref s) => write!(f, "{:?}", s),
            HashableValue::Tuple(ref v) =>
                write_elements(f, v.iter(), "(", ")", v.len(), v.len() == 1),
        }
    }
}

impl PartialEq for HashableValue {
    fn eq(&self, other: &HashableValue) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashableValue {}

impl PartialOrd for HashableValue {
    fn partial_cmp(&self, other: &HashableValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Implement a (more or less) consistent ordering for `HashableValue`s
/// so that they can be used as dictionary keys.
///
/// Numeric values with the same value (integral or not) compare equal; for
/// the remaining types there is a fixed order between kinds.
impl Ord for HashableValue {
    fn cmp(&self, other: &HashableValue) -> Ordering {
        use self::HashableValue::*;
        match *self {
            None => match *other {
                None => Ordering::Equal,
                _    => Ordering::Less
            },
            Bool(b) => match *other {
                None         => Ordering::Greater,
                Bool(b2)     => b.cmp(&b2),
                I64(i2)      => (b as i64).cmp(&i2),
                Int(ref bi)  => BigInt::from(b as i64).cmp(bi),
                F64(f)       => float_ord(b as i64 as f64, f),
                _            => Ordering::Less
            },
            I64(i) => match *other {
                None         => Ordering::Greater,
                Bool(b)      => i.cmp(&(b as i64)),
                I64(i2)      => i.cmp(&i2),
                Int(ref bi)  => BigInt::from(i).cmp(bi),
                F64(f)       => float_ord(i as f64, f),
                _            => Ordering::Less
            },
            Int(ref bi) => match *other {
                None         => Ordering::Greater,
                Bool(b)      => bi.cmp(&BigInt::from(b as i64)),
                I64(i)       => bi.cmp(&BigInt::from(i)),
                Int(ref bi2) => bi.cmp(bi2),
                F64(f)       => float_bigint_ord(bi, f),
                _            => Ordering::Less
            },
            F64(f) => match *other {
                None         => Ordering::Greater,
                Bool(b)      => float_ord(f, b as i64 as f64),
                I64(i)       => float_ord(f, i as f64),
                Int(ref bi)  => float_bigint_ord(bi, f).reverse(),
                F64(f2)      => float_ord(f, f2),
                _            => Ordering::Less
            },
            Bytes(ref bs) => match *other {
                String(_) |
                Tuple(_)       => Ordering::Less,
                Bytes(ref bs2) => bs.cmp(bs2),
                _              => Ordering::Greater
            },
            String(ref s) => match *other {
                Tuple(_)       => Ordering::Less,
                String(ref s2) => s.cmp(s2),
                _              => Ordering::Greater
            },
            Tuple(ref t) => match *other {
                Tuple(ref t2) => t.cmp(t2),
                _             => Ordering::Greater
            },
        }
    }
}

/// A "reasonable" total ordering for floats.
fn float_ord(f: f64, g: f64) -> Ordering {
    match f.partial_cmp(&g) {
        Some(o) => o,
        None    => Ordering::Less
    }
}

/// Ordering between big integers and floats.
fn float_bigint_ord(bi: &BigInt, g: f64) -> Ordering {
    match bi.to_f64() {
        Some(f) => float_ord(f, g),
        None => if bi.is_positive() { Ordering::Greater } else { Ordering::Less }
    }
}
