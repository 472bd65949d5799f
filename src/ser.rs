// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The writer: a depth-first walk of the value graph that emits opcodes.
//!
//! For every value the writer first consults the persistent-id hook, then
//! the memo, then dispatches on kind.  Aggregates with identity enter the
//! memo immediately after their construction phase (empty-container
//! opcode, or REDUCE) and before their contents, so contents are free to
//! point back at them; that is the entire cycle story.  Tuples are the
//! exception: their elements come first, and if saving the elements drags
//! the tuple itself into the memo through some mutable container, the
//! already-written elements are discarded with POP/POP_MARK and replaced
//! by a memo GET.

use std::io;
use std::rc::Rc;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use num_bigint::BigInt;
use serde::ser::Serialize;

use crate::codec;
use crate::consts::*;
use crate::error::{EncodingError, Error, Result};
use crate::memo::PicklerMemo;
use crate::object::{Object, Reduce};
use crate::value::{to_value, HashableValue, Value};

/// Options for the writer.
///
/// The default is binary mode with a fresh memo per `dump`.
#[derive(Clone, Debug)]
pub struct PickleOptions {
    binary: bool,
    keep_memo: bool,
}

impl PickleOptions {
    pub fn new() -> PickleOptions {
        PickleOptions { binary: true, keep_memo: false }
    }

    /// Use the text-mode scalar and memo forms instead of the fixed-width
    /// binary ones.  Structural opcodes are the same in both modes.
    pub fn text(mut self) -> Self {
        self.binary = false;
        self
    }

    /// Preserve the memo across `dump` calls on one `Pickler`, so related
    /// graphs dumped in sequence can share back references.
    pub fn keep_memo(mut self) -> Self {
        self.keep_memo = true;
        self
    }
}

impl Default for PickleOptions {
    fn default() -> Self {
        PickleOptions::new()
    }
}

type PersistentIdFn = Box<dyn FnMut(&Value) -> Option<String>>;

/// A structure for serializing value graphs into a byte stream.
///
/// Not for concurrent use: the memo is per-instance mutable state.  Errors
/// leave the instance in an unwound state; discard it.
pub struct Pickler<W> {
    writer: W,
    binary: bool,
    keep_memo: bool,
    memo: PicklerMemo,
    persistent_id: Option<PersistentIdFn>,
}

impl<W: io::Write> Pickler<W> {
    pub fn new(writer: W, options: PickleOptions) -> Pickler<W> {
        Pickler {
            writer,
            binary: options.binary,
            keep_memo: options.keep_memo,
            memo: PicklerMemo::new(),
            persistent_id: None,
        }
    }

    /// Install the persistent-id hook.  A value for which the hook returns
    /// a token is written as an out-of-band reference instead of being
    /// encoded; the reader's persistent-load hook must resolve the token.
    pub fn with_persistent_id<F>(mut self, f: F) -> Self
        where F: FnMut(&Value) -> Option<String> + 'static
    {
        self.persistent_id = Some(Box::new(f));
        self
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write one complete stream for `value`.
    pub fn dump(&mut self, value: &Value) -> Result<()> {
        if !self.keep_memo {
            self.memo.clear();
        }
        if self.binary {
            self.writer.write_all(&[PROTO, HIGHEST_PROTOCOL])?;
        }
        self.save(value)?;
        self.write_opcode(STOP)
    }

    #[inline]
    fn write_opcode(&mut self, opcode: u8) -> Result<()> {
        self.writer.write_all(&[opcode]).map_err(From::from)
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.writer.write_all(line)?;
        self.writer.write_all(b"\n").map_err(From::from)
    }

    fn save(&mut self, value: &Value) -> Result<()> {
        let token = match self.persistent_id {
            Some(ref mut hook) => hook(value),
            None => None,
        };
        if let Some(token) = token {
            return self.save_persistent(&token);
        }
        if let Some(slot) = self.memo.lookup(value) {
            return self.write_get(slot);
        }
        match *value {
            Value::None => self.write_opcode(NONE),
            Value::Bool(b) => self.save_bool(b),
            Value::I64(i) => self.save_i64(i),
            Value::Int(ref i) => self.save_bigint(i),
            Value::F64(f) => self.save_f64(f),
            Value::Bytes(ref b) => self.save_bytes(b),
            Value::String(ref s) => self.save_str(s),
            Value::Tuple(ref items) => self.save_tuple(value, items),
            Value::List(ref cell) => {
                self.write_opcode(EMPTY_LIST)?;
                self.memoize(value)?;
                self.batch_appends(&cell.borrow())
            }
            Value::Dict(ref cell) => {
                self.write_opcode(EMPTY_DICT)?;
                self.memoize(value)?;
                let dict = cell.borrow();
                let entries: Vec<_> = dict.iter().collect();
                self.batch_setitems(&entries)
            }
            Value::Global(ref def) => {
                self.write_global(def.module(), def.name())?;
                self.memoize(value)
            }
            Value::Object(ref cell) => self.save_object(value, &cell.borrow()),
            Value::Reducible(ref red) => self.save_reducible(value, red),
        }
    }

    fn save_persistent(&mut self, token: &str) -> Result<()> {
        if self.binary {
            self.save_str(token)?;
            self.write_opcode(BINPERSID)
        } else {
            // The token shares a line with nothing else, so it must not be
            // able to break the line format.
            if !token.bytes().all(|b| (0x20..0x7f).contains(&b)) {
                return Err(Error::Encoding(EncodingError::InvalidPersistentId));
            }
            self.write_opcode(PERSID)?;
            self.write_line(token.as_bytes())
        }
    }

    fn save_bool(&mut self, b: bool) -> Result<()> {
        if self.binary {
            self.write_opcode(if b { NEWTRUE } else { NEWFALSE })
        } else {
            self.write_opcode(INT)?;
            self.write_line(if b { b"01" } else { b"00" })
        }
    }

    fn save_i64(&mut self, i: i64) -> Result<()> {
        if !self.binary {
            self.write_opcode(INT)?;
            return self.write_line(i.to_string().as_bytes());
        }
        if 0 <= i && i < 0x100 {
            self.write_opcode(BININT1)?;
            self.writer.write_u8(i as u8).map_err(From::from)
        } else if 0 <= i && i < 0x1_0000 {
            self.write_opcode(BININT2)?;
            self.writer.write_u16::<LittleEndian>(i as u16).map_err(From::from)
        } else if -0x8000_0000 <= i && i < 0x8000_0000 {
            self.write_opcode(BININT)?;
            self.writer.write_i32::<LittleEndian>(i as i32).map_err(From::from)
        } else {
            self.save_bigint(&BigInt::from(i))
        }
    }

    fn save_bigint(&mut self, i: &BigInt) -> Result<()> {
        if !self.binary {
            self.write_opcode(LONG)?;
            return self.write_line(format!("{}L", i).as_bytes());
        }
        let bytes = codec::encode_long(i);
        if bytes.len() < 0x100 {
            self.write_opcode(LONG1)?;
            self.writer.write_u8(bytes.len() as u8)?;
        } else {
            self.write_opcode(LONG4)?;
            self.writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
        }
        self.writer.write_all(&bytes).map_err(From::from)
    }

    fn save_f64(&mut self, f: f64) -> Result<()> {
        if self.binary {
            self.write_opcode(BINFLOAT)?;
            // Yes, this one is big endian.
            self.writer.write_f64::<BigEndian>(f).map_err(From::from)
        } else {
            self.write_opcode(FLOAT)?;
            self.write_line(f.to_string().as_bytes())
        }
    }

    fn save_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.binary {
            if bytes.len() < 0x100 {
                self.write_opcode(SHORT_BINBYTES)?;
                self.writer.write_u8(bytes.len() as u8)?;
            } else {
                self.write_opcode(BINBYTES)?;
                self.writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
            }
            self.writer.write_all(bytes).map_err(From::from)
        } else {
            self.write_opcode(STRING)?;
            let mut line = Vec::with_capacity(bytes.len() + 2);
            line.push(b'\'');
            line.extend(codec::escape_bytes(bytes));
            line.push(b'\'');
            self.write_line(&line)
        }
    }

    fn save_str(&mut self, s: &str) -> Result<()> {
        if self.binary {
            if s.len() < 0x100 {
                self.write_opcode(SHORT_BINUNICODE)?;
                self.writer.write_u8(s.len() as u8)?;
            } else {
                self.write_opcode(BINUNICODE)?;
                self.writer.write_u32::<LittleEndian>(s.len() as u32)?;
            }
            self.writer.write_all(s.as_bytes()).map_err(From::from)
        } else {
            self.write_opcode(UNICODE)?;
            let line = codec::escape_string(s);
            self.write_line(&line)
        }
    }

    fn save_tuple(&mut self, value: &Value, items: &[Value]) -> Result<()> {
        if items.is_empty() {
            // Structural special case: immutable, commonly repeated, and
            // impossible to self-reference.  Never memoized.
            return self.write_opcode(EMPTY_TUPLE);
        }
        if items.len() <= 3 {
            for item in items {
                self.save(item)?;
            }
            if let Some(slot) = self.memo.lookup(value) {
                // Saving the elements closed a cycle through this tuple;
                // drop the copies and reference the memoized one.
                for _ in 0..items.len() {
                    self.write_opcode(POP)?;
                }
                return self.write_get(slot);
            }
            let opcode = [TUPLE1, TUPLE2, TUPLE3][items.len() - 1];
            self.write_opcode(opcode)?;
            self.memoize(value)
        } else {
            self.write_opcode(MARK)?;
            for item in items {
                self.save(item)?;
            }
            if let Some(slot) = self.memo.lookup(value) {
                self.write_opcode(POP_MARK)?;
                return self.write_get(slot);
            }
            self.write_opcode(TUPLE)?;
            self.memoize(value)
        }
    }

    fn batch_appends(&mut self, items: &[Value]) -> Result<()> {
        // Chunked like the classic protocol, to bound the stack depth the
        // reader needs.
        for chunk in items.chunks(1000) {
            if chunk.len() == 1 {
                self.save(&chunk[0])?;
                self.write_opcode(APPEND)?;
            } else {
                self.write_opcode(MARK)?;
                for item in chunk {
                    self.save(item)?;
                }
                self.write_opcode(APPENDS)?;
            }
        }
        Ok(())
    }

    fn batch_setitems(&mut self, entries: &[(&HashableValue, &Value)]) -> Result<()> {
        for chunk in entries.chunks(1000) {
            if chunk.len() == 1 {
                self.save_hashable(chunk[0].0)?;
                self.save(chunk[0].1)?;
                self.write_opcode(SETITEM)?;
            } else {
                self.write_opcode(MARK)?;
                for (key, value) in chunk {
                    self.save_hashable(key)?;
                    self.save(value)?;
                }
                self.write_opcode(SETITEMS)?;
            }
        }
        Ok(())
    }

    fn save_hashable(&mut self, value: &HashableValue) -> Result<()> {
        match *value {
            HashableValue::None => self.write_opcode(NONE),
            HashableValue::Bool(b) => self.save_bool(b),
            HashableValue::I64(i) => self.save_i64(i),
            HashableValue::Int(ref i) => self.save_bigint(i),
            HashableValue::F64(f) => self.save_f64(f),
            HashableValue::Bytes(ref b) => self.save_bytes(b),
            HashableValue::String(ref s) => self.save_str(s),
            HashableValue::Tuple(ref items) => {
                // Keys are immutable trees; no memo, no cycle rescue.
                if items.is_empty() {
                    return self.write_opcode(EMPTY_TUPLE);
                }
                if items.len() <= 3 {
                    for item in items {
                        self.save_hashable(item)?;
                    }
                    self.write_opcode([TUPLE1, TUPLE2, TUPLE3][items.len() - 1])
                } else {
                    self.write_opcode(MARK)?;
                    for item in items {
                        self.save_hashable(item)?;
                    }
                    self.write_opcode(TUPLE)
                }
            }
        }
    }

    fn write_global(&mut self, module: &str, name: &str) -> Result<()> {
        if module.is_empty() || name.is_empty()
            || module.contains('\n') || name.contains('\n')
        {
            return Err(Error::Encoding(EncodingError::MalformedReduction(
                "constructor reference must be two non-empty lines")));
        }
        self.write_opcode(GLOBAL)?;
        self.write_line(module.as_bytes())?;
        self.write_line(name.as_bytes())
    }

    /// The argument tuples of REDUCE are built fresh from a reduction and
    /// have no stable identity, so they are written structurally.
    fn write_tuple_body(&mut self, items: &[Value]) -> Result<()> {
        if items.is_empty() {
            return self.write_opcode(EMPTY_TUPLE);
        }
        if items.len() <= 3 {
            for item in items {
                self.save(item)?;
            }
            self.write_opcode([TUPLE1, TUPLE2, TUPLE3][items.len() - 1])
        } else {
            self.write_opcode(MARK)?;
            for item in items {
                self.save(item)?;
            }
            self.write_opcode(TUPLE)
        }
    }

    fn save_object(&mut self, value: &Value, obj: &Object) -> Result<()> {
        self.save(&Value::Global(obj.class.clone()))?;
        self.write_tuple_body(&obj.args)?;
        self.write_opcode(REDUCE)?;
        // From here on the object is referenceable, so the state below may
        // legally contain it.
        self.memoize(value)?;
        if !obj.attrs.is_empty() {
            self.write_opcode(EMPTY_DICT)?;
            self.write_opcode(MARK)?;
            for (key, attr) in &obj.attrs {
                self.save_str(key)?;
                self.save(attr)?;
            }
            self.write_opcode(SETITEMS)?;
            self.write_opcode(BUILD)?;
        }
        Ok(())
    }

    fn save_reducible(&mut self, value: &Value, red: &Rc<dyn Reduce>) -> Result<()> {
        let reduction = red.reduce()?;
        self.write_global(&reduction.module, &reduction.name)?;
        self.write_tuple_body(&reduction.args)?;
        self.write_opcode(REDUCE)?;
        self.memoize(value)?;
        if let Some(ref state) = reduction.state {
            self.save(state)?;
            self.write_opcode(BUILD)?;
        }
        Ok(())
    }

    fn write_get(&mut self, slot: u32) -> Result<()> {
        if !self.binary {
            self.write_opcode(GET)?;
            return self.write_line(slot.to_string().as_bytes());
        }
        if slot < 0x100 {
            self.write_opcode(BINGET)?;
            self.writer.write_u8(slot as u8).map_err(From::from)
        } else {
            self.write_opcode(LONG_BINGET)?;
            self.writer.write_u32::<LittleEndian>(slot).map_err(From::from)
        }
    }

    fn memoize(&mut self, value: &Value) -> Result<()> {
        let slot = match self.memo.record(value) {
            Some(slot) => slot,
            None => return Ok(()),
        };
        if !self.binary {
            self.write_opcode(PUT)?;
            return self.write_line(slot.to_string().as_bytes());
        }
        if slot < 0x100 {
            self.write_opcode(BINPUT)?;
            self.writer.write_u8(slot as u8).map_err(From::from)
        } else {
            self.write_opcode(LONG_BINPUT)?;
            self.writer.write_u32::<LittleEndian>(slot).map_err(From::from)
        }
    }
}

/// Encode the value graph into a stream.
pub fn value_to_writer<W: io::Write>(writer: &mut W, value: &Value,
                                     options: PickleOptions) -> Result<()> {
    Pickler::new(writer, options).dump(value)
}

/// Encode the value graph into a `Vec<u8>` buffer.
#[inline]
pub fn value_to_vec(value: &Value, options: PickleOptions) -> Result<Vec<u8>> {
    let mut writer = Vec::with_capacity(128);
    value_to_writer(&mut writer, value, options)?;
    Ok(writer)
}

/// Encode any serde-serializable value into a stream.
#[inline]
pub fn to_writer<W: io::Write, T: Serialize>(writer: &mut W, value: &T,
                                             options: PickleOptions) -> Result<()> {
    value_to_writer(writer, &to_value(value)?, options)
}

/// Encode any serde-serializable value into a `Vec<u8>` buffer.
#[inline]
pub fn to_vec<T: Serialize>(value: &T, options: PickleOptions) -> Result<Vec<u8>> {
    let mut writer = Vec::with_capacity(128);
    to_writer(&mut writer, value, options)?;
    Ok(writer)
}
