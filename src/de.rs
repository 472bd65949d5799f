// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The reader: one loop over the opcode stream, driving an operand stack,
//! a mark stack of indices into it, and the memo.
//!
//! The reader accepts the full opcode catalogue regardless of which mode
//! produced the stream.  Every failure is fatal to the current `load` and
//! reported with the stream offset at which it was detected; values below
//! the topmost mark are not reachable by any opcode, so a malformed stream
//! cannot smuggle operands across a mark boundary.
//!
//! A stream can only cause code to run through GLOBAL and REDUCE, and both
//! are gated: GLOBAL resolves against the registry (empty by default), and
//! REDUCE additionally requires the resolved class to carry the
//! safe-for-unpickling marker.  The gate is best-effort, not a sandbox.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Read};
use std::rc::Rc;
use std::str::{self, FromStr};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use iter_read::IterRead;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::de::DeserializeOwned;

use crate::codec;
use crate::consts::*;
use crate::error::{CorruptKind, Error, Result};
use crate::memo::UnpicklerMemo;
use crate::object::ClassRegistry;
use crate::value::{from_value, HashableValue, Value};

type PersistentLoadFn = Box<dyn FnMut(&str) -> Result<Value>>;

/// Options for the reader.
///
/// The default resolves no constructor names and has no persistent-load
/// hook, so by default a stream can only produce plain data.
pub struct UnpickleOptions {
    registry: ClassRegistry,
    persistent_load: Option<PersistentLoadFn>,
    keep_memo: bool,
}

impl UnpickleOptions {
    pub fn new() -> UnpickleOptions {
        UnpickleOptions {
            registry: ClassRegistry::new(),
            persistent_load: None,
            keep_memo: false,
        }
    }

    /// Resolve GLOBAL references against `registry`.
    pub fn with_registry(mut self, registry: ClassRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Install the persistent-load hook consumed by PERSID/BINPERSID.
    /// Without one, any persistent reference is a corrupt-stream error.
    pub fn with_persistent_load<F>(mut self, f: F) -> Self
        where F: FnMut(&str) -> Result<Value> + 'static
    {
        self.persistent_load = Some(Box::new(f));
        self
    }

    /// Preserve the memo across `load` calls on one `Unpickler`, matching
    /// a writer that keeps its memo across dumps.
    pub fn keep_memo(mut self) -> Self {
        self.keep_memo = true;
        self
    }
}

impl Default for UnpickleOptions {
    fn default() -> Self {
        UnpickleOptions::new()
    }
}

/// A structure for reconstructing value graphs from a byte stream.
///
/// Like the writer, not for concurrent use, and an errored instance is in
/// an unwound state and should be discarded.
pub struct Unpickler<R: Read> {
    rdr: io::Bytes<R>,
    pos: usize,
    value_stack: Vec<Value>,
    mark_stack: Vec<usize>,
    memo: UnpicklerMemo,
    keep_memo: bool,
    registry: ClassRegistry,
    persistent_load: Option<PersistentLoadFn>,
}

impl<R: Read> Unpickler<R> {
    pub fn new(rdr: R, options: UnpickleOptions) -> Unpickler<R> {
        Unpickler {
            rdr: rdr.bytes(),
            pos: 0,
            value_stack: Vec::new(),
            mark_stack: Vec::new(),
            memo: UnpicklerMemo::new(),
            keep_memo: options.keep_memo,
            registry: options.registry,
            persistent_load: options.persistent_load,
        }
    }

    /// Read one complete stream and return the reconstructed value.
    pub fn load(&mut self) -> Result<Value> {
        if !self.keep_memo {
            self.memo.clear();
        }
        self.value_stack.clear();
        self.mark_stack.clear();
        loop {
            let opcode = match self.read_byte()? {
                Some(opcode) => opcode,
                None => return Err(self.truncated()),
            };
            match opcode {
                PROTO => {
                    let version = self.read_u8()?;
                    if version > HIGHEST_PROTOCOL {
                        return Err(self.corrupt(CorruptKind::UnsupportedProtocol(version)));
                    }
                }
                STOP => return self.pop(),

                // Stack manipulation.
                MARK => self.mark_stack.push(self.value_stack.len()),
                POP => {
                    if self.mark_stack.last() == Some(&self.value_stack.len()) {
                        self.mark_stack.pop();
                    } else {
                        self.pop()?;
                    }
                }
                POP_MARK => {
                    let mark = self.pop_mark()?;
                    self.value_stack.truncate(mark);
                }
                DUP => {
                    let top = self.top()?.clone();
                    self.value_stack.push(top);
                }

                // Scalars.
                NONE => self.value_stack.push(Value::None),
                NEWTRUE => self.value_stack.push(Value::Bool(true)),
                NEWFALSE => self.value_stack.push(Value::Bool(false)),
                INT => {
                    let line = self.read_line()?;
                    let value = if line == b"00" {
                        Value::Bool(false)
                    } else if line == b"01" {
                        Value::Bool(true)
                    } else {
                        Value::I64(self.parse_decimal(line)?)
                    };
                    self.value_stack.push(value);
                }
                BININT1 => {
                    let n = self.read_u8()?;
                    self.value_stack.push(Value::I64(n as i64));
                }
                BININT2 => {
                    let buf = self.read_fixed(2)?;
                    self.value_stack.push(Value::I64(LittleEndian::read_u16(&buf) as i64));
                }
                BININT => {
                    let buf = self.read_fixed(4)?;
                    self.value_stack.push(Value::I64(LittleEndian::read_i32(&buf) as i64));
                }
                LONG => {
                    let mut line = self.read_line()?;
                    if line.last() == Some(&b'L') {
                        line.pop();
                    }
                    let big: BigInt = self.parse_decimal(line)?;
                    self.value_stack.push(fit_bigint(big));
                }
                LONG1 => {
                    let n = self.read_u8()? as usize;
                    let bytes = self.read_fixed(n)?;
                    self.value_stack.push(fit_bigint(codec::decode_long(&bytes)));
                }
                LONG4 => {
                    let n = self.read_i32_length()?;
                    let bytes = self.read_fixed(n)?;
                    self.value_stack.push(fit_bigint(codec::decode_long(&bytes)));
                }
                FLOAT => {
                    let line = self.read_line()?;
                    let f: f64 = self.parse_decimal(line)?;
                    self.value_stack.push(Value::F64(f));
                }
                BINFLOAT => {
                    let buf = self.read_fixed(8)?;
                    // Unlike the integer operands, this one is big endian.
                    self.value_stack.push(Value::F64(BigEndian::read_f64(&buf)));
                }
                STRING => {
                    let line = self.read_line()?;
                    let unquoted = match &line[..] {
                        [b'\'', inner @ .., b'\''] |
                        [b'"', inner @ .., b'"'] => codec::unescape_bytes(inner),
                        _ => None,
                    };
                    match unquoted {
                        Some(bytes) => self.value_stack.push(Value::Bytes(bytes)),
                        None => return Err(self.corrupt(CorruptKind::InvalidLiteral(line))),
                    }
                }
                SHORT_BINBYTES => {
                    let n = self.read_u8()? as usize;
                    let bytes = self.read_fixed(n)?;
                    self.value_stack.push(Value::Bytes(bytes));
                }
                BINBYTES => {
                    let n = self.read_u32()? as usize;
                    let bytes = self.read_fixed(n)?;
                    self.value_stack.push(Value::Bytes(bytes));
                }
                UNICODE => {
                    let line = self.read_line()?;
                    match codec::unescape_string(&line) {
                        Some(s) => self.value_stack.push(Value::String(s)),
                        None => return Err(self.corrupt(CorruptKind::InvalidLiteral(line))),
                    }
                }
                SHORT_BINUNICODE => {
                    let n = self.read_u8()? as usize;
                    let s = self.read_utf8(n)?;
                    self.value_stack.push(Value::String(s));
                }
                BINUNICODE => {
                    let n = self.read_u32()? as usize;
                    let s = self.read_utf8(n)?;
                    self.value_stack.push(Value::String(s));
                }

                // Aggregates.
                EMPTY_TUPLE => self.value_stack.push(Value::tuple(vec![])),
                TUPLE1 => {
                    let a = self.pop()?;
                    self.value_stack.push(Value::tuple(vec![a]));
                }
                TUPLE2 => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.value_stack.push(Value::tuple(vec![a, b]));
                }
                TUPLE3 => {
                    let c = self.pop()?;
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.value_stack.push(Value::tuple(vec![a, b, c]));
                }
                TUPLE => {
                    let items = self.pop_to_mark()?;
                    self.value_stack.push(Value::tuple(items));
                }
                EMPTY_LIST => self.value_stack.push(Value::list(vec![])),
                LIST => {
                    let items = self.pop_to_mark()?;
                    self.value_stack.push(Value::list(items));
                }
                EMPTY_DICT => self.value_stack.push(Value::dict(BTreeMap::new())),
                DICT => {
                    let items = self.pop_to_mark()?;
                    let map = self.make_dict(items)?;
                    self.value_stack.push(Value::dict(map));
                }
                APPEND => {
                    let value = self.pop()?;
                    self.top_list()?.borrow_mut().push(value);
                }
                APPENDS => {
                    let items = self.pop_to_mark()?;
                    self.top_list()?.borrow_mut().extend(items);
                }
                SETITEM => {
                    let value = self.pop()?;
                    let key = self.pop()?;
                    let dict = self.top_dict()?;
                    let key = match key.into_hashable() {
                        Ok(key) => key,
                        Err(_) => return Err(self.corrupt(CorruptKind::NotHashable)),
                    };
                    dict.borrow_mut().insert(key, value);
                }
                SETITEMS => {
                    let items = self.pop_to_mark()?;
                    let dict = self.top_dict()?;
                    let entries = self.make_dict(items)?;
                    dict.borrow_mut().extend(entries);
                }

                // Memo.
                GET => {
                    let line = self.read_line()?;
                    let slot = self.parse_decimal(line)?;
                    self.push_memo(slot)?;
                }
                BINGET => {
                    let slot = self.read_u8()? as u32;
                    self.push_memo(slot)?;
                }
                LONG_BINGET => {
                    let slot = self.read_u32()?;
                    self.push_memo(slot)?;
                }
                PUT => {
                    let line = self.read_line()?;
                    let slot = self.parse_decimal(line)?;
                    self.memoize(slot)?;
                }
                BINPUT => {
                    let slot = self.read_u8()? as u32;
                    self.memoize(slot)?;
                }
                LONG_BINPUT => {
                    let slot = self.read_u32()?;
                    self.memoize(slot)?;
                }

                // Constructors and state.
                GLOBAL => {
                    let module = self.read_utf8_line()?;
                    let name = self.read_utf8_line()?;
                    match self.registry.resolve(&module, &name) {
                        Some(def) => self.value_stack.push(Value::Global(def)),
                        None => return Err(Error::UnresolvedReference {
                            module, name, offset: self.pos,
                        }),
                    }
                }
                REDUCE => self.execute_reduce()?,
                BUILD => self.execute_build()?,
                PERSID => {
                    let line = self.read_line()?;
                    let token = match String::from_utf8(line) {
                        Ok(token) => token,
                        Err(_) => return Err(self.corrupt(CorruptKind::StringNotUtf8)),
                    };
                    let value = self.call_persistent_load(&token)?;
                    self.value_stack.push(value);
                }
                BINPERSID => {
                    let token = match self.pop()? {
                        Value::String(s) => s,
                        other => return Err(self.corrupt(CorruptKind::StackTop {
                            expected: "str", found: other.kind_name(),
                        })),
                    };
                    let value = self.call_persistent_load(&token)?;
                    self.value_stack.push(value);
                }

                other => return Err(self.corrupt(CorruptKind::UnknownOpcode(other))),
            }
        }
    }

    /// Assert that the stream is exhausted.
    pub fn end(&mut self) -> Result<()> {
        match self.read_byte()? {
            Some(_) => Err(self.corrupt(CorruptKind::TrailingBytes)),
            None => Ok(()),
        }
    }

    fn execute_reduce(&mut self) -> Result<()> {
        let args = match self.pop()? {
            Value::Tuple(rc) => Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone()),
            other => return Err(self.corrupt(CorruptKind::StackTop {
                expected: "tuple", found: other.kind_name(),
            })),
        };
        let def = match self.pop()? {
            Value::Global(def) => def,
            other => return Err(self.corrupt(CorruptKind::StackTop {
                expected: "global", found: other.kind_name(),
            })),
        };
        if !def.is_safe_for_unpickling() {
            return Err(Error::UnsafeReduction {
                module: def.module().to_owned(),
                name: def.name().to_owned(),
                offset: self.pos,
            });
        }
        let value = match def.instantiate(args) {
            Ok(value) => value,
            Err(why) => return Err(self.corrupt(CorruptKind::ConstructorFailed(why))),
        };
        self.value_stack.push(value);
        Ok(())
    }

    fn execute_build(&mut self) -> Result<()> {
        let state = self.pop()?;
        let cell = match *self.top()? {
            Value::Object(ref cell) => cell.clone(),
            ref other => return Err(Error::StateApplication {
                reason: format!("cannot apply state to {}", other.kind_name()),
                offset: self.pos,
            }),
        };
        let class = cell.borrow().class.clone();
        if let Some(hook) = class.state_hook() {
            return hook(&mut cell.borrow_mut(), state).map_err(|reason| {
                Error::StateApplication { reason, offset: self.pos }
            });
        }
        // Default: a dict state merges into the attribute namespace.  The
        // state dict may be shared, so it is copied, not drained.
        let dict = match state {
            Value::Dict(dict) => dict,
            other => return Err(Error::StateApplication {
                reason: format!("cannot apply {} state", other.kind_name()),
                offset: self.pos,
            }),
        };
        let mut obj = cell.borrow_mut();
        for (key, value) in dict.borrow().iter() {
            match *key {
                HashableValue::String(ref name) => {
                    obj.attrs.insert(name.clone(), value.clone());
                }
                _ => return Err(Error::StateApplication {
                    reason: "state key is not a string".into(),
                    offset: self.pos,
                }),
            }
        }
        Ok(())
    }

    fn call_persistent_load(&mut self, token: &str) -> Result<Value> {
        let offset = self.pos;
        match self.persistent_load {
            Some(ref mut hook) => hook(token),
            None => Err(Error::Corrupt { kind: CorruptKind::NoPersistentLoad, offset }),
        }
    }

    fn make_dict(&self, items: Vec<Value>) -> Result<BTreeMap<HashableValue, Value>> {
        let mut map = BTreeMap::new();
        let mut it = items.into_iter();
        while let Some(key) = it.next() {
            let value = match it.next() {
                Some(value) => value,
                None => return Err(self.corrupt(CorruptKind::StackUnderflow)),
            };
            let key = match key.into_hashable() {
                Ok(key) => key,
                Err(_) => return Err(self.corrupt(CorruptKind::NotHashable)),
            };
            map.insert(key, value);
        }
        Ok(map)
    }

    fn push_memo(&mut self, slot: u32) -> Result<()> {
        let value = match self.memo.get(slot) {
            Some(value) => value.clone(),
            None => return Err(self.corrupt(CorruptKind::MissingMemo(slot))),
        };
        self.value_stack.push(value);
        Ok(())
    }

    fn memoize(&mut self, slot: u32) -> Result<()> {
        let value = self.top()?.clone();
        if !self.memo.put(slot, value) {
            return Err(self.corrupt(CorruptKind::MemoRebound(slot)));
        }
        Ok(())
    }

    // Values below the topmost mark are off limits until the mark is
    // consumed.
    fn mark_limit(&self) -> usize {
        self.mark_stack.last().copied().unwrap_or(0)
    }

    fn pop(&mut self) -> Result<Value> {
        if self.value_stack.len() <= self.mark_limit() {
            return Err(self.corrupt(CorruptKind::StackUnderflow));
        }
        match self.value_stack.pop() {
            Some(value) => Ok(value),
            None => Err(self.corrupt(CorruptKind::StackUnderflow)),
        }
    }

    fn top(&self) -> Result<&Value> {
        if self.value_stack.len() <= self.mark_limit() {
            return Err(self.corrupt(CorruptKind::StackUnderflow));
        }
        match self.value_stack.last() {
            Some(value) => Ok(value),
            None => Err(self.corrupt(CorruptKind::StackUnderflow)),
        }
    }

    fn top_list(&self) -> Result<Rc<RefCell<Vec<Value>>>> {
        match *self.top()? {
            Value::List(ref rc) => Ok(rc.clone()),
            ref other => Err(self.corrupt(CorruptKind::StackTop {
                expected: "list", found: other.kind_name(),
            })),
        }
    }

    fn top_dict(&self) -> Result<Rc<RefCell<BTreeMap<HashableValue, Value>>>> {
        match *self.top()? {
            Value::Dict(ref rc) => Ok(rc.clone()),
            ref other => Err(self.corrupt(CorruptKind::StackTop {
                expected: "dict", found: other.kind_name(),
            })),
        }
    }

    fn pop_mark(&mut self) -> Result<usize> {
        match self.mark_stack.pop() {
            Some(mark) => Ok(mark),
            None => Err(self.corrupt(CorruptKind::NoMark)),
        }
    }

    fn pop_to_mark(&mut self) -> Result<Vec<Value>> {
        let mark = self.pop_mark()?;
        Ok(self.value_stack.split_off(mark))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        match self.rdr.next() {
            Some(Ok(b)) => {
                self.pos += 1;
                Ok(Some(b))
            }
            Some(Err(err)) => Err(Error::Io(err)),
            None => Ok(None),
        }
    }

    fn read_u8(&mut self) -> Result<u8> {
        match self.read_byte()? {
            Some(b) => Ok(b),
            None => Err(self.truncated()),
        }
    }

    // The length prefix is attacker controlled, so the capacity hint is
    // capped and the vector grows only as bytes actually arrive.
    fn read_fixed(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n.min(4096));
        for _ in 0..n {
            match self.read_byte()? {
                Some(b) => buf.push(b),
                None => return Err(self.truncated()),
            }
        }
        Ok(buf)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let buf = self.read_fixed(4)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn read_i32_length(&mut self) -> Result<usize> {
        let buf = self.read_fixed(4)?;
        let n = LittleEndian::read_i32(&buf);
        if n < 0 {
            return Err(self.corrupt(CorruptKind::NegativeLength));
        }
        Ok(n as usize)
    }

    fn read_utf8(&mut self, n: usize) -> Result<String> {
        let buf = self.read_fixed(n)?;
        match String::from_utf8(buf) {
            Ok(s) => Ok(s),
            Err(_) => Err(self.corrupt(CorruptKind::StringNotUtf8)),
        }
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            match self.read_byte()? {
                Some(b'\n') => return Ok(line),
                Some(b) => line.push(b),
                None => return Err(self.truncated()),
            }
        }
    }

    fn read_utf8_line(&mut self) -> Result<String> {
        let line = self.read_line()?;
        match String::from_utf8(line) {
            Ok(s) => Ok(s),
            Err(_) => Err(self.corrupt(CorruptKind::StringNotUtf8)),
        }
    }

    fn parse_decimal<T: FromStr>(&self, line: Vec<u8>) -> Result<T> {
        match str::from_utf8(&line).ok().and_then(|s| s.parse().ok()) {
            Some(value) => Ok(value),
            None => Err(self.corrupt(CorruptKind::InvalidLiteral(line))),
        }
    }

    fn corrupt(&self, kind: CorruptKind) -> Error {
        Error::Corrupt { kind, offset: self.pos }
    }

    fn truncated(&self) -> Error {
        Error::Truncated { offset: self.pos }
    }
}

fn fit_bigint(big: BigInt) -> Value {
    match big.to_i64() {
        Some(i) => Value::I64(i),
        None => Value::Int(big),
    }
}

/// Decode one value graph from a stream, requiring the stream to contain
/// nothing else.
pub fn value_from_reader<R: Read>(rdr: R, options: UnpickleOptions) -> Result<Value> {
    let mut unpickler = Unpickler::new(rdr, options);
    let value = unpickler.load()?;
    unpickler.end()?;
    Ok(value)
}

/// Decode one value graph from a byte slice.
pub fn value_from_slice(data: &[u8], options: UnpickleOptions) -> Result<Value> {
    value_from_reader(data, options)
}

/// Decode one value graph from a fallible byte iterator.
pub fn value_from_iter<I>(iter: I, options: UnpickleOptions) -> Result<Value>
    where I: Iterator<Item = io::Result<u8>>
{
    value_from_reader(IterRead::new(iter), options)
}

/// Decode any serde-deserializable value from a stream.
pub fn from_reader<R: Read, T: DeserializeOwned>(rdr: R, options: UnpickleOptions) -> Result<T> {
    from_value(value_from_reader(rdr, options)?)
}

/// Decode any serde-deserializable value from a byte slice.
pub fn from_slice<T: DeserializeOwned>(data: &[u8], options: UnpickleOptions) -> Result<T> {
    from_value(value_from_slice(data, options)?)
}

/// Decode any serde-deserializable value from a fallible byte iterator.
pub fn from_iter<I, T>(iter: I, options: UnpickleOptions) -> Result<T>
    where I: Iterator<Item = io::Result<u8>>, T: DeserializeOwned
{
    from_value(value_from_iter(iter, options)?)
}
