// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Stack-machine serialization for arbitrary object graphs.
//!
//! # Stream format
//!
//! A stream is a program for a small stack machine: a sequence of
//! single-byte opcodes, each followed by its operands, ending with a STOP
//! whose popped top of stack is the result.  The writer ([`Pickler`]) walks
//! a value graph depth first and emits such a program; the reader
//! ([`Unpickler`]) executes it.  The two interoperate only through the byte
//! stream.
//!
//! Binary mode (the default) uses fixed-width little-endian operands and
//! starts with a protocol marker; text mode uses decimal and escaped line
//! operands and is self-delimiting without a marker.  The reader accepts
//! both without being told which to expect.
//!
//! # Supported values
//!
//! The engine owns a closed graph type, [`Value`]:
//!
//! * None
//! * Booleans (Rust `bool`)
//! * Integers (Rust `i64` or bigints from num)
//! * Floats (Rust `f64`)
//! * Byte strings and unicode strings
//! * Tuples, lists, and dictionaries (keyed by [`HashableValue`])
//!
//! Shared and cyclic structure is preserved: aggregates are reference
//! counted, the writer deduplicates them by identity through its memo, and
//! the reader reconstructs the same sharing.  A list that contains itself
//! round-trips.
//!
//! Everything else enters the stream through the reduce protocol: a
//! [`Reduce`] implementation describes a value as constructor name, args
//! and optional state, and a [`ClassRegistry`] resolves names back to
//! constructors when reading.  Reconstruction only runs constructors that
//! are explicitly marked safe; an unmarked name is refused before any code
//! runs.  Out-of-band values can bypass the stream entirely via the
//! persistent-id/persistent-load hook pair.
//!
//! *Note on enums:* Enum variants are serialized as tuples `(name, [data])`
//! (or a 1-tuple for unit variants).  On deserialization, the tuple form as
//! well as the string/mapping form is accepted.
//!
//! *Note on bytes objects:* `Vec<u8>`, `[u8; N]` and `&[u8]` are treated as
//! sequences by serde's data model.  To (de)serialize them as byte strings,
//! use the wrappers from the `serde_bytes` crate.
//!
//! # Exported API
//!
//! The library exports generic serde (de)serializing functions `to_*` and
//! `from_*`.  It also exports functions that produce or take the `Value`
//! graph type directly, called `value_to_*` and `value_from_*`; only these
//! preserve sharing, cycles, and the full integer range.

pub use self::ser::{
    Pickler,
    PickleOptions,
    to_writer,
    to_vec,
    value_to_writer,
    value_to_vec,
};

pub use self::de::{
    Unpickler,
    UnpickleOptions,
    from_reader,
    from_slice,
    from_iter,
    value_from_reader,
    value_from_slice,
    value_from_iter,
};

pub use self::value::{
    Value,
    HashableValue,
    to_value,
    from_value,
};

pub use self::object::{
    ClassDef,
    ClassRegistry,
    Object,
    Reduce,
    Reduction,
};

pub use self::error::{CorruptKind, EncodingError, Error, Result};

pub use self::consts::HIGHEST_PROTOCOL;

pub mod ser;
pub mod de;
pub mod error;
pub mod value;
pub mod object;
mod codec;
mod consts;
mod memo;
mod value_impls;

#[cfg(test)]
#[path = "../test/mod.rs"]
mod test;
