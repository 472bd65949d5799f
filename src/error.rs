// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Error objects and codes.
//!
//! "Bad data", "unsupported object", and "refused for safety" are distinct
//! failure classes, so the top-level [`Error`] keeps one variant per class
//! instead of collapsing everything into a single message string.  Reader
//! errors carry the stream offset at which they were detected.

use std::error;
use std::fmt;
use std::io;
use std::result;
use serde::{de, ser};

/// Failures while writing a stream.
#[derive(Clone, Debug, PartialEq)]
pub enum EncodingError {
    /// The value's kind cannot be encoded and offers no reduction.
    Unpicklable(String),
    /// A `Reduce` implementation produced an unusable reduction.
    MalformedReduction(&'static str),
    /// The persistent-id hook returned a token the current mode cannot carry.
    InvalidPersistentId,
}

/// The concrete ways a stream can be corrupt.
#[derive(Clone, Debug, PartialEq)]
pub enum CorruptKind {
    /// Opcode byte outside the catalogue.
    UnknownOpcode(u8),
    /// PROTO declared a version newer than we understand.
    UnsupportedProtocol(u8),
    /// An opcode popped more values than the stack holds.
    StackUnderflow,
    /// A mark-consuming opcode found no mark.
    NoMark,
    /// Wrong kind of value on the stack for this opcode.
    StackTop { expected: &'static str, found: &'static str },
    /// Length prefix found negative.
    NegativeLength,
    /// String operand is not valid UTF-8.
    StringNotUtf8,
    /// Unparseable text-mode literal.
    InvalidLiteral(Vec<u8>),
    /// GET of a slot that was never PUT.
    MissingMemo(u32),
    /// PUT over an already-bound slot; the protocol has no rebind operation.
    MemoRebound(u32),
    /// Dict key or merge key is not hashable.
    NotHashable,
    /// Bytes remain after STOP.
    TrailingBytes,
    /// PERSID/BINPERSID encountered without a persistent-load hook.
    NoPersistentLoad,
    /// A registered constructor rejected its arguments.
    ConstructorFailed(String),
}

/// This type represents all possible errors that can occur when writing or
/// reading a stream.
#[derive(Debug)]
pub enum Error {
    /// Some IO error occurred on the sink or source.
    Io(io::Error),
    /// The writer could not encode a value.
    Encoding(EncodingError),
    /// EOF in the middle of an opcode or operand.
    Truncated { offset: usize },
    /// The stream is malformed.
    Corrupt { kind: CorruptKind, offset: usize },
    /// GLOBAL named a constructor the registry cannot resolve.
    UnresolvedReference { module: String, name: String, offset: usize },
    /// REDUCE named a constructor without the safe-for-unpickling marker.
    /// This is a security refusal, not a data error.
    UnsafeReduction { module: String, name: String, offset: usize },
    /// BUILD could not apply the popped state to the object below it.
    StateApplication { reason: String, offset: usize },
    /// Structure error while converting to or from Rust values via serde.
    Structure(String),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for EncodingError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EncodingError::Unpicklable(ref kind) =>
                write!(fmt, "cannot encode values of kind {}", kind),
            EncodingError::MalformedReduction(why) =>
                write!(fmt, "malformed reduction: {}", why),
            EncodingError::InvalidPersistentId =>
                write!(fmt, "persistent id not encodable in this mode"),
        }
    }
}

impl fmt::Display for CorruptKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CorruptKind::UnknownOpcode(op) =>
                write!(fmt, "unknown opcode byte 0x{:02x}", op),
            CorruptKind::UnsupportedProtocol(ver) =>
                write!(fmt, "unsupported protocol version {}", ver),
            CorruptKind::StackUnderflow => write!(fmt, "stack underflow"),
            CorruptKind::NoMark => write!(fmt, "no mark on the mark stack"),
            CorruptKind::StackTop { expected, found } =>
                write!(fmt, "invalid stack top, expected {}, got {}", expected, found),
            CorruptKind::NegativeLength => write!(fmt, "negative length prefix"),
            CorruptKind::StringNotUtf8 => write!(fmt, "string is not UTF-8 encoded"),
            CorruptKind::InvalidLiteral(ref l) =>
                write!(fmt, "literal is invalid: {}", String::from_utf8_lossy(l)),
            CorruptKind::MissingMemo(n) => write!(fmt, "missing memo slot {}", n),
            CorruptKind::MemoRebound(n) => write!(fmt, "memo slot {} bound twice", n),
            CorruptKind::NotHashable => write!(fmt, "dict key not hashable"),
            CorruptKind::TrailingBytes => write!(fmt, "trailing bytes found"),
            CorruptKind::NoPersistentLoad =>
                write!(fmt, "persistent reference without a persistent-load hook"),
            CorruptKind::ConstructorFailed(ref why) =>
                write!(fmt, "constructor failed: {}", why),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref error) => error.fmt(fmt),
            Error::Encoding(ref code) => write!(fmt, "encoding error: {}", code),
            Error::Truncated { offset } =>
                write!(fmt, "truncated stream at offset {}", offset),
            Error::Corrupt { ref kind, offset } =>
                write!(fmt, "corrupt stream at offset {}: {}", offset, kind),
            Error::UnresolvedReference { ref module, ref name, offset } =>
                write!(fmt, "unresolved reference {}.{} at offset {}", module, name, offset),
            Error::UnsafeReduction { ref module, ref name, offset } =>
                write!(fmt, "refusing unsafe reduction {}.{} at offset {}", module, name, offset),
            Error::StateApplication { ref reason, offset } =>
                write!(fmt, "cannot apply state at offset {}: {}", offset, reason),
            Error::Structure(ref msg) => fmt.write_str(msg),
        }
    }
}

impl error::Error for Error {}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Structure(msg.to_string())
    }
}

impl ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Structure(msg.to_string())
    }
}
