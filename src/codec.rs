// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Scalar codec helpers shared by the writer and the reader.
//!
//! Fixed-width integers and floats go through `byteorder` directly at the
//! call sites; this module holds the two wire forms that need real work:
//! the minimal two's-complement little-endian encoding used by the LONG1
//! and LONG4 opcodes, and the escaped line literals used by the text-mode
//! STRING and UNICODE opcodes.

use std::char;
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

/// Encode a big integer as minimal two's-complement little-endian bytes.
///
/// Zero encodes as the empty byte string.  A sign byte is appended whenever
/// the value's top bit would otherwise be misread.
pub fn encode_long(i: &BigInt) -> Vec<u8> {
    if i.is_zero() {
        return vec![];
    }
    if i.sign() == Sign::Minus {
        let n_bytes = i.to_bytes_le().1.len();
        let pos = i + (BigInt::from(1) << (n_bytes * 8));
        let mut bytes = pos.to_bytes_le().1;
        while bytes.len() < n_bytes {
            bytes.push(0x00);
        }
        if bytes.last().map_or(true, |b| *b < 0x80) {
            bytes.push(0xff);
        }
        bytes
    } else {
        let mut bytes = i.to_bytes_le().1;
        if bytes.last().map_or(false, |b| *b >= 0x80) {
            bytes.push(0x00);
        }
        bytes
    }
}

/// Decode two's-complement little-endian bytes into a big integer.
pub fn decode_long(bytes: &[u8]) -> BigInt {
    // BigInt::from_bytes_le doesn't like a sign bit in the bytes, therefore
    // we have to extract that ourselves and do the two's complement.
    let negative = !bytes.is_empty() && (bytes[bytes.len() - 1] & 0x80 != 0);
    let mut val = BigInt::from_bytes_le(Sign::Plus, bytes);
    if negative {
        val -= BigInt::from(1) << (bytes.len() * 8);
    }
    val
}

/// Escape a byte string for a text-mode STRING line.  The quotes are not
/// included.  Everything outside printable ASCII, plus backslash and the
/// single quote, becomes a `\xHH` escape, so the result never contains a
/// newline.
pub fn escape_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => result.extend(b"\\\\"),
            b'\'' | 0x00..=0x1f | 0x7f..=0xff => {
                result.extend(format!("\\x{:02x}", b).bytes());
            }
            _ => result.push(b),
        }
    }
    result
}

/// Undo [`escape_bytes`], also accepting the conventional letter escapes.
/// Returns `None` on a malformed escape.
pub fn unescape_bytes(s: &[u8]) -> Option<Vec<u8>> {
    let mut result = Vec::with_capacity(s.len());
    let mut iter = s.iter();
    while let Some(&b) = iter.next() {
        match b {
            b'\\' => match iter.next() {
                Some(&b'\\') => result.push(b'\\'),
                Some(&b'a') => result.push(b'\x07'),
                Some(&b'b') => result.push(b'\x08'),
                Some(&b't') => result.push(b'\x09'),
                Some(&b'n') => result.push(b'\x0a'),
                Some(&b'v') => result.push(b'\x0b'),
                Some(&b'f') => result.push(b'\x0c'),
                Some(&b'r') => result.push(b'\x0d'),
                Some(&b'x') => {
                    let hi = iter.next().and_then(|&c| (c as char).to_digit(16))?;
                    let lo = iter.next().and_then(|&c| (c as char).to_digit(16))?;
                    result.push(16 * hi as u8 + lo as u8);
                }
                _ => return None,
            },
            _ => result.push(b),
        }
    }
    Some(result)
}

/// Escape a string for a text-mode UNICODE line, raw-unicode-escape style:
/// only `\uXXXX` and `\UXXXXXXXX` escapes exist, chars below U+0100 are
/// written as raw latin-1 bytes, and backslash and line breaks are escaped
/// through `\u` so the line stays well-formed.
pub fn escape_string(s: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' | '\n' | '\r' => {
                result.extend(format!("\\u{:04x}", ch as u32).bytes());
            }
            _ if (ch as u32) < 0x100 => result.push(ch as u32 as u8),
            _ if (ch as u32) <= 0xffff => {
                result.extend(format!("\\u{:04x}", ch as u32).bytes());
            }
            _ => result.extend(format!("\\U{:08x}", ch as u32).bytes()),
        }
    }
    result
}

/// Undo [`escape_string`].  Returns `None` on a malformed escape or an
/// escape naming an invalid scalar value.
pub fn unescape_string(s: &[u8]) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut iter = s.iter();
    while let Some(&b) = iter.next() {
        match b {
            b'\\' => {
                let nescape = match iter.next() {
                    Some(&b'u') => 4,
                    Some(&b'U') => 8,
                    _ => return None,
                };
                let mut accum = 0;
                for _ in 0..nescape {
                    accum = accum * 16 + iter.next().and_then(|&c| (c as char).to_digit(16))?;
                }
                result.push(char::from_u32(accum)?);
            }
            _ => result.push(b as char),
        }
    }
    Some(result)
}
