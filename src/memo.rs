// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The memo tables deduplicating shared and cyclic references.
//!
//! The writer maps value identity to a slot number, assigned densely from
//! zero in first-seen order; the reader maps slots back to reconstructed
//! handles.  Both are scoped to one `dump`/`load` unless the caller opts
//! into keeping the writer memo across dumps.

use std::collections::HashMap;

use crate::value::Value;

/// Writer-side memo: identity → slot.
#[derive(Default)]
pub struct PicklerMemo {
    slots: HashMap<usize, u32>,
    // Holds a handle per recorded value, so no address can be freed and
    // reused for a different value within the memo's lifetime.
    keep: Vec<Value>,
}

impl PicklerMemo {
    pub fn new() -> PicklerMemo {
        PicklerMemo::default()
    }

    /// The slot under which this value was recorded, if it was.
    pub fn lookup(&self, value: &Value) -> Option<u32> {
        value.identity().and_then(|id| self.slots.get(&id).copied())
    }

    /// Record a value, assigning the next slot in sequence.  Returns `None`
    /// for values without identity, which are never deduplicated.  Must be
    /// called at most once per identity.
    pub fn record(&mut self, value: &Value) -> Option<u32> {
        let id = value.identity()?;
        let slot = self.slots.len() as u32;
        let prev = self.slots.insert(id, slot);
        debug_assert!(prev.is_none(), "identity recorded twice");
        self.keep.push(value.clone());
        Some(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.keep.clear();
    }
}

/// Reader-side memo: slot → value handle.
#[derive(Default)]
pub struct UnpicklerMemo {
    slots: HashMap<u32, Value>,
}

impl UnpicklerMemo {
    pub fn new() -> UnpicklerMemo {
        UnpicklerMemo::default()
    }

    /// The value bound to `slot`; `None` signals a corrupt or truncated
    /// stream.
    pub fn get(&self, slot: u32) -> Option<&Value> {
        self.slots.get(&slot)
    }

    /// Bind `slot` to `value`.  Returns false if the slot was already
    /// bound: the protocol has no update-in-place operation, so a rebind
    /// can only come from a corrupt stream.
    pub fn put(&mut self, slot: u32, value: Value) -> bool {
        self.slots.insert(slot, value).is_none()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
