// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The extension surface: registered classes, reconstructed instances, and
//! the reduce protocol for opaque kinds.
//!
//! The engine itself only knows the closed set of `Value` variants.  Every
//! other kind goes through reduction on the way out (a constructor name,
//! its arguments, and optional state) and through a [`ClassRegistry`] on
//! the way back in, which is the sole point where a stream gets to select
//! code to run.  Reduction safety is opt-in per class and is best-effort,
//! not a sandbox.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::result::Result as StdResult;

use crate::error::Result;
use crate::value::Value;

type ConstructFn = Box<dyn Fn(&Rc<ClassDef>, Vec<Value>) -> StdResult<Value, String>>;
type SetStateFn = Box<dyn Fn(&mut Object, Value) -> StdResult<(), String>>;
type ResolveFn = Box<dyn Fn(&str, &str) -> Option<Rc<ClassDef>>>;

/// How to rebuild an opaque value: apply the named constructor to `args`,
/// then apply `state` (if any) to the result.
///
/// The constructor/args phase must not reference the value being reduced
/// itself; a back reference belongs in `state`, which is encoded after the
/// value has entered the memo.
pub struct Reduction {
    /// Module part of the constructor reference.
    pub module: String,
    /// Qualified name of the constructor within the module.
    pub name: String,
    /// Constructor arguments.
    pub args: Vec<Value>,
    /// Optional state, applied via the class's state hook (or merged into
    /// the attribute dict) after construction.
    pub state: Option<Value>,
}

/// Writer-side capability for kinds the engine does not know natively.
pub trait Reduce {
    /// Describe how to rebuild this value.
    fn reduce(&self) -> Result<Reduction>;
}

/// A named constructor, with its unpickling hooks.
///
/// A `ClassDef` without an explicit constructor rebuilds a plain
/// [`Object`] carrying the args and an attribute dict, which round-trips
/// through the writer unchanged.
pub struct ClassDef {
    module: String,
    name: String,
    safe_for_unpickling: bool,
    construct: Option<ConstructFn>,
    set_state: Option<SetStateFn>,
}

impl ClassDef {
    /// Define a class under `module.name`.
    pub fn new<M: Into<String>, N: Into<String>>(module: M, name: N) -> ClassDef {
        ClassDef {
            module: module.into(),
            name: name.into(),
            safe_for_unpickling: false,
            construct: None,
            set_state: None,
        }
    }

    /// Mark this class as safe to construct from untrusted streams.
    /// Without the marker, REDUCE refuses to invoke it.
    pub fn safe_for_unpickling(mut self) -> Self {
        self.safe_for_unpickling = true;
        self
    }

    /// Replace the default Object-building constructor.
    pub fn with_constructor<F>(mut self, f: F) -> Self
        where F: Fn(&Rc<ClassDef>, Vec<Value>) -> StdResult<Value, String> + 'static
    {
        self.construct = Some(Box::new(f));
        self
    }

    /// Install a state hook, used by BUILD instead of the attribute-dict
    /// merge.
    pub fn with_set_state<F>(mut self, f: F) -> Self
        where F: Fn(&mut Object, Value) -> StdResult<(), String> + 'static
    {
        self.set_state = Some(Box::new(f));
        self
    }

    pub fn module(&self) -> &str { &self.module }

    pub fn name(&self) -> &str { &self.name }

    pub fn is_safe_for_unpickling(&self) -> bool { self.safe_for_unpickling }

    pub(crate) fn instantiate(self: &Rc<Self>, args: Vec<Value>) -> StdResult<Value, String> {
        match self.construct {
            Some(ref f) => f(self, args),
            None => Ok(Value::object(Object {
                class: self.clone(),
                args,
                attrs: BTreeMap::new(),
            })),
        }
    }

    pub(crate) fn state_hook(&self) -> Option<&SetStateFn> {
        self.set_state.as_ref()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("safe_for_unpickling", &self.safe_for_unpickling)
            .finish()
    }
}

/// A reconstructed instance: its class, the constructor arguments it was
/// built from, and its attribute dict.
pub struct Object {
    /// The class this instance belongs to.
    pub class: Rc<ClassDef>,
    /// Constructor arguments.
    pub args: Vec<Value>,
    /// Attribute namespace, filled by BUILD.
    pub attrs: BTreeMap<String, Value>,
}

impl Object {
    /// A fresh instance of `class` with no args and no attributes.
    pub fn new(class: Rc<ClassDef>) -> Object {
        Object { class, args: Vec::new(), attrs: BTreeMap::new() }
    }

    /// A fresh instance of `class` with the given constructor args.
    pub fn with_args(class: Rc<ClassDef>, args: Vec<Value>) -> Object {
        Object { class, args, attrs: BTreeMap::new() }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Object) -> bool {
        self.class.module() == other.class.module()
            && self.class.name() == other.class.name()
            && self.args == other.args
            && self.attrs == other.attrs
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &format_args!("{}.{}", self.class.module(), self.class.name()))
            .field("args", &self.args)
            .field("attrs", &self.attrs)
            .finish()
    }
}

/// The name-resolution capability consumed by GLOBAL and REDUCE.
///
/// Resolution first consults explicitly registered classes, then the
/// optional fallback resolver.  An empty registry resolves nothing, so by
/// default a stream cannot name any constructor at all.
#[derive(Default)]
pub struct ClassRegistry {
    classes: BTreeMap<(String, String), Rc<ClassDef>>,
    fallback: Option<ResolveFn>,
}

impl ClassRegistry {
    pub fn new() -> ClassRegistry {
        ClassRegistry { classes: BTreeMap::new(), fallback: None }
    }

    /// Register a class; the returned handle can be used to build
    /// [`Object`] values on the writer side.
    pub fn register(&mut self, def: ClassDef) -> Rc<ClassDef> {
        let def = Rc::new(def);
        let key = (def.module.clone(), def.name.clone());
        self.classes.insert(key, def.clone());
        def
    }

    /// Install a fallback resolver consulted after registry misses.
    pub fn with_fallback<F>(mut self, f: F) -> Self
        where F: Fn(&str, &str) -> Option<Rc<ClassDef>> + 'static
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Resolve `module.name` to a class, if known.
    pub fn resolve(&self, module: &str, name: &str) -> Option<Rc<ClassDef>> {
        self.classes
            .get(&(module.to_owned(), name.to_owned()))
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|f| f(module, name)))
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}
