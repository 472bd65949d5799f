// Copyright (c) 2024-2026 the brine developers.  Licensed under the Apache
// License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.


macro_rules! treemap {
    ($($k:expr => $v:expr),*) => {
        {
            let mut m = BTreeMap::new();
            $(m.insert($k, $v);)*
            m
        }
    };
}

mod struct_tests {
    use std::fmt;
    use serde::ser;
    use serde_derive::{Deserialize, Serialize};
    use crate::{to_vec, from_slice, value_from_slice, PickleOptions, UnpickleOptions, Value};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Inner {
        a: (),
        b: usize,
        c: Vec<String>,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Unit;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Newtype(i32);

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Tuple(i32, bool);

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    enum Animal {
        Dog,
        AntHive(Vec<String>),
        Frog(String, Vec<isize>),
        Cat { age: usize, name: String },
    }

    fn test_encode_ok<T>(value: T, literal: &'static str)
        where T: PartialEq + fmt::Debug + ser::Serialize,
    {
        let vec = to_vec(&value, PickleOptions::new()).unwrap();
        let val: Value = value_from_slice(&vec, UnpickleOptions::new()).unwrap();
        assert_eq!(format!("{}", val), literal);
    }

    #[test]
    fn encode_types() {
        test_encode_ok((), "None");
        test_encode_ok(None::<i32>, "None");
        test_encode_ok(Some(false), "False");
        test_encode_ok(4.5_f64, "4.5");
    }

    #[test]
    fn encode_struct() {
        test_encode_ok(Unit,
                       r#"()"#);
        test_encode_ok(Newtype(42),
                       r#"42"#);
        test_encode_ok(Tuple(42, false),
                       r#"(42, False)"#);
        test_encode_ok(Inner { a: (), b: 32, c: vec!["doc".into()] },
                       r#"{"a": None, "b": 32, "c": ["doc"]}"#);
    }

    #[test]
    fn encode_enum() {
        test_encode_ok(Animal::Dog,
                       r#"("Dog", )"#);
        test_encode_ok(Animal::AntHive(vec!["ant".into(), "aunt".into()]),
                       r#"("AntHive", ["ant", "aunt"])"#);
        test_encode_ok(Animal::Frog("Henry".into(), vec![1, 5]),
                       r#"("Frog", ("Henry", [1, 5]))"#);
        test_encode_ok(Animal::Cat { age: 5, name: "Molyneux".into() },
                       r#"("Cat", {"age": 5, "name": "Molyneux"})"#);
    }

    #[test]
    fn roundtrip_struct() {
        let animals = vec![
            Animal::Dog,
            Animal::AntHive(vec!["ant".into()]),
            Animal::Frog("Henry".into(), vec![1, 5]),
            Animal::Cat { age: 5, name: "Molyneux".into() },
        ];
        for options in &[PickleOptions::new(), PickleOptions::new().text()] {
            let vec = to_vec(&animals, options.clone()).unwrap();
            let tripped: Vec<Animal> = from_slice(&vec, UnpickleOptions::new()).unwrap();
            assert_eq!(tripped, animals);
        }
    }
}

mod value_tests {
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use num_bigint::BigInt;
    use rand::{thread_rng, RngCore};
    use quickcheck::{QuickCheck, StdGen};
    use crate::{
        to_vec, from_slice, value_to_vec, value_from_slice,
        PickleOptions, UnpickleOptions, Value, HashableValue,
    };
    use crate::error::{CorruptKind, Error};

    fn both_modes() -> [PickleOptions; 2] {
        [PickleOptions::new(), PickleOptions::new().text()]
    }

    fn get_test_object() -> Value {
        let longish = BigInt::from(10000000000u64) * BigInt::from(10000000000u64);
        Value::dict(treemap!(
            HashableValue::None => Value::None,
            HashableValue::Bool(false) => Value::tuple(vec![Value::Bool(false),
                                                            Value::Bool(true)]),
            HashableValue::I64(10) => Value::I64(100000),
            HashableValue::Int(longish.clone()) => Value::Int(longish),
            HashableValue::F64(1.0) => Value::F64(1.0),
            HashableValue::Bytes(b"bytes".to_vec()) => Value::Bytes(b"bytes".to_vec()),
            HashableValue::String("string".into()) => Value::String("string".into()),
            HashableValue::Tuple(vec![HashableValue::I64(1), HashableValue::I64(2)]) =>
                Value::tuple(vec![Value::I64(1), Value::I64(2), Value::I64(3)]),
            HashableValue::Tuple(vec![]) =>
                Value::list(vec![
                    Value::list(vec![Value::I64(1), Value::I64(2), Value::I64(3)]),
                    Value::dict(BTreeMap::new())
                ])))
    }

    fn roundtrip_value(original: &Value, options: PickleOptions) -> Value {
        let vec = value_to_vec(original, options).unwrap();
        value_from_slice(&vec, UnpickleOptions::new()).unwrap()
    }

    #[test]
    fn roundtrip() {
        let dict = get_test_object();
        for options in &both_modes() {
            assert_eq!(roundtrip_value(&dict, options.clone()), dict);
        }
    }

    #[test]
    fn roundtrip_int_boundaries() {
        let ints = [
            0i64, 1, -1, 255, 256, -255, -256, 65535, 65536,
            -0x8000_0000, 0x7fff_ffff, -0x8000_0001, 0x8000_0000,
            i64::min_value(), i64::max_value(),
        ];
        for options in &both_modes() {
            for &i in &ints {
                assert_eq!(roundtrip_value(&Value::I64(i), options.clone()), Value::I64(i));
            }
        }
    }

    #[test]
    fn roundtrip_bigints() {
        let bigs = [
            BigInt::from(i64::max_value()) + 1,
            BigInt::from(i64::min_value()) - 1,
            BigInt::from(1) << 1000,
            -(BigInt::from(1) << 1000usize),
        ];
        for options in &both_modes() {
            for big in &bigs {
                assert_eq!(roundtrip_value(&Value::Int(big.clone()), options.clone()),
                           Value::Int(big.clone()));
            }
            // A bigint that fits i64 comes back as an i64, which compares
            // equal across the two representations.
            assert_eq!(roundtrip_value(&Value::Int(BigInt::from(5)), options.clone()),
                       Value::I64(5));
        }
    }

    #[test]
    fn roundtrip_floats() {
        let floats = [
            0.0f64, -1.5, 4.5, 1.5e300, 5e-324, f64::MAX, f64::MIN_POSITIVE,
            f64::INFINITY, f64::NEG_INFINITY,
        ];
        for options in &both_modes() {
            for &f in &floats {
                assert_eq!(roundtrip_value(&Value::F64(f), options.clone()), Value::F64(f));
            }
            match roundtrip_value(&Value::F64(f64::NAN), options.clone()) {
                Value::F64(f) => assert!(f.is_nan()),
                other => panic!("expected float, got {:?}", other),
            }
        }
    }

    #[test]
    fn roundtrip_strings() {
        let all_bytes: Vec<u8> = (0u8..=255).collect();
        let strings = [
            String::new(),
            "plain ascii".into(),
            "newlines\nand\r\\backslashes".into(),
            "latin \u{e9}\u{ff} bmp \u{2603} astral \u{1f600}".into(),
        ];
        for options in &both_modes() {
            assert_eq!(roundtrip_value(&Value::Bytes(vec![]), options.clone()),
                       Value::Bytes(vec![]));
            assert_eq!(roundtrip_value(&Value::Bytes(all_bytes.clone()), options.clone()),
                       Value::Bytes(all_bytes.clone()));
            for s in &strings {
                assert_eq!(roundtrip_value(&Value::String(s.clone()), options.clone()),
                           Value::String(s.clone()));
            }
        }
        // Long enough to need the 4-byte length prefix.
        let big = vec![0xab; 70000];
        assert_eq!(roundtrip_value(&Value::Bytes(big.clone()), PickleOptions::new()),
                   Value::Bytes(big));
        let big_str = "x".repeat(70000);
        assert_eq!(roundtrip_value(&Value::String(big_str.clone()), PickleOptions::new()),
                   Value::String(big_str));
    }

    #[test]
    fn roundtrip_large_list() {
        // Exceeds one append batch.
        let items: Vec<_> = (0..2500).map(Value::I64).collect();
        let list = Value::list(items);
        for options in &both_modes() {
            assert_eq!(roundtrip_value(&list, options.clone()), list);
        }
    }

    #[test]
    fn deterministic_output() {
        let dict = get_test_object();
        for options in &both_modes() {
            let first = value_to_vec(&dict, options.clone()).unwrap();
            let second = value_to_vec(&dict, options.clone()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn shared_references() {
        let shared = Value::list(vec![Value::I64(1)]);
        let outer = Value::tuple(vec![shared.clone(), shared.clone()]);
        for options in &both_modes() {
            let tripped = roundtrip_value(&outer, options.clone());
            let items = match tripped {
                Value::Tuple(items) => items,
                other => panic!("expected tuple, got {:?}", other),
            };
            match (&items[0], &items[1]) {
                (Value::List(a), Value::List(b)) => {
                    assert!(Rc::ptr_eq(a, b));
                    a.borrow_mut().push(Value::I64(2));
                    assert_eq!(b.borrow().len(), 2);
                }
                _ => panic!("expected two lists"),
            }
        }
    }

    #[test]
    fn cyclic_list() {
        let list = Value::list(vec![]);
        if let Value::List(ref rc) = list {
            rc.borrow_mut().push(list.clone());
        }
        for options in &both_modes() {
            match roundtrip_value(&list, options.clone()) {
                Value::List(rc) => {
                    let inner = rc.borrow();
                    assert_eq!(inner.len(), 1);
                    match inner[0] {
                        Value::List(ref rc2) => assert!(Rc::ptr_eq(&rc, rc2)),
                        ref other => panic!("expected list, got {:?}", other),
                    }
                }
                other => panic!("expected list, got {:?}", other),
            }
        }
    }

    #[test]
    fn cyclic_dict() {
        let dict = Value::dict(BTreeMap::new());
        if let Value::Dict(ref rc) = dict {
            rc.borrow_mut().insert(HashableValue::String("me".into()), dict.clone());
        }
        match roundtrip_value(&dict, PickleOptions::new()) {
            Value::Dict(rc) => {
                let inner = rc.borrow();
                match inner.get(&HashableValue::String("me".into())) {
                    Some(Value::Dict(rc2)) => assert!(Rc::ptr_eq(&rc, rc2)),
                    other => panic!("expected dict entry, got {:?}", other),
                }
            }
            other => panic!("expected dict, got {:?}", other),
        }
    }

    #[test]
    fn cyclic_tuple() {
        // A tuple that closes a cycle through a list forces the writer to
        // discard the already written elements and reference the memo.
        let list = Value::list(vec![]);
        let tuple = Value::tuple(vec![list.clone()]);
        if let Value::List(ref rc) = list {
            rc.borrow_mut().push(tuple.clone());
        }
        for options in &both_modes() {
            match roundtrip_value(&tuple, options.clone()) {
                Value::Tuple(rc) => {
                    match rc[0] {
                        Value::List(ref inner) => match inner.borrow()[0] {
                            Value::Tuple(ref rc2) => assert!(Rc::ptr_eq(&rc, rc2)),
                            ref other => panic!("expected tuple, got {:?}", other),
                        },
                        ref other => panic!("expected list, got {:?}", other),
                    }
                }
                other => panic!("expected tuple, got {:?}", other),
            }
        }
    }

    #[test]
    fn memo_across_dumps() {
        use crate::{Pickler, Unpickler};

        let shared = Value::list(vec![Value::I64(7)]);
        let mut pickler = Pickler::new(Vec::new(), PickleOptions::new().keep_memo());
        pickler.dump(&shared).unwrap();
        pickler.dump(&shared).unwrap();
        let stream = pickler.into_inner();

        let mut unpickler = Unpickler::new(&stream[..], UnpickleOptions::new().keep_memo());
        let first = unpickler.load().unwrap();
        let second = unpickler.load().unwrap();
        unpickler.end().unwrap();
        match (first, second) {
            (Value::List(a), Value::List(b)) => assert!(Rc::ptr_eq(&a, &b)),
            _ => panic!("expected two lists"),
        }
    }

    #[test]
    fn truncated_streams() {
        let stream = value_to_vec(&get_test_object(), PickleOptions::new()).unwrap();
        for cut in 0..stream.len() {
            match value_from_slice(&stream[..cut], UnpickleOptions::new()) {
                Err(Error::Truncated { .. }) => {}
                other => panic!("prefix of length {} gave {:?}", cut, other),
            }
        }
    }

    #[test]
    fn corrupt_streams() {
        // opcode byte outside the catalogue
        match value_from_slice(b"\x80\x02\xff.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::UnknownOpcode(0xff), offset: 3 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // protocol from the future
        match value_from_slice(b"\x80\x05N.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::UnsupportedProtocol(5), .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // STOP with nothing on the stack
        match value_from_slice(b"\x80\x02.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::StackUnderflow, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // bytes after STOP
        match value_from_slice(b"\x80\x02N.N", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::TrailingBytes, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // APPENDS without a mark
        match value_from_slice(b"\x80\x02]e.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::NoMark, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // memo slot never bound
        match value_from_slice(b"\x80\x02h\x00.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::MissingMemo(0), .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // memo slot bound twice
        match value_from_slice(b"\x80\x02Nq\x00Nq\x00.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::MemoRebound(0), .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // a list is not a valid dict key
        match value_from_slice(b"\x80\x02}]Ns.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::NotHashable, .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        // unparseable decimal line
        match value_from_slice(b"Inumber\n.", UnpickleOptions::new()) {
            Err(Error::Corrupt { kind: CorruptKind::InvalidLiteral(_), .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn fuzzing() {
        // Tries to ensure that we don't panic when encountering strange streams.
        for _ in 0..1000 {
            let mut stream = [0u8; 1000];
            thread_rng().fill_bytes(&mut stream);
            if *stream.last().unwrap() == b'.' { continue; }
            // These must all fail with an error, since we skip the check if the
            // last byte is a STOP opcode.
            assert!(value_from_slice(&stream, UnpickleOptions::new()).is_err());
        }
    }

    #[test]
    fn qc_roundtrip() {
        fn roundtrip(tree: super::arby::TreeValue) {
            let original = tree.build();
            let vec = value_to_vec(&original, PickleOptions::new()).unwrap();
            let tripped = value_from_slice(&vec, UnpickleOptions::new()).unwrap();
            assert_eq!(original, tripped);
        }
        QuickCheck::new().gen(StdGen::new(thread_rng(), 10))
                         .tests(10000)
                         .quickcheck(roundtrip as fn(_));
    }

    #[test]
    fn roundtrip_json() {
        let original: serde_json::Value = serde_json::from_str(r#"[
            {"null": null,
             "false": false,
             "true": true,
             "int": -1238571,
             "float": 1.5e10,
             "list": [false, 5, "true", 3.8]
            }
        ]"#).unwrap();
        let vec = to_vec(&original, PickleOptions::new()).unwrap();
        let tripped: serde_json::Value = from_slice(&vec, UnpickleOptions::new()).unwrap();
        assert_eq!(original, tripped);
    }
}

mod object_tests {
    use std::rc::Rc;
    use crate::{
        value_to_vec, value_from_slice, PickleOptions, UnpickleOptions,
        ClassDef, ClassRegistry, Object, Reduce, Reduction, Value,
    };
    use crate::error::{CorruptKind, Error, Result};

    struct Complex {
        re: f64,
        im: f64,
    }

    impl Reduce for Complex {
        fn reduce(&self) -> Result<Reduction> {
            Ok(Reduction {
                module: "numbers".into(),
                name: "Complex".into(),
                args: vec![Value::F64(self.re), Value::F64(self.im)],
                state: None,
            })
        }
    }

    fn complex_stream() -> Vec<u8> {
        let value = Value::reducible(Rc::new(Complex { re: 1.5, im: -2.0 }));
        value_to_vec(&value, PickleOptions::new()).unwrap()
    }

    fn complex_class() -> ClassDef {
        ClassDef::new("numbers", "Complex").with_constructor(|_, args| {
            match args[..] {
                [Value::F64(re), Value::F64(im)] =>
                    Ok(Value::tuple(vec![Value::F64(re), Value::F64(im)])),
                _ => Err("expected two floats".into()),
            }
        })
    }

    #[test]
    fn reduce_roundtrip() {
        let mut registry = ClassRegistry::new();
        registry.register(complex_class().safe_for_unpickling());
        let tripped = value_from_slice(&complex_stream(),
                                       UnpickleOptions::new().with_registry(registry)).unwrap();
        assert_eq!(tripped, Value::tuple(vec![Value::F64(1.5), Value::F64(-2.0)]));
    }

    #[test]
    fn unresolved_constructor() {
        match value_from_slice(&complex_stream(), UnpickleOptions::new()) {
            Err(Error::UnresolvedReference { module, name, .. }) => {
                assert_eq!(module, "numbers");
                assert_eq!(name, "Complex");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unsafe_reduction_refused() {
        // Resolvable, but not marked safe: refused before the constructor runs.
        let mut registry = ClassRegistry::new();
        registry.register(complex_class());
        match value_from_slice(&complex_stream(),
                               UnpickleOptions::new().with_registry(registry)) {
            Err(Error::UnsafeReduction { module, name, .. }) => {
                assert_eq!(module, "numbers");
                assert_eq!(name, "Complex");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn constructor_failure() {
        struct Bogus;
        impl Reduce for Bogus {
            fn reduce(&self) -> Result<Reduction> {
                Ok(Reduction {
                    module: "numbers".into(),
                    name: "Complex".into(),
                    args: vec![Value::None],
                    state: None,
                })
            }
        }
        let stream = value_to_vec(&Value::reducible(Rc::new(Bogus)),
                                  PickleOptions::new()).unwrap();
        let mut registry = ClassRegistry::new();
        registry.register(complex_class().safe_for_unpickling());
        match value_from_slice(&stream, UnpickleOptions::new().with_registry(registry)) {
            Err(Error::Corrupt { kind: CorruptKind::ConstructorFailed(_), .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn object_roundtrip() {
        let mut writer_registry = ClassRegistry::new();
        let class = writer_registry.register(ClassDef::new("app", "Config"));
        let obj = Value::object(Object::with_args(class, vec![Value::I64(1)]));
        if let Value::Object(ref rc) = obj {
            rc.borrow_mut().attrs.insert("name".into(), Value::String("prod".into()));
        }
        for options in &[PickleOptions::new(), PickleOptions::new().text()] {
            let stream = value_to_vec(&obj, options.clone()).unwrap();
            let mut registry = ClassRegistry::new();
            registry.register(ClassDef::new("app", "Config").safe_for_unpickling());
            let tripped = value_from_slice(&stream,
                                           UnpickleOptions::new().with_registry(registry)).unwrap();
            assert_eq!(tripped, obj);
        }
    }

    #[test]
    fn self_referential_state() {
        let mut writer_registry = ClassRegistry::new();
        let class = writer_registry.register(ClassDef::new("app", "Node"));
        let obj = Value::object(Object::new(class));
        if let Value::Object(ref rc) = obj {
            rc.borrow_mut().attrs.insert("me".into(), obj.clone());
        }
        let stream = value_to_vec(&obj, PickleOptions::new()).unwrap();
        let mut registry = ClassRegistry::new();
        registry.register(ClassDef::new("app", "Node").safe_for_unpickling());
        let tripped = value_from_slice(&stream,
                                       UnpickleOptions::new().with_registry(registry)).unwrap();
        match tripped {
            Value::Object(rc) => {
                let inner = rc.borrow();
                match inner.attrs.get("me") {
                    Some(Value::Object(rc2)) => assert!(Rc::ptr_eq(&rc, rc2)),
                    other => panic!("expected object attr, got {:?}", other),
                }
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn state_hook() {
        struct Counter(i64);
        impl Reduce for Counter {
            fn reduce(&self) -> Result<Reduction> {
                Ok(Reduction {
                    module: "app".into(),
                    name: "Counter".into(),
                    args: vec![],
                    state: Some(Value::I64(self.0)),
                })
            }
        }
        let stream = value_to_vec(&Value::reducible(Rc::new(Counter(17))),
                                  PickleOptions::new()).unwrap();
        let mut registry = ClassRegistry::new();
        registry.register(ClassDef::new("app", "Counter")
            .safe_for_unpickling()
            .with_set_state(|obj, state| {
                obj.attrs.insert("count".into(), state);
                Ok(())
            }));
        let tripped = value_from_slice(&stream,
                                       UnpickleOptions::new().with_registry(registry)).unwrap();
        match tripped {
            Value::Object(rc) => assert_eq!(rc.borrow().attrs.get("count"),
                                            Some(&Value::I64(17))),
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn state_application_failure() {
        struct Broken;
        impl Reduce for Broken {
            fn reduce(&self) -> Result<Reduction> {
                Ok(Reduction {
                    module: "app".into(),
                    name: "Broken".into(),
                    args: vec![],
                    // Without a state hook, only dict states can apply.
                    state: Some(Value::I64(1)),
                })
            }
        }
        let stream = value_to_vec(&Value::reducible(Rc::new(Broken)),
                                  PickleOptions::new()).unwrap();
        let mut registry = ClassRegistry::new();
        registry.register(ClassDef::new("app", "Broken").safe_for_unpickling());
        match value_from_slice(&stream, UnpickleOptions::new().with_registry(registry)) {
            Err(Error::StateApplication { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn fallback_resolver() {
        let registry = ClassRegistry::new().with_fallback(|module, name| {
            if module == "numbers" {
                Some(Rc::new(ClassDef::new(module, name).safe_for_unpickling()))
            } else {
                None
            }
        });
        let tripped = value_from_slice(&complex_stream(),
                                       UnpickleOptions::new().with_registry(registry)).unwrap();
        match tripped {
            Value::Object(rc) => assert_eq!(rc.borrow().args,
                                            vec![Value::F64(1.5), Value::F64(-2.0)]),
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn persistent_ids() {
        use crate::Pickler;

        let value = Value::tuple(vec![Value::String("db://17".into()), Value::I64(17)]);
        for options in &[PickleOptions::new(), PickleOptions::new().text()] {
            let mut pickler = Pickler::new(Vec::new(), options.clone())
                .with_persistent_id(|value| match *value {
                    Value::String(ref s) if s.starts_with("db://") => Some(s.clone()),
                    _ => None,
                });
            pickler.dump(&value).unwrap();
            let stream = pickler.into_inner();

            let tripped = value_from_slice(&stream, UnpickleOptions::new()
                .with_persistent_load(|token| Ok(Value::String(token.to_owned())))).unwrap();
            assert_eq!(tripped, value);

            // The same stream is rejected without a hook.
            match value_from_slice(&stream, UnpickleOptions::new()) {
                Err(Error::Corrupt { kind: CorruptKind::NoPersistentLoad, .. }) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }
}

mod codec_tests {
    use num_bigint::BigInt;
    use crate::codec::{decode_long, encode_long,
                       escape_bytes, unescape_bytes, escape_string, unescape_string};

    #[test]
    fn long_wire_forms() {
        assert_eq!(encode_long(&BigInt::from(0)), Vec::<u8>::new());
        assert_eq!(encode_long(&BigInt::from(127)), vec![0x7f]);
        assert_eq!(encode_long(&BigInt::from(128)), vec![0x80, 0x00]);
        assert_eq!(encode_long(&BigInt::from(255)), vec![0xff, 0x00]);
        assert_eq!(encode_long(&BigInt::from(-1)), vec![0xff]);
        assert_eq!(encode_long(&BigInt::from(-128)), vec![0x80]);
        assert_eq!(encode_long(&BigInt::from(-129)), vec![0x7f, 0xff]);
        assert_eq!(encode_long(&BigInt::from(-256)), vec![0x00, 0xff]);
    }

    #[test]
    fn long_roundtrip() {
        let mut cases = vec![BigInt::from(0)];
        for shift in &[7usize, 8, 15, 16, 31, 32, 63, 64, 100] {
            let base = BigInt::from(1) << *shift;
            cases.push(base.clone() - 1);
            cases.push(base.clone());
            cases.push(base.clone() + 1);
            cases.push(-base.clone());
            cases.push(-(base.clone() - 1i32));
            cases.push(-(base + 1i32));
        }
        for case in cases {
            assert_eq!(decode_long(&encode_long(&case)), case);
        }
    }

    #[test]
    fn byte_escapes() {
        let all_bytes: Vec<u8> = (0u8..=255).collect();
        let escaped = escape_bytes(&all_bytes);
        assert!(!escaped.contains(&b'\n'));
        assert!(!escaped.contains(&b'\''));
        assert_eq!(unescape_bytes(&escaped), Some(all_bytes));
        // the conventional letter escapes are also accepted
        assert_eq!(unescape_bytes(b"\\t\\n\\r\\\\"), Some(b"\t\n\r\\".to_vec()));
        assert_eq!(unescape_bytes(b"\\q"), None);
        assert_eq!(unescape_bytes(b"\\x4"), None);
    }

    #[test]
    fn string_escapes() {
        let cases = [
            String::new(),
            "latin-1 range \u{e9}\u{ff}".to_owned(),
            "bmp \u{2603} astral \u{1f600}".to_owned(),
            "line\nbreaks\rand \\ backslash".to_owned(),
        ];
        for case in &cases {
            let escaped = escape_string(case);
            assert!(!escaped.contains(&b'\n'));
            assert_eq!(unescape_string(&escaped).as_ref(), Some(case));
        }
        assert_eq!(unescape_string(b"\\u12"), None);
        assert_eq!(unescape_string(b"\\Udddddddd"), None);
    }
}
