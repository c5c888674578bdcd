// kestrel-vm - Property tests for values and interning
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use proptest::prelude::*;

use kestrel_vm::intern::{fnv1a, IStr};
use kestrel_vm::Value;

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<f64>().prop_map(Value::Number),
        "[a-z]{0,12}".prop_map(|s| Value::Str(IStr::intern(&s))),
    ]
}

proptest! {
    #[test]
    fn interned_strings_are_canonical(s in "[ -~]{0,32}") {
        let a = IStr::intern(&s);
        let b = IStr::intern(&s);
        let c = IStr::intern_owned(s.clone());
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
        prop_assert_eq!(a.as_str(), s.as_str());
    }

    #[test]
    fn stored_hash_matches_fnv1a(s in "[ -~]{0,32}") {
        prop_assert_eq!(IStr::intern(&s).hash_value(), fnv1a(s.as_bytes()));
    }

    #[test]
    fn number_equality_matches_f64(a in any::<f64>(), b in any::<f64>()) {
        prop_assert_eq!(Value::Number(a) == Value::Number(b), a == b);
    }

    #[test]
    fn falsy_iff_nil_or_false(v in value_strategy()) {
        let falsy = v == Value::Nil || v == Value::Bool(false);
        prop_assert_eq!(v.is_falsy(), falsy);
    }

    #[test]
    fn distinct_contents_never_equal(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
        prop_assume!(a != b);
        prop_assert_ne!(Value::Str(IStr::intern(&a)), Value::Str(IStr::intern(&b)));
    }
}
