//! Structural deep copy for in-flight payloads.
//!
//! The transport may still hold the frame it handed to the interceptor, so a
//! rewrite must never touch shared containers. [`DeepCopy`] produces a value
//! that is structurally equal to its source but owns every container it
//! holds. Callables cannot be duplicated; a [`Delegate`] copy is a fresh
//! forwarding wrapper around the original.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::types::{ConnectionState, DispatchKind, Opcode, OutboundPayload};

/// Structural copy that shares no mutable container with its source.
///
/// Implementations keep the concrete type, so a typed record copies into the
/// same type with its methods intact.
pub trait DeepCopy {
    fn deep_copy(&self) -> Self;
}

// ─── Leaves ───────────────────────────────────────────────────────

macro_rules! copy_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DeepCopy for $ty {
                fn deep_copy(&self) -> Self {
                    *self
                }
            }
        )*
    };
}

copy_leaf!(
    bool, u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64, usize, isize, Opcode,
    ConnectionState,
);

impl DeepCopy for String {
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

impl DeepCopy for DispatchKind {
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

// ─── Containers ───────────────────────────────────────────────────

impl<T: DeepCopy> DeepCopy for Vec<T> {
    fn deep_copy(&self) -> Self {
        self.iter().map(DeepCopy::deep_copy).collect()
    }
}

impl<T: DeepCopy> DeepCopy for Option<T> {
    fn deep_copy(&self) -> Self {
        self.as_ref().map(DeepCopy::deep_copy)
    }
}

impl<T: DeepCopy> DeepCopy for Box<T> {
    fn deep_copy(&self) -> Self {
        Box::new(self.as_ref().deep_copy())
    }
}

impl<K: Clone + Ord, V: DeepCopy> DeepCopy for BTreeMap<K, V> {
    fn deep_copy(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect()
    }
}

impl<K: Clone + Eq + Hash, V: DeepCopy> DeepCopy for HashMap<K, V> {
    fn deep_copy(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect()
    }
}

impl DeepCopy for Value {
    fn deep_copy(&self) -> Self {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(n.clone()),
            Value::String(s) => Value::String(s.clone()),
            Value::Array(items) => Value::Array(items.deep_copy()),
            Value::Object(fields) => Value::Object(fields.deep_copy()),
        }
    }
}

impl DeepCopy for Map<String, Value> {
    fn deep_copy(&self) -> Self {
        self.iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect()
    }
}

impl DeepCopy for OutboundPayload {
    fn deep_copy(&self) -> Self {
        Self {
            opcode: self.opcode,
            data: self.data.deep_copy(),
            session_established: self.session_established,
        }
    }
}

// ─── Delegate ─────────────────────────────────────────────────────

type DelegateFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// A callable payload field.
///
/// Payload records that carry callbacks hold them as `Delegate` rather than
/// as opaque data. Copying a delegate yields a new callable identity that
/// forwards every call, with all arguments, to the original.
#[derive(Clone)]
pub struct Delegate {
    inner: Arc<DelegateFn>,
}

impl Delegate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.inner)(args)
    }

    /// `true` when both handles refer to the same callable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl DeepCopy for Delegate {
    fn deep_copy(&self) -> Self {
        let original = Arc::clone(&self.inner);
        Self::new(move |args| original(args))
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delegate({:p})", Arc::as_ptr(&self.inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn value_copy_is_equal_and_independent() {
        let original = json!({
            "capabilities": 16381,
            "properties": {"os": "linux", "flags": [1, 2, {"nested": true}]},
            "token": "x",
        });
        let mut copy = original.deep_copy();
        assert_eq!(copy, original);

        copy["properties"]["flags"][2]["nested"] = json!(false);
        copy["capabilities"] = json!(5);
        assert_eq!(original["properties"]["flags"][2]["nested"], json!(true));
        assert_eq!(original["capabilities"], json!(16381));
    }

    #[test]
    fn containers_live_at_different_addresses() {
        let original = json!({"a": [1, 2, 3], "b": {"c": []}});
        let copy = original.deep_copy();

        let orig_a = original["a"].as_array().expect("array");
        let copy_a = copy["a"].as_array().expect("array");
        assert!(!std::ptr::eq(orig_a, copy_a));

        let orig_b = original["b"].as_object().expect("object");
        let copy_b = copy["b"].as_object().expect("object");
        assert!(!std::ptr::eq(orig_b, copy_b));
    }

    #[test]
    fn primitives_copy_unchanged() {
        for value in [json!(null), json!(true), json!(42), json!(-1.5), json!("s")] {
            assert_eq!(value.deep_copy(), value);
        }
        assert_eq!(7u32.deep_copy(), 7);
        assert_eq!(Some("x".to_owned()).deep_copy(), Some("x".to_owned()));
    }

    #[test]
    fn keyed_and_boxed_containers_copy_their_values() {
        let mut by_seq = BTreeMap::new();
        by_seq.insert(1u64, json!({"t": "READY"}));
        let mut copy = by_seq.deep_copy();
        assert_eq!(copy, by_seq);
        copy.insert(1, json!({"t": "RESUMED"}));
        assert_eq!(by_seq[&1], json!({"t": "READY"}));

        let mut by_name = HashMap::new();
        by_name.insert("guild".to_owned(), vec![json!([1, 2])]);
        let copy = by_name.deep_copy();
        assert_eq!(copy, by_name);
        assert!(!std::ptr::eq(&copy["guild"][0], &by_name["guild"][0]));

        let boxed = Box::new(json!({"roles": []}));
        let copy = boxed.deep_copy();
        assert_eq!(copy, boxed);
        assert!(!std::ptr::eq(copy.as_ref(), boxed.as_ref()));

        assert_eq!(Opcode::Identify.deep_copy(), Opcode::Identify);
        assert_eq!(DispatchKind::Ready.deep_copy(), DispatchKind::Ready);
        assert_eq!(
            ConnectionState::Resuming.deep_copy(),
            ConnectionState::Resuming
        );
    }

    #[test]
    fn outbound_payload_copy_keeps_opcode_and_flag() {
        let payload = OutboundPayload::new(Opcode::Identify, json!({"token": "x"}), Some(false));
        let mut copy = payload.deep_copy();
        assert_eq!(copy, payload);
        copy.data["token"] = json!("y");
        assert_eq!(payload.data["token"], json!("x"));
    }

    #[test]
    fn delegate_copy_has_fresh_identity() {
        let delegate = Delegate::new(|_| json!(1));
        let copy = delegate.deep_copy();
        assert!(!copy.ptr_eq(&delegate));
        assert!(delegate.clone().ptr_eq(&delegate));
    }

    #[test]
    fn delegate_copy_forwards_every_argument() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let delegate = Delegate::new(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            json!(args.len())
        });
        let copy = delegate.deep_copy().deep_copy();

        let args = [json!(1), json!("two"), json!({"three": 3})];
        assert_eq!(copy.call(&args), delegate.call(&args));
        assert_eq!(copy.call(&args), json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// A typed record mixing data and a callback.
    #[derive(Debug)]
    struct AckFrame {
        data: Value,
        on_ack: Option<Delegate>,
        retries: u32,
    }

    impl AckFrame {
        fn ack(&self, seq: u64) -> Value {
            self.on_ack
                .as_ref()
                .map_or(Value::Null, |cb| cb.call(&[json!(seq)]))
        }
    }

    impl DeepCopy for AckFrame {
        fn deep_copy(&self) -> Self {
            Self {
                data: self.data.deep_copy(),
                on_ack: self.on_ack.deep_copy(),
                retries: self.retries,
            }
        }
    }

    #[test]
    fn typed_record_copy_keeps_behavior() {
        let frame = AckFrame {
            data: json!({"seq": 9}),
            on_ack: Some(Delegate::new(|args| json!({"acked": args[0].clone()}))),
            retries: 2,
        };
        let copy = frame.deep_copy();
        assert_eq!(copy.ack(9), json!({"acked": 9}));
        assert_eq!(copy.ack(9), frame.ack(9));
        assert_eq!(copy.data, frame.data);
        assert_eq!(copy.retries, 2);
        let (Some(a), Some(b)) = (&frame.on_ack, &copy.on_ack) else {
            panic!("callbacks should survive the copy");
        };
        assert!(!a.ptr_eq(b));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_json() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(|n| json!(n)),
                "[a-z]{0,8}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 64, 8, |inner| {
                prop_oneof![
                    proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                    proptest::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            /// The copy is structurally equal to its source.
            #[test]
            fn copy_equals_source(value in arb_json()) {
                prop_assert_eq!(value.deep_copy(), value);
            }

            /// Mutating the copy leaves the source untouched.
            #[test]
            fn copy_is_isolated(value in arb_json()) {
                let snapshot = value.clone();
                let mut copy = value.deep_copy();
                match &mut copy {
                    Value::Array(items) => items.push(Value::Null),
                    Value::Object(fields) => {
                        fields.insert("__mutated".to_owned(), Value::Bool(true));
                    }
                    other => *other = json!("mutated"),
                }
                prop_assert_eq!(value, snapshot);
            }
        }
    }
}
