//! Node attributes: a small keyed list on every node carrying literals,
//! declared types, and the scale/level bookkeeping the passes compute.

use std::rc::Rc;

use crate::{ConstantValue, DataType};

/**
 * The key type for node attributes. Keys are small, strictly positive
 * integers; zero is reserved for "no attribute".
 */
pub type AttrKey = u8;

#[derive(Debug, Clone, PartialEq)]
/**
 * The tagged union of payloads an attribute can carry.
 */
pub enum AttrValue {
    /**
     * An unsigned 32-bit integer.
     */
    U32(u32),

    /**
     * A signed 32-bit integer.
     */
    I32(i32),

    /**
     * A [`DataType`].
     */
    Type(DataType),

    /**
     * A shared double vector literal.
     */
    Const(Rc<ConstantValue<f64>>),

    /**
     * A shared 64-bit integer vector literal.
     */
    ConstInt64(Rc<ConstantValue<i64>>),
}

/**
 * A statically keyed attribute. Each marker type pairs a key with the
 * payload type that key is allowed to carry, so passes read and write
 * attributes without touching the tagged union directly.
 */
pub trait Attr {
    /**
     * The attribute's key.
     */
    const KEY: AttrKey;

    /**
     * The payload type stored under [`Self::KEY`].
     */
    type Value: Clone;

    /**
     * Wraps a payload in the tagged union.
     */
    fn wrap(value: Self::Value) -> AttrValue;

    /**
     * Extracts this attribute's payload from the tagged union, if the
     * variant matches.
     */
    fn unwrap(value: &AttrValue) -> Option<Self::Value>;
}

macro_rules! declare_attr {
    ($(#[$doc:meta])* $name:ident, $key:expr, $variant:ident, $value:ty) => {
        $(#[$doc])*
        pub enum $name {}

        impl Attr for $name {
            const KEY: AttrKey = $key;
            type Value = $value;

            fn wrap(value: Self::Value) -> AttrValue {
                AttrValue::$variant(value)
            }

            fn unwrap(value: &AttrValue) -> Option<Self::Value> {
                match value {
                    AttrValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

declare_attr!(
    /**
     * The number of scale bits removed by a `Rescale` node.
     */
    RescaleDivisor,
    1,
    U32,
    u32
);
declare_attr!(
    /**
     * The constant rotation amount on a rotation node.
     */
    Rotation,
    2,
    U32,
    u32
);
declare_attr!(
    /**
     * The double vector literal on a `Constant` node.
     */
    ConstValue,
    3,
    Const,
    Rc<ConstantValue<f64>>
);
declare_attr!(
    /**
     * The 64-bit integer vector literal on a `Constant` node.
     */
    ConstValueInt64,
    4,
    ConstInt64,
    Rc<ConstantValue<i64>>
);
declare_attr!(
    /**
     * The scalar literal on a `U32Constant` node.
     */
    Uint32Const,
    5,
    U32,
    u32
);
declare_attr!(
    /**
     * The inferred or declared [`DataType`] of a node.
     */
    Type,
    6,
    Type,
    DataType
);
declare_attr!(
    /**
     * Bits of plaintext range expected on an output node.
     */
    Range,
    7,
    U32,
    u32
);
declare_attr!(
    /**
     * A boolean flag, stored as 0 or 1.
     */
    Bool,
    8,
    U32,
    u32
);
declare_attr!(
    /**
     * The scale, in bits, at which a source or encode node's value enters
     * the ciphertext domain.
     */
    EncodeAtScale,
    9,
    U32,
    u32
);
declare_attr!(
    /**
     * The absolute level at which a source or encode node's value enters
     * the modulus chain.
     */
    EncodeAtLevel,
    10,
    U32,
    u32
);

/**
 * Checks that a `(key, value)` pair read from a serialized program names a
 * defined attribute and carries the payload variant that key requires.
 */
pub fn is_valid_attr(key: AttrKey, value: &AttrValue) -> bool {
    match key {
        RescaleDivisor::KEY
        | Rotation::KEY
        | Uint32Const::KEY
        | Range::KEY
        | Bool::KEY
        | EncodeAtScale::KEY
        | EncodeAtLevel::KEY => matches!(value, AttrValue::U32(_)),
        ConstValue::KEY => matches!(value, AttrValue::Const(_)),
        ConstValueInt64::KEY => matches!(value, AttrValue::ConstInt64(_)),
        Type::KEY => matches!(value, AttrValue::Type(_)),
        _ => false,
    }
}

/**
 * The attribute name for a key, as used in diagnostics.
 */
pub fn attr_name(key: AttrKey) -> &'static str {
    match key {
        RescaleDivisor::KEY => "RescaleDivisor",
        Rotation::KEY => "Rotation",
        ConstValue::KEY => "ConstValue",
        ConstValueInt64::KEY => "ConstValueInt64",
        Uint32Const::KEY => "Uint32Const",
        Type::KEY => "Type",
        Range::KEY => "Range",
        Bool::KEY => "Bool",
        EncodeAtScale::KEY => "EncodeAtScale",
        EncodeAtLevel::KEY => "EncodeAtLevel",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/**
 * A node's attributes: a flat `(key, value)` vector kept sorted by key.
 * Attribute counts per node are small, so lookup is a binary search and
 * insertion shifts at most a handful of entries.
 */
pub struct AttrList {
    entries: Vec<(AttrKey, AttrValue)>,
}

impl AttrList {
    /**
     * Creates an empty attribute list.
     */
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * True if the attribute `A` is present.
     */
    pub fn has<A: Attr>(&self) -> bool {
        self.get_raw(A::KEY).is_some()
    }

    /**
     * Reads the attribute `A`, if present and well-typed.
     */
    pub fn get<A: Attr>(&self) -> Option<A::Value> {
        self.get_raw(A::KEY).and_then(A::unwrap)
    }

    /**
     * Writes the attribute `A`, replacing any previous value.
     */
    pub fn set<A: Attr>(&mut self, value: A::Value) {
        self.set_raw(A::KEY, A::wrap(value));
    }

    /**
     * Reads the raw payload stored under `key`.
     */
    pub fn get_raw(&self, key: AttrKey) -> Option<&AttrValue> {
        self.entries
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|i| &self.entries[i].1)
    }

    /**
     * Writes a raw `(key, value)` pair, keeping the list sorted.
     */
    pub fn set_raw(&mut self, key: AttrKey, value: AttrValue) {
        match self.entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (key, value)),
        }
    }

    /**
     * Iterates over the `(key, value)` pairs in key order.
     */
    pub fn iter(&self) -> impl Iterator<Item = &(AttrKey, AttrValue)> {
        self.entries.iter()
    }

    /**
     * Copies every attribute from `other` into this list.
     */
    pub fn assign_from(&mut self, other: &AttrList) {
        for (key, value) in other.iter() {
            self.set_raw(*key, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_set_and_get() {
        let mut attrs = AttrList::new();

        attrs.set::<Rotation>(3);
        attrs.set::<Type>(DataType::Cipher);

        assert_eq!(attrs.get::<Rotation>(), Some(3));
        assert_eq!(attrs.get::<Type>(), Some(DataType::Cipher));
        assert!(!attrs.has::<Range>());
    }

    #[test]
    fn entries_stay_sorted() {
        let mut attrs = AttrList::new();

        attrs.set::<EncodeAtLevel>(2);
        attrs.set::<RescaleDivisor>(60);
        attrs.set::<Range>(10);

        let keys = attrs.iter().map(|(k, _)| *k).collect::<Vec<_>>();

        assert_eq!(
            keys,
            vec![RescaleDivisor::KEY, Range::KEY, EncodeAtLevel::KEY]
        );
    }

    #[test]
    fn key_value_pairing_is_checked() {
        assert!(is_valid_attr(Rotation::KEY, &AttrValue::U32(1)));
        assert!(!is_valid_attr(
            Rotation::KEY,
            &AttrValue::Type(DataType::Raw)
        ));
        assert!(!is_valid_attr(0, &AttrValue::U32(1)));
        assert!(!is_valid_attr(99, &AttrValue::U32(1)));
    }
}
