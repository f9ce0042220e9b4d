//! Attribute tree: the schema-shaped, language-neutral view of a resource.
//!
//! A [`Block`] is an ordered set of named slots. Absent optional fields are
//! simply not present in the block; there is no null placeholder, so "unset"
//! and "empty" stay distinguishable.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as Json;

/// Leaf value of the tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self { Scalar::Str(s) => Some(s), _ => None }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self { Scalar::Int(i) => Some(*i), _ => None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Scalar::Bool(b) => Some(*b), _ => None }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Scalar::Str(s) => Json::String(s.clone()),
            Scalar::Int(i) => Json::from(*i),
            Scalar::Bool(b) => Json::Bool(*b),
        }
    }
}

impl From<&str> for Scalar { fn from(v: &str) -> Self { Scalar::Str(v.to_string()) } }
impl From<String> for Scalar { fn from(v: String) -> Self { Scalar::Str(v) } }
impl From<i64> for Scalar { fn from(v: i64) -> Self { Scalar::Int(v) } }
impl From<i32> for Scalar { fn from(v: i32) -> Self { Scalar::Int(i64::from(v)) } }
impl From<bool> for Scalar { fn from(v: bool) -> Self { Scalar::Bool(v) } }

/// A slot value. Sets are unordered and deduplicated; maps are string to string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Scalar(Scalar),
    Set(BTreeSet<Scalar>),
    Map(BTreeMap<String, String>),
    /// Single nested block (0..1 fields).
    Block(Block),
    /// Repeated nested blocks, order preserved.
    BlockList(Vec<Block>),
}

impl AttrValue {
    pub fn string(v: impl Into<String>) -> Self { AttrValue::Scalar(Scalar::Str(v.into())) }

    pub fn int(v: i64) -> Self { AttrValue::Scalar(Scalar::Int(v)) }

    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::Set(items.into_iter().map(|s| Scalar::Str(s.into())).collect())
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self { AttrValue::Scalar(s) => Some(s), _ => None }
    }

    pub fn as_str(&self) -> Option<&str> { self.as_scalar().and_then(Scalar::as_str) }

    pub fn as_int(&self) -> Option<i64> { self.as_scalar().and_then(Scalar::as_int) }

    pub fn as_bool(&self) -> Option<bool> { self.as_scalar().and_then(Scalar::as_bool) }

    pub fn as_set(&self) -> Option<&BTreeSet<Scalar>> {
        match self { AttrValue::Set(s) => Some(s), _ => None }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self { AttrValue::Map(m) => Some(m), _ => None }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self { AttrValue::Block(b) => Some(b), _ => None }
    }

    pub fn as_block_list(&self) -> Option<&[Block]> {
        match self { AttrValue::BlockList(l) => Some(l), _ => None }
    }

    /// True for the zero value of each shape: `""`, `0`, `false`, an empty
    /// collection, or a block whose every slot is itself zero.
    pub fn is_zero(&self) -> bool {
        match self {
            AttrValue::Scalar(Scalar::Str(s)) => s.is_empty(),
            AttrValue::Scalar(Scalar::Int(i)) => *i == 0,
            AttrValue::Scalar(Scalar::Bool(b)) => !b,
            AttrValue::Set(s) => s.is_empty(),
            AttrValue::Map(m) => m.is_empty(),
            AttrValue::Block(b) => b.iter().all(|(_, v)| v.is_zero()),
            AttrValue::BlockList(l) => l.is_empty(),
        }
    }

    /// Plain JSON rendering: sets become arrays (in set order), blocks become objects.
    pub fn to_json(&self) -> Json {
        match self {
            AttrValue::Scalar(s) => s.to_json(),
            AttrValue::Set(set) => Json::Array(set.iter().map(Scalar::to_json).collect()),
            AttrValue::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), Json::String(v.clone()))).collect()),
            AttrValue::Block(b) => b.to_json(),
            AttrValue::BlockList(l) => Json::Array(l.iter().map(Block::to_json).collect()),
        }
    }
}

impl From<Scalar> for AttrValue { fn from(v: Scalar) -> Self { AttrValue::Scalar(v) } }
impl From<Block> for AttrValue { fn from(v: Block) -> Self { AttrValue::Block(v) } }
impl From<BTreeMap<String, String>> for AttrValue { fn from(v: BTreeMap<String, String>) -> Self { AttrValue::Map(v) } }

/// Named slots of one tree level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    slots: BTreeMap<String, AttrValue>,
}

/// Shared empty block for lookups that fall back when a slot is absent.
pub static EMPTY: Block = Block::new();

impl Block {
    pub const fn new() -> Self { Self { slots: BTreeMap::new() } }

    /// Builder-style insert, handy for literals in tests and translators.
    pub fn with(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.slots.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> { self.slots.get(key) }

    pub fn contains(&self, key: &str) -> bool { self.slots.contains_key(key) }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.slots.keys().map(String::as_str) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn str(&self, key: &str) -> Option<&str> { self.get(key).and_then(AttrValue::as_str) }

    pub fn int(&self, key: &str) -> Option<i64> { self.get(key).and_then(AttrValue::as_int) }

    pub fn bool(&self, key: &str) -> Option<bool> { self.get(key).and_then(AttrValue::as_bool) }

    pub fn set(&self, key: &str) -> Option<&BTreeSet<Scalar>> { self.get(key).and_then(AttrValue::as_set) }

    pub fn map(&self, key: &str) -> Option<&BTreeMap<String, String>> { self.get(key).and_then(AttrValue::as_map) }

    pub fn block(&self, key: &str) -> Option<&Block> { self.get(key).and_then(AttrValue::as_block) }

    /// Repeated blocks under `key`; empty when absent or of another shape.
    pub fn blocks(&self, key: &str) -> &[Block] {
        self.get(key).and_then(AttrValue::as_block_list).unwrap_or(&[])
    }

    /// Slot-wise [`equivalent`] over the union of both key sets.
    pub fn equivalent(&self, other: &Block) -> bool {
        self.keys().chain(other.keys()).all(|k| equivalent(self.get(k), other.get(k)))
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.slots.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }
}

/// Equality as the server sees it: an absent slot and a zero value are the
/// same thing, since zero values are omitted from the wire.
pub fn equivalent(a: Option<&AttrValue>, b: Option<&AttrValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) => v.is_zero(),
        (Some(AttrValue::Block(x)), Some(AttrValue::Block(y))) => x.equivalent(y),
        (Some(AttrValue::BlockList(x)), Some(AttrValue::BlockList(y))) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| p.equivalent(q))
        }
        (Some(x), Some(y)) => x == y || (x.is_zero() && y.is_zero()),
    }
}

impl FromIterator<(String, AttrValue)> for Block {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        Self { slots: iter.into_iter().collect() }
    }
}
