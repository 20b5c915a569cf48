//! Cache Values
//!
//! The union of everything a tier can hold: scalars, ordered arrays (arbitrarily
//! nested) and [`Cacheable`] entities.

use std::fmt;
use std::sync::Arc;

use crate::traits::{Cacheable, DynCacheable};

/// A value stored in, or read from, the cache
#[derive(Debug, Clone)]
pub enum CacheValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(CacheArray),
    Entity(Arc<dyn DynCacheable>),
}

impl CacheValue {
    /// Wrap an application entity
    pub fn entity<T: Cacheable>(entity: T) -> Self {
        Self::Entity(Arc::new(entity))
    }

    /// Borrow the entity if this value holds one of type `T`
    #[must_use]
    pub fn as_entity<T: Cacheable>(&self) -> Option<&T> {
        match self {
            Self::Entity(entity) => entity.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats, and integers widened to `f64`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> Option<&CacheArray> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for CacheValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            // Structural: same type and same persisted state
            (Self::Entity(a), Self::Entity(b)) => {
                a.type_name() == b.type_name()
                    && matches!(
                        (a.encode_entity(), b.encode_entity()),
                        (Ok(x), Ok(y)) if x == y
                    )
            }
            _ => false,
        }
    }
}

impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for CacheValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for CacheValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for CacheValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for CacheValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<CacheArray> for CacheValue {
    fn from(v: CacheArray) -> Self {
        Self::Array(v)
    }
}

impl<T: Into<CacheValue>> From<Vec<T>> for CacheValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(CacheArray::list(v))
    }
}

impl<T: Into<CacheValue>> From<Option<T>> for CacheValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Key of a [`CacheArray`] entry
///
/// Converting a string that is a canonical integer (`"7"`, not `"07"`) yields an
/// `Index`, so keys survive the trip through JSON object keys unchanged. A
/// [`CacheArray`] applies the same rule to a `Name` built directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArrayKey {
    Index(i64),
    Name(String),
}

impl ArrayKey {
    /// `Name("7")` becomes `Index(7)`; every other key is returned as is
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::Name(name) => Self::from(name),
            index @ Self::Index(_) => index,
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(v: i64) -> Self {
        Self::Index(v)
    }
}

impl From<usize> for ArrayKey {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or_else(|_| Self::Name(v.to_string()), Self::Index)
    }
}

impl From<&str> for ArrayKey {
    fn from(v: &str) -> Self {
        match v.parse::<i64>() {
            Ok(n) if n.to_string() == v => Self::Index(n),
            _ => Self::Name(v.to_string()),
        }
    }
}

impl From<String> for ArrayKey {
    fn from(v: String) -> Self {
        Self::from(v.as_str())
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

/// Ordered map with integer or string keys, values of any [`CacheValue`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheArray {
    entries: Vec<(ArrayKey, CacheValue)>,
}

impl CacheArray {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index-keyed list `0..n`
    pub fn list<T: Into<CacheValue>>(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            entries: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (ArrayKey::from(i), v.into()))
                .collect(),
        }
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn insert(&mut self, key: impl Into<ArrayKey>, value: impl Into<CacheValue>) {
        let key = key.into().normalized();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Append under the next integer key (one past the largest index so far)
    pub fn push(&mut self, value: impl Into<CacheValue>) {
        let next = self
            .entries
            .iter()
            .filter_map(|(k, _)| match k {
                ArrayKey::Index(i) => Some(*i),
                ArrayKey::Name(_) => None,
            })
            .max()
            .map_or(0, |max| max.saturating_add(1));
        self.entries.push((ArrayKey::Index(next), value.into()));
    }

    /// Builder-style [`CacheArray::insert`]
    #[must_use]
    pub fn with(mut self, key: impl Into<ArrayKey>, value: impl Into<CacheValue>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &ArrayKey) -> Option<&CacheValue> {
        let key = key.clone().normalized();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ArrayKey, CacheValue)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &CacheValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// `true` when keys are exactly `0, 1, .., n-1` in order
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, (k, _))| matches!(k, ArrayKey::Index(idx) if usize::try_from(*idx).is_ok_and(|idx| idx == i)))
    }
}

impl<T: Into<CacheValue>> FromIterator<T> for CacheArray {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::list(iter)
    }
}

impl IntoIterator for CacheArray {
    type Item = (ArrayKey, CacheValue);
    type IntoIter = std::vec::IntoIter<(ArrayKey, CacheValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
