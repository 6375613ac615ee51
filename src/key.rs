//! Access keys: a single key or a multi-segment path.

use std::fmt::Debug;
use std::hash::Hash;

use smallvec::SmallVec;

use crate::error::{AddressError, Result};

/// Bounds every key type must satisfy.
pub trait DictKey: Hash + Eq + Clone + Debug {}

impl<T: Hash + Eq + Clone + Debug> DictKey for T {}

/// Inline capacity for path segments.
const INLINE_SEGMENTS: usize = 4;

/// A key addressing one level (`Single`) or several levels (`Path`) of a tree.
///
/// Lookups treat a one-segment path like a single key. Assignment differs:
/// a path never adds an entry under a locked node, while a single key is a
/// plain map insert.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key<K> {
    Single(K),
    Path(SmallVec<[K; INLINE_SEGMENTS]>),
}

impl<K> Key<K> {
    pub fn single(key: K) -> Self {
        Key::Single(key)
    }

    pub fn path(segments: impl IntoIterator<Item = K>) -> Self {
        Key::Path(segments.into_iter().collect())
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        match self {
            Key::Single(_) => 1,
            Key::Path(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Segments in order; fails for an empty path.
    pub fn segments(&self) -> Result<&[K]> {
        match self {
            Key::Single(k) => Ok(std::slice::from_ref(k)),
            Key::Path(p) if p.is_empty() => Err(AddressError::EmptyPath.into()),
            Key::Path(p) => Ok(p.as_slice()),
        }
    }
}

impl<K> From<Vec<K>> for Key<K> {
    fn from(segments: Vec<K>) -> Self {
        Key::Path(SmallVec::from_vec(segments))
    }
}

impl<K, const N: usize> From<[K; N]> for Key<K> {
    fn from(segments: [K; N]) -> Self {
        Key::path(segments)
    }
}

impl<K: Clone> From<&[K]> for Key<K> {
    fn from(segments: &[K]) -> Self {
        Key::Path(SmallVec::from(segments))
    }
}

impl From<&str> for Key<String> {
    fn from(key: &str) -> Self {
        Key::Single(key.to_owned())
    }
}

impl From<String> for Key<String> {
    fn from(key: String) -> Self {
        Key::Single(key)
    }
}

impl<const N: usize> From<[&str; N]> for Key<String> {
    fn from(segments: [&str; N]) -> Self {
        Key::path(segments.into_iter().map(str::to_owned))
    }
}

impl From<Vec<&str>> for Key<String> {
    fn from(segments: Vec<&str>) -> Self {
        Key::path(segments.into_iter().map(str::to_owned))
    }
}

macro_rules! single_key_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key<$t> {
                fn from(key: $t) -> Self {
                    Key::Single(key)
                }
            }
        )*
    };
}

single_key_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);
