//! Sorted, deduplicated ordinal sets.
//!
//! Part memberships, induced-part lists, and bucket signatures are all small
//! sets of ordinals. Keeping them as sorted vectors makes equality a slice
//! comparison and lookup a binary search.

use std::fmt;
use std::iter::FromIterator;
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A sorted, deduplicated set of ordinals backed by a `Vec`.
///
/// Two sets with the same members compare equal regardless of the order in
/// which members were inserted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrdinalSet<T: Ord + Copy>(Vec<T>);

impl<T: Ord + Copy> Default for OrdinalSet<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Ord + Copy> OrdinalSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set from arbitrary (unsorted, duplicated) members.
    #[must_use]
    pub fn from_unsorted(mut members: Vec<T>) -> Self {
        members.sort_unstable();
        members.dedup();
        Self(members)
    }

    /// Returns the members as a sorted slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Checks membership.
    #[must_use]
    pub fn contains(&self, value: T) -> bool {
        self.0.binary_search(&value).is_ok()
    }

    /// Inserts a member. Returns true if it was not already present.
    pub fn insert(&mut self, value: T) -> bool {
        match self.0.binary_search(&value) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, value);
                true
            }
        }
    }

    /// Removes a member. Returns true if it was present.
    pub fn remove(&mut self, value: T) -> bool {
        match self.0.binary_search(&value) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Inserts every member of `other`.
    pub fn extend_from(&mut self, other: &OrdinalSet<T>) {
        for &value in other.iter() {
            self.insert(value);
        }
    }

    /// Returns the members of `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &OrdinalSet<T>) -> OrdinalSet<T> {
        Self(
            self.0
                .iter()
                .copied()
                .filter(|v| !other.contains(*v))
                .collect(),
        )
    }

    /// Checks if every member of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &OrdinalSet<T>) -> bool {
        self.0.iter().all(|v| other.contains(*v))
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Consumes the set and returns the sorted members.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T: Ord + Copy> Deref for OrdinalSet<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T: Ord + Copy> FromIterator<T> for OrdinalSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl<T: Ord + Copy> From<Vec<T>> for OrdinalSet<T> {
    fn from(members: Vec<T>) -> Self {
        Self::from_unsorted(members)
    }
}

impl<'a, T: Ord + Copy> IntoIterator for &'a OrdinalSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: Ord + Copy + fmt::Debug> fmt::Debug for OrdinalSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}
