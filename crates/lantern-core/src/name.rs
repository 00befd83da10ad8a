//! Entity identity and set algebra
//!
//! Every configured entity (matcher, profile, document) is addressed by a
//! two-part [`Name`]. [`NameSet`] is the currency of the dependency graph:
//! reverse edges, recheck fronts and diffs are all expressed as name sets.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Two-part entity identity: namespace plus local name.
///
/// Ordered by its string form `"namespace/name"`. Neither part may contain
/// `/`; record construction enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    namespace: String,
    name: String,
}

impl Name {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        // String-form order without allocating the joined form.
        self.namespace
            .chars()
            .chain(std::iter::once('/'))
            .chain(self.name.chars())
            .cmp(
                other
                    .namespace
                    .chars()
                    .chain(std::iter::once('/'))
                    .chain(other.name.chars()),
            )
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered set of entity names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet(BTreeSet<Name>);

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert; returns false if already present.
    pub fn add(&mut self, name: Name) -> bool {
        self.0.insert(name)
    }

    /// Remove; returns true if it was present.
    pub fn remove(&mut self, name: &Name) -> bool {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Name> {
        self.0.iter()
    }

    pub fn extend_from(&mut self, other: &NameSet) {
        for n in other.iter() {
            self.0.insert(n.clone());
        }
    }

    /// Diff against a newer set.
    ///
    /// Returns `(added, removed)`: names present only in `newer`, and names
    /// present only in `self`.
    pub fn diff(&self, newer: &NameSet) -> (NameSet, NameSet) {
        let added = newer
            .iter()
            .filter(|n| !self.contains(n))
            .cloned()
            .collect();
        let removed = self
            .iter()
            .filter(|n| !newer.contains(n))
            .cloned()
            .collect();
        (added, removed)
    }
}

impl fmt::Display for NameSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", n)?;
        }
        write!(f, "]")
    }
}

impl FromIterator<Name> for NameSet {
    fn from_iter<T: IntoIterator<Item = Name>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for NameSet {
    type Item = Name;
    type IntoIter = std::collections::btree_set::IntoIter<Name>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
