//! Documents and their collection
//!
//! A document pairs a content source with layered configuration values and
//! an optional mapping. The collection owns the reverse edges to the
//! profiles that reference each document, so deletions can push a recheck
//! front up the dependency graph.

use crate::element::Element;
use crate::mapping::Mapping;
use crate::name::{Name, NameSet};
use crate::source::Source;
use crate::value::Values;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Named pairing of a content source with values and a mapping.
#[derive(Debug, Clone)]
pub struct Document {
    element: Element,
    source: Arc<dyn Source>,
    plain: bool,
}

impl Document {
    pub fn new(
        name: Name,
        mapping: Option<Mapping>,
        values: Option<Values>,
        source: Arc<dyn Source>,
        plain: bool,
    ) -> Self {
        Self {
            element: Element::new(name, values, mapping),
            source,
            plain,
        }
    }

    pub fn name(&self) -> &Name {
        self.element.name()
    }

    pub fn error(&self) -> Option<&str> {
        self.element.error()
    }

    pub fn values(&self) -> Option<&Values> {
        self.element.values()
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        self.element.mapping()
    }

    pub fn source(&self) -> Arc<dyn Source> {
        self.source.clone()
    }

    /// Plain documents bypass the mapping chain and rendering entirely.
    pub fn plain(&self) -> bool {
        self.plain
    }
}

#[derive(Default)]
struct DocumentsInner {
    elements: BTreeMap<Name, Arc<Document>>,
    users: BTreeMap<Name, NameSet>,
}

/// Collection of documents plus reverse edges to dependent profiles.
#[derive(Default)]
pub struct Documents {
    inner: RwLock<DocumentsInner>,
}

impl Documents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &Name) -> Option<Arc<Document>> {
        self.inner
            .read()
            .expect("documents lock poisoned")
            .elements
            .get(name)
            .cloned()
    }

    /// Replace or insert; returns the profiles referencing this document,
    /// which need a recheck.
    pub fn set(&self, document: Document) -> NameSet {
        let mut inner = self.inner.write().expect("documents lock poisoned");
        let name = document.name().clone();
        inner.elements.insert(name.clone(), Arc::new(document));
        inner.users.get(&name).cloned().unwrap_or_default()
    }

    /// Remove; returns the dependent profiles for cascading recheck.
    pub fn delete(&self, name: &Name) -> NameSet {
        let mut inner = self.inner.write().expect("documents lock poisoned");
        inner.elements.remove(name);
        inner.users.get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn add_user(&self, name: &Name, user: Name) {
        let mut inner = self.inner.write().expect("documents lock poisoned");
        inner.users.entry(name.clone()).or_default().add(user);
    }

    pub(crate) fn delete_user(&self, name: &Name, user: &Name) {
        let mut inner = self.inner.write().expect("documents lock poisoned");
        if let Some(set) = inner.users.get_mut(name) {
            set.remove(user);
            if set.is_empty() {
                inner.users.remove(name);
            }
        }
    }

    pub(crate) fn add_users_for_all(&self, names: &NameSet, user: &Name) {
        for name in names.iter() {
            self.add_user(name, user.clone());
        }
    }

    pub(crate) fn delete_users_for_all(&self, names: &NameSet, user: &Name) {
        for name in names.iter() {
            self.delete_user(name, user);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("documents lock poisoned")
            .elements
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
