//! Profiles and their collection
//!
//! A profile binds request paths to documents through deliverables. The
//! collection validates document references, owns the reverse edges from
//! profiles to the matchers using them, and rechecks itself when documents
//! change underneath.

use crate::document::Documents;
use crate::element::Element;
use crate::error::ConfigError;
use crate::mapping::Mapping;
use crate::name::{Name, NameSet};
use crate::value::Values;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Binding of a document to a literal path or a path pattern.
#[derive(Debug, Clone)]
pub struct Deliverable {
    document: Name,
    path: String,
    pattern: Option<Regex>,
}

impl Deliverable {
    /// Literal-path deliverable.
    pub fn new(document: Name, path: impl Into<String>) -> Self {
        Self {
            document,
            path: path.into(),
            pattern: None,
        }
    }

    /// Pattern deliverable; the pattern is an anchored regular expression
    /// evaluated against the whole request path.
    pub fn by_pattern(document: Name, pattern: &str) -> Result<Self, String> {
        let compiled =
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| e.to_string())?;
        Ok(Self {
            document,
            path: pattern.to_string(),
            pattern: Some(compiled),
        })
    }

    pub fn document(&self) -> &Name {
        &self.document
    }

    /// The literal path, or the pattern text for pattern deliverables.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_pattern(&self) -> bool {
        self.pattern.is_some()
    }

    pub fn matches_path(&self, path: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(path),
            None => self.path == path,
        }
    }
}

/// Named set of path-to-document bindings.
#[derive(Debug, Clone)]
pub struct Profile {
    element: Element,
    deliverables: Vec<Deliverable>,
}

impl Profile {
    /// Validates that entries are complete and no two share a path.
    pub fn new(
        name: Name,
        mapping: Option<Mapping>,
        values: Option<Values>,
        deliverables: Vec<Deliverable>,
    ) -> Result<Self, ConfigError> {
        let mut seen: BTreeMap<&str, &Deliverable> = BTreeMap::new();
        for (index, d) in deliverables.iter().enumerate() {
            if d.document.name().trim().is_empty() {
                return Err(ConfigError::EmptyDocumentName { index });
            }
            if d.path.trim().is_empty() {
                return Err(ConfigError::EmptyPath { index });
            }
            if let Some(old) = seen.insert(d.path.as_str(), d) {
                return Err(ConfigError::DuplicatePath {
                    path: d.path.clone(),
                    old: old.document.clone(),
                    new: d.document.clone(),
                });
            }
        }
        Ok(Self {
            element: Element::new(name, values, mapping),
            deliverables,
        })
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

    /// All referenced document names.
    pub fn documents(&self) -> NameSet {
        self.deliverables
            .iter()
            .map(|d| d.document.clone())
            .collect()
    }

    /// Exact-path lookup first; pattern deliverables in declaration order
    /// after that, first match wins.
    pub fn deliverable_for_path(&self, path: &str) -> Option<&Deliverable> {
        self.deliverables
            .iter()
            .find(|d| !d.is_pattern() && d.path == path)
            .or_else(|| {
                self.deliverables
                    .iter()
                    .find(|d| d.is_pattern() && d.matches_path(path))
            })
    }
}

#[derive(Default)]
struct ProfilesInner {
    elements: BTreeMap<Name, Arc<Profile>>,
    users: BTreeMap<Name, NameSet>,
}

/// Collection of profiles with reverse edges to dependent matchers.
pub struct Profiles {
    documents: Arc<Documents>,
    inner: RwLock<ProfilesInner>,
}

impl Profiles {
    pub fn new(documents: Arc<Documents>) -> Self {
        Self {
            documents,
            inner: RwLock::new(ProfilesInner::default()),
        }
    }

    fn check(&self, profile: &Profile) -> Option<String> {
        for name in profile.documents().iter() {
            match self.documents.get(name) {
                Some(doc) => {
                    if let Some(e) = doc.error() {
                        return Some(format!("document {}: {}", name, e));
                    }
                }
                None => return Some(format!("document {} not found", name)),
            }
        }
        None
    }

    pub fn get(&self, name: &Name) -> Option<Arc<Profile>> {
        self.inner
            .read()
            .expect("profiles lock poisoned")
            .elements
            .get(name)
            .cloned()
    }

    /// Replace or insert. Diffs the document-reference set against any
    /// previous version, adjusts the reverse edges in the documents
    /// collection, and validates every reference. Returns the matchers
    /// currently using this profile together with the stored error.
    pub fn set(&self, mut profile: Profile) -> (NameSet, Option<String>) {
        let mut inner = self.inner.write().expect("profiles lock poisoned");
        let name = profile.name().clone();

        let referenced = profile.documents();
        let (added, removed) = match inner.elements.get(&name) {
            Some(old) => old.documents().diff(&referenced),
            None => (referenced.clone(), NameSet::new()),
        };
        self.documents.delete_users_for_all(&removed, &name);
        self.documents.add_users_for_all(&added, &name);

        let error = self.check(&profile);
        profile.element.set_error(error.clone());
        inner.elements.insert(name.clone(), Arc::new(profile));

        let users = inner.users.get(&name).cloned().unwrap_or_default();
        (users, error)
    }

    /// Remove; drops the reverse edges this profile held in the documents
    /// collection and returns the dependent matchers.
    pub fn delete(&self, name: &Name) -> NameSet {
        let mut inner = self.inner.write().expect("profiles lock poisoned");
        if let Some(old) = inner.elements.remove(name) {
            self.documents
                .delete_users_for_all(&old.documents(), name);
        }
        inner.users.get(name).cloned().unwrap_or_default()
    }

    /// Recompute the error of each named profile against the current
    /// document state; returns the subset whose error message changed.
    pub fn recheck(&self, set: &NameSet) -> NameSet {
        let mut inner = self.inner.write().expect("profiles lock poisoned");
        let mut changed = NameSet::new();
        for name in set.iter() {
            let Some(entry) = inner.elements.get_mut(name) else {
                continue;
            };
            let error = self.check(entry);
            if Arc::make_mut(entry).element.recheck(error) {
                changed.add(name.clone());
            }
        }
        changed
    }

    pub(crate) fn add_user(&self, name: &Name, user: Name) {
        let mut inner = self.inner.write().expect("profiles lock poisoned");
        inner.users.entry(name.clone()).or_default().add(user);
    }

    pub(crate) fn delete_user(&self, name: &Name, user: &Name) {
        let mut inner = self.inner.write().expect("profiles lock poisoned");
        if let Some(set) = inner.users.get_mut(name) {
            set.remove(user);
            if set.is_empty() {
                inner.users.remove(name);
            }
        }
    }

    /// Union of the matcher sets using the named profiles.
    pub fn users_of(&self, names: &NameSet) -> NameSet {
        let inner = self.inner.read().expect("profiles lock poisoned");
        let mut out = NameSet::new();
        for name in names.iter() {
            if let Some(set) = inner.users.get(name) {
                out.extend_from(set);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::source::{DataSource, MIME_TEXT};

    fn doc(name: &str) -> Document {
        Document::new(
            Name::new("ns", name),
            None,
            None,
            Arc::new(DataSource::text(MIME_TEXT, "x")),
            false,
        )
    }

    fn profile(name: &str, deliverables: Vec<Deliverable>) -> Profile {
        Profile::new(Name::new("ns", name), None, None, deliverables).unwrap()
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let err = Profile::new(
            Name::new("ns", "p"),
            None,
            None,
            vec![
                Deliverable::new(Name::new("ns", "a"), "/boot.ipxe"),
                Deliverable::new(Name::new("ns", "b"), "/boot.ipxe"),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate deliverable"));
    }

    #[test]
    fn test_deliverable_for_path_prefers_exact() {
        let p = profile(
            "p",
            vec![
                Deliverable::by_pattern(Name::new("ns", "wild"), ".*\\.ipxe").unwrap(),
                Deliverable::new(Name::new("ns", "exact"), "boot.ipxe"),
            ],
        );

        assert_eq!(
            p.deliverable_for_path("boot.ipxe").unwrap().document(),
            &Name::new("ns", "exact")
        );
        assert_eq!(
            p.deliverable_for_path("other.ipxe").unwrap().document(),
            &Name::new("ns", "wild")
        );
        assert!(p.deliverable_for_path("cloud-init.yaml").is_none());
    }

    #[test]
    fn test_pattern_is_anchored() {
        let d = Deliverable::by_pattern(Name::new("ns", "d"), "boot").unwrap();
        assert!(d.matches_path("boot"));
        assert!(!d.matches_path("boot.ipxe"));
        assert!(!d.matches_path("reboot"));
    }

    #[test]
    fn test_pattern_declaration_order_wins() {
        let p = profile(
            "p",
            vec![
                Deliverable::by_pattern(Name::new("ns", "first"), "a.*").unwrap(),
                Deliverable::by_pattern(Name::new("ns", "second"), "ab.*").unwrap(),
            ],
        );
        assert_eq!(
            p.deliverable_for_path("abc").unwrap().document(),
            &Name::new("ns", "first")
        );
    }

    #[test]
    fn test_set_validates_references() {
        let documents = Arc::new(Documents::new());
        let profiles = Profiles::new(documents.clone());

        let p = profile(
            "p",
            vec![Deliverable::new(Name::new("ns", "missing"), "/x")],
        );
        let (_, err) = profiles.set(p);
        assert_eq!(err.as_deref(), Some("document ns/missing not found"));

        documents.set(doc("missing"));
        let changed =
            profiles.recheck(&[Name::new("ns", "p")].into_iter().collect());
        assert!(changed.contains(&Name::new("ns", "p")));
        assert!(profiles.get(&Name::new("ns", "p")).unwrap().error().is_none());

        // A second recheck reports no change.
        let changed =
            profiles.recheck(&[Name::new("ns", "p")].into_iter().collect());
        assert!(changed.is_empty());
    }

    #[test]
    fn test_set_diffs_reverse_edges() {
        let documents = Arc::new(Documents::new());
        let profiles = Profiles::new(documents.clone());
        documents.set(doc("a"));
        documents.set(doc("b"));

        let p = profile("p", vec![Deliverable::new(Name::new("ns", "a"), "/x")]);
        profiles.set(p);
        assert!(documents
            .delete(&Name::new("ns", "a"))
            .contains(&Name::new("ns", "p")));
        documents.set(doc("a"));
        // Re-register the edge dropped by the delete above.
        documents.add_user(&Name::new("ns", "a"), Name::new("ns", "p"));

        // Re-pointing the profile from a to b moves the edge.
        let p = profile("p", vec![Deliverable::new(Name::new("ns", "b"), "/x")]);
        profiles.set(p);
        assert!(documents.delete(&Name::new("ns", "a")).is_empty());
        assert!(documents
            .delete(&Name::new("ns", "b"))
            .contains(&Name::new("ns", "p")));
    }

    #[test]
    fn test_delete_returns_users() {
        let documents = Arc::new(Documents::new());
        let profiles = Profiles::new(documents);

        profiles.set(profile("p", vec![]));
        profiles.add_user(&Name::new("ns", "p"), Name::new("ns", "m1"));

        let users = profiles.delete(&Name::new("ns", "p"));
        assert!(users.contains(&Name::new("ns", "m1")));
    }
}
