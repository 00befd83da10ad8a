//! The three-tier entity catalog
//!
//! Owns the Matchers -> Profiles -> Documents collections and runs the
//! cascading recheck when configuration changes: a document update rechecks
//! the profiles referencing it, and every profile whose effective error
//! changed pushes a recheck into the matchers referencing *it*. This is the
//! surface the external reconciliation collaborator drives.

use crate::document::{Document, Documents};
use crate::matcher::{Matcher, Matchers};
use crate::name::{Name, NameSet};
use crate::profile::{Profile, Profiles};
use std::sync::Arc;
use tracing::debug;

/// Entities whose effective error state changed during a cascade; the
/// collaborator re-reports their status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Propagation {
    pub profiles: NameSet,
    pub matchers: NameSet,
}

pub struct Catalog {
    matchers: Arc<Matchers>,
    profiles: Arc<Profiles>,
    documents: Arc<Documents>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        let documents = Arc::new(Documents::new());
        let profiles = Arc::new(Profiles::new(documents.clone()));
        let matchers = Arc::new(Matchers::new(profiles.clone()));
        Self {
            matchers,
            profiles,
            documents,
        }
    }

    pub fn matchers(&self) -> &Matchers {
        &self.matchers
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    /// Install a matcher; returns its stored validation error.
    pub fn apply_matcher(&self, matcher: Matcher) -> Option<String> {
        self.matchers.set(matcher)
    }

    pub fn delete_matcher(&self, name: &Name) {
        self.matchers.delete(name);
    }

    /// Install a profile and recheck its dependent matchers.
    pub fn apply_profile(&self, profile: Profile) -> (Option<String>, Propagation) {
        let (users, error) = self.profiles.set(profile);
        let matchers = self.matchers.recheck(&users);
        (
            error,
            Propagation {
                profiles: NameSet::new(),
                matchers,
            },
        )
    }

    pub fn delete_profile(&self, name: &Name) -> Propagation {
        let users = self.profiles.delete(name);
        Propagation {
            profiles: NameSet::new(),
            matchers: self.matchers.recheck(&users),
        }
    }

    /// Install a document and recheck dependents transitively.
    pub fn apply_document(&self, document: Document) -> Propagation {
        let users = self.documents.set(document);
        self.recheck_from_documents(users)
    }

    pub fn delete_document(&self, name: &Name) -> Propagation {
        let users = self.documents.delete(name);
        self.recheck_from_documents(users)
    }

    fn recheck_from_documents(&self, profiles: NameSet) -> Propagation {
        if profiles.is_empty() {
            return Propagation::default();
        }
        debug!(profiles = %profiles, "rechecking document users");
        let changed = self.profiles.recheck(&profiles);
        let matcher_users = self.profiles.users_of(&changed);
        let matchers = self.matchers.recheck(&matcher_users);
        Propagation {
            profiles: changed,
            matchers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Deliverable;
    use crate::selector::Selector;
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

    fn profile(name: &str, doc: &str, path: &str) -> Profile {
        Profile::new(
            Name::new("ns", name),
            None,
            None,
            vec![Deliverable::new(Name::new("ns", doc), path)],
        )
        .unwrap()
    }

    fn matcher(name: &str, profile: &str) -> Matcher {
        Matcher::new(
            Name::new("ns", name),
            Selector::everything(),
            None,
            None,
            Name::new("ns", profile),
            0,
        )
    }

    #[test]
    fn test_document_delete_cascades_to_matchers() {
        let catalog = Catalog::new();
        catalog.apply_document(doc("d1"));
        let (err, _) = catalog.apply_profile(profile("p1", "d1", "/boot.ipxe"));
        assert!(err.is_none());
        assert!(catalog.apply_matcher(matcher("m1", "p1")).is_none());
        assert!(catalog.apply_matcher(matcher("m2", "p1")).is_none());

        let propagation = catalog.delete_document(&Name::new("ns", "d1"));

        // The profile turned erroneous and every matcher pointing at it is
        // in the recheck set.
        assert!(propagation.profiles.contains(&Name::new("ns", "p1")));
        assert!(propagation.matchers.contains(&Name::new("ns", "m1")));
        assert!(propagation.matchers.contains(&Name::new("ns", "m2")));

        let p = catalog.profiles().get(&Name::new("ns", "p1")).unwrap();
        assert_eq!(p.error(), Some("document ns/d1 not found"));
        let m = catalog.matchers().get(&Name::new("ns", "m1")).unwrap();
        assert_eq!(
            m.error(),
            Some("profile ns/p1: document ns/d1 not found")
        );
    }

    #[test]
    fn test_document_restore_clears_cascade() {
        let catalog = Catalog::new();
        catalog.apply_document(doc("d1"));
        catalog.apply_profile(profile("p1", "d1", "/boot.ipxe"));
        catalog.apply_matcher(matcher("m1", "p1"));
        catalog.delete_document(&Name::new("ns", "d1"));

        let propagation = catalog.apply_document(doc("d1"));
        assert!(propagation.profiles.contains(&Name::new("ns", "p1")));
        assert!(propagation.matchers.contains(&Name::new("ns", "m1")));

        assert!(catalog
            .profiles()
            .get(&Name::new("ns", "p1"))
            .unwrap()
            .error()
            .is_none());
        assert!(catalog
            .matchers()
            .get(&Name::new("ns", "m1"))
            .unwrap()
            .error()
            .is_none());
    }

    #[test]
    fn test_unrelated_document_change_propagates_nothing() {
        let catalog = Catalog::new();
        catalog.apply_document(doc("d1"));
        catalog.apply_profile(profile("p1", "d1", "/x"));
        catalog.apply_matcher(matcher("m1", "p1"));

        let propagation = catalog.apply_document(doc("unrelated"));
        assert_eq!(propagation, Propagation::default());
    }

    #[test]
    fn test_profile_apply_rechecks_its_matchers() {
        let catalog = Catalog::new();
        catalog.apply_matcher(matcher("m1", "p1"));
        assert!(catalog
            .matchers()
            .get(&Name::new("ns", "m1"))
            .unwrap()
            .error()
            .is_some());

        catalog.apply_document(doc("d1"));
        let (err, propagation) = catalog.apply_profile(profile("p1", "d1", "/x"));
        assert!(err.is_none());
        assert!(propagation.matchers.contains(&Name::new("ns", "m1")));
        assert!(catalog
            .matchers()
            .get(&Name::new("ns", "m1"))
            .unwrap()
            .error()
            .is_none());
    }
}
