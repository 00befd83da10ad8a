//! Matchers and their collection
//!
//! A matcher pairs a label selector and a priority weight with a target
//! profile. Matching a request returns every accepting matcher ordered by
//! priority: higher weight first, ties broken by ascending name.

use crate::element::Element;
use crate::mapping::Mapping;
use crate::name::{Name, NameSet};
use crate::profile::Profiles;
use crate::selector::{Labels, Selector};
use crate::value::Values;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Rule binding a selector and weight to a profile.
#[derive(Clone)]
pub struct Matcher {
    element: Element,
    selector: Selector,
    weight: i32,
    profile: Name,
}

impl Matcher {
    pub fn new(
        name: Name,
        selector: Selector,
        mapping: Option<Mapping>,
        values: Option<Values>,
        profile: Name,
        weight: i32,
    ) -> Self {
        Self {
            element: Element::new(name, values, mapping),
            selector,
            weight,
            profile,
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

    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn profile_name(&self) -> &Name {
        &self.profile
    }

    pub fn matches(&self, labels: &dyn Labels) -> bool {
        self.selector.matches(labels)
    }

    /// Priority order: higher weight wins, then the smaller name.
    pub fn prefer_over(&self, other: &Matcher) -> bool {
        self.weight > other.weight
            || (self.weight == other.weight && self.name() < other.name())
    }
}

/// Collection of matchers; validates profile references downward.
pub struct Matchers {
    profiles: Arc<Profiles>,
    inner: RwLock<BTreeMap<Name, Arc<Matcher>>>,
}

impl Matchers {
    pub fn new(profiles: Arc<Profiles>) -> Self {
        Self {
            profiles,
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    fn check(&self, matcher: &Matcher) -> Option<String> {
        match self.profiles.get(matcher.profile_name()) {
            Some(profile) => profile
                .error()
                .map(|e| format!("profile {}: {}", profile.name(), e)),
            None => Some(format!("profile {} not found", matcher.profile_name())),
        }
    }

    pub fn get(&self, name: &Name) -> Option<Arc<Matcher>> {
        self.inner
            .read()
            .expect("matchers lock poisoned")
            .get(name)
            .cloned()
    }

    /// Replace or insert. Re-points the reverse edge in the profiles
    /// collection when the profile reference changed and immediately
    /// revalidates it. The result is stored as the matcher's error and
    /// returned; an erroneous matcher is kept, not rejected.
    pub fn set(&self, mut matcher: Matcher) -> Option<String> {
        let mut inner = self.inner.write().expect("matchers lock poisoned");
        let name = matcher.name().clone();

        if let Some(old) = inner.get(&name) {
            if old.profile_name() != matcher.profile_name() {
                self.profiles.delete_user(old.profile_name(), &name);
            }
        }
        self.profiles.add_user(matcher.profile_name(), name.clone());

        let error = self.check(&matcher);
        matcher.element.set_error(error.clone());
        inner.insert(name, Arc::new(matcher));
        error
    }

    /// Remove the matcher and its reverse edge.
    pub fn delete(&self, name: &Name) {
        let mut inner = self.inner.write().expect("matchers lock poisoned");
        if let Some(old) = inner.remove(name) {
            self.profiles.delete_user(old.profile_name(), name);
        }
    }

    /// All matchers whose selector accepts the labels, in priority order.
    pub fn matching(&self, labels: &dyn Labels) -> Vec<Arc<Matcher>> {
        let inner = self.inner.read().expect("matchers lock poisoned");
        let mut found: Vec<Arc<Matcher>> = inner
            .values()
            .filter(|m| m.matches(labels))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.weight()
                .cmp(&a.weight())
                .then_with(|| a.name().cmp(b.name()))
        });
        found
    }

    /// Recompute each named matcher's error against the current profile
    /// state; returns the subset whose error message changed.
    pub fn recheck(&self, set: &NameSet) -> NameSet {
        let mut inner = self.inner.write().expect("matchers lock poisoned");
        let mut changed = NameSet::new();
        for name in set.iter() {
            let Some(entry) = inner.get_mut(name) else {
                continue;
            };
            let error = self.check(entry);
            if Arc::make_mut(entry).element.recheck(error) {
                changed.add(name.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Documents;
    use crate::metadata::MetaData;
    use crate::value::Value;

    fn selector(pairs: &[(&str, &str)]) -> Selector {
        let labels = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Selector::compile(&labels, &[]).unwrap()
    }

    fn matcher(name: &str, sel: Selector, profile: &str, weight: i32) -> Matcher {
        Matcher::new(
            Name::new("ns", name),
            sel,
            None,
            None,
            Name::new("ns", profile),
            weight,
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> MetaData {
        let mut md = MetaData::new();
        for (k, v) in pairs {
            md.insert(*k, Value::from(*v));
        }
        md
    }

    fn collections() -> (Arc<Documents>, Arc<Profiles>, Matchers) {
        let documents = Arc::new(Documents::new());
        let profiles = Arc::new(Profiles::new(documents.clone()));
        let matchers = Matchers::new(profiles.clone());
        (documents, profiles, matchers)
    }

    fn empty_profile(profiles: &Profiles, name: &str) {
        let p =
            crate::profile::Profile::new(Name::new("ns", name), None, None, vec![]).unwrap();
        profiles.set(p);
    }

    #[test]
    fn test_set_flags_dangling_profile() {
        let (_docs, profiles, matchers) = collections();

        let err = matchers.set(matcher("m", selector(&[]), "missing", 0));
        assert_eq!(err.as_deref(), Some("profile ns/missing not found"));
        // Kept despite the error.
        assert!(matchers.get(&Name::new("ns", "m")).is_some());

        empty_profile(&profiles, "missing");
        let changed = matchers.recheck(&[Name::new("ns", "m")].into_iter().collect());
        assert!(changed.contains(&Name::new("ns", "m")));
        assert!(matchers.get(&Name::new("ns", "m")).unwrap().error().is_none());
    }

    #[test]
    fn test_matching_subset_and_order() {
        let (_docs, profiles, matchers) = collections();
        empty_profile(&profiles, "p");

        matchers.set(matcher("low", selector(&[("os", "linux")]), "p", 1));
        matchers.set(matcher("b-high", selector(&[("os", "linux")]), "p", 5));
        matchers.set(matcher("a-high", selector(&[("os", "linux")]), "p", 5));
        matchers.set(matcher("other", selector(&[("os", "windows")]), "p", 9));

        let found = matchers.matching(&labels(&[("os", "linux")]));
        let names: Vec<String> = found.iter().map(|m| m.name().to_string()).collect();
        // Higher weight first, ties by ascending name.
        assert_eq!(names, ["ns/a-high", "ns/b-high", "ns/low"]);

        // Stable across repeated calls with unchanged state.
        let again = matchers.matching(&labels(&[("os", "linux")]));
        let names_again: Vec<String> =
            again.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, names_again);
    }

    #[test]
    fn test_matching_empty_for_unmatched_labels() {
        let (_docs, profiles, matchers) = collections();
        empty_profile(&profiles, "p");
        matchers.set(matcher("m", selector(&[("os", "linux")]), "p", 1));

        assert!(matchers.matching(&labels(&[("os", "plan9")])).is_empty());
    }

    #[test]
    fn test_set_repoints_reverse_edge() {
        let (_docs, profiles, matchers) = collections();
        empty_profile(&profiles, "p1");
        empty_profile(&profiles, "p2");

        matchers.set(matcher("m", selector(&[]), "p1", 0));
        matchers.set(matcher("m", selector(&[]), "p2", 0));

        assert!(profiles.delete(&Name::new("ns", "p1")).is_empty());
        assert!(profiles
            .delete(&Name::new("ns", "p2"))
            .contains(&Name::new("ns", "m")));
    }

    #[test]
    fn test_delete_removes_reverse_edge() {
        let (_docs, profiles, matchers) = collections();
        empty_profile(&profiles, "p");
        matchers.set(matcher("m", selector(&[]), "p", 0));
        matchers.delete(&Name::new("ns", "m"));

        assert!(profiles.delete(&Name::new("ns", "p")).is_empty());
    }
}
