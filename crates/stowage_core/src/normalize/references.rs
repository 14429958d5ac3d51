//! Collection element references.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

use crate::raw::{Element, Property, Reference};

type Key = (String, Uuid, String);

/// Remembers which reference each loaded collection element carries.
///
/// Domain components don't hold their reference. When an aggregate is
/// normalized again, an element equal to a remembered one gets the
/// remembered reference back, so an unchanged element produces no diff.
/// Anything else is treated as new and gets a fresh reference.
#[derive(Debug)]
pub struct References {
    enabled: bool,
    known: Mutex<HashMap<Key, Vec<Element>>>,
}

impl References {
    /// Creates an arena. A disabled arena mints a fresh reference every
    /// time.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn key(model: &str, id: Uuid, collection: &str) -> Key {
        (model.to_string(), id, collection.to_string())
    }

    /// Records the elements of a loaded collection.
    pub fn remember(&self, model: &str, id: Uuid, collection: &str, elements: &[Element]) {
        if !self.enabled {
            return;
        }
        self.known
            .lock()
            .insert(Self::key(model, id, collection), elements.to_vec());
    }

    /// Assigns references to freshly normalized elements and remembers
    /// the result.
    pub fn assign(
        &self,
        model: &str,
        id: Uuid,
        collection: &str,
        elements: Vec<Vec<Property>>,
    ) -> Vec<Element> {
        let key = Self::key(model, id, collection);
        let mut known = self.known.lock();
        let mut candidates: Vec<Option<Element>> = if self.enabled {
            known
                .get(&key)
                .map(|elements| elements.iter().cloned().map(Some).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let assigned: Vec<Element> = elements
            .into_iter()
            .map(|properties| {
                let reused = candidates
                    .iter_mut()
                    .find(|c| c.as_ref().is_some_and(|e| e.properties == properties))
                    .and_then(Option::take);
                match reused {
                    Some(element) => element,
                    None => {
                        let reference = Reference::new();
                        trace!(model, collection, %reference, "new collection element");
                        Element {
                            reference,
                            properties,
                        }
                    }
                }
            })
            .collect();

        if self.enabled {
            known.insert(key, assigned.clone());
        }
        assigned
    }

    /// Forgets everything remembered for one aggregate.
    pub fn forget(&self, model: &str, id: Uuid) {
        self.known
            .lock()
            .retain(|(m, i, _), _| !(m == model && *i == id));
    }

    /// Forgets everything.
    pub fn clear(&self) {
        let mut known = self.known.lock();
        trace!(collections = known.len(), "reference arena cleared");
        known.clear();
    }

    /// Number of collections with remembered elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.lock().len()
    }

    /// Returns true if nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.lock().is_empty()
    }

    /// Number of elements remembered for a collection.
    #[must_use]
    pub fn tracked(&self, model: &str, id: Uuid, collection: &str) -> usize {
        self.known
            .lock()
            .get(&Self::key(model, id, collection))
            .map_or(0, Vec::len)
    }
}

impl Default for References {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(label: &str) -> Vec<Property> {
        vec![Property::new("label", label)]
    }

    #[test]
    fn equal_elements_keep_their_reference() {
        let refs = References::default();
        let id = Uuid::new_v4();
        let first = refs.assign("user", id, "tags", vec![tag("a"), tag("b")]);
        let second = refs.assign("user", id, "tags", vec![tag("b"), tag("a"), tag("c")]);

        assert_eq!(second[0].reference, first[1].reference);
        assert_eq!(second[1].reference, first[0].reference);
        assert!(first.iter().all(|e| e.reference != second[2].reference));
        assert_eq!(refs.tracked("user", id, "tags"), 3);
    }

    #[test]
    fn duplicates_are_matched_once() {
        let refs = References::default();
        let id = Uuid::new_v4();
        let first = refs.assign("user", id, "tags", vec![tag("a")]);
        let second = refs.assign("user", id, "tags", vec![tag("a"), tag("a")]);

        assert_eq!(second[0].reference, first[0].reference);
        assert_ne!(second[1].reference, first[0].reference);
    }

    #[test]
    fn disabled_arena_always_mints() {
        let refs = References::new(false);
        let id = Uuid::new_v4();
        let first = refs.assign("user", id, "tags", vec![tag("a")]);
        let second = refs.assign("user", id, "tags", vec![tag("a")]);

        assert_ne!(first[0].reference, second[0].reference);
        assert_eq!(refs.tracked("user", id, "tags"), 0);
    }

    #[test]
    fn forget_drops_one_aggregate() {
        let refs = References::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        refs.assign("user", a, "tags", vec![tag("x")]);
        refs.assign("user", b, "tags", vec![tag("y")]);

        refs.forget("user", a);
        assert_eq!(refs.tracked("user", a, "tags"), 0);
        assert_eq!(refs.tracked("user", b, "tags"), 1);
    }

    #[test]
    fn clear_empties_the_arena() {
        let refs = References::default();
        refs.assign("user", Uuid::new_v4(), "tags", vec![tag("x")]);
        refs.assign("user", Uuid::new_v4(), "tags", vec![tag("y")]);
        assert_eq!(refs.len(), 2);

        refs.clear();
        assert!(refs.is_empty());
    }
}
