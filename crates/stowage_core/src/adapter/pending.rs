//! Writes buffered until commit.

use std::collections::HashMap;
use uuid::Uuid;

use crate::raw::Aggregate;

/// A buffered write to one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Store the aggregate as given.
    Put {
        /// The whole aggregate after the write.
        aggregate: Aggregate,
    },
    /// Delete the aggregate.
    Delete,
}

type Key = (String, Uuid);

/// Pending writes of a transaction, keyed by aggregate name and id.
///
/// Later writes to the same aggregate replace earlier ones. Draining
/// yields the writes in the order their aggregates were first touched.
#[derive(Debug, Default)]
pub struct PendingWrites {
    writes: HashMap<Key, PendingWrite>,
    order: Vec<Key>,
}

impl PendingWrites {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, model: &str, id: Uuid, write: PendingWrite) {
        let key = (model.to_string(), id);
        if self.writes.insert(key.clone(), write).is_none() {
            self.order.push(key);
        }
    }

    /// Records the new state of an aggregate.
    pub fn put(&mut self, model: &str, aggregate: Aggregate) {
        let id = aggregate.id.value;
        self.record(model, id, PendingWrite::Put { aggregate });
    }

    /// Records the deletion of an aggregate.
    pub fn delete(&mut self, model: &str, id: Uuid) {
        self.record(model, id, PendingWrite::Delete);
    }

    /// Gets the pending write for an aggregate.
    #[must_use]
    pub fn get(&self, model: &str, id: Uuid) -> Option<&PendingWrite> {
        self.writes.get(&(model.to_string(), id))
    }

    /// Pending writes to one aggregate type.
    pub fn of<'a>(&'a self, model: &'a str) -> impl Iterator<Item = (Uuid, &'a PendingWrite)> + 'a {
        self.order
            .iter()
            .filter(move |(m, _)| m == model)
            .filter_map(|key| self.writes.get(key).map(|w| (key.1, w)))
    }

    /// Takes every pending write, in first-touched order.
    pub fn drain(&mut self) -> Vec<(String, Uuid, PendingWrite)> {
        let mut writes = std::mem::take(&mut self.writes);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|key| {
                let write = writes.remove(&key)?;
                Some((key.0, key.1, write))
            })
            .collect()
    }

    /// Discards every pending write.
    pub fn clear(&mut self) {
        self.writes.clear();
        self.order.clear();
    }

    /// Number of aggregates with a pending write.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_writes_replace_earlier_ones() {
        let mut pending = PendingWrites::new();
        let id = Uuid::new_v4();

        pending.put("user", Aggregate::new("id", id));
        pending.delete("user", id);

        assert_eq!(pending.len(), 1);
        assert_eq!(pending.get("user", id), Some(&PendingWrite::Delete));
    }

    #[test]
    fn drain_keeps_first_touched_order() {
        let mut pending = PendingWrites::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        pending.put("user", Aggregate::new("id", a));
        pending.delete("order", b);
        pending.put("user", Aggregate::new("id", a));

        let drained = pending.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1, a);
        assert_eq!(drained[1].0, "order");
        assert!(pending.is_empty());
    }

    #[test]
    fn writes_are_scoped_by_model() {
        let mut pending = PendingWrites::new();
        let id = Uuid::new_v4();
        pending.put("user", Aggregate::new("id", id));

        assert!(pending.get("order", id).is_none());
        assert_eq!(pending.of("user").count(), 1);
        assert_eq!(pending.of("order").count(), 0);
    }
}
