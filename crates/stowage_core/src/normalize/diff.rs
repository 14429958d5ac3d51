//! Computing the difference between two raw snapshots.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::raw::{Aggregate, CollectionDiff, Diff, Entity, Optional, Presence, Property};

fn changed(then: &[Property], now: &[Property]) -> Vec<Property> {
    now.iter()
        .filter(|p| {
            then.iter()
                .find(|t| t.name == p.name)
                .map_or(true, |t| t.value != p.value)
        })
        .cloned()
        .collect()
}

/// Computes what changed from `then` to `now`.
///
/// # Errors
///
/// Fails with [`CoreError::IdentityMismatch`] if the snapshots belong to
/// different aggregates.
pub fn diff(then: &Aggregate, now: &Aggregate) -> CoreResult<Diff> {
    if then.id != now.id {
        return Err(CoreError::IdentityMismatch {
            then: then.id.value.to_string(),
            now: now.id.value.to_string(),
        });
    }

    let properties = changed(&then.properties, &now.properties);

    let entities = now
        .entities
        .iter()
        .filter_map(|entity| {
            let before = then
                .entity(&entity.name)
                .map_or(&[][..], |e| e.properties.as_slice());
            let properties = changed(before, &entity.properties);
            (!properties.is_empty()).then(|| Entity {
                name: entity.name.clone(),
                properties,
            })
        })
        .collect();

    let optionals = now
        .optionals
        .iter()
        .filter_map(|optional| {
            let before = then
                .optional(&optional.name)
                .and_then(|o| o.presence.properties());
            let presence = match (before, optional.presence.properties()) {
                (None, None) => return None,
                (None, Some(all)) => Presence::BrandNew(all.to_vec()),
                (Some(_), None) => Presence::Absent,
                (Some(before), Some(after)) => {
                    let properties = changed(before, after);
                    if properties.is_empty() {
                        return None;
                    }
                    Presence::Present(properties)
                }
            };
            Some(Optional {
                name: optional.name.clone(),
                presence,
            })
        })
        .collect();

    let collections = now
        .collections
        .iter()
        .filter_map(|collection| {
            let before = then
                .collection(&collection.name)
                .map_or(&[][..], |c| c.elements.as_slice());
            let kept: HashSet<_> = collection
                .elements
                .iter()
                .filter(|e| before.contains(e))
                .map(|e| e.reference)
                .collect();
            let removed: Vec<_> = before
                .iter()
                .filter(|e| !kept.contains(&e.reference))
                .map(|e| e.reference)
                .collect();
            let added: Vec<_> = collection
                .elements
                .iter()
                .filter(|e| !kept.contains(&e.reference))
                .cloned()
                .collect();
            (!added.is_empty() || !removed.is_empty()).then(|| CollectionDiff {
                name: collection.name.clone(),
                added,
                removed,
                elements: collection.elements.clone(),
            })
        })
        .collect();

    Ok(Diff {
        id: now.id.clone(),
        properties,
        entities,
        optionals,
        collections,
    })
}
