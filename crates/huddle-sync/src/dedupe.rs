use std::collections::HashMap;
use std::hash::Hash;

use tracing::warn;

/// Collapse `raws` to one entry per key. A later duplicate replaces the earlier
/// one in place, so the output keeps first-seen order with last-seen values.
///
/// Entries whose key selector returns `None` are dropped.
pub fn unique_by<T, K, F>(raws: Vec<T>, entity: &str, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut slots: HashMap<K, usize> = HashMap::with_capacity(raws.len());
    let mut unique: Vec<T> = Vec::with_capacity(raws.len());
    let mut dropped = 0usize;

    for raw in raws {
        let Some(k) = key(&raw) else {
            dropped += 1;
            continue;
        };

        match slots.get(&k) {
            Some(&idx) => unique[idx] = raw,
            None => {
                slots.insert(k, unique.len());
                unique.push(raw);
            }
        }
    }

    if dropped > 0 {
        warn!("Dropped {} {} payloads without an identity key", dropped, entity);
    }

    unique
}
