//! Per-origin object-number translation.
//!
//! Every indirect object in the assembled document lives in the numbering
//! space of the document it came from, its origin. A [`RemapTable`] maps
//! `(origin, old number)` pairs onto the single output numbering space of one
//! write session and tracks the pool of objects that were seen only through
//! references and may still need to be pulled in.

use crate::error::{Error, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::fmt;

/// Session-stable handle of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OriginId(pub(crate) u32);

impl OriginId {
    /// Objects created through the document API.
    pub const SELF: OriginId = OriginId(0);

    /// Raw index of the origin.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::SELF {
            write!(f, "self")
        } else {
            write!(f, "src{}", self.0)
        }
    }
}

/// What an old number translates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Written under this output number
    Mapped(u32),
    /// Not part of the output; references become `null`
    Deleted,
}

/// Old-to-new number tables for one write session.
#[derive(Debug, Default)]
pub struct RemapTable {
    tables: HashMap<OriginId, HashMap<u32, Slot>>,
    unknown: IndexMap<OriginId, IndexSet<u32>>,
}

impl RemapTable {
    /// Create an empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the (empty) table of an origin. Idempotent.
    pub fn register_origin(&mut self, origin: OriginId) {
        self.tables.entry(origin).or_default();
    }

    /// Whether the origin has a table.
    pub fn has_origin(&self, origin: OriginId) -> bool {
        self.tables.contains_key(&origin)
    }

    fn table(&self, origin: OriginId) -> Result<&HashMap<u32, Slot>> {
        self.tables
            .get(&origin)
            .ok_or_else(|| Error::structural(format!("no remap table for origin {}", origin)))
    }

    fn table_mut(&mut self, origin: OriginId) -> Result<&mut HashMap<u32, Slot>> {
        self.tables
            .get_mut(&origin)
            .ok_or_else(|| Error::structural(format!("no remap table for origin {}", origin)))
    }

    /// Current translation of `old`, if any.
    pub fn lookup(&self, origin: OriginId, old: u32) -> Result<Option<Slot>> {
        Ok(self.table(origin)?.get(&old).copied())
    }

    /// Record that `old` is written as `new`.
    ///
    /// An existing translation is never replaced: the first registration of
    /// an old number wins for the whole session.
    pub fn insert(&mut self, origin: OriginId, old: u32, new: u32) -> Result<Slot> {
        let slot = *self.table_mut(origin)?.entry(old).or_insert(Slot::Mapped(new));
        if slot != Slot::Mapped(new) {
            log::debug!("{}:{} already translated to {:?}, keeping it", origin, old, slot);
        }
        Ok(slot)
    }

    /// Mark `old` as excluded from the output.
    pub fn mark_deleted(&mut self, origin: OriginId, old: u32) -> Result<()> {
        self.table_mut(origin)?.entry(old).or_insert(Slot::Deleted);
        Ok(())
    }

    /// Translate `old`, allocating a number with `alloc` when it is unmapped.
    ///
    /// Returns the slot and whether it was created by this call.
    pub fn get_or_assign(
        &mut self,
        origin: OriginId,
        old: u32,
        alloc: impl FnOnce() -> u32,
    ) -> Result<(Slot, bool)> {
        let table = self.table_mut(origin)?;
        if let Some(slot) = table.get(&old) {
            return Ok((*slot, false));
        }
        let slot = Slot::Mapped(alloc());
        table.insert(old, slot);
        Ok((slot, true))
    }

    /// Add an original (untranslated) reference target to the unknown pool.
    pub fn record_unknown(&mut self, origin: OriginId, old: u32) {
        self.unknown.entry(origin).or_default().insert(old);
    }

    /// Number of pooled candidates.
    pub fn unknown_len(&self) -> usize {
        self.unknown.values().map(IndexSet::len).sum()
    }

    /// Take the unknown pool, in discovery order.
    pub fn drain_unknown(&mut self) -> Vec<(OriginId, u32)> {
        std::mem::take(&mut self.unknown)
            .into_iter()
            .flat_map(|(origin, olds)| olds.into_iter().map(move |old| (origin, old)))
            .collect()
    }

    /// Number of translations across all origins.
    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    /// Whether nothing has been translated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every table and the pool.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.unknown.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_unregistered_origin_is_structural() {
        let mut table = RemapTable::new();
        let err = table.get_or_assign(OriginId(3), 1, || 1).unwrap_err();
        assert!(err.is_structural());
        assert!(table.lookup(OriginId(3), 1).unwrap_err().is_structural());
    }

    #[test]
    fn test_first_registration_wins() {
        let mut table = RemapTable::new();
        table.register_origin(OriginId::SELF);
        assert_eq!(table.insert(OriginId::SELF, 5, 1).unwrap(), Slot::Mapped(1));
        assert_eq!(table.insert(OriginId::SELF, 5, 2).unwrap(), Slot::Mapped(1));
    }

    #[test]
    fn test_deleted_slot_is_sticky() {
        let mut table = RemapTable::new();
        table.register_origin(OriginId(1));
        table.mark_deleted(OriginId(1), 9).unwrap();
        let (slot, fresh) = table.get_or_assign(OriginId(1), 9, || 4).unwrap();
        assert_eq!(slot, Slot::Deleted);
        assert!(!fresh);
    }

    #[test]
    fn test_origins_are_independent() {
        let mut table = RemapTable::new();
        table.register_origin(OriginId(1));
        table.register_origin(OriginId(2));
        table.insert(OriginId(1), 7, 10).unwrap();
        table.insert(OriginId(2), 7, 11).unwrap();
        assert_eq!(table.lookup(OriginId(1), 7).unwrap(), Some(Slot::Mapped(10)));
        assert_eq!(table.lookup(OriginId(2), 7).unwrap(), Some(Slot::Mapped(11)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_pool_keeps_discovery_order() {
        let mut table = RemapTable::new();
        table.record_unknown(OriginId(2), 8);
        table.record_unknown(OriginId(1), 3);
        table.record_unknown(OriginId(2), 4);
        table.record_unknown(OriginId(2), 8);
        assert_eq!(table.unknown_len(), 3);
        assert_eq!(
            table.drain_unknown(),
            vec![(OriginId(2), 8), (OriginId(2), 4), (OriginId(1), 3)]
        );
        assert_eq!(table.unknown_len(), 0);
    }

    proptest! {
        #[test]
        fn prop_assignment_is_injective_and_idempotent(
            olds in proptest::collection::vec(0u32..500, 1..200)
        ) {
            let mut table = RemapTable::new();
            table.register_origin(OriginId(1));
            let mut counter = 1u32;
            let mut first: HashMap<u32, u32> = HashMap::new();
            for old in &olds {
                let (slot, fresh) = table
                    .get_or_assign(OriginId(1), *old, || { let n = counter; counter += 1; n })
                    .unwrap();
                let Slot::Mapped(new) = slot else { panic!("unexpected deleted slot") };
                match first.get(old) {
                    Some(previous) => {
                        prop_assert!(!fresh);
                        prop_assert_eq!(*previous, new);
                    },
                    None => {
                        prop_assert!(fresh);
                        first.insert(*old, new);
                    },
                }
            }
            let distinct: HashSet<u32> = first.values().copied().collect();
            prop_assert_eq!(distinct.len(), first.len());
            prop_assert_eq!(counter as usize - 1, first.len());
        }
    }
}
