//! State of one write session.
//!
//! Everything that changes while a document is numbered and emitted lives
//! here rather than on the document, so a session can be inspected after
//! the write and discarded before the next one.

use crate::error::Result;
use crate::object::Object;
use crate::remap::{OriginId, RemapTable, Slot};
use crate::xref::XrefEntry;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Byte offsets by output number.
///
/// Sized once numbering is complete; numbers handed out afterwards (lazy
/// pull-ins, the cross-reference stream) land in the overflow list until
/// [`OffsetTable::merged`] folds them in.
#[derive(Debug, Default)]
pub struct OffsetTable {
    slots: Vec<Option<u64>>,
    overflow: Vec<(u32, u64)>,
}

impl OffsetTable {
    /// Table with room for numbers below `size`.
    pub fn with_size(size: u32) -> Self {
        Self {
            slots: vec![None; size as usize],
            overflow: Vec::new(),
        }
    }

    /// Record where `number` starts.
    pub fn record(&mut self, number: u32, offset: u64) {
        match self.slots.get_mut(number as usize) {
            Some(slot) => *slot = Some(offset),
            None => self.overflow.push((number, offset)),
        }
    }

    /// Offset of `number`, looking at the overflow list as well.
    pub fn get(&self, number: u32) -> Option<u64> {
        match self.slots.get(number as usize) {
            Some(slot) => *slot,
            None => self
                .overflow
                .iter()
                .rev()
                .find(|(n, _)| *n == number)
                .map(|(_, offset)| *offset),
        }
    }

    /// Entries recorded past the initial size.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Offsets for every number below `size`, overflow included.
    pub fn merged(&self, size: u32) -> Vec<Option<u64>> {
        let mut merged = self.slots.clone();
        merged.resize(size as usize, None);
        for (number, offset) in &self.overflow {
            if let Some(slot) = merged.get_mut(*number as usize) {
                *slot = Some(*offset);
            }
        }
        merged
    }
}

/// An object pulled in during emission, waiting to be written.
#[derive(Debug)]
pub(crate) struct Pending {
    pub(crate) origin: OriginId,
    pub(crate) number: u32,
    pub(crate) body: Object,
}

/// Counters, tables and queues of one write.
#[derive(Debug)]
pub struct WriteSession {
    counter: u32,
    pub(crate) remap: RemapTable,
    offsets: OffsetTable,
    written: HashSet<u32>,
    compressed: BTreeMap<u32, (u32, u32)>,
    pub(crate) pending: VecDeque<Pending>,
    numbered: u32,
    xref_width: Option<u8>,
    bytes_written: u64,
}

impl Default for WriteSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteSession {
    /// Fresh session; the first promoted object gets number 1.
    pub fn new() -> Self {
        Self {
            counter: 1,
            remap: RemapTable::new(),
            offsets: OffsetTable::default(),
            written: HashSet::new(),
            compressed: BTreeMap::new(),
            pending: VecDeque::new(),
            numbered: 0,
            xref_width: None,
            bytes_written: 0,
        }
    }

    /// Hand out the next object number.
    pub fn promote(&mut self) -> u32 {
        let number = self.counter;
        self.counter += 1;
        number
    }

    /// Output number of `old` in `origin`, handing out the next number when
    /// it has none. Also returns whether the number was handed out now.
    pub fn assign(&mut self, origin: OriginId, old: u32) -> Result<(Slot, bool)> {
        let counter = &mut self.counter;
        self.remap.get_or_assign(origin, old, || {
            let number = *counter;
            *counter += 1;
            number
        })
    }

    /// The next number to be handed out; also the cross-reference size.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Numbers handed out so far.
    pub fn object_count(&self) -> u32 {
        self.counter - 1
    }

    /// Objects numbered before emission started.
    pub fn numbered_count(&self) -> u32 {
        self.numbered
    }

    /// Close the numbering phase and size the offset table.
    pub fn finish_numbering(&mut self) {
        self.numbered = self.counter - 1;
        self.offsets = OffsetTable::with_size(self.counter);
    }

    /// Record where `number` starts.
    pub fn record_offset(&mut self, number: u32, offset: u64) {
        self.offsets.record(number, offset);
    }

    /// Byte offset of a written object.
    pub fn offset(&self, number: u32) -> Option<u64> {
        self.offsets.get(number)
    }

    /// Mark `number` as serialized; false if it already was.
    pub fn mark_written(&mut self, number: u32) -> bool {
        self.written.insert(number)
    }

    /// Whether `number` has been serialized.
    pub fn is_written(&self, number: u32) -> bool {
        self.written.contains(&number)
    }

    /// Record that `number` lives at `index` inside object stream `stream`.
    pub fn record_compressed(&mut self, number: u32, stream: u32, index: u32) {
        self.compressed.insert(number, (stream, index));
    }

    /// Objects stored in object streams.
    pub fn compressed_count(&self) -> usize {
        self.compressed.len()
    }

    /// Containing stream and index of a compressed object.
    pub fn compressed_location(&self, number: u32) -> Option<(u32, u32)> {
        self.compressed.get(&number).copied()
    }

    /// Middle field width of the cross-reference stream, once written.
    pub fn xref_width(&self) -> Option<u8> {
        self.xref_width
    }

    pub(crate) fn set_xref_width(&mut self, width: u8) {
        self.xref_width = Some(width);
    }

    /// Total bytes of the written file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn set_bytes_written(&mut self, bytes: u64) {
        self.bytes_written = bytes;
    }

    /// Dense entry list for numbers below the counter.
    ///
    /// Numbers that were allocated but never written become free entries
    /// chained from object 0.
    pub fn xref_entries(&self) -> Vec<XrefEntry> {
        let size = self.counter;
        let offsets = self.offsets.merged(size);
        if self.offsets.overflow_len() > 0 {
            log::debug!("Merged {} overflow offsets", self.offsets.overflow_len());
        }

        let mut entries = Vec::with_capacity(size as usize);
        let mut free = Vec::new();
        for number in 0..size {
            let entry = match (offsets[number as usize], self.compressed.get(&number)) {
                _ if number == 0 => XrefEntry::free_head(),
                (Some(offset), _) => XrefEntry::InFile { offset, gen: 0 },
                (None, Some(&(stream, index))) => XrefEntry::InStream { stream, index },
                (None, None) => {
                    free.push(number);
                    XrefEntry::Free { next: 0, gen: 0 }
                },
            };
            entries.push(entry);
        }
        if !free.is_empty() {
            log::warn!("{} allocated object numbers were never written", free.len());
        }

        let mut previous = 0usize;
        for number in free {
            if let XrefEntry::Free { next, .. } = &mut entries[previous] {
                *next = number;
            }
            previous = number as usize;
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        let mut session = WriteSession::new();
        assert_eq!(session.promote(), 1);
        assert_eq!(session.promote(), 2);
        assert_eq!(session.counter(), 3);
        assert_eq!(session.object_count(), 2);
    }

    #[test]
    fn test_overflow_offsets_are_merged() {
        let mut session = WriteSession::new();
        session.promote();
        session.finish_numbering();
        session.record_offset(1, 15);
        let late = session.promote();
        session.record_offset(late, 90);
        assert_eq!(session.offset(late), Some(90));

        let entries = session.xref_entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], XrefEntry::InFile { offset: 90, gen: 0 });
    }

    #[test]
    fn test_unwritten_numbers_form_free_list() {
        let mut session = WriteSession::new();
        for _ in 0..4 {
            session.promote();
        }
        session.finish_numbering();
        session.record_offset(1, 10);
        session.record_offset(3, 30);
        session.record_compressed(4, 3, 0);

        let entries = session.xref_entries();
        assert_eq!(entries[0], XrefEntry::Free { next: 2, gen: 65535 });
        assert_eq!(entries[2], XrefEntry::Free { next: 0, gen: 0 });
        assert_eq!(entries[4], XrefEntry::InStream { stream: 3, index: 0 });
    }

    #[test]
    fn test_assign_shares_the_counter() {
        let mut session = WriteSession::new();
        let origin = OriginId(1);
        session.remap.register_origin(origin);
        assert_eq!(session.promote(), 1);
        assert_eq!(session.assign(origin, 40).unwrap(), (Slot::Mapped(2), true));
        assert_eq!(session.assign(origin, 40).unwrap(), (Slot::Mapped(2), false));
        assert_eq!(session.promote(), 3);
    }

    #[test]
    fn test_written_guard() {
        let mut session = WriteSession::new();
        assert!(session.mark_written(5));
        assert!(!session.mark_written(5));
        assert!(session.is_written(5));
    }
}
