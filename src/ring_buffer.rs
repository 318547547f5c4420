//! Fixed-capacity circular buffer of owned byte records.
//!
//! The ring holds up to [`RING_CAPACITY`] records in a plain slot array with
//! integer write/read cursors, so adding a record never reallocates. Once the
//! ring is full, each further add overwrites the oldest slot and hands the
//! evicted record back to the caller.
//!
//! Readers treat the retained records as one flat byte sequence in age order:
//! [`RecordRing::find_at`] maps a byte offset into that concatenation to the
//! record containing it plus the remaining intra-record offset.
//!
//! # Cursor discipline
//!
//! - `in_off` is the next slot to fill, `out_off` the oldest occupied slot.
//! - `in_off == out_off` is ambiguous; the `full` flag disambiguates the
//!   empty ring from the full one.
//! - Occupancy is `full ? RING_CAPACITY : (in_off - out_off) mod RING_CAPACITY`.

use bytes::Bytes;

/// Number of record slots in the ring.
pub const RING_CAPACITY: usize = 10;

/// Fixed ring of owned records with overwrite-oldest semantics.
#[derive(Debug, Default)]
pub struct RecordRing {
    entries: [Option<Bytes>; RING_CAPACITY],
    in_off: usize,
    out_off: usize,
    full: bool,
}

impl RecordRing {
    /// Creates an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `record` at the write cursor.
    ///
    /// When the ring is already full the previous occupant of that slot (the
    /// oldest record) is returned so the caller can release it, and the read
    /// cursor advances past it. Adding never fails for capacity reasons.
    pub fn add(&mut self, record: Bytes) -> Option<Bytes> {
        let evicted = if self.full {
            self.entries[self.in_off].take()
        } else {
            None
        };

        self.entries[self.in_off] = Some(record);
        if self.full {
            self.out_off = (self.out_off + 1) % RING_CAPACITY;
        }
        self.in_off = (self.in_off + 1) % RING_CAPACITY;
        if self.in_off == self.out_off {
            self.full = true;
        }

        evicted
    }

    /// Maps a byte offset into the concatenation of retained records (age
    /// order, indexed from zero) to the record containing it and the offset
    /// within that record. Returns `None` at or past the end.
    pub fn find_at(&self, fpos: usize) -> Option<(&Bytes, usize)> {
        let mut remaining = fpos;
        for idx in 0..self.occupancy() {
            let slot = (self.out_off + idx) % RING_CAPACITY;
            let entry = self.entries[slot].as_ref()?;
            if remaining < entry.len() {
                return Some((entry, remaining));
            }
            remaining -= entry.len();
        }
        None
    }

    /// Iterates the retained records in age order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> + '_ {
        (0..self.occupancy()).filter_map(move |idx| {
            self.entries[(self.out_off + idx) % RING_CAPACITY].as_ref()
        })
    }

    /// Number of occupied slots.
    pub fn occupancy(&self) -> usize {
        if self.full {
            RING_CAPACITY
        } else {
            (self.in_off + RING_CAPACITY - self.out_off) % RING_CAPACITY
        }
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        !self.full && self.in_off == self.out_off
    }

    /// True when every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Total byte length of the retained records.
    pub fn total_len(&self) -> usize {
        self.iter().map(Bytes::len).sum()
    }

    /// Index of the next slot to fill.
    pub fn write_index(&self) -> usize {
        self.in_off
    }

    /// The record held by a physical slot, if any.
    pub fn slot(&self, index: usize) -> Option<&Bytes> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Replaces the record at a physical slot, returning the previous
    /// occupant. Cursors are untouched; the slot keeps its logical position.
    pub fn replace_slot(&mut self, index: usize, record: Bytes) -> Option<Bytes> {
        let slot = self.entries.get_mut(index)?;
        slot.replace(record)
    }

    /// Releases every occupied slot in fixed index order and resets the
    /// cursors. Returns the number of records released.
    pub fn drain(&mut self) -> usize {
        let mut released = 0;
        for slot in &mut self.entries {
            if slot.take().is_some() {
                released += 1;
            }
        }
        self.in_off = 0;
        self.out_off = 0;
        self.full = false;
        released
    }
}
