//! The shared log device: one record ring behind one lock.
//!
//! `LogDevice` is the single point of mutation for the append-and-replay
//! log. It owns the [`RecordRing`](crate::ring_buffer::RecordRing) together
//! with the *working index*, the slot currently accumulating a partial
//! (unterminated) record, and serializes every operation under one mutex.
//!
//! An append either extends the in-progress partial record or commits a new
//! one:
//!
//! - While `working_index` differs from the ring's write cursor, the slot at
//!   `working_index` holds a partial record. The grown buffer is built in
//!   full before the slot is touched, so a failed allocation leaves the
//!   partial record byte-identical.
//! - Otherwise the incoming bytes start a fresh record, which is added to the
//!   ring; on a full ring the evicted oldest record is dropped here.
//!
//! In both cases a trailing `0x0A` completes the record and resets the
//! working index to the write cursor ("no partial in progress").
//!
//! The lock is held for the whole of each operation and never across an
//! await point, so a `std::sync::Mutex` is sufficient even though callers
//! are async tasks. A poisoned lock surfaces as
//! [`DeviceError::Interrupted`].

use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use log::debug;

use crate::error::{DeviceError, DeviceResult};
use crate::ring_buffer::RecordRing;

struct DeviceState {
    ring: RecordRing,
    /// Slot accumulating the current partial record; equals the ring's write
    /// index when no partial record is in progress.
    working_index: usize,
}

/// Mutex-guarded append/read/seek state machine over the record ring.
pub struct LogDevice {
    state: Mutex<DeviceState>,
}

impl Default for LogDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState {
                ring: RecordRing::new(),
                working_index: 0,
            }),
        }
    }

    fn lock(&self) -> DeviceResult<MutexGuard<'_, DeviceState>> {
        self.state.lock().map_err(|_| DeviceError::Interrupted)
    }

    /// Integrates `bytes` into the log and returns the number of bytes
    /// committed.
    ///
    /// Extends the current partial record if one is in progress, otherwise
    /// starts a new record (evicting the oldest on a full ring). A record is
    /// complete once its last byte is the line terminator.
    pub fn append(&self, bytes: &[u8]) -> DeviceResult<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock()?;
        debug!("append {} bytes", bytes.len());

        if state.working_index != state.ring.write_index() {
            // Extend the partial record. Build the grown buffer first; the
            // slot is only touched once the allocation has succeeded.
            let partial = state
                .ring
                .slot(state.working_index)
                .ok_or(DeviceError::Fault)?
                .clone();

            let mut grown = Vec::new();
            grown
                .try_reserve_exact(partial.len() + bytes.len())
                .map_err(|_| DeviceError::OutOfMemory)?;
            grown.extend_from_slice(&partial);
            grown.extend_from_slice(bytes);

            let working_index = state.working_index;
            state.ring.replace_slot(working_index, Bytes::from(grown));
        } else {
            let mut fresh = Vec::new();
            fresh
                .try_reserve_exact(bytes.len())
                .map_err(|_| DeviceError::OutOfMemory)?;
            fresh.extend_from_slice(bytes);

            if let Some(evicted) = state.ring.add(Bytes::from(fresh)) {
                debug!("evicted oldest record ({} bytes)", evicted.len());
            }
        }

        let working_index = state.working_index;
        let complete = state
            .ring
            .slot(working_index)
            .is_some_and(|record| record.last() == Some(&b'\n'));
        if complete {
            state.working_index = state.ring.write_index();
        }

        Ok(bytes.len())
    }

    /// Copies out at most `max` bytes starting at byte offset `fpos` of the
    /// retained log.
    ///
    /// At most one record's tail is returned per call; the caller advances
    /// its own cursor by the returned length. An offset at or past the end
    /// yields an empty buffer, not an error.
    pub fn read_at(&self, fpos: usize, max: usize) -> DeviceResult<Bytes> {
        let state = self.lock()?;
        match state.ring.find_at(fpos) {
            Some((entry, intra)) => {
                let len = max.min(entry.len() - intra);
                debug!("read {} bytes at offset {}", len, fpos);
                Ok(entry.slice(intra..intra + len))
            }
            None => Ok(Bytes::new()),
        }
    }

    /// Resolves a (record index, intra-record offset) pair to the absolute
    /// byte offset of that position in the retained log.
    ///
    /// `write_cmd` counts records from the oldest, zero-referenced. An
    /// intra-record offset equal to the record's length is accepted and
    /// resolves to one past that record's end; anything larger is rejected.
    pub fn seek_to(&self, write_cmd: u32, write_cmd_offset: u32) -> DeviceResult<usize> {
        let state = self.lock()?;

        if state.ring.is_empty() {
            return Err(DeviceError::Invalid("log is empty".into()));
        }

        let mut absolute = 0usize;
        let mut records = state.ring.iter();
        for _ in 0..write_cmd {
            match records.next() {
                Some(record) => absolute += record.len(),
                None => {
                    return Err(DeviceError::Invalid(format!(
                        "record index {} past end of log",
                        write_cmd
                    )));
                }
            }
        }

        let target = records.next().ok_or_else(|| {
            DeviceError::Invalid(format!("record index {} past end of log", write_cmd))
        })?;
        let offset = write_cmd_offset as usize;
        if offset > target.len() {
            return Err(DeviceError::Invalid(format!(
                "offset {} past record length {}",
                offset,
                target.len()
            )));
        }

        Ok(absolute + offset)
    }

    /// Total byte length of the retained log.
    pub fn retained_len(&self) -> DeviceResult<usize> {
        Ok(self.lock()?.ring.total_len())
    }

    /// Releases every retained record and resets the device to empty.
    /// Returns the number of records released.
    pub fn drain(&self) -> DeviceResult<usize> {
        let mut state = self.lock()?;
        let released = state.ring.drain();
        state.working_index = state.ring.write_index();
        debug!("drained {} records", released);
        Ok(released)
    }
}
