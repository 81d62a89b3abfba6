// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII grain write access for safe zero-copy writing.

use std::sync::atomic::Ordering;

use tracing::trace;

use crate::grain::writer::GrainWriter;
use crate::shm::segment::SlotRef;
use crate::{Error, Result, time};

/// RAII-protected grain writing session.
///
/// Provides mutable access to a grain's payload buffer for zero-copy writing.
/// Nothing becomes visible to readers until slices are committed; a session
/// dropped without any commit leaves the flow's head untouched.
///
/// A grain can be published progressively: [`Self::commit_slices`] publishes
/// a growing prefix of the payload while keeping the session open, and
/// [`Self::commit`] publishes the final slice count and consumes the session.
/// The committed slice count never decreases within a slot generation.
///
/// The lifetime `'a` is tied to the [`GrainWriter`] that created this
/// session.
///
/// # Examples
///
/// ```no_run
/// # use mxl::GrainWriter;
/// # fn example(writer: GrainWriter) -> Result<(), mxl::Error> {
/// let mut access = writer.open_grain(100)?;
///
/// // Fill grain with data
/// let payload = access.payload_mut();
/// payload.fill(42);
///
/// // Commit all slices
/// let total_slices = access.total_slices();
/// access.commit(total_slices)?;
/// # Ok(())
/// # }
/// ```
pub struct GrainWriteAccess<'a> {
    writer: &'a GrainWriter,
    slot: SlotRef<'a>,
    index: u64,
    /// Slices already published for this grain; commits must grow past it.
    committed_slices: u32,
    /// Flags ORed into the slot header on the next commit.
    staged_flags: u32,
    finished: bool,
}

impl<'a> GrainWriteAccess<'a> {
    /// Creates a new grain write session (internal use only).
    pub(crate) fn new(
        writer: &'a GrainWriter,
        index: u64,
        slot: SlotRef<'a>,
        committed_slices: u32,
    ) -> Self {
        Self {
            writer,
            slot,
            index,
            committed_slices,
            staged_flags: 0,
            finished: false,
        }
    }

    /// Returns mutable access to the grain's payload buffer.
    ///
    /// This provides zero-copy write access to the shared memory ring
    /// buffer. Modifications are visible to readers once the covering slices
    /// are committed.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // Safety: the writer holds the exclusive flow lock, so no other
        // process mutates this slot; readers only access committed slices.
        unsafe {
            std::slice::from_raw_parts_mut(self.slot.payload_ptr(), self.slot.grain_size())
        }
    }

    /// Returns the size of the grain payload in bytes.
    pub fn max_size(&self) -> u32 {
        self.slot.header.grain_size
    }

    /// Returns the total number of slices in this grain.
    pub fn total_slices(&self) -> u32 {
        self.slot.header.total_slices
    }

    /// Returns the number of slices committed so far.
    pub fn valid_slices(&self) -> u32 {
        self.committed_slices
    }

    /// Returns the absolute index this grain was opened at.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Stages grain flags (e.g. [`crate::GRAIN_FLAG_INVALID`]) to be ORed
    /// into the slot header on the next commit.
    pub fn set_flags(&mut self, flags: u32) {
        self.staged_flags |= flags;
    }

    /// Publishes a growing prefix of the grain while keeping the session
    /// open.
    ///
    /// Readers waiting on this grain observe the new slice count
    /// immediately; the flow's head index moves to this grain on its first
    /// commit.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] unless
    /// `valid_slices > self.valid_slices() && valid_slices <= self.total_slices()`.
    pub fn commit_slices(&mut self, valid_slices: u32) -> Result<()> {
        if self.finished {
            return Err(Error::Other(
                "Grain was already committed or canceled.".to_string(),
            ));
        }
        if valid_slices <= self.committed_slices || valid_slices > self.total_slices() {
            return Err(Error::InvalidArg(format!(
                "valid slices must grow from {} and stay within {}, got {}",
                self.committed_slices,
                self.total_slices(),
                valid_slices
            )));
        }

        let now = time::current_time();
        self.slot
            .header
            .flags
            .fetch_or(self.staged_flags, Ordering::Relaxed);
        self.slot.header.commit_timestamp.store(now, Ordering::Relaxed);
        // Publish the payload prefix, then move the head; readers pair
        // acquire loads with both stores.
        self.slot
            .header
            .valid_slices
            .store(valid_slices, Ordering::Release);
        self.committed_slices = valid_slices;

        let header = self.writer.flow().header();
        let discrete = header.discrete();
        discrete.head_index.fetch_max(self.index, Ordering::AcqRel);
        header.last_write_time.store(now, Ordering::Release);
        discrete.sync_counter.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Commits the grain, making it visible to readers, and ends the
    /// session.
    ///
    /// # Arguments
    ///
    /// * `valid_slices` - Number of complete slices (typically
    ///   [`Self::total_slices`] for a fully written grain)
    ///
    /// # Errors
    ///
    /// Same constraints as [`Self::commit_slices`].
    pub fn commit(mut self, valid_slices: u32) -> Result<()> {
        self.commit_slices(valid_slices)?;
        self.finished = true;
        Ok(())
    }

    /// Cancels the write session without publishing anything further.
    ///
    /// Slices committed earlier through [`Self::commit_slices`] stay
    /// published; an entirely uncommitted grain never becomes visible since
    /// the head index was never moved to it.
    pub fn cancel(mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

impl Drop for GrainWriteAccess<'_> {
    /// Treats an abandoned session as canceled.
    fn drop(&mut self) {
        if !self.finished && self.committed_slices == 0 {
            trace!(
                "Grain write session for index {} dropped without commit.",
                self.index
            );
        }
    }
}
