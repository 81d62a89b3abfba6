// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! RAII sample write access for safe zero-copy audio writing.

use std::sync::atomic::Ordering;

use tracing::trace;

use crate::samples::writer::SamplesWriter;
use crate::shm::segment::WrappedSliceGeometry;
use crate::{Error, Result, time};

/// RAII-protected audio sample writing session.
///
/// Provides mutable access to the reserved range of every channel ring for
/// zero-copy writing. Data may be split into two fragments per channel if
/// the range wraps the ring boundary.
///
/// Committing publishes the flow's head index; a session dropped without a
/// commit leaves the head untouched, so readers never see the samples.
///
/// The lifetime `'a` is tied to the [`SamplesWriter`] that created this
/// session.
///
/// # Examples
///
/// ```no_run
/// # use mxl::SamplesWriter;
/// # fn example(writer: SamplesWriter) -> Result<(), mxl::Error> {
/// let mut access = writer.open_samples(1000, 480)?; // 10ms at 48kHz
///
/// // Fill each channel with data
/// for ch in 0..access.channels() {
///     let (frag1, frag2) = access.channel_data_mut(ch)?;
///     frag1.fill(0x42);
///     frag2.fill(0x42);
/// }
///
/// access.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct SamplesWriteAccess<'a> {
    writer: &'a SamplesWriter,
    last_index: u64,
    geometry: WrappedSliceGeometry,
    finished: bool,
}

impl<'a> SamplesWriteAccess<'a> {
    /// Creates a new samples write session (internal use only).
    pub(crate) fn new(
        writer: &'a SamplesWriter,
        last_index: u64,
        geometry: WrappedSliceGeometry,
    ) -> Self {
        Self {
            writer,
            last_index,
            geometry,
            finished: false,
        }
    }

    /// Returns the number of audio channels.
    pub fn channels(&self) -> usize {
        self.geometry.channel_count
    }

    /// Returns mutable access to a specific channel's reserved range.
    ///
    /// Each channel's data is returned as two mutable byte slices
    /// (fragments). If the range does not wrap the ring, the second fragment
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `channel >= channels()`.
    pub fn channel_data_mut(&mut self, channel: usize) -> Result<(&mut [u8], &mut [u8])> {
        if channel >= self.geometry.channel_count {
            return Err(Error::InvalidArg(format!(
                "channel {channel} out of range ({} channels)",
                self.geometry.channel_count
            )));
        }
        // Safety: the writer holds the exclusive flow lock and the geometry
        // was computed against the mapped ring bounds; the two fragments
        // never overlap.
        unsafe {
            let ring = self
                .writer
                .flow()
                .channel_base()
                .add(self.geometry.stride * channel);
            Ok((
                std::slice::from_raw_parts_mut(
                    ring.add(self.geometry.fragment0_offset),
                    self.geometry.fragment0_len,
                ),
                std::slice::from_raw_parts_mut(ring, self.geometry.fragment1_len),
            ))
        }
    }

    /// Commits the samples, making them visible to readers.
    ///
    /// Publishes the head index, stamps the last write time, and closes the
    /// seqlock generation opened by
    /// [`SamplesWriter::open_samples`].
    pub fn commit(mut self) -> Result<()> {
        let header = self.writer.flow().header();
        let continuous = header.continuous();
        continuous
            .head_index
            .store(self.last_index, Ordering::Release);
        header
            .last_write_time
            .store(time::current_time(), Ordering::Release);
        continuous.generation.fetch_add(1, Ordering::Release);
        self.finished = true;
        Ok(())
    }

    /// Cancels the sample write operation without committing.
    ///
    /// The head index is not updated, so readers never observe the written
    /// range (the ring bytes themselves are not zeroed).
    pub fn cancel(mut self) -> Result<()> {
        self.writer
            .flow()
            .header()
            .continuous()
            .generation
            .fetch_add(1, Ordering::Release);
        self.finished = true;
        Ok(())
    }
}

impl Drop for SamplesWriteAccess<'_> {
    /// Automatically cancels uncommitted samples on drop.
    ///
    /// This closes the seqlock generation so copying readers do not spin on
    /// an abandoned write.
    fn drop(&mut self) {
        if !self.finished {
            self.writer
                .flow()
                .header()
                .continuous()
                .generation
                .fetch_add(1, Ordering::Release);
            trace!(
                "Sample write session ending at index {} dropped without commit.",
                self.last_index
            );
        }
    }
}
