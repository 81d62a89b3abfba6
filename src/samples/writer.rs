// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample writer implementation for continuous media flows.

use std::sync::atomic::Ordering;

use crate::flow::FlowInfo;
use crate::flow::writer::WriterState;
use crate::samples::write_access::SamplesWriteAccess;
use crate::shm::segment::{self, AnyFlowData, ContinuousFlowData};
use crate::{Error, Result};

/// Writer for continuous audio sample streams.
///
/// Provides zero-copy write access to the per-channel sample rings. A batch
/// of samples is opened by the absolute index of its last sample, filled via
/// [`SamplesWriteAccess`], and committed to advance the flow's head index.
/// The batch size is the writer's choice; readers may consume with a
/// different one.
///
/// # Thread Safety
///
/// `SamplesWriter` is `Send` but not `Sync`. Each writer should be used by
/// only one thread at a time, but can be transferred between threads.
///
/// # Examples
///
/// ```no_run
/// # use mxl::SamplesWriter;
/// # fn example(writer: SamplesWriter) -> Result<(), mxl::Error> {
/// let mut access = writer.open_samples(1000, 480)?; // 10ms at 48kHz
///
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
pub struct SamplesWriter {
    state: WriterState,
}

// Safety: writers are not thread-safe (no Sync) but can be sent between
// threads.
unsafe impl Send for SamplesWriter {}

impl SamplesWriter {
    /// Creates a new samples writer (internal use only).
    pub(crate) fn new(state: WriterState) -> Self {
        Self { state }
    }

    /// Explicitly detaches this writer, releasing the flow immediately.
    ///
    /// Normally the writer is released automatically when dropped.
    pub fn destroy(self) -> Result<()> {
        drop(self);
        Ok(())
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> FlowInfo {
        segment::snapshot(self.flow().header())
    }

    /// Opens `count` samples ending at `last_index` (inclusive) for writing.
    ///
    /// Reserves the range `[last_index - count + 1, last_index]` across all
    /// channels and returns the two fragments per channel. The flow's head
    /// index does not move until [`SamplesWriteAccess::commit`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] when `count` is zero, exceeds the ring length,
    /// or `last_index < count - 1`.
    pub fn open_samples(&self, last_index: u64, count: usize) -> Result<SamplesWriteAccess<'_>> {
        let flow = self.flow();
        if count == 0 || count as u64 > flow.buffer_length() {
            return Err(Error::InvalidArg(format!(
                "sample count {count} out of range (1..={})",
                flow.buffer_length()
            )));
        }
        if last_index.checked_sub(count as u64 - 1).is_none() {
            return Err(Error::InvalidArg(format!(
                "last index {last_index} does not cover {count} samples"
            )));
        }

        // Seqlock open: an odd generation tells copying readers a write is
        // in flight.
        flow.header()
            .continuous()
            .generation
            .fetch_add(1, Ordering::AcqRel);

        let geometry = flow.fragments(last_index, count);
        Ok(SamplesWriteAccess::new(self, last_index, geometry))
    }

    pub(crate) fn flow(&self) -> &ContinuousFlowData {
        match &self.state.data {
            AnyFlowData::Continuous(flow) => flow,
            // The conversion in FlowWriter checked the format.
            AnyFlowData::Discrete(_) => unreachable!(),
        }
    }
}
