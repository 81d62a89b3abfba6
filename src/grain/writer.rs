// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Grain writer implementation for discrete media flows.

use std::sync::atomic::Ordering;

use crate::flow::FlowInfo;
use crate::flow::writer::WriterState;
use crate::grain::write_access::GrainWriteAccess;
use crate::shm::segment::{self, AnyFlowData, DiscreteFlowData};
use crate::Result;

/// Writer for discrete media grains (video frames, data packets).
///
/// Provides zero-copy write access to grains in MXL's ring buffer. Each grain
/// is opened at a specific index, written via [`GrainWriteAccess`], and then
/// committed to make it visible to readers. Opening and committing never
/// block.
///
/// # Thread Safety
///
/// `GrainWriter` is `Send` but not `Sync`. Each writer should be used by only
/// one thread at a time, but can be transferred between threads.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, GrainWriter};
/// # fn example(instance: MxlInstance, writer: GrainWriter) -> Result<(), mxl::Error> {
/// // Open a grain for writing at the current index
/// let rate = mxl::Rational::new(60, 1);
/// let index = instance.get_current_index(&rate);
///
/// let mut access = writer.open_grain(index)?;
/// access.payload_mut().fill(0xFF); // Write data
/// let total_slices = access.total_slices();
/// access.commit(total_slices)?; // Commit
/// # Ok(())
/// # }
/// ```
pub struct GrainWriter {
    state: WriterState,
}

// Safety: writers are not thread-safe (no Sync) but can be sent between
// threads.
unsafe impl Send for GrainWriter {}

impl GrainWriter {
    /// Creates a new grain writer (internal use only).
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

    /// Opens the grain at `index` for writing.
    ///
    /// Resolves the ring slot for `index` and reinitializes it when a
    /// different grain occupied it before; reopening the index of a
    /// partially committed grain resumes it instead. Returns a
    /// [`GrainWriteAccess`] session that provides mutable access to the
    /// grain's payload buffer and must be committed (fully or slice by
    /// slice) to become visible to readers.
    pub fn open_grain(&self, index: u64) -> Result<GrainWriteAccess<'_>> {
        let slot = self.flow().slot(index);
        if slot.header.index.load(Ordering::Relaxed) != index {
            // Retire whatever grain lived here: readers must never see the
            // new index paired with the old slice count.
            slot.header.valid_slices.store(0, Ordering::Relaxed);
            slot.header.flags.store(0, Ordering::Relaxed);
            slot.header.commit_timestamp.store(0, Ordering::Relaxed);
            slot.header.index.store(index, Ordering::Release);
        }
        let committed_slices = slot.header.valid_slices.load(Ordering::Relaxed);
        Ok(GrainWriteAccess::new(self, index, slot, committed_slices))
    }

    pub(crate) fn flow(&self) -> &DiscreteFlowData {
        match &self.state.data {
            AnyFlowData::Discrete(flow) => flow,
            // The conversion in FlowWriter checked the format.
            AnyFlowData::Continuous(_) => unreachable!(),
        }
    }
}
