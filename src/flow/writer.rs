// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Generic flow writer implementation.
//!
//! Provides [`FlowWriter`], a type-erased writer that can be converted to
//! either [`crate::GrainWriter`] or [`crate::SamplesWriter`] based on the
//! flow format.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::trace;
use uuid::Uuid;

use crate::grain::writer::GrainWriter;
use crate::instance::InstanceContext;
use crate::samples::writer::SamplesWriter;
use crate::shm::segment::AnyFlowData;
use crate::sync::WriterLock;
use crate::time;
use crate::{Error, Result};

/// Exclusive write attachment to a flow.
///
/// Owns the flow mapping and the OS-level writer lock, and clears the
/// shared liveness flag when the last typed writer derived from it is
/// dropped.
pub(crate) struct WriterState {
    /// Keeps the domain alive for as long as the writer is attached.
    _context: Arc<InstanceContext>,
    pub(crate) flow_id: Uuid,
    pub(crate) data: AnyFlowData,
    _lock: WriterLock,
}

impl Drop for WriterState {
    /// Detaches the writer: clears the liveness flag and stamps the last
    /// write time. The file lock is released with the struct.
    fn drop(&mut self) {
        let header = self.data.header();
        header.writer_live.store(0, Ordering::Release);
        header
            .last_write_time
            .store(time::current_time(), Ordering::Release);
        trace!("Released flow writer for {}", self.flow_id);
    }
}

/// Generic flow writer handle.
///
/// This is the initial writer type returned by
/// [`crate::MxlInstance::create_flow_writer`]. It must be converted to a
/// typed writer ([`GrainWriter`] or [`SamplesWriter`]) using the appropriate
/// conversion method based on the flow's data format.
///
/// The writer holds exclusive write access to the flow; a second attach
/// attempt fails with [`Error::WriterBusy`] until this writer (or the typed
/// writer derived from it) is dropped.
///
/// # Examples
///
/// ```no_run
/// # use mxl::MxlInstance;
/// # fn example(instance: MxlInstance) -> Result<(), mxl::Error> {
/// let flow_def = r#"{"id": "...", "format": "urn:x-nmos:format:video", ...}"#;
/// let (writer, info, was_created) = instance.create_flow_writer(flow_def, None)?;
///
/// // Convert to the appropriate typed writer based on the flow format
/// if info.is_discrete_flow() {
///     let grain_writer = writer.to_grain_writer()?;
///     // Use grain_writer for video/data
/// } else {
///     let samples_writer = writer.to_samples_writer()?;
///     // Use samples_writer for audio
/// }
/// # Ok(())
/// # }
/// ```
pub struct FlowWriter {
    state: WriterState,
}

// Safety: writers are not thread-safe (no Sync) but can be sent between
// threads; the shared mapping is only touched through atomics and the
// exclusive write protocol.
unsafe impl Send for FlowWriter {}

impl FlowWriter {
    /// Creates a new flow writer (internal use only).
    pub(crate) fn new(
        context: Arc<InstanceContext>,
        flow_id: Uuid,
        data: AnyFlowData,
        lock: WriterLock,
    ) -> Self {
        Self {
            state: WriterState {
                _context: context,
                flow_id,
                data,
                _lock: lock,
            },
        }
    }

    /// Converts this generic writer into a [`GrainWriter`] for discrete
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is continuous (audio); the write
    /// attachment is released in that case.
    pub fn to_grain_writer(self) -> Result<GrainWriter> {
        if !self.state.data.header().is_discrete() {
            return Err(Error::Other(
                "Cannot convert FlowWriter to GrainWriter for a continuous flow.".to_string(),
            ));
        }
        Ok(GrainWriter::new(self.state))
    }

    /// Converts this generic writer into a [`SamplesWriter`] for continuous
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is discrete (video/data); the write
    /// attachment is released in that case.
    pub fn to_samples_writer(self) -> Result<SamplesWriter> {
        if self.state.data.header().is_discrete() {
            return Err(Error::Other(
                "Cannot convert FlowWriter to SamplesWriter for a discrete flow.".to_string(),
            ));
        }
        Ok(SamplesWriter::new(self.state))
    }
}
