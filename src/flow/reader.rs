// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Generic flow reader implementation.
//!
//! Provides [`FlowReader`], a type-erased reader that can be converted to
//! either [`crate::GrainReader`] or [`crate::SamplesReader`] based on the
//! flow format.

use std::sync::Arc;

use uuid::Uuid;

use crate::flow::FlowInfo;
use crate::grain::reader::GrainReader;
use crate::instance::InstanceContext;
use crate::samples::reader::SamplesReader;
use crate::shm::segment::AnyFlowData;
use crate::{Error, Result};

/// Generic flow reader handle.
///
/// This is the initial reader type returned by
/// [`crate::MxlInstance::create_flow_reader`]. It must be converted to a
/// typed reader ([`GrainReader`] or [`SamplesReader`]) using the appropriate
/// conversion method based on the flow's data format.
///
/// # Examples
///
/// ```no_run
/// # use mxl::MxlInstance;
/// # fn example(instance: MxlInstance) -> Result<(), mxl::Error> {
/// let reader = instance.create_flow_reader("flow-uuid")?;
///
/// // Check flow type and convert to the appropriate reader
/// if reader.get_info().config.is_discrete_flow() {
///     let grain_reader = reader.to_grain_reader()?;
///     // Use grain_reader for video/data
/// } else {
///     let samples_reader = reader.to_samples_reader()?;
///     // Use samples_reader for audio
/// }
/// # Ok(())
/// # }
/// ```
pub struct FlowReader {
    context: Arc<InstanceContext>,
    flow_id: Uuid,
    data: AnyFlowData,
}

// Safety: readers are not thread-safe (no Sync) but can be sent between
// threads; the shared mapping is only touched through atomics and raw reads.
unsafe impl Send for FlowReader {}

impl FlowReader {
    /// Creates a new `FlowReader` from internal components (internal use
    /// only).
    pub(crate) fn new(context: Arc<InstanceContext>, flow_id: Uuid, data: AnyFlowData) -> Self {
        Self {
            context,
            flow_id,
            data,
        }
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> FlowInfo {
        self.data.snapshot()
    }

    /// Converts this generic reader into a [`GrainReader`] for discrete
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is continuous (audio). Check the flow
    /// type with [`Self::get_info`] first if unsure.
    pub fn to_grain_reader(self) -> Result<GrainReader> {
        match self.data {
            AnyFlowData::Discrete(flow) => {
                Ok(GrainReader::new(self.context, self.flow_id, flow))
            }
            AnyFlowData::Continuous(_) => Err(Error::Other(
                "Cannot convert FlowReader to GrainReader for a continuous flow.".to_string(),
            )),
        }
    }

    /// Converts this generic reader into a [`SamplesReader`] for continuous
    /// flows.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow is discrete (video/data). Check the flow
    /// type with [`Self::get_info`] first if unsure.
    pub fn to_samples_reader(self) -> Result<SamplesReader> {
        match self.data {
            AnyFlowData::Continuous(flow) => {
                Ok(SamplesReader::new(self.context, self.flow_id, flow))
            }
            AnyFlowData::Discrete(_) => Err(Error::Other(
                "Cannot convert FlowReader to SamplesReader for a discrete flow.".to_string(),
            )),
        }
    }
}
