// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Flow types and metadata structures.
//!
//! This module defines data types for working with MXL flows, including:
//! - Flow readers and writers ([`reader`], [`writer`])
//! - Flow definitions and schema ([`flowdef`])
//! - Instance and flow options ([`options`])
//! - Configuration and runtime metadata ([`FlowConfigInfo`], [`FlowRuntimeInfo`])
//! - Media format classification ([`DataFormat`])

pub mod flowdef;
pub mod options;
pub mod reader;
pub mod writer;

use uuid::Uuid;

use crate::shm::layout::{FORMAT_AUDIO, FORMAT_DATA, FORMAT_VIDEO};
use crate::{Error, Rational, Result};

/// Media data format classification for MXL flows.
///
/// Flows are classified as either discrete (grain-based) or continuous
/// (sample-based) depending on the data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    /// Format not specified or unknown.
    Unspecified,
    /// Video data (discrete, grain-based).
    Video,
    /// Audio data (continuous, sample-based).
    Audio,
    /// Generic data packets (discrete, grain-based).
    Data,
}

impl DataFormat {
    /// Returns `true` if this format uses discrete (grain-based) delivery.
    ///
    /// Video and generic data flows use discrete delivery, while audio uses
    /// continuous (sample-based) delivery.
    pub fn is_discrete(&self) -> bool {
        matches!(self, DataFormat::Video | DataFormat::Data)
    }

    /// The numeric code stored in the shared flow header.
    pub(crate) fn code(&self) -> u32 {
        match self {
            DataFormat::Unspecified => 0,
            DataFormat::Video => FORMAT_VIDEO,
            DataFormat::Audio => FORMAT_AUDIO,
            DataFormat::Data => FORMAT_DATA,
        }
    }
}

impl From<u32> for DataFormat {
    /// Converts a raw format code from the shared header to a [`DataFormat`].
    fn from(value: u32) -> Self {
        match value {
            FORMAT_VIDEO => DataFormat::Video,
            FORMAT_AUDIO => DataFormat::Audio,
            FORMAT_DATA => DataFormat::Data,
            _ => DataFormat::Unspecified,
        }
    }
}

/// Complete flow information including configuration and runtime state.
///
/// Combines static configuration (format, rate, dimensions) with dynamic
/// runtime state (head index, last access times). This is an owned snapshot;
/// it does not track later changes to the shared header.
pub struct FlowInfo {
    /// Static flow configuration.
    pub config: FlowConfigInfo,
    /// Dynamic runtime state.
    pub runtime: FlowRuntimeInfo,
}

/// Flow configuration metadata.
///
/// Contains static information about a flow's format, rate, and buffer
/// configuration. This is set when the flow is created and does not change.
pub struct FlowConfigInfo {
    pub(crate) id: Uuid,
    pub(crate) format: DataFormat,
    pub(crate) max_commit_batch_size_hint: u32,
    pub(crate) kind: FlowKind,
}

/// Format-specific arm of [`FlowConfigInfo`].
pub enum FlowKind {
    /// Configuration of a discrete (video/data) flow.
    Discrete(DiscreteFlowConfigInfo),
    /// Configuration of a continuous (audio) flow.
    Continuous(ContinuousFlowConfigInfo),
}

/// Static configuration of a discrete flow.
pub struct DiscreteFlowConfigInfo {
    /// The number of grains per second.
    pub grain_rate: Rational,
    /// The number of slots in the ring buffer.
    pub grain_count: u32,
    /// Byte length of one slice per payload plane; unused planes are zero.
    pub slice_sizes: [u32; 4],
}

/// Static configuration of a continuous flow.
pub struct ContinuousFlowConfigInfo {
    /// The number of samples per second.
    pub sample_rate: Rational,
    /// The number of channels; one ring per channel.
    pub channel_count: u32,
    /// The number of samples in each per-channel ring.
    pub buffer_length: u64,
}

impl FlowConfigInfo {
    /// Returns the flow's unique identifier (UUID).
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the media data format of this flow.
    pub fn data_format(&self) -> DataFormat {
        self.format
    }

    /// Returns `true` if this is a discrete (grain-based) flow.
    pub fn is_discrete_flow(&self) -> bool {
        self.format.is_discrete()
    }

    /// Returns the maximum commit batch size hint from the writer.
    ///
    /// For continuous flows, writers can indicate their preferred batch size;
    /// readers can use this to match the writer's pacing.
    pub fn max_commit_batch_size_hint(&self) -> u32 {
        self.max_commit_batch_size_hint
    }

    /// Returns discrete flow configuration (for video and data flows).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is continuous (audio).
    pub fn discrete(&self) -> Result<&DiscreteFlowConfigInfo> {
        match &self.kind {
            FlowKind::Discrete(info) => Ok(info),
            FlowKind::Continuous(_) => Err(Error::Other(format!(
                "Flow format is {:?}, video or data required.",
                self.format
            ))),
        }
    }

    /// Returns continuous flow configuration (for audio flows).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is discrete (video/data).
    pub fn continuous(&self) -> Result<&ContinuousFlowConfigInfo> {
        match &self.kind {
            FlowKind::Continuous(info) => Ok(info),
            FlowKind::Discrete(_) => Err(Error::Other(format!(
                "Flow format is {:?}, audio required.",
                self.format
            ))),
        }
    }

    /// Returns the grain rate for discrete flows (video/data).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is continuous (audio).
    pub fn grain_rate(&self) -> Result<Rational> {
        Ok(self.discrete()?.grain_rate)
    }

    /// Returns the sample rate for continuous flows (audio).
    ///
    /// # Errors
    ///
    /// Returns an error if this flow is discrete (video/data).
    pub fn sample_rate(&self) -> Result<Rational> {
        Ok(self.continuous()?.sample_rate)
    }
}

/// Dynamic runtime information about a flow.
///
/// Contains state that changes as data is written and read, such as the
/// current head index and last access timestamps.
pub struct FlowRuntimeInfo {
    /// The largest index ever published. Zero means nothing was published
    /// yet.
    pub head_index: u64,
    /// The TAI timestamp of the last write operation (in nanoseconds).
    pub last_write_time: u64,
    /// The TAI timestamp of the last read operation (in nanoseconds).
    pub last_read_time: u64,
}
