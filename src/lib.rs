// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # MXL - Media eXchange Layer
//!
//! High-performance zero-copy shared-memory media exchange for video, audio,
//! and data streams between independent processes on a single host.
//!
//! ## Overview
//!
//! MXL enables inter-process media exchange using memory-mapped ring buffers
//! on tmpfs. Producers publish timed media grains (video frames, ancillary
//! data packets) or sample windows (audio) into a named domain directory;
//! consumers attach to that domain and read them with bounded latency and
//! without copies. Producer and consumer lifecycles are not coordinated:
//! readers may attach before or after writers, and either side may crash.
//!
//! ### Key Concepts
//!
//! - **Domain**: A tmpfs directory containing shared memory for media flows
//! - **Instance**: A connection to an MXL domain ([`MxlInstance`])
//! - **Flow**: A unidirectional ring buffer for media data, either discrete
//!   or continuous
//! - **Grain**: A discrete unit of media (video frame, data packet) accessed
//!   via [`GrainReader`]/[`GrainWriter`]
//! - **Samples**: Continuous media data (audio) accessed via
//!   [`SamplesReader`]/[`SamplesWriter`]
//!
//! ### Flow Types
//!
//! MXL supports two media flow patterns:
//!
//! - **Discrete (grain-based)**: Video frames and data packets delivered as
//!   complete units, optionally published slice by slice
//! - **Continuous (sample-based)**: Audio streams delivered as per-channel
//!   sample batches
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ MxlInstance │  (bound to a domain)
//! └──────┬──────┘
//!        │
//!        ├─► FlowWriter ──► GrainWriter   (video/data)
//!        │              └─► SamplesWriter  (audio)
//!        │
//!        └─► FlowReader ──► GrainReader   (video/data)
//!                       └─► SamplesReader  (audio)
//! ```
//!
//! ## Examples
//!
//! ### Creating an MXL instance and writing video grains
//!
//! ```no_run
//! use mxl::MxlInstance;
//!
//! # fn main() -> Result<(), mxl::Error> {
//! // Create an instance bound to a tmpfs domain
//! let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
//!
//! // Create a flow writer from a JSON flow definition
//! let flow_def = r#"{"id": "...", "format": "urn:x-nmos:format:video", ...}"#;
//! let (writer, info, _) = instance.create_flow_writer(flow_def, None)?;
//!
//! // Convert to a grain writer for discrete video data
//! let grain_writer = writer.to_grain_writer()?;
//!
//! // Write a grain at the current index
//! let rate = info.grain_rate()?;
//! let index = instance.get_current_index(&rate);
//! let mut access = grain_writer.open_grain(index)?;
//! access.payload_mut().fill(42); // Fill with test data
//! let total_slices = access.total_slices();
//! access.commit(total_slices)?; // Commit all slices
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading audio samples
//!
//! ```no_run
//! use mxl::MxlInstance;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), mxl::Error> {
//! let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
//!
//! // Connect to an existing audio flow
//! let reader = instance.create_flow_reader("flow-uuid")?;
//! let samples_reader = reader.to_samples_reader()?;
//!
//! // Read 480 samples (10ms at 48kHz) with 5-second timeout
//! let index = samples_reader.get_info().runtime.head_index;
//! let samples = samples_reader.get_samples(index, 480, Duration::from_secs(5))?;
//!
//! // Access per-channel data (may wrap at ring boundary)
//! for ch in 0..samples.num_of_channels() {
//!     let (fragment1, fragment2) = samples.channel_data(ch)?;
//!     println!("Channel {}: {} + {} bytes", ch, fragment1.len(), fragment2.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Timing and Synchronization
//!
//! MXL uses TAI timestamps (nanoseconds since the SMPTE ST 2059 epoch,
//! 1970-01-01 00:00:00 TAI):
//!
//! - [`MxlInstance::get_time`] returns the current TAI time
//! - [`MxlInstance::index_to_timestamp`] / [`MxlInstance::timestamp_to_index`]
//!   convert between indices and timestamps
//! - [`MxlInstance::get_duration_until_index`] paces writers
//!
//! ## Thread Safety
//!
//! - [`MxlInstance`] is `Send + Sync` and can be shared across threads
//! - Readers and writers are `Send` but not `Sync`
//! - Each flow has at most one writer at a time (enforced through an OS file
//!   lock that also survives writer crashes) and any number of readers

mod error;
mod flow;
mod grain;
mod instance;
mod manager;
mod rational;
mod samples;
mod shm;
mod sync;

pub mod time;

pub use error::{
    Error, Result, STATUS_FLOW_INVALID, STATUS_FLOW_NOT_FOUND, STATUS_INVALID_ARG,
    STATUS_INVALID_DESCRIPTOR, STATUS_IO_ERROR, STATUS_OK, STATUS_OUT_OF_RANGE_TOO_EARLY,
    STATUS_OUT_OF_RANGE_TOO_LATE, STATUS_PERMISSION_DENIED, STATUS_UNSUPPORTED_MEDIA_TYPE,
    STATUS_WRITER_BUSY, Status,
};
pub use flow::options::FlowOptions;
pub use flow::{
    ContinuousFlowConfigInfo, DataFormat, DiscreteFlowConfigInfo, FlowConfigInfo, FlowInfo,
    FlowKind, FlowRuntimeInfo, flowdef, reader::FlowReader, writer::FlowWriter,
};
pub use grain::{
    data::*, reader::GrainReader, write_access::GrainWriteAccess, writer::GrainWriter,
};
pub use instance::MxlInstance;
pub use rational::Rational;
pub use samples::{
    data::*, reader::SamplesReader, write_access::SamplesWriteAccess, writer::SamplesWriter,
};
pub use shm::layout::{GRAIN_FLAG_DISCONTINUITY, GRAIN_FLAG_INVALID};
pub use time::UNDEFINED_INDEX;
