// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Continuous media sample handling (audio streams).
//!
//! Continuous flows store one contiguous sample ring per channel, addressed
//! by absolute sample index. Batches are opened and read by the index of
//! their last sample; a batch that crosses the ring boundary comes back as
//! two fragments per channel. The writer's batch size and the readers' batch
//! sizes are independent.
//!
//! # Key Types
//!
//! - [`reader::SamplesReader`]: Reads audio samples from a flow
//! - [`writer::SamplesWriter`]: Writes audio samples to a flow
//! - [`write_access::SamplesWriteAccess`]: RAII write session for a sample
//!   batch
//! - [`data::SamplesData`]: Zero-copy view of multi-channel sample data

pub mod data;
pub mod reader;
pub mod write_access;
pub mod writer;
