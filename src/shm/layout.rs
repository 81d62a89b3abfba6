// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Binary layout of the structures stored in flow shared memory.
//!
//! These structs are mapped directly over the flow's `data` file and shared
//! read-write between the writer process and any number of reader processes.
//! Host endianness; this is not a portable wire format. Fields mutated after
//! publication are atomics; everything else is written once before the flow
//! directory is renamed into place and is read-only afterwards.

use std::mem::{ManuallyDrop, offset_of, size_of};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64};

use uuid::Uuid;

use crate::Rational;

/// Identifies a mapped flow header ("MXLFLOWI").
pub(crate) const FLOW_INFO_MAGIC: u64 = 0x4D58_4C46_4C4F_5749;

/// The version of the flow header structure we expect and support.
pub(crate) const FLOW_INFO_VERSION: u32 = 1;

/// The version of the grain slot header structure we expect and support.
pub(crate) const GRAIN_HEADER_VERSION: u32 = 1;

/// The flow header occupies exactly the first page of the mapping.
pub(crate) const FLOW_INFO_SIZE: usize = 4096;

/// Grain payloads start one page after their slot header and are page
/// aligned.
pub(crate) const GRAIN_PAYLOAD_OFFSET: usize = 4096;

pub(crate) const PAGE_SIZE: usize = 4096;

/// Maximum number of payload planes per grain. v210 uses one, v210+alpha
/// uses two.
pub(crate) const MAX_PLANES_PER_GRAIN: usize = 4;

/// Grain payload size for ANC data flows (`video/smpte291`). Large enough to
/// hold all the ANC data of one frame in a single grain, and exactly one VFS
/// page.
pub(crate) const DATA_FORMAT_GRAIN_SIZE: usize = 4096;

/// The grain carries no usable payload. Committing an invalid grain is the
/// proper way to move the ring buffer forward whilst letting consumers know
/// that the grain is missing; a consumer may repeat the previous grain,
/// insert silence, etc.
pub const GRAIN_FLAG_INVALID: u32 = 1 << 0;

/// The grain is not continuous with its predecessor.
pub const GRAIN_FLAG_DISCONTINUITY: u32 = 1 << 1;

pub(crate) const FORMAT_VIDEO: u32 = 1;
pub(crate) const FORMAT_AUDIO: u32 = 2;
pub(crate) const FORMAT_DATA: u32 = 3;

/// Rounds `len` up to the next page boundary.
pub(crate) fn round_up_to_page(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Header fields specific to discrete (grain-based) flows.
#[repr(C)]
pub(crate) struct DiscreteInfo {
    /// Grains per second. Always the declared grain rate, reduced to lowest
    /// terms, even for interlaced video.
    pub grain_rate: Rational,
    /// Largest grain index ever published. Zero means no grain has been
    /// published yet.
    pub head_index: AtomicU64,
    /// Byte length of one slice per payload plane; unused planes are zero.
    pub slice_sizes: [u32; MAX_PLANES_PER_GRAIN],
    /// Number of slots in the ring. A power of two.
    pub grain_count: u32,
    /// Incremented on every commit so waiting readers can cheaply detect
    /// progress.
    pub sync_counter: AtomicU32,
}

/// Header fields specific to continuous (sample-based) flows.
#[repr(C)]
pub(crate) struct ContinuousInfo {
    /// Samples per second, reduced to lowest terms.
    pub sample_rate: Rational,
    /// Number of channels; one ring per channel.
    pub channel_count: u32,
    /// Bytes per sample (bit depth / 8).
    pub sample_bytes: u32,
    /// Number of samples in each per-channel ring.
    pub buffer_length: u64,
    /// Largest sample index ever published. Zero means no sample has been
    /// published yet.
    pub head_index: AtomicU64,
    /// Byte distance between the same position in consecutive channel rings.
    pub stride: u64,
    /// Seqlock generation: odd while a write is open, even when idle.
    pub generation: AtomicU32,
    _pad: u32,
}

/// Format-specific arm of the flow header.
#[repr(C)]
pub(crate) union FormatSpecific {
    pub discrete: ManuallyDrop<DiscreteInfo>,
    pub continuous: ManuallyDrop<ContinuousInfo>,
}

/// Binary structure stored at the start of the flow `data` file.
#[repr(C)]
pub(crate) struct FlowInfoHeader {
    pub magic: u64,
    pub version: u32,
    /// One of [`FORMAT_VIDEO`], [`FORMAT_AUDIO`], [`FORMAT_DATA`].
    pub format: u32,
    /// The flow UUID. Identical to the flow's directory name.
    pub id: [u8; 16],
    /// TAI creation stamp; strictly increases across recreations of the same
    /// flow id.
    pub generation: u64,
    /// Zero once the flow has been invalidated. Invalidation is terminal.
    pub valid: AtomicU8,
    _pad0: [u8; 7],
    /// One while a writer holds the flow. May be stale after a writer crash;
    /// the file-lock probe is authoritative.
    pub writer_live: AtomicU8,
    _pad1: [u8; 7],
    /// Last time a consumer read from the flow, TAI nanoseconds.
    pub last_read_time: AtomicU64,
    /// Last time a producer wrote to the flow, TAI nanoseconds.
    pub last_write_time: AtomicU64,
    /// Largest batch (slices or samples) the producer expects to commit at
    /// once.
    pub max_commit_batch_size_hint: u32,
    _pad2: [u8; 4],
    pub specific: FormatSpecific,
    _reserved: [u8; FLOW_INFO_SIZE - 80 - size_of::<FormatSpecific>()],
}

impl FlowInfoHeader {
    pub fn flow_id(&self) -> Uuid {
        Uuid::from_bytes(self.id)
    }

    pub fn is_discrete(&self) -> bool {
        self.format == FORMAT_VIDEO || self.format == FORMAT_DATA
    }

    /// Accessor for the discrete arm.
    ///
    /// Callers must have checked [`Self::is_discrete`]; this is enforced in
    /// debug builds only.
    pub fn discrete(&self) -> &DiscreteInfo {
        debug_assert!(self.is_discrete());
        unsafe { &self.specific.discrete }
    }

    /// Accessor for the continuous arm.
    pub fn continuous(&self) -> &ContinuousInfo {
        debug_assert!(!self.is_discrete());
        unsafe { &self.specific.continuous }
    }
}

/// Per-slot header of the discrete ring, one page before its payload.
#[repr(C)]
pub(crate) struct GrainHeader {
    pub version: u32,
    _pad0: u32,
    /// Absolute grain index currently occupying this ring slot.
    /// [`crate::UNDEFINED_INDEX`] until first written.
    pub index: AtomicU64,
    /// Grain flags; see [`GRAIN_FLAG_INVALID`].
    pub flags: AtomicU32,
    /// Size in bytes of the complete grain payload.
    pub grain_size: u32,
    /// Number of slices that make up a full grain.
    pub total_slices: u32,
    /// How many leading slices are currently committed. Monotonically
    /// non-decreasing while `index` is unchanged; a grain is complete when
    /// `valid_slices == total_slices`.
    pub valid_slices: AtomicU32,
    /// TAI time of the most recent commit on this slot.
    pub commit_timestamp: AtomicU64,
    _reserved: [u8; GRAIN_PAYLOAD_OFFSET - 40],
}

// The documented offsets of the shared layout are part of the on-disk
// contract between processes.
const _: () = {
    assert!(size_of::<FlowInfoHeader>() == FLOW_INFO_SIZE);
    assert!(offset_of!(FlowInfoHeader, magic) == 0);
    assert!(offset_of!(FlowInfoHeader, version) == 8);
    assert!(offset_of!(FlowInfoHeader, format) == 12);
    assert!(offset_of!(FlowInfoHeader, id) == 16);
    assert!(offset_of!(FlowInfoHeader, generation) == 32);
    assert!(offset_of!(FlowInfoHeader, valid) == 40);
    assert!(offset_of!(FlowInfoHeader, writer_live) == 48);
    assert!(offset_of!(FlowInfoHeader, last_read_time) == 56);
    assert!(offset_of!(FlowInfoHeader, last_write_time) == 64);
    assert!(offset_of!(FlowInfoHeader, max_commit_batch_size_hint) == 72);
    assert!(offset_of!(FlowInfoHeader, specific) == 80);
    assert!(size_of::<DiscreteInfo>() == 48);
    assert!(size_of::<ContinuousInfo>() == 56);
    assert!(size_of::<GrainHeader>() == GRAIN_PAYLOAD_OFFSET);
    assert!(offset_of!(GrainHeader, index) == 8);
    assert!(offset_of!(GrainHeader, valid_slices) == 28);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rounding() {
        assert_eq!(round_up_to_page(0), 0);
        assert_eq!(round_up_to_page(1), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up_to_page(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}
