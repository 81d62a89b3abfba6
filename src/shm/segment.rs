// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Memory-mapped flow data segments.
//!
//! [`Segment`] owns the mapping of a flow's `data` file. [`DiscreteFlowData`]
//! and [`ContinuousFlowData`] lay the typed ring structures over it and are
//! the only place where raw pointers into the mapping are derived.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::atomic::Ordering;

use memmap2::MmapMut;
use uuid::Uuid;

use crate::flow::{
    ContinuousFlowConfigInfo, DataFormat, DiscreteFlowConfigInfo, FlowConfigInfo, FlowInfo,
    FlowKind, FlowRuntimeInfo,
};
use crate::shm::layout::{
    FLOW_INFO_MAGIC, FLOW_INFO_SIZE, FLOW_INFO_VERSION, FlowInfoHeader, GRAIN_HEADER_VERSION,
    GRAIN_PAYLOAD_OFFSET, GrainHeader, MAX_PLANES_PER_GRAIN, round_up_to_page,
};
use crate::time;
use crate::{Error, Result, UNDEFINED_INDEX};

/// A read-write mapping of a flow `data` file.
pub(crate) struct Segment {
    _mmap: MmapMut,
    _file: File,
    base: *mut u8,
    len: usize,
    inode: u64,
}

// Safety: the mapping stays valid for the lifetime of the segment; the raw
// base pointer merely caches `mmap.as_mut_ptr()`. Concurrent access to the
// shared fields goes through atomics.
unsafe impl Send for Segment {}

impl Segment {
    /// Creates the backing file with the given length and maps it.
    pub fn create(path: &Path, len: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(len as u64)?;
        Self::map(file, len)
    }

    /// Maps an existing backing file read-write.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        Self::map(file, len)
    }

    fn map(file: File, len: usize) -> std::io::Result<Self> {
        let inode = file.metadata()?.ino();
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        let base = mmap.as_mut_ptr();
        Ok(Self {
            _mmap: mmap,
            _file: file,
            base,
            len,
            inode,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Inode of the mapped file, captured at map time. Used to detect that
    /// the flow was destroyed and recreated behind our back.
    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn header(&self) -> &FlowInfoHeader {
        // Safety: `validate_header` checked magic, version and length before
        // any typed access; creation writes the header before returning.
        unsafe { &*(self.base as *const FlowInfoHeader) }
    }

    fn body_ptr(&self) -> *mut u8 {
        // Safety: the segment is always at least FLOW_INFO_SIZE long.
        unsafe { self.base.add(FLOW_INFO_SIZE) }
    }

    fn validate_header(&self) -> Result<()> {
        if self.len < FLOW_INFO_SIZE {
            return Err(Error::Other(format!(
                "Flow data file is truncated ({} bytes).",
                self.len
            )));
        }
        let header = self.header();
        if header.magic != FLOW_INFO_MAGIC {
            return Err(Error::Other("Not a flow data file.".to_string()));
        }
        if header.version != FLOW_INFO_VERSION {
            return Err(Error::Other(format!(
                "Unsupported flow data version: {}, supported is: {}",
                header.version, FLOW_INFO_VERSION
            )));
        }
        Ok(())
    }
}

/// Creation-time parameters of a discrete flow segment.
pub(crate) struct DiscreteCreateParams {
    pub id: Uuid,
    pub format: u32,
    pub grain_rate: crate::Rational,
    pub grain_count: u32,
    pub grain_size: u32,
    pub total_slices: u32,
    pub slice_sizes: [u32; MAX_PLANES_PER_GRAIN],
}

/// Creation-time parameters of a continuous flow segment.
pub(crate) struct ContinuousCreateParams {
    pub id: Uuid,
    pub sample_rate: crate::Rational,
    pub channel_count: u32,
    pub sample_bytes: u32,
    pub buffer_length: u64,
}

/// A mapped discrete flow: header page plus a ring of grain slots.
pub(crate) struct DiscreteFlowData {
    segment: Segment,
    grain_count: u64,
    slot_stride: usize,
}

/// One slot of the discrete ring.
pub(crate) struct SlotRef<'a> {
    pub header: &'a GrainHeader,
    payload: *mut u8,
}

impl SlotRef<'_> {
    pub fn payload_ptr(&self) -> *mut u8 {
        self.payload
    }

    pub fn grain_size(&self) -> usize {
        self.header.grain_size as usize
    }
}

impl DiscreteFlowData {
    /// Byte stride from one ring slot to the next for the given payload size.
    pub fn slot_stride_for(grain_size: usize) -> usize {
        GRAIN_PAYLOAD_OFFSET + round_up_to_page(grain_size)
    }

    /// Creates and initializes the backing segment for a new discrete flow.
    pub fn create(path: &Path, params: &DiscreteCreateParams) -> Result<Self> {
        let slot_stride = Self::slot_stride_for(params.grain_size as usize);
        let len = FLOW_INFO_SIZE + params.grain_count as usize * slot_stride;
        let segment = Segment::create(path, len)?;

        let now = time::current_time();
        // Safety: the file was just created and is not yet published; we have
        // exclusive access. The mapping starts zeroed.
        unsafe {
            let header = &mut *(segment.base as *mut FlowInfoHeader);
            header.magic = FLOW_INFO_MAGIC;
            header.version = FLOW_INFO_VERSION;
            header.format = params.format;
            header.id = *params.id.as_bytes();
            header.generation = now;
            header.valid.store(1, Ordering::Relaxed);
            header.last_read_time.store(now, Ordering::Relaxed);
            header.last_write_time.store(now, Ordering::Relaxed);
            header.max_commit_batch_size_hint = 1;

            let discrete = &mut header.specific.discrete;
            discrete.grain_rate = params.grain_rate;
            discrete.slice_sizes = params.slice_sizes;
            discrete.grain_count = params.grain_count;
        }

        let data = Self {
            segment,
            grain_count: params.grain_count as u64,
            slot_stride,
        };
        for i in 0..params.grain_count as u64 {
            // Safety: slot offsets are within the freshly sized mapping.
            unsafe {
                let slot = data.slot_header_mut(i);
                (*slot).version = GRAIN_HEADER_VERSION;
                (*slot).grain_size = params.grain_size;
                (*slot).total_slices = params.total_slices;
                (*slot).index.store(UNDEFINED_INDEX, Ordering::Relaxed);
            }
        }
        Ok(data)
    }

    /// Lays the discrete ring structure over an opened segment.
    pub fn new(segment: Segment) -> Result<Self> {
        segment.validate_header()?;
        let header = segment.header();
        if !header.is_discrete() {
            return Err(Error::Other(
                "Attempt to open a continuous flow as discrete.".to_string(),
            ));
        }
        let grain_count = header.discrete().grain_count as u64;
        let body_len = segment.len().saturating_sub(FLOW_INFO_SIZE);
        if grain_count == 0 || body_len as u64 % grain_count != 0 {
            return Err(Error::Other(
                "Flow data file does not match its grain count.".to_string(),
            ));
        }
        let slot_stride = (body_len as u64 / grain_count) as usize;
        if slot_stride < GRAIN_PAYLOAD_OFFSET {
            return Err(Error::Other("Flow data file is truncated.".to_string()));
        }
        Ok(Self {
            segment,
            grain_count,
            slot_stride,
        })
    }

    pub fn header(&self) -> &FlowInfoHeader {
        self.segment.header()
    }

    pub fn grain_count(&self) -> u64 {
        self.grain_count
    }

    pub fn inode(&self) -> u64 {
        self.segment.inode()
    }

    /// Resolves an absolute grain index to its ring slot.
    pub fn slot(&self, index: u64) -> SlotRef<'_> {
        let offset = (index % self.grain_count) as usize * self.slot_stride;
        // Safety: offset is bounded by grain_count * slot_stride which the
        // constructor checked against the mapping length.
        unsafe {
            let slot_base = self.segment.body_ptr().add(offset);
            SlotRef {
                header: &*(slot_base as *const GrainHeader),
                payload: slot_base.add(GRAIN_PAYLOAD_OFFSET),
            }
        }
    }

    unsafe fn slot_header_mut(&self, slot: u64) -> *mut GrainHeader {
        let offset = slot as usize * self.slot_stride;
        unsafe { self.segment.body_ptr().add(offset) as *mut GrainHeader }
    }
}

/// Byte geometry of a wrap-aware range over all channel rings.
///
/// The concatenation of the two fragments is exactly the requested sample
/// count times the sample size, per channel; the second fragment is non-empty
/// exactly when the range crosses the ring boundary.
#[derive(Clone, Copy)]
pub(crate) struct WrappedSliceGeometry {
    pub fragment0_offset: usize,
    pub fragment0_len: usize,
    pub fragment1_len: usize,
    pub stride: usize,
    pub channel_count: usize,
}

/// A mapped continuous flow: header page plus per-channel sample rings.
pub(crate) struct ContinuousFlowData {
    segment: Segment,
    buffer_length: u64,
    sample_bytes: u32,
    channel_count: u32,
    stride: usize,
}

impl ContinuousFlowData {
    /// Creates and initializes the backing segment for a new continuous flow.
    pub fn create(path: &Path, params: &ContinuousCreateParams) -> Result<Self> {
        let stride = params.buffer_length as usize * params.sample_bytes as usize;
        let len = FLOW_INFO_SIZE + params.channel_count as usize * stride;
        let segment = Segment::create(path, len)?;

        let now = time::current_time();
        // Safety: exclusive access to the freshly created, zeroed mapping.
        unsafe {
            let header = &mut *(segment.base as *mut FlowInfoHeader);
            header.magic = FLOW_INFO_MAGIC;
            header.version = FLOW_INFO_VERSION;
            header.format = crate::shm::layout::FORMAT_AUDIO;
            header.id = *params.id.as_bytes();
            header.generation = now;
            header.valid.store(1, Ordering::Relaxed);
            header.last_read_time.store(now, Ordering::Relaxed);
            header.last_write_time.store(now, Ordering::Relaxed);
            header.max_commit_batch_size_hint = 1;

            let continuous = &mut header.specific.continuous;
            continuous.sample_rate = params.sample_rate;
            continuous.channel_count = params.channel_count;
            continuous.sample_bytes = params.sample_bytes;
            continuous.buffer_length = params.buffer_length;
            continuous.stride = stride as u64;
        }

        Ok(Self {
            segment,
            buffer_length: params.buffer_length,
            sample_bytes: params.sample_bytes,
            channel_count: params.channel_count,
            stride,
        })
    }

    /// Lays the channel ring structure over an opened segment.
    pub fn new(segment: Segment) -> Result<Self> {
        segment.validate_header()?;
        let header = segment.header();
        if header.is_discrete() {
            return Err(Error::Other(
                "Attempt to open a discrete flow as continuous.".to_string(),
            ));
        }
        let continuous = header.continuous();
        let buffer_length = continuous.buffer_length;
        let sample_bytes = continuous.sample_bytes;
        let channel_count = continuous.channel_count;
        let stride = continuous.stride as usize;
        let needed = FLOW_INFO_SIZE + channel_count as usize * stride;
        if buffer_length == 0
            || sample_bytes == 0
            || stride != buffer_length as usize * sample_bytes as usize
            || segment.len() < needed
        {
            return Err(Error::Other(
                "Flow data file does not match its channel geometry.".to_string(),
            ));
        }
        Ok(Self {
            segment,
            buffer_length,
            sample_bytes,
            channel_count,
            stride,
        })
    }

    pub fn header(&self) -> &FlowInfoHeader {
        self.segment.header()
    }

    pub fn inode(&self) -> u64 {
        self.segment.inode()
    }

    pub fn buffer_length(&self) -> u64 {
        self.buffer_length
    }

    /// Base address of the first channel ring.
    pub fn channel_base(&self) -> *mut u8 {
        self.segment.body_ptr()
    }

    /// Computes the two-fragment geometry for `count` samples ending at
    /// `last_index`, inclusive.
    ///
    /// The caller must have validated `count <= buffer_length` and
    /// `last_index + 1 >= count`.
    pub fn fragments(&self, last_index: u64, count: usize) -> WrappedSliceGeometry {
        let start = (last_index + 1 - count as u64) % self.buffer_length;
        let until_wrap = (self.buffer_length - start) as usize;
        let first = count.min(until_wrap);
        let second = count - first;
        let sample_bytes = self.sample_bytes as usize;
        WrappedSliceGeometry {
            fragment0_offset: start as usize * sample_bytes,
            fragment0_len: first * sample_bytes,
            fragment1_len: second * sample_bytes,
            stride: self.stride,
            channel_count: self.channel_count as usize,
        }
    }
}

/// A mapped flow of either kind.
pub(crate) enum AnyFlowData {
    Discrete(DiscreteFlowData),
    Continuous(ContinuousFlowData),
}

impl AnyFlowData {
    /// Opens the flow data file at `path` and lays the matching ring
    /// structure over it.
    pub fn open(path: &Path) -> Result<Self> {
        let segment = Segment::open(path).map_err(Error::from_fs)?;
        segment.validate_header()?;
        if segment.header().is_discrete() {
            Ok(AnyFlowData::Discrete(DiscreteFlowData::new(segment)?))
        } else {
            Ok(AnyFlowData::Continuous(ContinuousFlowData::new(segment)?))
        }
    }

    pub fn header(&self) -> &FlowInfoHeader {
        match self {
            AnyFlowData::Discrete(data) => data.header(),
            AnyFlowData::Continuous(data) => data.header(),
        }
    }

    pub fn inode(&self) -> u64 {
        match self {
            AnyFlowData::Discrete(data) => data.inode(),
            AnyFlowData::Continuous(data) => data.inode(),
        }
    }

    /// Takes an owned snapshot of the flow's configuration and runtime state.
    pub fn snapshot(&self) -> FlowInfo {
        snapshot(self.header())
    }
}

/// Takes an owned snapshot of a flow header's configuration and runtime
/// state.
pub(crate) fn snapshot(header: &FlowInfoHeader) -> FlowInfo {
    let kind = if header.is_discrete() {
        let discrete = header.discrete();
        FlowKind::Discrete(DiscreteFlowConfigInfo {
            grain_rate: discrete.grain_rate,
            grain_count: discrete.grain_count,
            slice_sizes: discrete.slice_sizes,
        })
    } else {
        let continuous = header.continuous();
        FlowKind::Continuous(ContinuousFlowConfigInfo {
            sample_rate: continuous.sample_rate,
            channel_count: continuous.channel_count,
            buffer_length: continuous.buffer_length,
        })
    };
    let head_index = if header.is_discrete() {
        header.discrete().head_index.load(Ordering::Acquire)
    } else {
        header.continuous().head_index.load(Ordering::Acquire)
    };
    FlowInfo {
        config: FlowConfigInfo {
            id: header.flow_id(),
            format: DataFormat::from(header.format),
            max_commit_batch_size_hint: header.max_commit_batch_size_hint,
            kind,
        },
        runtime: FlowRuntimeInfo {
            head_index,
            last_write_time: header.last_write_time.load(Ordering::Relaxed),
            last_read_time: header.last_read_time.load(Ordering::Relaxed),
        },
    }
}

/// Returns `true` if the flow backing `data_path` is still the one this
/// mapping refers to.
///
/// A flow is valid while its `valid` flag is set and the data file on disk
/// still has the inode recorded at map time; a recreated flow gets a new
/// inode and therefore invalidates all prior handles.
pub(crate) fn flow_is_current(header: &FlowInfoHeader, inode: u64, data_path: &Path) -> bool {
    if header.valid.load(Ordering::Acquire) == 0 {
        return false;
    }
    match std::fs::metadata(data_path) {
        Ok(metadata) => metadata.ino() == inode,
        Err(_) => false,
    }
}
