// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Grain reader implementation for discrete media flows.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use uuid::Uuid;

use crate::flow::FlowInfo;
use crate::grain::data::GrainData;
use crate::instance::InstanceContext;
use crate::shm::segment::{self, DiscreteFlowData};
use crate::{Error, Result, UNDEFINED_INDEX, sync, time};

/// Reader for discrete media grains (video frames, data packets).
///
/// Provides zero-copy access to grains stored in MXL's ring buffer. Grains
/// are accessed by index, and reads can be blocking (with timeout) or
/// non-blocking.
///
/// # Thread Safety
///
/// `GrainReader` is `Send` but not `Sync`. Each reader should be used by only
/// one thread at a time, but can be transferred between threads.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, GrainReader};
/// # use std::time::Duration;
/// # fn example(instance: MxlInstance, reader: GrainReader) -> Result<(), mxl::Error> {
/// let info = reader.get_info();
/// let rate = info.config.grain_rate()?;
/// let index = instance.get_current_index(&rate);
///
/// // Blocking read with 5-second timeout
/// let grain = reader.get_complete_grain(index, Duration::from_secs(5))?;
/// println!("Read {} bytes", grain.payload.len());
/// # Ok(())
/// # }
/// ```
pub struct GrainReader {
    context: Arc<InstanceContext>,
    flow_id: Uuid,
    flow: DiscreteFlowData,
}

// Safety: readers are not thread-safe (no Sync) but can be sent between
// threads.
unsafe impl Send for GrainReader {}

impl GrainReader {
    /// Creates a new grain reader (internal use only).
    pub(crate) fn new(
        context: Arc<InstanceContext>,
        flow_id: Uuid,
        flow: DiscreteFlowData,
    ) -> Self {
        Self {
            context,
            flow_id,
            flow,
        }
    }

    /// Retrieves complete flow information (config + runtime).
    pub fn get_info(&self) -> FlowInfo {
        segment::snapshot(self.flow.header())
    }

    /// Reads the grain at `index`, blocking up to `timeout` for it to be
    /// published.
    ///
    /// The returned grain may be partial: the writer publishes slice by
    /// slice, and `valid_slices` reports how much of the payload is
    /// committed so far. Re-call to observe more slices; `valid_slices`
    /// never decreases while the grain occupies its ring slot. Use
    /// [`Self::get_complete_grain`] to wait for the whole grain.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRangeTooEarly`] if the grain is not available within
    ///   `timeout`
    /// - [`Error::OutOfRangeTooLate`] if the grain has been overwritten
    /// - [`Error::FlowInvalid`] if the flow was destroyed or recreated
    pub fn get_grain(&self, index: u64, timeout: Duration) -> Result<GrainData<'_>> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let deadline = time::current_time().saturating_add(timeout_ns);
        let discrete = self.flow.header().discrete();

        // An index that lies further in the future than the timeout can
        // never be satisfied in time.
        let wall_clock_gap = time::ns_until_index(&discrete.grain_rate, index);
        if wall_clock_gap != UNDEFINED_INDEX && wall_clock_gap > timeout_ns {
            let head = discrete.head_index.load(Ordering::Acquire);
            if head == 0 || index > head {
                return Err(self.classify(Error::OutOfRangeTooEarly));
            }
        }

        loop {
            if self.flow.header().valid.load(Ordering::Acquire) == 0 {
                return Err(Error::FlowInvalid);
            }
            let head = discrete.head_index.load(Ordering::Acquire);
            if head != 0 && index <= head {
                let min_index = head.saturating_sub(self.flow.grain_count() - 1);
                if index < min_index {
                    return Err(self.classify(Error::OutOfRangeTooLate));
                }
                return self.read_slot(index);
            }
            let published = sync::wait_until(deadline, || {
                let head = discrete.head_index.load(Ordering::Acquire);
                head != 0 && head >= index
            });
            if !published {
                return Err(self.classify(Error::OutOfRangeTooEarly));
            }
        }
    }

    /// Reads a complete grain, blocking up to `timeout`.
    ///
    /// Waits for the grain at `index` to be completely written, retrying
    /// while partial data is encountered. Returns once all slices are valid
    /// or the timeout expires.
    pub fn get_complete_grain(&self, index: u64, timeout: Duration) -> Result<GrainData<'_>> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let deadline = time::current_time().saturating_add(timeout_ns);
        loop {
            let remaining = deadline.saturating_sub(time::current_time());
            let grain = self.get_grain(index, Duration::from_nanos(remaining))?;
            if grain.is_complete() {
                return Ok(grain);
            }
            drop(grain);
            if time::current_time() >= deadline {
                return Err(self.classify(Error::OutOfRangeTooEarly));
            }
            std::thread::sleep(Duration::from_micros(50));
        }
    }

    /// Reads a grain without blocking (may return partial data).
    ///
    /// Unlike [`Self::get_grain`], this returns immediately whether or not
    /// the grain has been published.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRangeTooEarly`] if the grain hasn't been published yet
    /// - [`Error::OutOfRangeTooLate`] if the grain has been overwritten
    /// - [`Error::FlowInvalid`] if the flow was destroyed or recreated
    pub fn get_grain_non_blocking(&self, index: u64) -> Result<GrainData<'_>> {
        if self.flow.header().valid.load(Ordering::Acquire) == 0 {
            return Err(Error::FlowInvalid);
        }
        let discrete = self.flow.header().discrete();
        let head = discrete.head_index.load(Ordering::Acquire);
        if head == 0 || index > head {
            return Err(self.classify(Error::OutOfRangeTooEarly));
        }
        let min_index = head.saturating_sub(self.flow.grain_count() - 1);
        if index < min_index {
            return Err(self.classify(Error::OutOfRangeTooLate));
        }
        self.read_slot(index)
    }

    fn read_slot(&self, index: u64) -> Result<GrainData<'_>> {
        let slot = self.flow.slot(index);
        let mut slot_index = slot.header.index.load(Ordering::Acquire);
        if slot_index != index {
            // The writer may be mid-reinitialization of this slot; give it
            // one more look before declaring the grain overwritten.
            slot_index = slot.header.index.load(Ordering::Acquire);
            if slot_index != index {
                return Err(self.classify(Error::OutOfRangeTooLate));
            }
        }
        let valid_slices = slot.header.valid_slices.load(Ordering::Acquire);
        let flags = slot.header.flags.load(Ordering::Relaxed);

        self.flow
            .header()
            .last_read_time
            .store(time::current_time(), Ordering::Relaxed);

        // Safety: the slot payload stays mapped for the lifetime of this
        // reader. It may be overwritten by a subsequent write of the same
        // slot, which the caller accepts by construction of the ring.
        let payload =
            unsafe { std::slice::from_raw_parts(slot.payload_ptr(), slot.grain_size()) };
        Ok(GrainData {
            payload,
            total_size: slot.grain_size(),
            flags,
            valid_slices,
            total_slices: slot.header.total_slices,
        })
    }

    /// Converts an out-of-range outcome into [`Error::FlowInvalid`] when the
    /// flow itself turns out to be gone.
    fn classify(&self, error: Error) -> Error {
        let data_path = self.context.manager.data_path(&self.flow_id);
        if !segment::flow_is_current(self.flow.header(), self.flow.inode(), &data_path) {
            Error::FlowInvalid
        } else {
            error
        }
    }
}
