// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample reader implementation for continuous media flows.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use uuid::Uuid;

use crate::flow::FlowInfo;
use crate::instance::InstanceContext;
use crate::samples::data::SamplesData;
use crate::shm::segment::{self, ContinuousFlowData};
use crate::{Error, Result, UNDEFINED_INDEX, sync, time};

/// Reader for continuous audio sample streams.
///
/// Provides zero-copy access to multi-channel audio samples stored in MXL's
/// ring buffer. Samples are read in batches addressed by the absolute index
/// of their last sample; the reader's batch size is independent of the batch
/// size the writer commits with.
///
/// # Thread Safety
///
/// `SamplesReader` is `Send` but not `Sync`. Each reader should be used by
/// only one thread at a time, but can be transferred between threads.
///
/// # Examples
///
/// ```no_run
/// # use mxl::{MxlInstance, SamplesReader};
/// # use std::time::Duration;
/// # fn example(instance: MxlInstance, reader: SamplesReader) -> Result<(), mxl::Error> {
/// let info = reader.get_info();
/// let head_index = info.runtime.head_index;
///
/// // Read 480 samples (10ms at 48kHz)
/// let samples = reader.get_samples(head_index, 480, Duration::from_secs(1))?;
/// println!("Read {} channels", samples.num_of_channels());
/// # Ok(())
/// # }
/// ```
pub struct SamplesReader {
    context: Arc<InstanceContext>,
    flow_id: Uuid,
    flow: ContinuousFlowData,
}

// Safety: readers are not thread-safe (no Sync) but can be sent between
// threads.
unsafe impl Send for SamplesReader {}

impl SamplesReader {
    /// Creates a new samples reader (internal use only).
    pub(crate) fn new(
        context: Arc<InstanceContext>,
        flow_id: Uuid,
        flow: ContinuousFlowData,
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

    /// Reads `count` samples ending at `last_index` (inclusive), blocking up
    /// to `timeout` for them to be published.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfRangeTooEarly`] if the samples are not available
    ///   within `timeout`
    /// - [`Error::OutOfRangeTooLate`] if the range reaches below the oldest
    ///   retained sample
    /// - [`Error::FlowInvalid`] if the flow was destroyed or recreated
    /// - [`Error::InvalidArg`] if `count` is zero or exceeds the ring length
    pub fn get_samples(
        &self,
        last_index: u64,
        count: usize,
        timeout: Duration,
    ) -> Result<SamplesData<'_>> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let deadline = time::current_time().saturating_add(timeout_ns);
        self.check_count(count)?;
        let continuous = self.flow.header().continuous();

        // An index that lies further in the future than the timeout can
        // never be satisfied in time.
        let wall_clock_gap = time::ns_until_index(&continuous.sample_rate, last_index);
        if wall_clock_gap != UNDEFINED_INDEX && wall_clock_gap > timeout_ns {
            let head = continuous.head_index.load(Ordering::Acquire);
            if head == 0 || last_index > head {
                return Err(self.classify(Error::OutOfRangeTooEarly));
            }
        }

        loop {
            if self.flow.header().valid.load(Ordering::Acquire) == 0 {
                return Err(Error::FlowInvalid);
            }
            let head = continuous.head_index.load(Ordering::Acquire);
            if head != 0 && last_index <= head {
                return self.slice_range(last_index, count);
            }
            let published = sync::wait_until(deadline, || {
                let head = continuous.head_index.load(Ordering::Acquire);
                head != 0 && head >= last_index
            });
            if !published {
                return Err(self.classify(Error::OutOfRangeTooEarly));
            }
        }
    }

    /// Reads `count` samples ending at `last_index` without blocking.
    ///
    /// # Errors
    ///
    /// As [`Self::get_samples`], but immediately returns
    /// [`Error::OutOfRangeTooEarly`] when the samples aren't published yet.
    pub fn get_samples_non_blocking(
        &self,
        last_index: u64,
        count: usize,
    ) -> Result<SamplesData<'_>> {
        self.check_count(count)?;
        if self.flow.header().valid.load(Ordering::Acquire) == 0 {
            return Err(Error::FlowInvalid);
        }
        let continuous = self.flow.header().continuous();
        let head = continuous.head_index.load(Ordering::Acquire);
        if head == 0 || last_index > head {
            return Err(self.classify(Error::OutOfRangeTooEarly));
        }
        self.slice_range(last_index, count)
    }

    fn check_count(&self, count: usize) -> Result<()> {
        if count == 0 || count as u64 > self.flow.buffer_length() {
            return Err(Error::InvalidArg(format!(
                "sample count {count} out of range (1..={})",
                self.flow.buffer_length()
            )));
        }
        Ok(())
    }

    fn slice_range(&self, last_index: u64, count: usize) -> Result<SamplesData<'_>> {
        let continuous = self.flow.header().continuous();
        let head = continuous.head_index.load(Ordering::Acquire);

        // The retained window is the trailing bufferLength samples.
        let window_start = (head + 1).saturating_sub(self.flow.buffer_length());
        let range_start = match last_index.checked_sub(count as u64 - 1) {
            Some(start) => start,
            None => return Err(self.classify(Error::OutOfRangeTooLate)),
        };
        if range_start < window_start {
            return Err(self.classify(Error::OutOfRangeTooLate));
        }

        self.flow
            .header()
            .last_read_time
            .store(time::current_time(), Ordering::Relaxed);

        let geometry = self.flow.fragments(last_index, count);
        Ok(SamplesData::new(
            self.flow.channel_base(),
            geometry,
            &continuous.generation,
        ))
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
