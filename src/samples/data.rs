// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample data structures for zero-copy audio access.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::Error;
use crate::shm::segment::WrappedSliceGeometry;

/// Zero-copy view of multi-channel audio sample data.
///
/// Provides read-only access to audio samples stored in MXL's shared memory
/// ring buffer. Each channel is stored in its own ring, and a range may be
/// split into two fragments when it crosses the ring boundary; the
/// concatenation of the two fragments is exactly the requested sample count.
///
/// The lifetime `'a` is tied to the [`crate::SamplesReader`] that produced
/// it.
///
/// # Consistency
///
/// The fragments point straight into memory the writer keeps reusing. A
/// reader that copies them out can race a writer wrapping the ring;
/// [`Self::to_owned`] guards the copy with the writer's generation counter
/// and retries until it observes a quiescent interval, so an owned copy is
/// never stitched together from different writer generations.
///
/// # Examples
///
/// ```no_run
/// # use mxl::SamplesData;
/// # fn example(samples: SamplesData) -> Result<(), mxl::Error> {
/// println!("Channels: {}", samples.num_of_channels());
///
/// for ch in 0..samples.num_of_channels() {
///     let (frag1, frag2) = samples.channel_data(ch)?;
///     println!("Channel {}: {} + {} bytes", ch, frag1.len(), frag2.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SamplesData<'a> {
    base: *const u8,
    geometry: WrappedSliceGeometry,
    generation: &'a AtomicU32,
}

impl<'a> SamplesData<'a> {
    /// Creates a new samples data view (internal use only).
    pub(crate) fn new(
        base: *const u8,
        geometry: WrappedSliceGeometry,
        generation: &'a AtomicU32,
    ) -> Self {
        Self {
            base,
            geometry,
            generation,
        }
    }

    /// Returns the number of audio channels.
    pub fn num_of_channels(&self) -> usize {
        self.geometry.channel_count
    }

    /// Returns zero-copy access to a specific channel's sample data.
    ///
    /// Each channel's data is returned as two byte slices (fragments). If
    /// the range does not wrap the ring, the second fragment is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArg`] if `channel >= num_of_channels()`.
    pub fn channel_data(&self, channel: usize) -> crate::Result<(&[u8], &[u8])> {
        if channel >= self.geometry.channel_count {
            return Err(Error::InvalidArg(format!(
                "channel {channel} out of range ({} channels)",
                self.geometry.channel_count
            )));
        }
        // Safety: the geometry was computed against the mapped ring bounds
        // and the mapping outlives `'a`.
        unsafe {
            let ring = self.base.add(self.geometry.stride * channel);
            Ok((
                std::slice::from_raw_parts(
                    ring.add(self.geometry.fragment0_offset),
                    self.geometry.fragment0_len,
                ),
                std::slice::from_raw_parts(ring, self.geometry.fragment1_len),
            ))
        }
    }

    /// Creates an owned copy of this sample data.
    ///
    /// The copy is retried until the writer's generation counter is stable
    /// around it, so the result is consistent even if the writer wraps the
    /// ring mid-copy.
    pub fn to_owned(&self) -> OwnedSamplesData {
        loop {
            let generation = self.generation.load(Ordering::Acquire);
            if generation & 1 != 0 {
                // A write is open; wait for it to settle.
                std::hint::spin_loop();
                continue;
            }
            let mut payload = Vec::with_capacity(self.geometry.channel_count);
            for channel in 0..self.geometry.channel_count {
                // Safe unwrap: channel index is always valid.
                let (fragment0, fragment1) = self.channel_data(channel).unwrap();
                let mut channel_payload = Vec::with_capacity(fragment0.len() + fragment1.len());
                channel_payload.extend_from_slice(fragment0);
                channel_payload.extend_from_slice(fragment1);
                payload.push(channel_payload);
            }
            if self.generation.load(Ordering::Acquire) == generation {
                return OwnedSamplesData { payload };
            }
        }
    }
}

impl<'a> AsRef<SamplesData<'a>> for SamplesData<'a> {
    fn as_ref(&self) -> &SamplesData<'a> {
        self
    }
}

/// Owned copy of multi-channel sample data.
///
/// Unlike [`SamplesData`], this owns its data and can outlive the reader.
/// Each channel is stored as a contiguous `Vec<u8>` (fragments are joined).
pub struct OwnedSamplesData {
    /// Per-channel sample data (raw bytes).
    ///
    /// Each inner `Vec<u8>` contains the complete samples for one channel,
    /// with both fragments concatenated.
    pub payload: Vec<Vec<u8>>,
}

impl<'a> From<&SamplesData<'a>> for OwnedSamplesData {
    /// Creates a consistent owned copy; see [`SamplesData::to_owned`].
    fn from(value: &SamplesData<'a>) -> Self {
        value.to_owned()
    }
}

impl<'a> From<SamplesData<'a>> for OwnedSamplesData {
    /// Creates a consistent owned copy; see [`SamplesData::to_owned`].
    fn from(value: SamplesData<'a>) -> Self {
        value.as_ref().into()
    }
}
