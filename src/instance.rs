// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! MXL instance management and core domain operations.
//!
//! This module provides [`MxlInstance`], the main entry point for interacting
//! with an MXL domain. An instance is bound to a domain directory (typically
//! on tmpfs) and provides methods to create flows, attach readers/writers and
//! manage timing.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use uuid::Uuid;

use crate::flow::flowdef::FlowDef;
use crate::flow::options::{DEFAULT_HISTORY_DURATION_NS, FlowOptions};
use crate::flow::reader::FlowReader;
use crate::flow::writer::FlowWriter;
use crate::flow::{FlowConfigInfo, FlowInfo};
use crate::manager::FlowManager;
use crate::sync::WriterLock;
use crate::time;
use crate::{Error, Rational, Result, UNDEFINED_INDEX};

/// Internal shared context for an MXL instance.
///
/// This is separated from [`MxlInstance`] so that readers and writers can
/// hold a reference to the domain for as long as they live, even past the
/// instance handle itself.
pub(crate) struct InstanceContext {
    pub(crate) manager: FlowManager,
    pub(crate) options: FlowOptions,
}

impl InstanceContext {
    /// The history duration flows of this instance retain by default.
    pub(crate) fn history_duration_ns(&self, flow_options: &FlowOptions) -> u64 {
        flow_options.history_duration_ns(
            self.options
                .history_duration_ns(DEFAULT_HISTORY_DURATION_NS),
        )
    }
}

/// Main entry point for interacting with an MXL domain.
///
/// An `MxlInstance` represents a connection to a shared memory domain
/// (typically a tmpfs directory like `/dev/shm/my_domain`). It provides
/// methods to:
///
/// - Create, destroy and enumerate flows
/// - Create flow readers and writers
/// - Query and manipulate timing (TAI timestamps and indices)
///
/// The instance is cheaply cloneable and thread-safe (`Send + Sync`), but
/// readers and writers created from it are not thread-safe and should not be
/// shared between threads.
///
/// # Examples
///
/// ```no_run
/// use mxl::MxlInstance;
///
/// # fn main() -> Result<(), mxl::Error> {
/// let instance = MxlInstance::new("/dev/shm/my_domain", "")?;
///
/// // Create a flow reader
/// let reader = instance.create_flow_reader("5fbec3b1-1b0f-417d-9059-8b94a47197ed")?;
///
/// // Query current time
/// let tai_ns = instance.get_time();
/// println!("Current TAI: {}", tai_ns);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MxlInstance {
    context: Arc<InstanceContext>,
}

impl MxlInstance {
    /// Creates a new MXL instance bound to the specified domain.
    ///
    /// The domain directory is created if it does not exist yet.
    ///
    /// # Arguments
    ///
    /// * `domain` - Filesystem path to the domain directory
    /// * `options` - JSON options document (or empty); the only defined key
    ///   is the `urn:x-mxl:option:history_duration/v1.0` override
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] when the domain cannot be created
    /// - [`Error::InvalidArg`] when the options document is malformed
    pub fn new(domain: impl AsRef<Path>, options: &str) -> Result<Self> {
        let options = FlowOptions::from_json(options)?;
        let manager = FlowManager::new(domain.as_ref())?;
        Ok(Self {
            context: Arc::new(InstanceContext { manager, options }),
        })
    }

    /// Creates a flow from a JSON flow definition and returns its published
    /// info.
    ///
    /// If a flow with the same id already exists it is left untouched and its
    /// current info is returned; use [`Self::create_flow_writer`] to learn
    /// whether a flow was newly created.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDescriptor`] when the definition fails validation
    /// - [`Error::UnsupportedMediaType`] when no geometry rule exists for the
    ///   definition's media type
    /// - [`Error::PermissionDenied`] when the domain is not writable
    pub fn create_flow(&self, flow_def: &str, options: Option<&str>) -> Result<FlowInfo> {
        let def = FlowDef::from_json(flow_def)?;
        let flow_options = FlowOptions::from_json(options.unwrap_or(""))?;
        let history_ns = self.context.history_duration_ns(&flow_options);

        let data = if self.context.manager.flow_exists(&def.id) {
            self.context.manager.open_flow(&def.id)?
        } else {
            self.context
                .manager
                .create_flow(&def, flow_def, history_ns)?
        };
        Ok(data.snapshot())
    }

    /// Destroys a flow: marks it invalid, then unlinks its artifacts.
    ///
    /// Attached readers observe [`Error::FlowInvalid`] on their next access.
    ///
    /// # Errors
    ///
    /// [`Error::FlowNotFound`] when no flow with this id exists (including
    /// when it was already destroyed).
    pub fn destroy_flow(&self, flow_id: &str) -> Result<()> {
        let flow_id = parse_flow_id(flow_id)?;
        self.context.manager.delete_flow(&flow_id)
    }

    /// Returns `true` iff a live writer currently holds the flow.
    ///
    /// A writer that crashed without detaching leaves a stale liveness flag
    /// behind; the flag is cross-checked against the writer's OS file lock
    /// and healed when the lock turns out to be free.
    pub fn is_flow_active(&self, flow_id: &str) -> Result<bool> {
        let flow_id = parse_flow_id(flow_id)?;
        let data = self.context.manager.open_flow(&flow_id)?;
        if data.header().writer_live.load(Ordering::Acquire) == 0 {
            return Ok(false);
        }
        if WriterLock::is_held(&self.context.manager.data_path(&flow_id))? {
            Ok(true)
        } else {
            // The writer died without detaching; heal the stale flag.
            data.header().writer_live.store(0, Ordering::Release);
            Ok(false)
        }
    }

    /// Retrieves the JSON flow definition an existing flow was created from.
    ///
    /// The returned string is byte-for-byte the definition passed to
    /// [`Self::create_flow`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArg`] when `flow_id` is not a well-formed UUID
    /// - [`Error::FlowNotFound`] when the flow does not exist
    pub fn get_flow_def(&self, flow_id: &str) -> Result<String> {
        let flow_id = parse_flow_id(flow_id)?;
        self.context.manager.read_flow_def(&flow_id)
    }

    /// Enumerates the flows of the domain.
    pub fn list_flows(&self) -> Result<Vec<Uuid>> {
        self.context.manager.list_flows()
    }

    /// Creates a flow reader for an existing flow in the domain.
    ///
    /// The returned [`FlowReader`] is a generic reader that must be converted
    /// to either a [`crate::GrainReader`] (discrete flows) or a
    /// [`crate::SamplesReader`] (continuous flows) using the appropriate
    /// `to_*` method.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FlowNotFound`] if no flow with the given ID exists in
    /// the domain.
    pub fn create_flow_reader(&self, flow_id: &str) -> Result<FlowReader> {
        let flow_id = parse_flow_id(flow_id)?;
        let data = self.context.manager.open_flow(&flow_id)?;
        Ok(FlowReader::new(self.context.clone(), flow_id, data))
    }

    /// Creates a flow writer from a JSON flow definition.
    ///
    /// This creates the flow if it does not exist yet, then takes exclusive
    /// write access to it. The returned [`FlowWriter`] is generic and must be
    /// converted to either [`crate::GrainWriter`] or [`crate::SamplesWriter`]
    /// based on the flow type.
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// - `FlowWriter`: generic writer handle
    /// - `FlowConfigInfo`: flow configuration metadata
    /// - `bool`: `true` if a new flow was created, `false` if an existing
    ///   flow was attached
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDescriptor`] when the definition fails validation
    /// - [`Error::WriterBusy`] when another writer already holds the flow
    pub fn create_flow_writer(
        &self,
        flow_def: &str,
        options: Option<&str>,
    ) -> Result<(FlowWriter, FlowConfigInfo, bool)> {
        let def = FlowDef::from_json(flow_def)?;
        let flow_options = FlowOptions::from_json(options.unwrap_or(""))?;
        let history_ns = self.context.history_duration_ns(&flow_options);

        let was_created = !self.context.manager.flow_exists(&def.id);
        let data = if was_created {
            self.context
                .manager
                .create_flow(&def, flow_def, history_ns)?
        } else {
            self.context.manager.open_flow(&def.id)?
        };

        let lock = WriterLock::acquire(&self.context.manager.data_path(&def.id))?;
        data.header().writer_live.store(1, Ordering::Release);

        let info = data.snapshot();
        Ok((
            FlowWriter::new(self.context.clone(), def.id, data, lock),
            info.config,
            was_created,
        ))
    }

    /// Returns the current TAI time in nanoseconds.
    ///
    /// TAI (International Atomic Time) is the time standard used by MXL,
    /// following SMPTE ST 2059. Unlike UTC, TAI does not have leap seconds.
    /// The epoch is 1970-01-01 00:00:00 TAI.
    pub fn get_time(&self) -> u64 {
        time::current_time()
    }

    /// Returns the current media index for a given rate.
    ///
    /// MXL uses index-based addressing where each grain or sample is assigned
    /// a monotonically increasing index. This computes the index current at
    /// this very moment.
    pub fn get_current_index(&self, rate: &Rational) -> u64 {
        time::current_index(rate)
    }

    /// Converts a TAI timestamp to a media index.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid (zero numerator or
    /// denominator).
    pub fn timestamp_to_index(&self, timestamp: u64, rate: &Rational) -> Result<u64> {
        match time::timestamp_to_index(rate, timestamp) {
            UNDEFINED_INDEX => Err(Error::InvalidArg(format!("invalid rate {rate}"))),
            index => Ok(index),
        }
    }

    /// Converts a media index to the earliest TAI timestamp mapping to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid.
    pub fn index_to_timestamp(&self, index: u64, rate: &Rational) -> Result<u64> {
        match time::index_to_timestamp(rate, index) {
            UNDEFINED_INDEX => Err(Error::InvalidArg(format!("invalid rate {rate}"))),
            timestamp => Ok(timestamp),
        }
    }

    /// Calculates the duration until a future index becomes current.
    ///
    /// Useful for pacing writers to avoid writing too far ahead.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate is invalid.
    pub fn get_duration_until_index(
        &self,
        index: u64,
        rate: &Rational,
    ) -> Result<std::time::Duration> {
        match time::ns_until_index(rate, index) {
            UNDEFINED_INDEX => Err(Error::InvalidArg(format!("invalid rate {rate}"))),
            ns => Ok(std::time::Duration::from_nanos(ns)),
        }
    }

    /// Sleeps for the specified duration.
    pub fn sleep_for(&self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }

    /// Forces immediate destruction of the MXL instance.
    ///
    /// Normally the instance is released when all handles are dropped; this
    /// method makes the release explicit and verifies that no readers or
    /// writers are still attached.
    ///
    /// # Errors
    ///
    /// Returns an error if readers or writers created from this instance are
    /// still alive.
    pub fn destroy(self) -> Result<()> {
        Arc::into_inner(self.context)
            .map(drop)
            .ok_or_else(|| Error::Other("Instance is still in use.".to_string()))
    }
}

/// Parses a canonical UUID string.
fn parse_flow_id(flow_id: &str) -> Result<Uuid> {
    Uuid::parse_str(flow_id)
        .map_err(|_| Error::InvalidArg(format!("'{flow_id}' is not a valid flow id")))
}
