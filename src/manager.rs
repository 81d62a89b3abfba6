// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Flow lifecycle management inside a domain directory.
//!
//! Each flow lives under `<domain>/<flow-uuid>/` as two artifacts: the
//! canonical `descriptor.json` it was created from and the mapped `data`
//! file. Creation is atomic-publish: the artifacts are built in a
//! `.mxl-tmp-*` directory inside the domain and renamed into place, so
//! concurrent readers never observe a half-built flow.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::flow::flowdef::{FlowDef, FlowGeometry};
use crate::shm::segment::{
    AnyFlowData, ContinuousCreateParams, ContinuousFlowData, DiscreteCreateParams,
    DiscreteFlowData,
};
use crate::{Error, Result};

const DESCRIPTOR_FILE_NAME: &str = "descriptor.json";
const DATA_FILE_NAME: &str = "data";

/// Creates, opens, enumerates and deletes the flows of one domain.
pub(crate) struct FlowManager {
    domain: PathBuf,
}

/// Removes a temporary flow directory unless creation succeeded.
struct TempDirGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

/// Maps creation-time filesystem errors; a missing or unwritable domain is a
/// permission problem, not a missing flow.
fn create_error(error: std::io::Error) -> Error {
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
        _ => Error::Io(error),
    }
}

impl FlowManager {
    /// Binds a manager to the domain directory, creating it if necessary.
    pub fn new(domain: &Path) -> Result<Self> {
        fs::create_dir_all(domain).map_err(create_error)?;
        let domain = domain.canonicalize().map_err(Error::from_fs)?;
        Ok(Self { domain })
    }

    pub fn flow_directory(&self, flow_id: &Uuid) -> PathBuf {
        self.domain.join(flow_id.to_string())
    }

    pub fn descriptor_path(&self, flow_id: &Uuid) -> PathBuf {
        self.flow_directory(flow_id).join(DESCRIPTOR_FILE_NAME)
    }

    pub fn data_path(&self, flow_id: &Uuid) -> PathBuf {
        self.flow_directory(flow_id).join(DATA_FILE_NAME)
    }

    /// Returns `true` if a flow with this id currently exists in the domain.
    pub fn flow_exists(&self, flow_id: &Uuid) -> bool {
        self.descriptor_path(flow_id).exists()
    }

    /// Materializes a new flow from a validated definition.
    ///
    /// `flow_def_json` is stored byte-for-byte as `descriptor.json`;
    /// `history_ns` sizes the ring so that it retains at least that much
    /// wall-clock time of media.
    pub fn create_flow(
        &self,
        def: &FlowDef,
        flow_def_json: &str,
        history_ns: u64,
    ) -> Result<AnyFlowData> {
        let flow_id = def.id;
        let geometry = def.geometry()?;

        let temp_path = self
            .domain
            .join(format!(".mxl-tmp-{}", Uuid::new_v4().simple()));
        fs::create_dir(&temp_path).map_err(create_error)?;
        let mut guard = TempDirGuard {
            path: temp_path.clone(),
            armed: true,
        };

        fs::write(temp_path.join(DESCRIPTOR_FILE_NAME), flow_def_json).map_err(create_error)?;

        let data_path = temp_path.join(DATA_FILE_NAME);
        let data = match geometry {
            FlowGeometry::Discrete {
                grain_rate,
                grain_size,
                total_slices,
                slice_sizes,
            } => {
                let grain_count = ring_length(history_ns, grain_rate.numerator, grain_rate.denominator);
                debug!(
                    "Create discrete flow. id: {}, grainCount: {}, grain payload size: {}",
                    flow_id, grain_count, grain_size
                );
                let params = DiscreteCreateParams {
                    id: flow_id,
                    format: def.data_format().code(),
                    grain_rate,
                    grain_count: grain_count as u32,
                    grain_size,
                    total_slices,
                    slice_sizes,
                };
                AnyFlowData::Discrete(DiscreteFlowData::create(&data_path, &params)?)
            }
            FlowGeometry::Continuous {
                sample_rate,
                channel_count,
                sample_bytes,
            } => {
                let buffer_length =
                    ring_length(history_ns, sample_rate.numerator, sample_rate.denominator);
                debug!(
                    "Create continuous flow. id: {}, channel count: {}, word size: {}, buffer length: {}",
                    flow_id, channel_count, sample_bytes, buffer_length
                );
                let params = ContinuousCreateParams {
                    id: flow_id,
                    sample_rate,
                    channel_count,
                    sample_bytes,
                    buffer_length,
                };
                AnyFlowData::Continuous(ContinuousFlowData::create(&data_path, &params)?)
            }
        };

        fs::rename(&temp_path, self.flow_directory(&flow_id)).map_err(create_error)?;
        guard.armed = false;

        Ok(data)
    }

    /// Maps an existing flow.
    pub fn open_flow(&self, flow_id: &Uuid) -> Result<AnyFlowData> {
        if !self.flow_exists(flow_id) {
            return Err(Error::FlowNotFound);
        }
        AnyFlowData::open(&self.data_path(flow_id))
    }

    /// Invalidates a flow and unlinks its artifacts.
    ///
    /// The `valid` flag is cleared before the files disappear so attached
    /// readers observe the invalidation on their next access even while they
    /// keep the old mapping alive.
    pub fn delete_flow(&self, flow_id: &Uuid) -> Result<()> {
        trace!("Delete flow: {}", flow_id);
        let flow_dir = self.flow_directory(flow_id);
        if !flow_dir.is_dir() {
            return Err(Error::FlowNotFound);
        }
        if let Ok(data) = AnyFlowData::open(&self.data_path(flow_id)) {
            data.header().valid.store(0, Ordering::Release);
        }
        fs::remove_dir_all(&flow_dir).map_err(Error::from_fs)?;
        Ok(())
    }

    /// Enumerates the flows of the domain.
    pub fn list_flows(&self) -> Result<Vec<Uuid>> {
        let mut flow_ids = Vec::new();
        for entry in fs::read_dir(&self.domain).map_err(Error::from_fs)? {
            let entry = entry.map_err(Error::from_fs)?;
            if !entry.path().is_dir() {
                continue;
            }
            // Flow directories are named by their canonical UUID; anything
            // else (temp directories included) is skipped.
            if let Some(name) = entry.file_name().to_str()
                && let Ok(flow_id) = Uuid::parse_str(name)
            {
                flow_ids.push(flow_id);
            }
        }
        Ok(flow_ids)
    }

    /// Returns the exact descriptor bytes the flow was created from.
    pub fn read_flow_def(&self, flow_id: &Uuid) -> Result<String> {
        fs::read_to_string(self.descriptor_path(flow_id)).map_err(Error::from_fs)
    }
}

/// Number of ring entries needed to span `history_ns` at `numerator /
/// denominator` entries per second, rounded up to a power of two.
fn ring_length(history_ns: u64, numerator: i64, denominator: i64) -> u64 {
    let entries = (history_ns as u128 * numerator as u128)
        .div_ceil(denominator as u128 * 1_000_000_000)
        .max(2) as u64;
    entries.next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_length_is_a_power_of_two_spanning_the_history() {
        // One second at 59.94 fps needs 60 grains; the ring rounds up to 64.
        assert_eq!(ring_length(1_000_000_000, 60000, 1001), 64);
        // One second at 48 kHz rounds up to 65536 samples.
        assert_eq!(ring_length(1_000_000_000, 48000, 1), 65536);
        // Tiny histories still leave a usable ring.
        assert_eq!(ring_length(1, 25, 1), 2);
    }
}
