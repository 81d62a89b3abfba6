// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the MXL core.
//!
//! These tests exercise the flow lifecycle and the read/write protocols for
//! both discrete (grain-based) and continuous (sample-based) flows. Each test
//! creates an isolated temporary domain and cleans up automatically.

use std::time::Duration;

use mxl::{Error, GRAIN_FLAG_INVALID, MxlInstance, Rational, flowdef};
use tempfile::TempDir;
use tracing::info;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

const V210_FLOW_ID: &str = "5fbec3b1-1b0f-417d-9059-8b94a47197ed";
const V210_ALPHA_FLOW_ID: &str = "4b2c3f37-25e2-4d41-a55f-b2a6b3e8c3b7";
const AUDIO_FLOW_ID: &str = "b3bb5be7-9fe9-4324-a5bb-4c70e1084449";
const DATA_FLOW_ID: &str = "db3bd465-2772-484f-8fac-830b0471258b";

fn v210_flow_def() -> &'static str {
    include_str!("data/v210_flow.json")
}

fn v210_alpha_flow_def() -> &'static str {
    include_str!("data/v210+alpha_flow.json")
}

fn audio_flow_def() -> &'static str {
    include_str!("data/audio_flow.json")
}

fn data_flow_def() -> &'static str {
    include_str!("data/data_flow.json")
}

/// Sets up a test by initializing logging and creating an isolated domain.
///
/// Returns an MXL instance bound to a unique temporary domain, along with
/// the domain guard for cleanup.
fn setup_test() -> (MxlInstance, TempDir) {
    // Initialize logging once (respects RUST_LOG environment variable)
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });

    let domain = tempfile::tempdir().expect("failed to create test domain directory");
    let instance = MxlInstance::new(domain.path(), "").unwrap();
    (instance, domain)
}

#[test]
fn video_flow_create_destroy() {
    let (instance_writer, domain) = setup_test();
    let instance_reader = MxlInstance::new(domain.path(), "").unwrap();

    let flow_info = instance_writer.create_flow(v210_flow_def(), None).unwrap();
    assert_eq!(flow_info.config.id().to_string(), V210_FLOW_ID);

    // We created the flow but it does not have a writer yet. The flow should
    // not be active.
    assert!(!instance_reader.is_flow_active(V210_FLOW_ID).unwrap());

    let reader = instance_reader.create_flow_reader(V210_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    let (writer, config, was_created) = instance_writer
        .create_flow_writer(v210_flow_def(), None)
        .unwrap();
    assert!(!was_created);
    let grain_writer = writer.to_grain_writer().unwrap();

    // The writer is now attached. The flow should be active.
    assert!(instance_reader.is_flow_active(V210_FLOW_ID).unwrap());

    // Compute the grain index for the flow rate and current TAI time.
    let rate = Rational::new(60000, 1001);
    assert_eq!(config.grain_rate().unwrap(), rate);
    let now = instance_writer.get_time();
    let index = instance_writer.timestamp_to_index(now, &rate).unwrap();

    let mut access = grain_writer.open_grain(index).unwrap();
    assert_eq!(access.index(), index);

    // Confirm that the grain size and slice lengths are what we expect.
    let line_length = flowdef::v210_line_length(1920);
    let discrete = config.discrete().unwrap();
    assert_eq!(discrete.slice_sizes[0], line_length);
    assert_eq!(discrete.slice_sizes[1], 0);
    assert_eq!(discrete.slice_sizes[2], 0);
    assert_eq!(discrete.slice_sizes[3], 0);
    assert_eq!(access.max_size(), line_length * 1080);
    assert_eq!(access.total_slices(), 1080);

    // Set a mark at the beginning and the end of the grain payload.
    let payload = access.payload_mut();
    payload[0] = 0xCA;
    let last = payload.len() - 1;
    payload[last] = 0xFE;

    // Since no grain has been committed yet, the head should still be at 0.
    let info_before = grain_reader.get_info();
    assert_eq!(info_before.runtime.head_index, 0);

    // Mark the grain as invalid and commit it.
    access.set_flags(GRAIN_FLAG_INVALID);
    let total_slices = access.total_slices();
    access.commit(total_slices).unwrap();

    // Read back the grain using the flow reader.
    let grain = grain_reader
        .get_grain(index, Duration::from_nanos(16))
        .unwrap();

    // Confirm that the flags, the marks and the slice counts are preserved.
    assert_eq!(grain.flags, GRAIN_FLAG_INVALID);
    assert!(grain.is_complete());
    assert_eq!(grain.payload[0], 0xCA);
    assert_eq!(grain.payload[grain.total_size - 1], 0xFE);
    drop(grain);

    // Confirm that the head has moved and the access times increased.
    let info_after = grain_reader.get_info();
    assert_eq!(info_after.runtime.head_index, index);
    assert!(info_after.runtime.last_read_time > info_before.runtime.last_read_time);
    assert!(info_after.runtime.last_write_time > info_before.runtime.last_write_time);

    // Release the reader, then keep using the writer.
    drop(grain_reader);
    let mut access = grain_writer.open_grain(index + 1).unwrap();
    let payload = access.payload_mut();
    payload[0] = 0xCA;
    access.cancel().unwrap();

    grain_writer.destroy().unwrap();

    // The writer is now gone. The flow should be inactive.
    assert!(!instance_reader.is_flow_active(V210_FLOW_ID).unwrap());

    instance_writer.destroy_flow(V210_FLOW_ID).unwrap();
    // This should be gone from the filesystem.
    assert!(matches!(
        instance_writer.destroy_flow(V210_FLOW_ID),
        Err(Error::FlowNotFound)
    ));

    instance_reader.destroy().unwrap();
    instance_writer.destroy().unwrap();
}

#[test]
fn video_flow_with_alpha_create_destroy() {
    let (instance, _domain) = setup_test();

    let (writer, config, was_created) = instance
        .create_flow_writer(v210_alpha_flow_def(), None)
        .unwrap();
    assert!(was_created);
    assert_eq!(config.id().to_string(), V210_ALPHA_FLOW_ID);

    // The alpha plane adds a second slice series.
    let fill_stride = flowdef::v210_line_length(1920);
    let key_stride = (1920 + 2) / 3 * 4;
    let discrete = config.discrete().unwrap();
    assert_eq!(discrete.slice_sizes[0], fill_stride);
    assert_eq!(discrete.slice_sizes[1], key_stride);
    assert_eq!(discrete.slice_sizes[2], 0);
    assert_eq!(discrete.slice_sizes[3], 0);

    let grain_writer = writer.to_grain_writer().unwrap();
    let rate = config.grain_rate().unwrap();
    let index = instance.get_current_index(&rate);

    let mut access = grain_writer.open_grain(index).unwrap();
    assert_eq!(access.max_size(), (fill_stride + key_stride) * 1080);
    let payload = access.payload_mut();
    payload[0] = 0xCA;
    let last = payload.len() - 1;
    payload[last] = 0xFE;
    let total_slices = access.total_slices();
    access.commit(total_slices).unwrap();

    let reader = instance.create_flow_reader(V210_ALPHA_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();
    let grain = grain_reader
        .get_complete_grain(index, Duration::from_secs(1))
        .unwrap();
    assert_eq!(grain.payload[0], 0xCA);
    assert_eq!(grain.payload[grain.total_size - 1], 0xFE);
    drop(grain);

    drop(grain_reader);
    drop(grain_writer);
    instance.destroy_flow(V210_ALPHA_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn video_flow_invalid_after_recreate() {
    let (instance_writer, domain) = setup_test();
    let instance_reader = MxlInstance::new(domain.path(), "").unwrap();

    instance_writer.create_flow(v210_flow_def(), None).unwrap();

    let reader = instance_reader.create_flow_reader(V210_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    let (_writer, _, _) = instance_writer
        .create_flow_writer(v210_flow_def(), None)
        .unwrap();
    assert!(instance_reader.is_flow_active(V210_FLOW_ID).unwrap());

    // Destroy and immediately recreate the flow with the same id.
    instance_writer.destroy_flow(V210_FLOW_ID).unwrap();
    instance_writer.create_flow(v210_flow_def(), None).unwrap();

    let rate = Rational::new(60000, 1001);
    let index = instance_reader.get_current_index(&rate);

    // The reader is still attached to the previous incarnation.
    assert!(matches!(
        grain_reader.get_grain(index, Duration::from_nanos(16)),
        Err(Error::FlowInvalid)
    ));
}

#[test]
fn invalid_flow_definitions() {
    let (instance, _domain) = setup_test();

    // Parse a valid flow definition and keep it as a reference object.
    let valid: serde_json::Value = serde_json::from_str(v210_flow_def()).unwrap();

    let create = |value: &serde_json::Value| instance.create_flow(&value.to_string(), None);
    let expect_invalid = |value: &serde_json::Value| {
        assert!(
            matches!(create(value), Err(Error::InvalidDescriptor(_))),
            "expected INVALID_DESCRIPTOR for {value}"
        );
    };

    // No grain rate.
    let mut no_grain_rate = valid.clone();
    no_grain_rate.as_object_mut().unwrap().remove("grain_rate");
    expect_invalid(&no_grain_rate);

    // No id.
    let mut no_id = valid.clone();
    no_id.as_object_mut().unwrap().remove("id");
    expect_invalid(&no_id);

    // No media type.
    let mut no_media_type = valid.clone();
    no_media_type.as_object_mut().unwrap().remove("media_type");
    expect_invalid(&no_media_type);

    // No label, then an empty label.
    let mut no_label = valid.clone();
    no_label.as_object_mut().unwrap().remove("label");
    expect_invalid(&no_label);
    let mut empty_label = valid.clone();
    empty_label["label"] = "".into();
    expect_invalid(&empty_label);

    // A group hint that does not follow <group>:<role>[:<scope>].
    let mut invalid_tag = valid.clone();
    invalid_tag["tags"]["urn:x-nmos:tag:grouphint/v1.0"]
        .as_array_mut()
        .unwrap()
        .push("a/b/c".into());
    expect_invalid(&invalid_tag);

    // No tags at all.
    let mut no_tags = valid.clone();
    no_tags.as_object_mut().unwrap().remove("tags");
    expect_invalid(&no_tags);

    // Interlaced with a field rate instead of a grain rate.
    let mut interlaced_rate = valid.clone();
    interlaced_rate["interlace_mode"] = "interlaced_tff".into();
    expect_invalid(&interlaced_rate);

    // Interlaced with an odd height.
    let mut interlaced_height = valid.clone();
    interlaced_height["interlace_mode"] = "interlaced_tff".into();
    interlaced_height["grain_rate"] =
        serde_json::json!({"numerator": 30000, "denominator": 1001});
    interlaced_height["frame_height"] = 1081.into();
    expect_invalid(&interlaced_height);

    // Not JSON at all.
    assert!(matches!(
        instance.create_flow("{ this is not json", None),
        Err(Error::InvalidDescriptor(_))
    ));

    instance.destroy().unwrap();
}

#[test]
fn grain_rate_is_normalized_in_flow_info() {
    let (instance, _domain) = setup_test();

    // A dumb way to express 50/1; creating the flow should succeed and the
    // published rate should be normalized.
    let mut value: serde_json::Value = serde_json::from_str(v210_flow_def()).unwrap();
    value["grain_rate"] = serde_json::json!({"numerator": 100000, "denominator": 2000});
    let flow_info = instance.create_flow(&value.to_string(), None).unwrap();

    let discrete = flow_info.config.discrete().unwrap();
    assert_eq!(discrete.grain_rate, Rational::new(50, 1));

    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn data_flow_create_destroy() {
    let (instance, _domain) = setup_test();

    instance.create_flow(data_flow_def(), None).unwrap();

    let reader = instance.create_flow_reader(DATA_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();
    let (writer, config, _) = instance.create_flow_writer(data_flow_def(), None).unwrap();
    let grain_writer = writer.to_grain_writer().unwrap();

    let rate = config.grain_rate().unwrap();
    let index = instance.get_current_index(&rate);

    let mut access = grain_writer.open_grain(index).unwrap();
    // ANC grains are always 4KiB of one-byte slices.
    assert_eq!(access.max_size(), 4096);
    assert_eq!(access.total_slices(), 4096);

    // Store an RFC 8331 style packet payload in the grain.
    let packet: Vec<u8> = (0u16..256).map(|byte| byte as u8).collect();
    access.payload_mut()[..packet.len()].copy_from_slice(&packet);
    access.set_flags(GRAIN_FLAG_INVALID);
    let total_slices = access.total_slices();
    access.commit(total_slices).unwrap();

    let grain = grain_reader
        .get_grain(index, Duration::from_nanos(16))
        .unwrap();
    assert_eq!(grain.flags, GRAIN_FLAG_INVALID);
    assert_eq!(&grain.payload[..packet.len()], packet.as_slice());
    drop(grain);

    let info = grain_reader.get_info();
    assert_eq!(info.runtime.head_index, index);

    drop(grain_reader);
    drop(grain_writer);
    instance.destroy_flow(DATA_FLOW_ID).unwrap();
    assert!(matches!(
        instance.destroy_flow(DATA_FLOW_ID),
        Err(Error::FlowNotFound)
    ));
    instance.destroy().unwrap();
}

#[test]
fn video_flow_slice_commits() {
    let (instance, _domain) = setup_test();

    instance.create_flow(v210_flow_def(), None).unwrap();
    let reader = instance.create_flow_reader(V210_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();
    let (writer, config, _) = instance.create_flow_writer(v210_flow_def(), None).unwrap();
    let grain_writer = writer.to_grain_writer().unwrap();

    let rate = config.grain_rate().unwrap();
    let index = instance.get_current_index(&rate);

    let mut access = grain_writer.open_grain(index).unwrap();
    let total_slices = access.total_slices();
    let batch_size = 135;

    let info_start = grain_reader.get_info();
    assert_eq!(info_start.runtime.head_index, 0);

    // Publish the grain line batch by line batch; the committed count must
    // be observable (and monotonic) after every batch.
    let mut committed = 0;
    while committed < total_slices {
        committed = (committed + batch_size).min(total_slices);
        access.commit_slices(committed).unwrap();

        let partial = grain_reader
            .get_grain(index, Duration::from_nanos(16))
            .unwrap();
        assert_eq!(partial.valid_slices, committed);
        assert_eq!(partial.total_slices, total_slices);
        drop(partial);

        let info = grain_reader.get_info();
        assert_eq!(info.runtime.head_index, index);
        assert!(info.runtime.last_write_time > info_start.runtime.last_write_time);
    }

    // Committing backwards is rejected.
    assert!(matches!(
        access.commit_slices(total_slices),
        Err(Error::InvalidArg(_))
    ));
    drop(access);

    let grain = grain_reader
        .get_complete_grain(index, Duration::from_millis(1))
        .unwrap();
    assert!(grain.is_complete());
    drop(grain);

    drop(grain_reader);
    drop(grain_writer);
    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn audio_flow_create_destroy() {
    let (instance_writer, domain) = setup_test();
    let instance_reader = MxlInstance::new(domain.path(), "").unwrap();

    let flow_info = instance_writer.create_flow(audio_flow_def(), None).unwrap();
    {
        let continuous = flow_info.config.continuous().unwrap();
        assert_eq!(continuous.sample_rate, Rational::new(48000, 1));
        assert_eq!(continuous.channel_count, 1);
        assert!(continuous.buffer_length > 128);
    }

    let reader = instance_reader.create_flow_reader(AUDIO_FLOW_ID).unwrap();
    let samples_reader = reader.to_samples_reader().unwrap();
    let (writer, config, _) = instance_writer
        .create_flow_writer(audio_flow_def(), None)
        .unwrap();
    let samples_writer = writer.to_samples_writer().unwrap();

    let rate = config.sample_rate().unwrap();
    let index = instance_writer.get_current_index(&rate);

    {
        // Open a range of samples for writing.
        let mut access = samples_writer.open_samples(index, 64).unwrap();
        assert_eq!(access.channels(), 1);
        let (fragment0, fragment1) = access.channel_data_mut(0).unwrap();
        assert_eq!(fragment0.len() + fragment1.len(), 256);

        // Fill some test data.
        let split = fragment0.len();
        for (i, byte) in fragment0.iter_mut().enumerate() {
            *byte = i as u8;
        }
        for (i, byte) in fragment1.iter_mut().enumerate() {
            *byte = (split + i) as u8;
        }

        // The head index is not modified until commit.
        let info = samples_reader.get_info();
        assert_eq!(info.runtime.head_index, 0);

        access.commit().unwrap();
    }

    {
        // Read the range back.
        let samples = samples_reader
            .get_samples(index, 64, Duration::from_secs(1))
            .unwrap();
        assert_eq!(samples.num_of_channels(), 1);
        let (fragment0, fragment1) = samples.channel_data(0).unwrap();
        assert_eq!(fragment0.len() + fragment1.len(), 256);
        let split = fragment0.len();
        for (i, byte) in fragment0.iter().enumerate() {
            assert_eq!(*byte, i as u8);
        }
        for (i, byte) in fragment1.iter().enumerate() {
            assert_eq!(*byte, (split + i) as u8);
        }
        drop(samples);

        // Confirm that the head has moved.
        let info = samples_reader.get_info();
        assert_eq!(info.runtime.head_index, index);
    }

    // Release the reader, then keep using the writer.
    drop(samples_reader);
    {
        let mut access = samples_writer.open_samples(index + 64, 64).unwrap();
        let (fragment0, fragment1) = access.channel_data_mut(0).unwrap();
        assert_eq!(fragment0.len() + fragment1.len(), 256);
        access.cancel().unwrap();
    }

    samples_writer.destroy().unwrap();
    instance_writer.destroy_flow(AUDIO_FLOW_ID).unwrap();
    assert!(matches!(
        instance_writer.destroy_flow(AUDIO_FLOW_ID),
        Err(Error::FlowNotFound)
    ));

    instance_reader.destroy().unwrap();
    instance_writer.destroy().unwrap();
}

#[test]
fn audio_flow_invalid_after_recreate() {
    let (instance_writer, domain) = setup_test();
    let instance_reader = MxlInstance::new(domain.path(), "").unwrap();

    instance_writer.create_flow(audio_flow_def(), None).unwrap();

    let reader = instance_reader.create_flow_reader(AUDIO_FLOW_ID).unwrap();
    let samples_reader = reader.to_samples_reader().unwrap();
    let (_writer, config, _) = instance_writer
        .create_flow_writer(audio_flow_def(), None)
        .unwrap();

    instance_writer.destroy_flow(AUDIO_FLOW_ID).unwrap();

    let rate = config.sample_rate().unwrap();
    let index = instance_writer.get_current_index(&rate);

    // Recreate the flow with the same id; the old reader must notice.
    instance_writer.create_flow(audio_flow_def(), None).unwrap();
    assert!(matches!(
        samples_reader.get_samples(index, 64, Duration::from_nanos(16)),
        Err(Error::FlowInvalid)
    ));
}

struct Batch {
    last_index: u64,
    size: usize,
}

/// Splits `num_samples` samples ending at `last_index` into `num_batches`
/// read or write batches; the batch containing the oldest data comes first.
fn plan_audio_batches(num_batches: u64, num_samples: u64, last_index: u64) -> Vec<Batch> {
    let base = num_samples / num_batches;
    let remainder = num_samples % num_batches;
    let mut samples_so_far = 0;
    (0..num_batches)
        .map(|i| {
            let size = base + if i < remainder { 1 } else { 0 };
            samples_so_far += size;
            Batch {
                last_index: last_index - num_samples + samples_so_far,
                size: size as usize,
            }
        })
        .collect()
}

fn fill_with_indices(fragment: &mut [u8], next_index: &mut u64) {
    for chunk in fragment.chunks_exact_mut(4) {
        chunk.copy_from_slice(&(*next_index as u32).to_ne_bytes());
        *next_index += 1;
    }
}

fn check_indices(fragment: &[u8], next_index: &mut u64) {
    for chunk in fragment.chunks_exact(4) {
        assert_eq!(u32::from_ne_bytes(chunk.try_into().unwrap()), *next_index as u32);
        *next_index += 1;
    }
}

#[test]
fn audio_flow_different_writer_reader_batch_sizes() {
    let (instance, _domain) = setup_test();

    let flow_info = instance.create_flow(audio_flow_def(), None).unwrap();
    let buffer_length = flow_info.config.continuous().unwrap().buffer_length;
    let sample_rate = flow_info.config.sample_rate().unwrap();

    // Write a whole buffer worth of data in four batches, every sample equal
    // to its absolute index, then read it back with a different batching.
    let last_index = instance.get_current_index(&sample_rate);
    let (writer, _, _) = instance.create_flow_writer(audio_flow_def(), None).unwrap();
    let samples_writer = writer.to_samples_writer().unwrap();

    for batch in plan_audio_batches(4, buffer_length, last_index) {
        let mut access = samples_writer
            .open_samples(batch.last_index, batch.size)
            .unwrap();
        let (fragment0, fragment1) = access.channel_data_mut(0).unwrap();
        assert_eq!((fragment0.len() + fragment1.len()) / 4, batch.size);
        let mut next_index = batch.last_index + 1 - batch.size as u64;
        fill_with_indices(fragment0, &mut next_index);
        fill_with_indices(fragment1, &mut next_index);
        assert_eq!(next_index, batch.last_index + 1);
        access.commit().unwrap();
    }
    samples_writer.destroy().unwrap();

    let reader = instance.create_flow_reader(AUDIO_FLOW_ID).unwrap();
    let samples_reader = reader.to_samples_reader().unwrap();
    let info = samples_reader.get_info();
    assert_eq!(info.runtime.head_index, last_index);

    for batch in plan_audio_batches(3, buffer_length, last_index) {
        let samples = samples_reader
            .get_samples(batch.last_index, batch.size, Duration::from_secs(1))
            .unwrap();
        let (fragment0, fragment1) = samples.channel_data(0).unwrap();
        assert_eq!((fragment0.len() + fragment1.len()) / 4, batch.size);
        let mut next_index = batch.last_index + 1 - batch.size as u64;
        check_indices(fragment0, &mut next_index);
        check_indices(fragment1, &mut next_index);
        assert_eq!(next_index, batch.last_index + 1);
    }

    drop(samples_reader);
    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn get_flow_def_round_trips() {
    let (instance, _domain) = setup_test();

    let flow_def = v210_flow_def();
    instance.create_flow(flow_def, None).unwrap();

    assert!(matches!(
        instance.get_flow_def("this is not UUID"),
        Err(Error::InvalidArg(_))
    ));
    assert!(matches!(
        instance.get_flow_def("75f369f9-6814-48a3-b827-942bc24c3d25"),
        Err(Error::FlowNotFound)
    ));

    let retrieved = instance.get_flow_def(V210_FLOW_ID).unwrap();
    assert_eq!(retrieved, flow_def);

    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn second_writer_is_rejected() {
    let (instance, _domain) = setup_test();

    let (writer, _, was_created) = instance.create_flow_writer(v210_flow_def(), None).unwrap();
    assert!(was_created);

    assert!(matches!(
        instance.create_flow_writer(v210_flow_def(), None),
        Err(Error::WriterBusy)
    ));

    // Releasing the first writer frees the flow for a successor.
    drop(writer);
    let (writer, _, was_created) = instance.create_flow_writer(v210_flow_def(), None).unwrap();
    assert!(!was_created);
    drop(writer);

    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}

#[test]
fn list_flows_enumerates_the_domain() {
    let (instance, _domain) = setup_test();

    assert!(instance.list_flows().unwrap().is_empty());
    instance.create_flow(v210_flow_def(), None).unwrap();
    instance.create_flow(audio_flow_def(), None).unwrap();

    let mut flows: Vec<String> = instance
        .list_flows()
        .unwrap()
        .iter()
        .map(|id| id.to_string())
        .collect();
    flows.sort();
    assert_eq!(flows, vec![V210_FLOW_ID, AUDIO_FLOW_ID]);

    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy_flow(AUDIO_FLOW_ID).unwrap();
    info!("domain is empty again");
    assert!(instance.list_flows().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn create_flow_in_unwritable_domain() {
    use std::os::unix::fs::PermissionsExt;

    // Root bypasses permission checks; the scenario is meaningless then.
    if nix::unistd::geteuid().is_root() {
        return;
    }

    let (instance, domain) = setup_test();
    let mut permissions = std::fs::metadata(domain.path()).unwrap().permissions();
    permissions.set_mode(0o555);
    std::fs::set_permissions(domain.path(), permissions.clone()).unwrap();

    assert!(matches!(
        instance.create_flow(v210_flow_def(), None),
        Err(Error::PermissionDenied)
    ));

    // Restore permissions so the domain guard can clean up.
    permissions.set_mode(0o755);
    std::fs::set_permissions(domain.path(), permissions).unwrap();
}

#[test]
fn reader_times_out_on_a_future_index() {
    let (instance, _domain) = setup_test();

    instance.create_flow(v210_flow_def(), None).unwrap();
    let reader = instance.create_flow_reader(V210_FLOW_ID).unwrap();
    let grain_reader = reader.to_grain_reader().unwrap();

    // One minute ahead of the head; nothing will ever be published.
    let rate = Rational::new(60000, 1001);
    let index = instance.get_current_index(&rate) + 3600;
    assert!(matches!(
        grain_reader.get_grain(index, Duration::from_millis(1)),
        Err(Error::OutOfRangeTooEarly)
    ));

    drop(grain_reader);
    instance.destroy_flow(V210_FLOW_ID).unwrap();
    instance.destroy().unwrap();
}
