// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! JSON flow definition schema types and validation.
//!
//! This module defines Rust structures for parsing and serializing MXL flow
//! definitions, which follow the NMOS IS-04 flow schema format, and enforces
//! the semantic constraints that gate flow creation.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::DataFormat;
use crate::shm::layout::{DATA_FORMAT_GRAIN_SIZE, MAX_PLANES_PER_GRAIN};
use crate::{Error, Rational, Result};

/// Maximum supported frame width (8K).
pub const MAX_FRAME_WIDTH: u32 = 7680;

/// Maximum supported frame height (8K).
pub const MAX_FRAME_HEIGHT: u32 = 4320;

/// The tag key that must carry the NMOS group hints.
///
/// See <https://specs.amwa.tv/nmos-parameter-registers/branches/main/tags/grouphint.html>
pub const GROUP_HINT_TAG: &str = "urn:x-nmos:tag:grouphint/v1.0";

/// Returns the byte length of one line of v210 video, including padding.
pub fn v210_line_length(width: u32) -> u32 {
    width.div_ceil(48) * 128
}

/// Complete flow definition structure following the NMOS IS-04 schema.
///
/// This represents the JSON flow definition passed to
/// [`crate::MxlInstance::create_flow`]. It contains both common metadata
/// (ID, labels, tags) and format-specific details (video dimensions, audio
/// rates).
///
/// # Examples
///
/// ```no_run
/// use mxl::flowdef::FlowDef;
///
/// let json = r#"{
///     "id": "12345678-1234-4234-9234-123456789abc",
///     "format": "urn:x-nmos:format:video",
///     "label": "My Video Flow",
///     "description": "1080p60 video",
///     "tags": {"urn:x-nmos:tag:grouphint/v1.0": ["cam 1:video"]},
///     "media_type": "video/v210",
///     "grain_rate": {"numerator": 60, "denominator": 1},
///     "frame_width": 1920,
///     "frame_height": 1080,
///     "interlace_mode": "progressive",
///     "colorspace": "BT709",
///     "components": []
/// }"#;
///
/// let flow_def = FlowDef::from_json(json).unwrap();
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDef {
    /// Unique identifier for this flow (UUID).
    pub id: Uuid,
    /// Human-readable description.
    pub description: String,
    /// Arbitrary key-value tags for organization. The group-hint tag is
    /// mandatory; see [`GROUP_HINT_TAG`].
    pub tags: HashMap<String, Vec<String>>,
    /// Short human-readable label. Must not be empty.
    pub label: String,
    /// List of parent flow IDs (for derived flows).
    #[serde(default)]
    pub parents: Vec<String>,
    /// MIME media type (e.g., "video/v210").
    pub media_type: String,
    /// Format-specific details, discriminated by the NMOS `format` URN.
    #[serde(flatten)]
    pub details: FlowDefDetails,
}

/// Format-specific flow definition details.
///
/// This enum is deserialized from the format-specific fields based on the
/// `format` URN in the JSON.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "format")]
pub enum FlowDefDetails {
    /// Video flow definition.
    #[serde(rename = "urn:x-nmos:format:video")]
    Video(FlowDefVideo),
    /// Audio flow definition.
    #[serde(rename = "urn:x-nmos:format:audio")]
    Audio(FlowDefAudio),
    /// Ancillary data flow definition.
    #[serde(rename = "urn:x-nmos:format:data")]
    Data(FlowDefData),
}

/// Video flow definition details.
///
/// Specifies video-specific parameters like dimensions, frame rate, and color
/// format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefVideo {
    /// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
    pub grain_rate: Rational,
    /// Frame width in pixels.
    pub frame_width: u32,
    /// Frame height in pixels.
    pub frame_height: u32,
    /// Interlacing mode.
    pub interlace_mode: InterlaceMode,
    /// Colorspace identifier (e.g., "BT709", "BT2020").
    pub colorspace: String,
    /// Video component descriptions (Y, Cb, Cr, etc.).
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Video interlacing mode.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterlaceMode {
    /// Progressive scan (non-interlaced).
    #[serde(rename = "progressive")]
    Progressive,
    /// Interlaced with top field first.
    #[serde(rename = "interlaced_tff")]
    InterlacedTff,
    /// Interlaced with bottom field first.
    #[serde(rename = "interlaced_bff")]
    InterlacedBff,
}

impl InterlaceMode {
    /// Returns `true` for either interlaced mode.
    pub fn is_interlaced(&self) -> bool {
        *self != InterlaceMode::Progressive
    }
}

impl FromStr for InterlaceMode {
    type Err = ();

    /// Parses an interlace mode string.
    ///
    /// Accepts: "progressive", "interlaced_tff", or "interlaced_bff".
    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "progressive" => Ok(Self::Progressive),
            "interlaced_tff" => Ok(Self::InterlacedTff),
            "interlaced_bff" => Ok(Self::InterlacedBff),
            _ => Err(()),
        }
    }
}

/// Audio flow definition details.
///
/// Specifies audio-specific parameters like sample rate and channel count.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefAudio {
    /// Sample rate as a rational number (typically 48000/1 Hz).
    pub sample_rate: Rational,
    /// Number of audio channels.
    pub channel_count: u32,
    /// Bit depth per sample. 32 or 64 (IEEE floats).
    pub bit_depth: u8,
    /// The source this flow originates from.
    pub source_id: Uuid,
    /// The device the source belongs to.
    pub device_id: Uuid,
}

/// Ancillary data flow definition details.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FlowDefData {
    /// Grain rate as a rational number; ANC grains pace the video frames
    /// they accompany.
    pub grain_rate: Rational,
}

/// Video component description (Y, Cb, Cr, alpha, etc.).
///
/// Describes a single component plane in a video frame, including its
/// dimensions and bit depth.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Component {
    /// Component name (e.g., "Y", "Cb", "Cr", "A").
    pub name: String,
    /// Component width in pixels.
    pub width: u32,
    /// Component height in pixels.
    pub height: u32,
    /// Bit depth of this component.
    pub bit_depth: u8,
}

/// Payload geometry derived from a validated flow definition.
pub(crate) enum FlowGeometry {
    Discrete {
        grain_rate: Rational,
        grain_size: u32,
        total_slices: u32,
        slice_sizes: [u32; MAX_PLANES_PER_GRAIN],
    },
    Continuous {
        sample_rate: Rational,
        channel_count: u32,
        sample_bytes: u32,
    },
}

impl FlowDef {
    /// Parses and validates a JSON flow definition.
    ///
    /// Rates are reduced to lowest terms on ingest, so every rate later
    /// published in the flow header is normalized.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDescriptor`] when the document is not valid JSON, a
    /// required field is missing or malformed, or a semantic rule of the
    /// NMOS schema subset is violated.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut def: FlowDef = serde_json::from_str(json)
            .map_err(|error| Error::InvalidDescriptor(format!("failed to parse: {error}")))?;
        def.normalize();
        def.validate()?;
        Ok(def)
    }

    /// Returns the media data format of this flow.
    pub fn data_format(&self) -> DataFormat {
        match &self.details {
            FlowDefDetails::Video(_) => DataFormat::Video,
            FlowDefDetails::Audio(_) => DataFormat::Audio,
            FlowDefDetails::Data(_) => DataFormat::Data,
        }
    }

    /// Returns the declared grain or sample rate, normalized.
    ///
    /// This is always the grain rate as declared; for interlaced video the
    /// field rate is the caller's concern.
    pub fn rate(&self) -> Rational {
        match &self.details {
            FlowDefDetails::Video(video) => video.grain_rate,
            FlowDefDetails::Audio(audio) => audio.sample_rate,
            FlowDefDetails::Data(data) => data.grain_rate,
        }
    }

    fn normalize(&mut self) {
        match &mut self.details {
            FlowDefDetails::Video(video) => video.grain_rate = video.grain_rate.normalized(),
            FlowDefDetails::Audio(audio) => audio.sample_rate = audio.sample_rate.normalized(),
            FlowDefDetails::Data(data) => data.grain_rate = data.grain_rate.normalized(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(Error::InvalidDescriptor("label must not be empty".into()));
        }
        self.validate_group_hints()?;
        if !self.rate().is_valid() {
            return Err(Error::InvalidDescriptor(format!(
                "invalid rate {}",
                self.rate()
            )));
        }
        match &self.details {
            FlowDefDetails::Video(video) => video.validate(),
            FlowDefDetails::Audio(audio) => audio.validate(),
            FlowDefDetails::Data(_) => Ok(()),
        }
    }

    //
    // Validates that the group hint tag is present and valid.
    // Expected entry format: "<group-name>:<role-in-group>[:<group-scope>]"
    // where group-scope, if present, is either "device" or "node".
    //
    fn validate_group_hints(&self) -> Result<()> {
        let hints = self.tags.get(GROUP_HINT_TAG).ok_or_else(|| {
            Error::InvalidDescriptor(format!("missing tag '{GROUP_HINT_TAG}'"))
        })?;
        if hints.is_empty() {
            return Err(Error::InvalidDescriptor(
                "group hint tag found but empty".into(),
            ));
        }
        for hint in hints {
            let parts: Vec<&str> = hint.split(':').collect();
            if parts.len() < 2 || parts.len() > 3 {
                return Err(Error::InvalidDescriptor(format!(
                    "invalid group hint value '{hint}'. Expected format \
                     '<group-name>:<role-in-group>[:<group-scope>]'"
                )));
            }
            if parts[0].is_empty() || parts[1].is_empty() {
                return Err(Error::InvalidDescriptor(format!(
                    "invalid group hint value '{hint}'. Group name and role must not be empty."
                )));
            }
            if parts.len() == 3 && parts[2] != "device" && parts[2] != "node" {
                return Err(Error::InvalidDescriptor(format!(
                    "invalid group hint value '{hint}'. Group scope must be either 'device' or \
                     'node'."
                )));
            }
        }
        Ok(())
    }

    /// Computes the payload geometry for this flow definition.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedMediaType`] when the media type has no geometry
    /// rule.
    pub(crate) fn geometry(&self) -> Result<FlowGeometry> {
        match &self.details {
            FlowDefDetails::Video(video) => video.geometry(&self.media_type),
            FlowDefDetails::Audio(audio) => Ok(FlowGeometry::Continuous {
                sample_rate: audio.sample_rate,
                channel_count: audio.channel_count,
                sample_bytes: u32::from(audio.bit_depth) / 8,
            }),
            FlowDefDetails::Data(data) => {
                if self.media_type != "video/smpte291" {
                    return Err(Error::UnsupportedMediaType(self.media_type.clone()));
                }
                Ok(FlowGeometry::Discrete {
                    grain_rate: data.grain_rate,
                    grain_size: DATA_FORMAT_GRAIN_SIZE as u32,
                    total_slices: DATA_FORMAT_GRAIN_SIZE as u32,
                    slice_sizes: [1, 0, 0, 0],
                })
            }
        }
    }
}

impl FlowDefVideo {
    /// Frame height lines covered by one field, i.e. the number of payload
    /// slices per grain.
    fn effective_height(&self) -> u32 {
        if self.interlace_mode.is_interlaced() {
            self.frame_height / 2
        } else {
            self.frame_height
        }
    }

    fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_width > MAX_FRAME_WIDTH {
            return Err(Error::InvalidDescriptor(format!(
                "frame_width {} out of range (1..={MAX_FRAME_WIDTH})",
                self.frame_width
            )));
        }
        if self.frame_height == 0 || self.frame_height > MAX_FRAME_HEIGHT {
            return Err(Error::InvalidDescriptor(format!(
                "frame_height {} out of range (1..={MAX_FRAME_HEIGHT})",
                self.frame_height
            )));
        }
        if self.interlace_mode.is_interlaced() {
            // Interlaced media is handled as separate fields: the declared
            // grain rate must be one of the standardized frame rates and the
            // height must split evenly.
            if self.grain_rate != Rational::new(30000, 1001)
                && self.grain_rate != Rational::new(25, 1)
            {
                return Err(Error::InvalidDescriptor(
                    "invalid grain_rate for interlaced video. Expected 30000/1001 or 25/1.".into(),
                ));
            }
            if self.frame_height % 2 != 0 {
                return Err(Error::InvalidDescriptor(
                    "invalid video height for interlaced video. Must be even.".into(),
                ));
            }
        }
        Ok(())
    }

    fn geometry(&self, media_type: &str) -> Result<FlowGeometry> {
        let lines = self.effective_height();
        let fill_slice = v210_line_length(self.frame_width);
        match media_type {
            "video/v210" => Ok(FlowGeometry::Discrete {
                grain_rate: self.grain_rate,
                grain_size: fill_slice * lines,
                total_slices: lines,
                slice_sizes: [fill_slice, 0, 0, 0],
            }),
            "video/v210+alpha" => {
                // The alpha plane is a second slice series appended to the
                // fill plane.
                let key_slice = (self.frame_width + 2) / 3 * 4;
                Ok(FlowGeometry::Discrete {
                    grain_rate: self.grain_rate,
                    grain_size: (fill_slice + key_slice) * lines,
                    total_slices: lines,
                    slice_sizes: [fill_slice, key_slice, 0, 0],
                })
            }
            other => Err(Error::UnsupportedMediaType(other.to_string())),
        }
    }
}

impl FlowDefAudio {
    fn validate(&self) -> Result<()> {
        if self.bit_depth != 32 && self.bit_depth != 64 {
            return Err(Error::InvalidDescriptor(format!(
                "unsupported bit depth: {}",
                self.bit_depth
            )));
        }
        if self.channel_count == 0 {
            return Err(Error::InvalidDescriptor(
                "channel_count must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_json() -> serde_json::Value {
        serde_json::json!({
            "id": "5fbec3b1-1b0f-417d-9059-8b94a47197ed",
            "format": "urn:x-nmos:format:video",
            "label": "test video",
            "description": "1080p60 v210 test flow",
            "tags": { "urn:x-nmos:tag:grouphint/v1.0": ["camera 1:video"] },
            "media_type": "video/v210",
            "grain_rate": { "numerator": 60000, "denominator": 1001 },
            "frame_width": 1920,
            "frame_height": 1080,
            "interlace_mode": "progressive",
            "colorspace": "BT709",
            "components": []
        })
    }

    fn parse(value: serde_json::Value) -> Result<FlowDef> {
        FlowDef::from_json(&value.to_string())
    }

    #[test]
    fn valid_video_flow_parses() {
        let def = parse(video_json()).unwrap();
        assert_eq!(def.data_format(), DataFormat::Video);
        assert_eq!(def.rate(), Rational::new(60000, 1001));
    }

    #[test]
    fn v210_geometry() {
        let def = parse(video_json()).unwrap();
        let FlowGeometry::Discrete {
            grain_size,
            total_slices,
            slice_sizes,
            ..
        } = def.geometry().unwrap()
        else {
            panic!("expected discrete geometry");
        };
        assert_eq!(slice_sizes[0], v210_line_length(1920));
        assert_eq!(slice_sizes[0], 5120);
        assert_eq!(total_slices, 1080);
        assert_eq!(grain_size, 5120 * 1080);
    }

    #[test]
    fn v210_alpha_geometry_adds_a_plane() {
        let mut value = video_json();
        value["media_type"] = "video/v210+alpha".into();
        let def = parse(value).unwrap();
        let FlowGeometry::Discrete {
            grain_size,
            slice_sizes,
            ..
        } = def.geometry().unwrap()
        else {
            panic!("expected discrete geometry");
        };
        assert_eq!(slice_sizes[0], 5120);
        assert_eq!(slice_sizes[1], (1920 + 2) / 3 * 4);
        assert_eq!(grain_size, (slice_sizes[0] + slice_sizes[1]) * 1080);
    }

    #[test]
    fn unsupported_video_media_type() {
        let mut value = video_json();
        value["media_type"] = "video/raw".into();
        let def = parse(value).unwrap();
        assert!(matches!(
            def.geometry(),
            Err(Error::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn empty_label_is_rejected() {
        let mut value = video_json();
        value["label"] = "".into();
        assert!(matches!(parse(value), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn missing_tags_are_rejected() {
        let mut value = video_json();
        value.as_object_mut().unwrap().remove("tags");
        assert!(matches!(parse(value), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn group_hint_rules() {
        for (hint, ok) in [
            ("camera 1:video", true),
            ("camera 1:video:device", true),
            ("camera 1:video:node", true),
            ("a/b/c", false),
            ("a:b:c:d", false),
            (":role", false),
            ("group:", false),
            ("group:role:rack", false),
        ] {
            let mut value = video_json();
            value["tags"][GROUP_HINT_TAG] = serde_json::json!([hint]);
            assert_eq!(parse(value).is_ok(), ok, "hint {hint:?}");
        }

        let mut value = video_json();
        value["tags"][GROUP_HINT_TAG] = serde_json::json!([]);
        assert!(matches!(parse(value), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn interlaced_grain_rate_coupling() {
        let mut value = video_json();
        value["interlace_mode"] = "interlaced_tff".into();
        // 60000/1001 is a field rate, not a legal interlaced grain rate.
        assert!(matches!(parse(value), Err(Error::InvalidDescriptor(_))));

        let mut value = video_json();
        value["interlace_mode"] = "interlaced_tff".into();
        value["grain_rate"] = serde_json::json!({"numerator": 30000, "denominator": 1001});
        let def = parse(value).unwrap();
        let FlowGeometry::Discrete { total_slices, .. } = def.geometry().unwrap() else {
            panic!("expected discrete geometry");
        };
        // Interlaced media is handled as separate fields.
        assert_eq!(total_slices, 540);

        let mut value = video_json();
        value["interlace_mode"] = "interlaced_bff".into();
        value["grain_rate"] = serde_json::json!({"numerator": 25, "denominator": 1});
        value["frame_height"] = 1081.into();
        assert!(matches!(parse(value), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn rates_are_normalized_on_ingest() {
        let mut value = video_json();
        value["grain_rate"] = serde_json::json!({"numerator": 100000, "denominator": 2000});
        let def = parse(value).unwrap();
        assert_eq!(def.rate(), Rational::new(50, 1));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            FlowDef::from_json("{ this is not json"),
            Err(Error::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn audio_bit_depth_is_constrained() {
        let audio = serde_json::json!({
            "id": "b3bb5be7-9fe9-4324-a5bb-4c70e1084449",
            "format": "urn:x-nmos:format:audio",
            "label": "test audio",
            "description": "48 kHz mono",
            "tags": { "urn:x-nmos:tag:grouphint/v1.0": ["camera 1:audio"] },
            "media_type": "audio/float32",
            "sample_rate": { "numerator": 48000 },
            "channel_count": 1,
            "bit_depth": 32,
            "source_id": "2aa143ac-0ab7-4d75-bc32-5c00c13e186f",
            "device_id": "af215c64-692a-4ae6-8811-bbdcf93fc03b"
        });
        let def = parse(audio.clone()).unwrap();
        assert_eq!(def.rate(), Rational::new(48000, 1));
        let FlowGeometry::Continuous { sample_bytes, .. } = def.geometry().unwrap() else {
            panic!("expected continuous geometry");
        };
        assert_eq!(sample_bytes, 4);

        let mut bad = audio;
        bad["bit_depth"] = 24.into();
        assert!(matches!(parse(bad), Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn data_flow_uses_fixed_grain_geometry() {
        let data = serde_json::json!({
            "id": "db3bd465-2772-484f-8fac-830b0471258b",
            "format": "urn:x-nmos:format:data",
            "label": "test anc",
            "description": "closed captions",
            "tags": { "urn:x-nmos:tag:grouphint/v1.0": ["camera 1:anc"] },
            "media_type": "video/smpte291",
            "grain_rate": { "numerator": 60000, "denominator": 1001 }
        });
        let def = parse(data.clone()).unwrap();
        let FlowGeometry::Discrete {
            grain_size,
            total_slices,
            slice_sizes,
            ..
        } = def.geometry().unwrap()
        else {
            panic!("expected discrete geometry");
        };
        assert_eq!(grain_size, 4096);
        assert_eq!(total_slices, 4096);
        assert_eq!(slice_sizes[0], 1);

        let mut bad = data;
        bad["media_type"] = "application/json".into();
        let def = parse(bad).unwrap();
        assert!(matches!(
            def.geometry(),
            Err(Error::UnsupportedMediaType(_))
        ));
    }
}
