// SPDX-FileCopyrightText: 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Instance and flow option documents.
//!
//! Options are passed as small JSON objects; unknown keys are ignored so
//! newer producers can talk to older consumers. The only option currently
//! defined is the history duration override, which controls how much
//! wall-clock time the ring buffers retain.

use serde::Deserialize;

use crate::{Error, Result};

/// Ring buffers retain one second of media unless overridden.
pub(crate) const DEFAULT_HISTORY_DURATION_NS: u64 = 1_000_000_000;

/// Options accepted by [`crate::MxlInstance::new`] and
/// [`crate::MxlInstance::create_flow`].
#[derive(Deserialize, Clone, Debug, Default)]
pub struct FlowOptions {
    /// How much wall-clock history the flow's ring buffer must retain, in
    /// nanoseconds.
    #[serde(rename = "urn:x-mxl:option:history_duration/v1.0")]
    pub history_duration: Option<u64>,
}

impl FlowOptions {
    /// Parses an options document.
    ///
    /// An empty string is equivalent to `{}`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] when the document is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
            .map_err(|error| Error::InvalidArg(format!("malformed options document: {error}")))
    }

    /// The configured history duration, falling back to `default_ns`.
    pub(crate) fn history_duration_ns(&self, default_ns: u64) -> u64 {
        self.history_duration.unwrap_or(default_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_default_documents() {
        assert!(FlowOptions::from_json("").unwrap().history_duration.is_none());
        assert!(FlowOptions::from_json("{}").unwrap().history_duration.is_none());
    }

    #[test]
    fn history_duration_override() {
        let options =
            FlowOptions::from_json(r#"{"urn:x-mxl:option:history_duration/v1.0": 500000000}"#)
                .unwrap();
        assert_eq!(options.history_duration, Some(500_000_000));
        assert_eq!(
            options.history_duration_ns(DEFAULT_HISTORY_DURATION_NS),
            500_000_000
        );
        assert_eq!(
            FlowOptions::default().history_duration_ns(DEFAULT_HISTORY_DURATION_NS),
            DEFAULT_HISTORY_DURATION_NS
        );
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            FlowOptions::from_json("not json"),
            Err(Error::InvalidArg(_))
        ));
    }
}
