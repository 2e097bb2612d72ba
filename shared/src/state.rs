//! Persisted controller state and its shareable token form.
//!
//! A snapshot is JSON with three top-level keys (`selection`, `settings`,
//! `tracks`) encoded as unpadded base64url so it can travel in a link.
//! Struct field order fixes the key order, so equal state always yields the
//! same token. Unknown keys are ignored on decode.

use crate::ranges::{Range, RangeList};
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

pub type VariableId = u32;
pub type Vec3 = [f64; 3];

const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("token is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token does not hold controller state: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inconsistent controller state: {0}")]
    Invalid(String),
}

/// The unit a selection was originally built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Location,
    Segment,
    Gene,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Location => "location",
            Unit::Segment => "segment",
            Unit::Gene => "gene",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain-data form of a selection: its origin unit plus every unit that
/// had been resolved when it was captured.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionData {
    pub unit: Unit,
    pub locations: Option<RangeList>,
    pub segments: Option<RangeList>,
    pub genes: Option<Vec<String>>,
}

/// Display settings shared by every observer of one controller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub variable: Option<VariableId>,
    pub colormap: String,
    pub show_unmapped_segments: bool,
    pub background_color: String,
    pub camera_position: Vec3,
    /// `None` rotates around the structure centroid.
    pub center_position: Option<Vec3>,
    pub contact_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            variable: None,
            colormap: "rainbow".to_string(),
            show_unmapped_segments: false,
            background_color: "#FFFFFF".to_string(),
            camera_position: [0.0, 0.0, 10.0],
            center_position: None,
            contact_threshold: 0.05,
        }
    }
}

/// A saved (variable, location range) pair rendered as a secondary chart.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub variable: VariableId,
    pub location_range: Range,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ControllerSnapshot {
    pub selection: Option<SelectionData>,
    pub settings: Settings,
    pub tracks: Vec<Track>,
}

impl ControllerSnapshot {
    pub fn to_token(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(TOKEN_ENGINE.encode(json))
    }

    pub fn from_token(token: &str) -> Result<Self, DecodeError> {
        let bytes = TOKEN_ENGINE.decode(token.trim())?;
        let snapshot: ControllerSnapshot = serde_json::from_slice(&bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Name of the first setting holding NaN or an infinity. JSON has no
    /// spelling for those, so such a snapshot cannot survive a token.
    pub fn non_finite_setting(&self) -> Option<&'static str> {
        let settings = &self.settings;
        if !settings.contact_threshold.is_finite() {
            return Some("contactThreshold");
        }
        if !settings.camera_position.iter().all(|v| v.is_finite()) {
            return Some("cameraPosition");
        }
        if settings
            .center_position
            .is_some_and(|center| !center.iter().all(|v| v.is_finite()))
        {
            return Some("centerPosition");
        }
        None
    }

    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if let Some(name) = self.non_finite_setting() {
            return Err(DecodeError::Invalid(format!(
                "{name} must hold finite numbers"
            )));
        }

        let Some(selection) = &self.selection else {
            return Ok(());
        };
        let origin_present = match selection.unit {
            Unit::Location => selection.locations.is_some(),
            Unit::Segment => selection.segments.is_some(),
            Unit::Gene => selection.genes.is_some() && selection.segments.is_some(),
        };
        if !origin_present {
            return Err(DecodeError::Invalid(format!(
                "{} selection is missing its {} data",
                selection.unit,
                match selection.unit {
                    Unit::Gene => "gene or segment",
                    unit => unit.as_str(),
                }
            )));
        }
        Ok(())
    }
}
