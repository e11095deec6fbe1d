//! Camouflage analysis document.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PERCENT_MIN: f64 = 0.0;
const PERCENT_MAX: f64 = 100.0;

pub const FALLBACK_CONFIDENCE: f64 = 50.0;
pub const FALLBACK_DESCRIPTION: &str =
    "Unable to parse AI analysis. Please try again with a different image.";
pub const ERROR_DESCRIPTION: &str = "An error occurred during analysis. Please try again.";

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\n?(.*?)\n?```").expect("valid fence pattern"));
static PLAIN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\n?(.*?)\n?```").expect("valid fence pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRect")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRegion")]
pub struct CamouflageRegion {
    pub description: String,
    pub intensity: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CamouflageRegion {
    pub fn rect(&self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Validated camouflage judgment for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawAnalysis")]
pub struct AnalysisResult {
    pub detected: bool,
    pub species: Option<String>,
    pub camouflage_percentage: f64,
    pub confidence: f64,
    pub description: String,
    pub adaptations: Vec<String>,
    pub bounding_box: Option<BoundingBox>,
    pub camouflage_regions: Vec<CamouflageRegion>,
}

impl AnalysisResult {
    /// Result substituted when the model's answer cannot be parsed.
    pub fn fallback() -> Self {
        Self {
            detected: false,
            species: None,
            camouflage_percentage: 0.0,
            confidence: FALLBACK_CONFIDENCE,
            description: FALLBACK_DESCRIPTION.to_string(),
            adaptations: Vec::new(),
            bounding_box: None,
            camouflage_regions: Vec::new(),
        }
    }

    /// Zeroed result carried alongside an error message.
    pub fn zeroed(description: &str) -> Self {
        Self {
            confidence: 0.0,
            description: description.to_string(),
            ..Self::fallback()
        }
    }

    /// Parses model or service output, unwrapping a fenced code block first.
    pub fn from_model_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(extract_json_block(text))
    }

    /// Like [`from_model_text`](Self::from_model_text) but never fails.
    pub fn parse_or_fallback(text: &str) -> Self {
        match Self::from_model_text(text) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("Failed to parse analysis ({}), using fallback", err);
                tracing::debug!("Unparseable analysis text: {}", text);
                Self::fallback()
            }
        }
    }
}

/// Body returned with a non-success status by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub error: String,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

impl ErrorDocument {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            result: AnalysisResult::zeroed(ERROR_DESCRIPTION),
        }
    }
}

/// Returns the contents of the first ```` ```json ```` block, else of the
/// first plain ```` ``` ```` block, else the whole text.
pub fn extract_json_block(text: &str) -> &str {
    JSON_FENCE
        .captures(text)
        .or_else(|| PLAIN_FENCE.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return PERCENT_MIN;
    }
    value.clamp(PERCENT_MIN, PERCENT_MAX)
}

fn clamp_rect(x: f64, y: f64, width: f64, height: f64) -> (f64, f64, f64, f64) {
    let x = clamp_percent(x);
    let y = clamp_percent(y);
    let width = clamp_percent(width).min(PERCENT_MAX - x);
    let height = clamp_percent(height).min(PERCENT_MAX - y);
    (x, y, width, height)
}

#[derive(Deserialize)]
struct RawRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<RawRect> for BoundingBox {
    fn from(raw: RawRect) -> Self {
        let (x, y, width, height) = clamp_rect(raw.x, raw.y, raw.width, raw.height);
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Deserialize)]
struct RawRegion {
    #[serde(default)]
    description: Option<String>,
    intensity: f64,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<RawRegion> for CamouflageRegion {
    fn from(raw: RawRegion) -> Self {
        let (x, y, width, height) = clamp_rect(raw.x, raw.y, raw.width, raw.height);
        Self {
            description: raw.description.unwrap_or_default(),
            intensity: clamp_percent(raw.intensity),
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    detected: bool,
    #[serde(default)]
    species: Option<String>,
    camouflage_percentage: f64,
    confidence: f64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    adaptations: Option<Vec<String>>,
    #[serde(default)]
    bounding_box: Option<BoundingBox>,
    #[serde(default)]
    camouflage_regions: Option<Vec<CamouflageRegion>>,
}

impl From<RawAnalysis> for AnalysisResult {
    fn from(raw: RawAnalysis) -> Self {
        Self {
            detected: raw.detected,
            species: raw.species.filter(|s| !s.trim().is_empty()),
            camouflage_percentage: clamp_percent(raw.camouflage_percentage),
            confidence: clamp_percent(raw.confidence),
            description: raw.description.unwrap_or_default(),
            adaptations: raw.adaptations.unwrap_or_default(),
            bounding_box: raw.bounding_box,
            camouflage_regions: raw.camouflage_regions.unwrap_or_default(),
        }
    }
}
