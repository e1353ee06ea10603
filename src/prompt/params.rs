//! Generation parameter bag and the model-version parsing it relies on.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub const DEFAULT_STYLIZATION: u32 = 100;
pub const DEFAULT_CHARACTER_WEIGHT: u32 = 100;

/// Parameters a node carries under its `generation` metadata key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub aspect_ratio: Option<String>,
    pub stylization: Option<u32>,
    pub weirdness: Option<u32>,
    pub variety: Option<u32>,
    pub speed: Option<Speed>,
    pub character_weight: Option<u32>,
    pub model: Option<String>,
}

impl GenerationParams {
    pub fn from_value(value: &Value) -> AppResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone()).map_err(|e| AppError::InvalidParameter {
            name: "generation".into(),
            reason: e.to_string(),
        })
    }

    /// Field-wise merge where `overrides` wins whenever it sets a value.
    pub fn merged(self, overrides: GenerationParams) -> Self {
        GenerationParams {
            aspect_ratio: overrides.aspect_ratio.or(self.aspect_ratio),
            stylization: overrides.stylization.or(self.stylization),
            weirdness: overrides.weirdness.or(self.weirdness),
            variety: overrides.variety.or(self.variety),
            speed: overrides.speed.or(self.speed),
            character_weight: overrides.character_weight.or(self.character_weight),
            model: overrides.model.or(self.model),
        }
    }

    pub fn model_version(&self) -> Option<ModelVersion> {
        self.model.as_deref().and_then(ModelVersion::parse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Turbo,
    Fast,
    Relax,
}

impl Speed {
    pub fn flag(&self) -> &'static str {
        match self {
            Speed::Turbo => "--turbo",
            Speed::Fast => "--fast",
            Speed::Relax => "--relax",
        }
    }
}

impl FromStr for Speed {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turbo" => Ok(Speed::Turbo),
            "fast" => Ok(Speed::Fast),
            "relax" | "relaxed" => Ok(Speed::Relax),
            other => Err(AppError::InvalidParameter {
                name: "speed".into(),
                reason: format!("expected turbo, fast or relax, got '{}'", other),
            }),
        }
    }
}

/// Translate an aspect-ratio name into the provider's `W:H` notation.
///
/// Explicit ratios such as `16:9` pass through unchanged.
pub fn aspect_ratio_value(raw: &str) -> AppResult<Option<String>> {
    let trimmed = raw.trim();
    let mapped = match trimmed.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "portrait" => "2:3",
        "square" => "1:1",
        "landscape" => "3:2",
        _ => {
            let valid = trimmed
                .split_once(':')
                .map(|(w, h)| is_positive_int(w) && is_positive_int(h))
                .unwrap_or(false);
            if !valid {
                return Err(AppError::InvalidParameter {
                    name: "aspect_ratio".into(),
                    reason: format!("expected portrait, square, landscape or W:H, got '{}'", trimmed),
                });
            }
            trimmed
        }
    };
    Ok(Some(mapped.to_string()))
}

fn is_positive_int(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && !s.trim_start_matches('0').is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Midjourney,
    Niji,
}

/// Model version detected from a model identifier such as `mj-v6.1` or `niji-6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVersion {
    pub family: ModelFamily,
    /// Dotted version number; empty when a niji model names no number.
    pub number: String,
}

impl ModelVersion {
    pub fn parse(model_id: &str) -> Option<Self> {
        let lower = model_id.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }
        if let Some(pos) = lower.find("niji") {
            let rest = lower[pos + 4..].trim_start_matches(|c: char| !c.is_ascii_digit());
            return Some(ModelVersion {
                family: ModelFamily::Niji,
                number: leading_version(rest),
            });
        }
        if lower.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Some(ModelVersion {
                family: ModelFamily::Midjourney,
                number: leading_version(&lower),
            });
        }
        let bytes = lower.as_bytes();
        for (i, _) in lower.match_indices('v') {
            if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
                return Some(ModelVersion {
                    family: ModelFamily::Midjourney,
                    number: leading_version(&lower[i + 1..]),
                });
            }
        }
        None
    }

    pub fn flag(&self) -> String {
        match (self.family, self.number.is_empty()) {
            (ModelFamily::Niji, true) => "--niji".to_string(),
            (ModelFamily::Niji, false) => format!("--niji {}", self.number),
            (ModelFamily::Midjourney, _) => format!("--v {}", self.number),
        }
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            ModelFamily::Midjourney => write!(f, "v{}", self.number),
            ModelFamily::Niji => write!(f, "niji {}", self.number),
        }
    }
}

fn leading_version(s: &str) -> String {
    let taken: String = s.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    taken.trim_end_matches('.').to_string()
}
