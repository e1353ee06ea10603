//! Flag/model-version compatibility table.
//!
//! The relay rejects some flag and model combinations outright. Rather than
//! branching in the compiler, each known conflict is a row below; the compiler
//! asks [`is_supported`] before emitting a gated flag.
use crate::prompt::params::{ModelFamily, ModelVersion};

/// Flags whose emission depends on the target model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedFlag {
    CharacterReference,
}

impl GatedFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatedFlag::CharacterReference => "--cref",
        }
    }
}

struct Incompatibility {
    flag: GatedFlag,
    family: ModelFamily,
    /// `None` matches every version of the family.
    version_prefix: Option<&'static str>,
}

const INCOMPATIBILITIES: &[Incompatibility] = &[
    Incompatibility {
        flag: GatedFlag::CharacterReference,
        family: ModelFamily::Midjourney,
        version_prefix: Some("7"),
    },
    Incompatibility {
        flag: GatedFlag::CharacterReference,
        family: ModelFamily::Niji,
        version_prefix: None,
    },
];

/// Whether `flag` may be sent for `version`. An undetected version is the
/// provider default and is treated as compatible.
pub fn is_supported(flag: GatedFlag, version: Option<&ModelVersion>) -> bool {
    let Some(version) = version else {
        return true;
    };
    !INCOMPATIBILITIES.iter().any(|row| {
        row.flag == flag
            && row.family == version.family
            && row
                .version_prefix
                .map_or(true, |prefix| version.number.starts_with(prefix))
    })
}
