use std::ffi::c_int;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Early-rejection strategy of the soft cascade.
///
/// Passed through to the native library as an integer selector.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCriteria {
    #[default]
    #[serde(alias = "default")]
    NoReject,
    Dollar,
    NmsMask,
}

impl RejectionCriteria {
    /// Alias the native library uses for its default strategy.
    pub const DEFAULT: Self = Self::NoReject;

    /// Value handed to the native create call.
    pub fn as_raw(self) -> c_int {
        match self {
            Self::NoReject => 1,
            Self::Dollar => 2,
            Self::NmsMask => 0xF,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoReject => "no_reject",
            Self::Dollar => "dollar",
            Self::NmsMask => "nms_mask",
        }
    }
}

impl fmt::Display for RejectionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown rejection criteria '{0}' (expected no_reject, dollar, nms_mask or default)")]
pub struct ParseRejectionError(String);

impl FromStr for RejectionCriteria {
    type Err = ParseRejectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "no_reject" | "noreject" | "default" => Ok(Self::NoReject),
            "dollar" => Ok(Self::Dollar),
            "nms_mask" | "nmsmask" => Ok(Self::NmsMask),
            _ => Err(ParseRejectionError(s.to_string())),
        }
    }
}
