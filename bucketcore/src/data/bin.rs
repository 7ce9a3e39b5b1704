use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::spectrum::MsMsSpectrum;
use crate::error::CurationError;

/// Ionization mode of a bin, stored as `pos` / `neg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Pos,
    Neg,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Pos => "pos",
            Polarity::Neg => "neg",
        }
    }
}

impl Display for Polarity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" | "positive" | "+" => Ok(Polarity::Pos),
            "neg" | "negative" | "-" => Ok(Polarity::Neg),
            other => Err(format!("unknown polarity '{other}'")),
        }
    }
}

/// Tri-state `valid_for_autocuration` column: NULL / 0 / 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutocurationFlag {
    #[default]
    Unknown,
    Invalid,
    Valid,
}

impl AutocurationFlag {
    pub fn from_column(value: Option<i64>) -> Self {
        match value {
            None => AutocurationFlag::Unknown,
            Some(0) => AutocurationFlag::Invalid,
            Some(_) => AutocurationFlag::Valid,
        }
    }

    pub fn to_column(&self) -> Option<i64> {
        match self {
            AutocurationFlag::Unknown => None,
            AutocurationFlag::Invalid => Some(0),
            AutocurationFlag::Valid => Some(1),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, AutocurationFlag::Valid)
    }
}

impl From<bool> for AutocurationFlag {
    fn from(valid: bool) -> Self {
        if valid {
            AutocurationFlag::Valid
        } else {
            AutocurationFlag::Invalid
        }
    }
}

/// A candidate chemical feature as stored in the `bins` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub bin_id: i64,
    pub english_name: Option<String>,
    pub inchikey: Option<String>,
    pub adduct: Option<String>,
    pub group_id: Option<i64>,
    pub is_istd: Option<bool>,
    pub is_known: Option<bool>,
    pub polarity: Option<Polarity>,
    pub valid_for_autocuration: AutocurationFlag,
    pub mzrt_only: Option<bool>,
    pub consensus_mz: Option<f64>,
    pub consensus_rt: Option<f64>,
    /// Composite consensus text, sub-spectra separated by `@`.
    pub consensus_spectrum: Option<String>,
}

impl Bin {
    pub fn new(bin_id: i64) -> Self {
        Bin {
            bin_id,
            english_name: None,
            inchikey: None,
            adduct: None,
            group_id: None,
            is_istd: None,
            is_known: None,
            polarity: None,
            valid_for_autocuration: AutocurationFlag::Unknown,
            mzrt_only: None,
            consensus_mz: None,
            consensus_rt: None,
            consensus_spectrum: None,
        }
    }

    /// The majority-cluster consensus, `Ok(None)` if nothing is stored yet.
    pub fn majority_spectrum(&self) -> Result<Option<MsMsSpectrum>, CurationError> {
        match self.consensus_spectrum.as_deref() {
            Some(text) if !text.trim().is_empty() => MsMsSpectrum::decode_majority(text).map(Some),
            _ => Ok(None),
        }
    }
}

/// One observed spectrum instance of a bin within one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub annotation_id: i64,
    pub bin_id: i64,
    pub run_id: Option<String>,
    pub precursor_mz: Option<f64>,
    pub retention_time: Option<f64>,
    pub intensity: Option<f64>,
    pub adduct: Option<String>,
    /// Raw `mz:intensity` text as delivered by ingestion.
    pub spectrum: Option<String>,
    pub member_of_consensus: Option<bool>,
}
