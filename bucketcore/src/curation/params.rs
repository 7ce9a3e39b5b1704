use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::cleaning::CleaningParams;
use crate::algorithm::clustering::ClusterParams;
use crate::algorithm::consensus::ConsensusParams;
use crate::error::CurationError;

/// Parameters of the auto-curation test of one bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationParams {
    /// Peak matching / binning tolerance in Da (default: 0.015)
    pub ms2_tolerance: f64,
    /// Relative noise floor used when cleaning spectra (default: 0.03)
    pub noise_level: f64,
    /// Dendrogram cut height for clustering (default: 0.2)
    pub mutual_distance_for_cluster: f64,
    /// Replace histogram values by their ceiling before the entropy (default: false)
    pub entropy_use_ceiling: bool,
    /// Bins flatter than this exponential entropy are invalid (default: 60.0)
    pub max_entropy: f64,
    /// Fragment m/z spread below which a bin is accepted without the entropy test (default: 0.5)
    pub min_mz_range: f64,
    /// Minimum share of spectra in the largest cluster (default: 0.9)
    pub largest_cluster_membership: f64,
    /// Minimum number of spectra for a valid bin (default: 20)
    pub bin_spectra_count_minimum: usize,
    /// Share of spectra a consensus m/z bin must be present in (default: 0.3)
    pub minimum_percent_present: f64,
    /// Gap in bin indices bridged when grouping consensus bins (default: 3)
    pub bin_space_tolerance: i64,
}

impl Default for CurationParams {
    fn default() -> Self {
        CurationParams {
            ms2_tolerance: 0.015,
            noise_level: 0.03,
            mutual_distance_for_cluster: 0.2,
            entropy_use_ceiling: false,
            max_entropy: 60.0,
            min_mz_range: 0.5,
            largest_cluster_membership: 0.9,
            bin_spectra_count_minimum: 20,
            minimum_percent_present: 0.3,
            bin_space_tolerance: 3,
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), CurationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(CurationError::InvalidParameter { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), CurationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CurationError::InvalidParameter { name, value })
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), CurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CurationError::InvalidParameter { name, value })
    }
}

impl CurationParams {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read parameters from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let params = Self::from_json_str(&fs::read_to_string(path)?)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CurationError> {
        check_positive("ms2_tolerance", self.ms2_tolerance)?;
        check_fraction("noise_level", self.noise_level)?;
        check_fraction("mutual_distance_for_cluster", self.mutual_distance_for_cluster)?;
        check_fraction("largest_cluster_membership", self.largest_cluster_membership)?;
        check_fraction("minimum_percent_present", self.minimum_percent_present)?;
        check_non_negative("max_entropy", self.max_entropy)?;
        check_non_negative("min_mz_range", self.min_mz_range)?;
        if self.bin_space_tolerance < 0 {
            return Err(CurationError::InvalidParameter {
                name: "bin_space_tolerance",
                value: self.bin_space_tolerance as f64,
            });
        }
        Ok(())
    }

    pub fn cleaning(&self) -> CleaningParams {
        CleaningParams {
            noise_level: self.noise_level,
            ms2_tolerance: self.ms2_tolerance,
        }
    }

    pub fn clustering(&self) -> ClusterParams {
        ClusterParams {
            ms2_tolerance: self.ms2_tolerance,
            mutual_distance: self.mutual_distance_for_cluster,
        }
    }

    pub fn consensus(&self) -> ConsensusParams {
        ConsensusParams {
            ms2_tolerance: self.ms2_tolerance,
            minimum_percent_present: self.minimum_percent_present,
            bin_space_tolerance: self.bin_space_tolerance,
        }
    }
}

/// Parameters of reference library matching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Precursor m/z window half width in Da (default: 0.01)
    pub mz_tolerance: f64,
    /// Retention time window half width (default: 1.0)
    pub rt_tolerance: f64,
    /// Fragment matching tolerance in Da (default: 0.015)
    pub ms2_tolerance: f64,
    /// Weight of the forward dot product (default: 0.5)
    pub weight_forward: f64,
    /// Weight of the reverse dot product (default: 0.5)
    pub weight_reverse: f64,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            mz_tolerance: 0.01,
            rt_tolerance: 1.0,
            ms2_tolerance: 0.015,
            weight_forward: 0.5,
            weight_reverse: 0.5,
        }
    }
}

impl MatchParams {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let params = Self::from_json_str(&fs::read_to_string(path)?)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CurationError> {
        check_positive("mz_tolerance", self.mz_tolerance)?;
        check_positive("rt_tolerance", self.rt_tolerance)?;
        check_positive("ms2_tolerance", self.ms2_tolerance)?;
        check_fraction("weight_forward", self.weight_forward)?;
        check_fraction("weight_reverse", self.weight_reverse)?;
        Ok(())
    }
}
