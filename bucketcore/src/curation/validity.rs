//! Auto-curation validity test of a single bin.
//!
//! The cleaned spectra of a bin pass through four ordered checks and the first
//! decisive one settles the flag:
//!
//! 1. cohesion: the largest similarity cluster must hold enough of the spectra,
//! 2. count: the bin needs enough spectra,
//! 3. m/z range: a narrow fragment range is accepted as valid without further checks,
//! 4. entropy: a flat, noisy pooled spectrum is rejected.
//!
//! Whatever the outcome, the bin consensus of every cluster is attached so failed
//! bins still carry a representative spectrum for review.

use serde::{Deserialize, Serialize};

use crate::algorithm::cleaning::clean_spectra;
use crate::algorithm::clustering::{cluster_spectra, ClusterAssignment};
use crate::algorithm::consensus::build_bin_consensus;
use crate::curation::params::CurationParams;
use crate::data::bin::AutocurationFlag;
use crate::data::spectrum::{ConsensusSpectrum, MsMsSpectrum};
use crate::error::CurationError;

/// Number of equal-width m/z bins of the entropy histogram.
pub const ENTROPY_HISTOGRAM_BINS: usize = 100;

/// The check that decided a bin's flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurationStage {
    Cohesion,
    Count,
    MzRange,
    Entropy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidityDecision {
    pub flag: AutocurationFlag,
    pub stage: CurationStage,
    pub consensus: ConsensusSpectrum,
    pub assignment: ClusterAssignment,
    /// Input index of every spectrum that took part; empty spectra are left out.
    pub source_indices: Vec<usize>,
    pub cohesion: f64,
    pub spectrum_count: usize,
    pub mz_range: Option<f64>,
    pub entropy: Option<f64>,
}

impl ValidityDecision {
    /// Input indices of the spectra that fed the majority consensus.
    pub fn majority_members(&self) -> Vec<usize> {
        self.assignment
            .largest()
            .map(|c| c.members.iter().map(|&i| self.source_indices[i]).collect())
            .unwrap_or_default()
    }
}

fn pooled_mz_bounds(spectra: &[MsMsSpectrum]) -> Option<(f64, f64)> {
    spectra
        .iter()
        .filter_map(MsMsSpectrum::mz_bounds)
        .reduce(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)))
}

/// Spread between the lowest and the highest fragment m/z over all spectra.
pub fn mz_range(spectra: &[MsMsSpectrum]) -> Option<f64> {
    pooled_mz_bounds(spectra).map(|(lo, hi)| hi - lo)
}

/// Exponential Shannon entropy of the pooled intensity histogram.
///
/// The pooled m/z span is divided into 100 equal bins; intensities are summed per
/// bin and divided by the number of spectra. With `use_ceiling` every histogram
/// value is rounded up first, which turns the measure into a count of occupied bins.
/// A histogram with `k` equally intense occupied bins scores `k`.
pub fn bin_entropy(spectra: &[MsMsSpectrum], use_ceiling: bool) -> f64 {
    let Some((lo, hi)) = pooled_mz_bounds(spectra) else {
        return 0.0;
    };
    let width = (hi - lo) / ENTROPY_HISTOGRAM_BINS as f64;
    if width <= 0.0 {
        return 1.0;
    }

    let mut histogram = [0.0_f64; ENTROPY_HISTOGRAM_BINS];
    for spectrum in spectra {
        for (mz, intensity) in spectrum.peaks() {
            let index = (((mz - lo) / width).floor() as usize).min(ENTROPY_HISTOGRAM_BINS - 1);
            histogram[index] += intensity;
        }
    }

    let count = spectra.len() as f64;
    let values: Vec<f64> = histogram
        .iter()
        .map(|&v| v / count)
        .map(|v| if use_ceiling { v.ceil() } else { v })
        .collect();

    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }

    let shannon: f64 = values
        .iter()
        .filter(|&&v| v > 0.0)
        .map(|&v| {
            let p = v / total;
            -p * p.ln()
        })
        .sum();
    shannon.exp()
}

/// Run the ordered validity checks on already cleaned spectra.
///
/// Spectra without peaks take no part in clustering, counting or the consensus;
/// if none has a peak the bin is `EmptyInput`.
pub fn classify(cleaned: &[MsMsSpectrum], params: &CurationParams) -> Result<ValidityDecision, CurationError> {
    let (source_indices, cleaned): (Vec<usize>, Vec<MsMsSpectrum>) = cleaned
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_empty())
        .map(|(i, s)| (i, s.clone()))
        .unzip();
    if cleaned.is_empty() {
        return Err(CurationError::EmptyInput);
    }
    let cleaned = cleaned.as_slice();

    let assignment = cluster_spectra(cleaned, &params.clustering())?;
    let consensus = build_bin_consensus(cleaned, &assignment, &params.consensus())?;
    let cohesion = assignment.cohesion();
    let spectrum_count = assignment.spectrum_count();

    let mut decision = ValidityDecision {
        flag: AutocurationFlag::Invalid,
        stage: CurationStage::Cohesion,
        consensus,
        assignment,
        source_indices,
        cohesion,
        spectrum_count,
        mz_range: None,
        entropy: None,
    };

    if cohesion < params.largest_cluster_membership {
        return Ok(decision);
    }

    decision.stage = CurationStage::Count;
    if spectrum_count < params.bin_spectra_count_minimum {
        return Ok(decision);
    }

    // a narrow fragment range does not invalidate the bin
    decision.stage = CurationStage::MzRange;
    let range = mz_range(cleaned).unwrap_or(0.0);
    decision.mz_range = Some(range);
    if range < params.min_mz_range {
        decision.flag = AutocurationFlag::Valid;
        return Ok(decision);
    }

    decision.stage = CurationStage::Entropy;
    let entropy = bin_entropy(cleaned, params.entropy_use_ceiling);
    decision.entropy = Some(entropy);
    decision.flag = AutocurationFlag::from(entropy <= params.max_entropy);
    Ok(decision)
}

/// Clean raw spectra and run the validity checks on them.
pub fn curate_spectra(raw: &[MsMsSpectrum], params: &CurationParams) -> Result<ValidityDecision, CurationError> {
    if raw.is_empty() {
        return Err(CurationError::EmptyInput);
    }
    let cleaned = clean_spectra(raw, &params.cleaning());
    let decision = classify(&cleaned, params)?;
    log::debug!(
        "{} spectra: {:?} at {:?} stage (cohesion {:.3}, range {:?}, entropy {:?})",
        decision.spectrum_count,
        decision.flag,
        decision.stage,
        decision.cohesion,
        decision.mz_range,
        decision.entropy
    );
    Ok(decision)
}
