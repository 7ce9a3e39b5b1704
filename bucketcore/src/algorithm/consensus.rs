use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::algorithm::clustering::ClusterAssignment;
use crate::data::spectrum::{ConsensusSpectrum, MsMsSpectrum};
use crate::error::CurationError;

/// Configuration for consensus spectrum building
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Width of the m/z bins peaks are pooled into, in Da (default: 0.015)
    pub ms2_tolerance: f64,
    /// A bin is kept when more than this share of spectra has a peak in it (default: 0.3)
    pub minimum_percent_present: f64,
    /// Kept bins at most this many bin indices apart form one peak group (default: 3)
    pub bin_space_tolerance: i64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            ms2_tolerance: 0.015,
            minimum_percent_present: 0.3,
            bin_space_tolerance: 3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PooledPeak {
    mz: f64,
    intensity: f64,
    bin: i64,
}

/// Bin indices present in enough distinct spectra.
///
/// Falls back to the most frequently present indices when none clears the bar, so a
/// non-empty pool always yields at least one peak.
fn frequent_bins(presence: &BTreeMap<i64, BTreeSet<usize>>, spectrum_count: usize, minimum_percent_present: f64) -> Vec<i64> {
    let minimum_count = (spectrum_count as f64 * minimum_percent_present).floor() as usize;

    let retained: Vec<i64> = presence
        .iter()
        .filter(|(_, sources)| sources.len() > minimum_count)
        .map(|(&bin, _)| bin)
        .collect();

    if !retained.is_empty() {
        return retained;
    }

    let best = presence.values().map(BTreeSet::len).max().unwrap_or(0);
    log::debug!("no m/z bin present in more than {minimum_count} spectra, keeping bins present in {best}");
    presence
        .iter()
        .filter(|(_, sources)| sources.len() == best)
        .map(|(&bin, _)| bin)
        .collect()
}

/// Chain sorted bin indices whose gaps are within `bin_space_tolerance`, then widen
/// every group by one index on each side of each member.
fn group_bins(sorted_bins: &[i64], bin_space_tolerance: i64) -> Vec<BTreeSet<i64>> {
    let mut groups: Vec<Vec<i64>> = Vec::new();
    for &bin in sorted_bins {
        match groups.last_mut() {
            Some(group) if group.last().map_or(false, |&last| bin - last <= bin_space_tolerance) => group.push(bin),
            _ => groups.push(vec![bin]),
        }
    }

    groups
        .into_iter()
        .map(|group| group.iter().flat_map(|&b| [b - 1, b, b + 1]).collect())
        .collect()
}

/// Build one consensus spectrum from a set of cleaned spectra.
///
/// All peaks are pooled and assigned to m/z bins of width `ms2_tolerance` starting at
/// the lowest pooled m/z. Bins with a peak in enough distinct spectra are grouped, and
/// each group contributes one peak: the mean m/z and mean intensity of every pooled
/// peak inside the widened group. The result is normalized to a base peak of 1.0.
pub fn build_consensus(spectra: &[MsMsSpectrum], params: &ConsensusParams) -> Result<MsMsSpectrum, CurationError> {
    if spectra.is_empty() {
        return Err(CurationError::EmptyInput);
    }

    let min_mz = spectra
        .iter()
        .filter_map(MsMsSpectrum::mz_bounds)
        .map(|(lo, _)| lo)
        .reduce(f64::min);
    let Some(min_mz) = min_mz else {
        return Ok(MsMsSpectrum::default());
    };

    let mut pool: Vec<PooledPeak> = Vec::new();
    let mut presence: BTreeMap<i64, BTreeSet<usize>> = BTreeMap::new();

    for (source, spectrum) in spectra.iter().enumerate() {
        for (mz, intensity) in spectrum.peaks() {
            let bin = ((mz - min_mz) / params.ms2_tolerance).floor() as i64;
            pool.push(PooledPeak { mz, intensity, bin });
            presence.entry(bin).or_default().insert(source);
        }
    }

    let retained = frequent_bins(&presence, spectra.len(), params.minimum_percent_present);
    let groups = group_bins(&retained, params.bin_space_tolerance);

    let mut peaks: Vec<(f64, f64)> = groups
        .iter()
        .filter_map(|group| {
            let members: Vec<&PooledPeak> = pool.iter().filter(|p| group.contains(&p.bin)).collect();
            if members.is_empty() {
                return None;
            }
            let count = members.len() as f64;
            let mz = members.iter().map(|p| p.mz).sum::<f64>() / count;
            let intensity = members.iter().map(|p| p.intensity).sum::<f64>() / count;
            Some((mz, intensity))
        })
        .collect();

    peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(MsMsSpectrum::from_peaks(peaks).normalized_to_max())
}

/// Build one consensus per cluster, largest cluster first.
pub fn build_bin_consensus(
    spectra: &[MsMsSpectrum],
    assignment: &ClusterAssignment,
    params: &ConsensusParams,
) -> Result<ConsensusSpectrum, CurationError> {
    let sub_spectra = assignment
        .ranked
        .iter()
        .map(|cluster| {
            let members: Vec<MsMsSpectrum> = cluster.members.iter().map(|&i| spectra[i].clone()).collect();
            build_consensus(&members, params)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConsensusSpectrum::new(sub_spectra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::clustering::ClusterAssignment;

    fn spectrum(peaks: &[(f64, f64)]) -> MsMsSpectrum {
        MsMsSpectrum::from_peaks(peaks.to_vec())
    }

    fn params(tolerance: f64, percent: f64) -> ConsensusParams {
        ConsensusParams {
            ms2_tolerance: tolerance,
            minimum_percent_present: percent,
            bin_space_tolerance: 3,
        }
    }

    #[test]
    fn test_replicates_reproduce_spectrum() {
        let replicate = spectrum(&[(100.0, 1.0), (150.0, 0.5)]);
        let consensus = build_consensus(&vec![replicate; 3], &params(0.01, 0.3)).unwrap();

        assert_eq!(consensus.len(), 2);
        assert_eq!(*consensus.mz, vec![100.0, 150.0]);
        assert_eq!(*consensus.intensity, vec![1.0, 0.5]);
    }

    #[test]
    fn test_drifting_peaks_are_averaged() {
        let spectra = vec![
            spectrum(&[(100.000, 1.0)]),
            spectrum(&[(100.012, 0.8)]),
            spectrum(&[(100.025, 0.6)]),
        ];
        let consensus = build_consensus(&spectra, &params(0.01, 0.3)).unwrap();

        assert_eq!(consensus.len(), 1);
        assert!((consensus.mz[0] - 100.012333333).abs() < 1e-6);
        assert_eq!(consensus.intensity[0], 1.0);
    }

    #[test]
    fn test_rare_peaks_are_dropped() {
        let spectra = vec![
            spectrum(&[(100.0, 1.0), (200.0, 0.5)]),
            spectrum(&[(100.0, 1.0), (200.0, 0.5)]),
            spectrum(&[(100.0, 1.0), (300.0, 0.9)]),
        ];
        // floor(3 * 0.5) = 1, so a bin needs peaks from at least two spectra
        let consensus = build_consensus(&spectra, &params(0.01, 0.5)).unwrap();
        assert_eq!(*consensus.mz, vec![100.0, 200.0]);
    }

    #[test]
    fn test_presence_counts_spectra_not_peaks() {
        // one spectrum with two peaks in the same bin must not count twice
        let spectra = vec![
            spectrum(&[(100.0, 1.0), (100.001, 1.0), (200.0, 1.0)]),
            spectrum(&[(200.0, 1.0)]),
            spectrum(&[(200.0, 1.0)]),
        ];
        let consensus = build_consensus(&spectra, &params(0.01, 0.5)).unwrap();
        assert_eq!(*consensus.mz, vec![200.0]);
    }

    #[test]
    fn test_output_is_normalized_and_non_empty() {
        let spectra = vec![
            spectrum(&[(100.0, 0.2), (180.0, 1.0), (250.0, 0.4)]),
            spectrum(&[(120.0, 0.9), (180.3, 0.1)]),
            spectrum(&[(400.0, 0.7)]),
        ];
        for percent in [0.0, 0.3, 0.9, 1.0] {
            let consensus = build_consensus(&spectra, &params(0.015, percent)).unwrap();
            assert!(!consensus.is_empty());
            assert!(consensus.intensity.iter().all(|&i| i <= 1.0));
            assert!(consensus.intensity.iter().any(|&i| i == 1.0));
        }
    }

    #[test]
    fn test_group_bins_chains_and_widens() {
        let groups = group_bins(&[10, 12, 20], 3);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].iter().copied().collect::<Vec<_>>(), vec![9, 10, 11, 12, 13]);
        assert_eq!(groups[1].iter().copied().collect::<Vec<_>>(), vec![19, 20, 21]);
    }

    #[test]
    fn test_bin_consensus_is_ordered_by_cluster_size() {
        let a = spectrum(&[(100.0, 1.0)]);
        let b = spectrum(&[(300.0, 1.0)]);
        let spectra = vec![b.clone(), a.clone(), a.clone(), a];
        let assignment = ClusterAssignment::from_labels(vec![0, 1, 1, 1]);

        let consensus = build_bin_consensus(&spectra, &assignment, &params(0.01, 0.3)).unwrap();
        assert_eq!(consensus.len(), 2);
        assert_eq!(*consensus.majority().unwrap().mz, vec![100.0]);
        assert_eq!(consensus.to_string(), "100.0:1.0@300.0:1.0");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(build_consensus(&[], &ConsensusParams::default()), Err(CurationError::EmptyInput));
    }
}
