use serde::{Deserialize, Serialize};

use crate::data::spectrum::MsMsSpectrum;

/// Configuration for spectrum cleaning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleaningParams {
    /// Peaks below this fraction of the base peak are dropped (default: 0.03)
    pub noise_level: f64,
    /// Peaks closer than this (Da) are merged into one centroid (default: 0.015)
    pub ms2_tolerance: f64,
}

impl Default for CleaningParams {
    fn default() -> Self {
        CleaningParams {
            noise_level: 0.03,
            ms2_tolerance: 0.015,
        }
    }
}

/// Merge peaks that lie within `tolerance` of a more intense peak.
///
/// Peaks are visited by descending intensity; each visited peak absorbs the
/// contiguous run of neighbours within `tolerance` on either side. The merged
/// peak has the intensity-weighted mean m/z and the summed intensity.
///
/// # Arguments
/// * `mz` - m/z values (must be sorted in ascending order)
/// * `intensity` - intensity values corresponding to m/z
/// * `tolerance` - merge distance in Da
///
/// # Returns
/// Tuple of (centroid_mz, centroid_intensity) sorted by m/z
pub fn centroid_peaks(mz: &[f64], intensity: &[f64], tolerance: f64) -> (Vec<f64>, Vec<f64>) {
    let needs_centroid = mz.windows(2).any(|w| w[1] - w[0] <= tolerance);
    if !needs_centroid {
        return (mz.to_vec(), intensity.to_vec());
    }

    let n = mz.len();
    let mut remaining = intensity.to_vec();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| intensity[b].total_cmp(&intensity[a]));

    let mut centroids: Vec<(f64, f64)> = Vec::with_capacity(n);

    for i in order {
        if remaining[i] <= 0.0 {
            continue;
        }

        let mut left = i;
        while left > 0 && mz[i] - mz[left - 1] <= tolerance {
            left -= 1;
        }
        let mut right = i + 1;
        while right < n && mz[right] - mz[i] <= tolerance {
            right += 1;
        }

        if right - left == 1 {
            centroids.push((mz[i], remaining[i]));
        } else {
            let intensity_sum: f64 = remaining[left..right].iter().sum();
            let weighted_mz: f64 = mz[left..right]
                .iter()
                .zip(&remaining[left..right])
                .map(|(m, i)| m * i)
                .sum();
            centroids.push((weighted_mz / intensity_sum, intensity_sum));
        }

        remaining[left..right].iter_mut().for_each(|v| *v = 0.0);
    }

    centroids.sort_by(|a, b| a.0.total_cmp(&b.0));
    centroids.into_iter().unzip()
}

/// Remove peaks whose intensity is below `noise_level` times the base peak.
pub fn remove_noise(mz: &[f64], intensity: &[f64], noise_level: f64) -> (Vec<f64>, Vec<f64>) {
    let max = intensity.iter().copied().fold(0.0, f64::max);
    let threshold = max * noise_level;

    mz.iter()
        .zip(intensity)
        .filter(|&(_, &i)| i >= threshold)
        .map(|(&m, &i)| (m, i))
        .unzip()
}

/// Clean a raw spectrum before clustering or consensus building.
///
/// Drops non-positive and non-finite peaks, centroids within the MS2 tolerance,
/// removes noise relative to the base peak and normalizes the base peak to 1.0.
pub fn clean_spectrum(spectrum: &MsMsSpectrum, params: &CleaningParams) -> MsMsSpectrum {
    let (mz, intensity): (Vec<f64>, Vec<f64>) = spectrum
        .peaks()
        .filter(|(m, i)| m.is_finite() && i.is_finite() && *i > 0.0)
        .unzip();

    if mz.is_empty() {
        return MsMsSpectrum::default();
    }

    let (mz, intensity) = centroid_peaks(&mz, &intensity, params.ms2_tolerance);
    let (mz, intensity) = remove_noise(&mz, &intensity, params.noise_level);

    MsMsSpectrum::new(mz, intensity).normalized_to_max()
}

/// Clean every spectrum of a bin with the same parameters.
pub fn clean_spectra(spectra: &[MsMsSpectrum], params: &CleaningParams) -> Vec<MsMsSpectrum> {
    spectra.iter().map(|s| clean_spectrum(s, params)).collect()
}
