//! Dot-product spectral similarity.
//!
//! Both scores are the squared cosine between the aligned intensity vectors of two
//! spectra. The forward score uses every aligned peak; the reverse score only the
//! peaks that are present in the reference spectrum, so fragments seen only in the
//! query do not count against a match.

use serde::{Deserialize, Serialize};

use crate::data::spectrum::MsMsSpectrum;

/// Forward and reverse similarity of one query/reference pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub forward: f64,
    pub reverse: f64,
}

impl SimilarityPair {
    pub fn weighted(&self, weight_forward: f64, weight_reverse: f64) -> f64 {
        weight_forward * self.forward + weight_reverse * self.reverse
    }
}

/// Aligns the peaks of two m/z-sorted spectra.
///
/// Peaks closer than `tolerance` are paired; every other peak is paired with a
/// zero intensity on the other side. Returns (query intensity, reference intensity).
fn align_peaks(query: &MsMsSpectrum, reference: &MsMsSpectrum, tolerance: f64) -> Vec<(f64, f64)> {
    let (q_mz, q_int) = (&query.mz, &query.intensity);
    let (r_mz, r_int) = (&reference.mz, &reference.intensity);

    let mut aligned = Vec::with_capacity(q_mz.len() + r_mz.len());
    let (mut a, mut b) = (0, 0);

    while a < q_mz.len() && b < r_mz.len() {
        let delta = q_mz[a] - r_mz[b];
        if delta < -tolerance {
            aligned.push((q_int[a], 0.0));
            a += 1;
        } else if delta > tolerance {
            aligned.push((0.0, r_int[b]));
            b += 1;
        } else {
            aligned.push((q_int[a], r_int[b]));
            a += 1;
            b += 1;
        }
    }

    aligned.extend(q_int[a..].iter().map(|&i| (i, 0.0)));
    aligned.extend(r_int[b..].iter().map(|&i| (0.0, i)));
    aligned
}

/// Squared cosine of the aligned pairs, clamped into [0, 1]; degenerate input scores 0.
fn squared_cosine<'a>(pairs: impl Iterator<Item = &'a (f64, f64)>) -> f64 {
    let (mut dot, mut q_norm, mut r_norm) = (0.0, 0.0, 0.0);
    for &(q, r) in pairs {
        dot += q * r;
        q_norm += q * q;
        r_norm += r * r;
    }

    let score = (dot * dot) / (q_norm * r_norm);
    if !score.is_finite() {
        log::trace!("degenerate similarity (dot {dot}, norms {q_norm} / {r_norm}) scored as 0");
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

fn is_self_comparison(query: &MsMsSpectrum, reference: &MsMsSpectrum) -> bool {
    !query.is_empty() && query == reference
}

/// Forward dot-product similarity of `query` against `reference`.
pub fn forward(query: &MsMsSpectrum, reference: &MsMsSpectrum, tolerance: f64) -> f64 {
    if is_self_comparison(query, reference) {
        return 1.0;
    }
    squared_cosine(align_peaks(query, reference, tolerance).iter())
}

/// Reverse dot-product similarity: only peaks present in `reference` are scored.
pub fn reverse(query: &MsMsSpectrum, reference: &MsMsSpectrum, tolerance: f64) -> f64 {
    if is_self_comparison(query, reference) {
        return 1.0;
    }
    let aligned = align_peaks(query, reference, tolerance);
    squared_cosine(aligned.iter().filter(|(_, r)| *r > 0.0))
}

/// Forward and reverse similarity in one call.
pub fn similarity_pair(query: &MsMsSpectrum, reference: &MsMsSpectrum, tolerance: f64) -> SimilarityPair {
    SimilarityPair {
        forward: forward(query, reference, tolerance),
        reverse: reverse(query, reference, tolerance),
    }
}

/// Similarity used to fill the within-bin cluster matrix.
///
/// This is the forward score of `a` against `b`, taken as if it were symmetric:
/// the matrix is filled from one triangular pass and mirrored. Callers needing a
/// directional score should use [`forward`] or [`reverse`] explicitly.
pub fn symmetric_similarity(a: &MsMsSpectrum, b: &MsMsSpectrum, tolerance: f64) -> f64 {
    forward(a, b, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn spectrum(peaks: &[(f64, f64)]) -> MsMsSpectrum {
        MsMsSpectrum::from_peaks(peaks.to_vec())
    }

    #[test]
    fn test_self_similarity_is_exactly_one() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(1..40);
            let peaks: Vec<(f64, f64)> = (0..n)
                .map(|_| (rng.gen_range(50.0..1000.0), rng.gen_range(0.001..1.0)))
                .collect();
            let s = MsMsSpectrum::from_peaks(peaks);
            for tolerance in [0.0, 0.01, 0.5, 5.0] {
                assert_eq!(forward(&s, &s, tolerance), 1.0);
                assert_eq!(reverse(&s, &s, tolerance), 1.0);
            }
        }
    }

    #[test]
    fn test_identical_copies_score_one() {
        let a = spectrum(&[(100.0, 0.3), (150.0, 1.0), (151.0, 0.7)]);
        let b = spectrum(&[(100.0, 0.3), (150.0, 1.0), (151.0, 0.7)]);
        assert_eq!(forward(&a, &b, 0.01), 1.0);
    }

    #[test]
    fn test_disjoint_spectra_score_zero() {
        let a = spectrum(&[(100.0, 1.0)]);
        let b = spectrum(&[(200.0, 1.0)]);
        assert_eq!(forward(&a, &b, 0.01), 0.0);
        assert_eq!(reverse(&a, &b, 0.01), 0.0);
    }

    #[test]
    fn test_peaks_within_tolerance_match() {
        let a = spectrum(&[(100.000, 1.0), (150.0, 0.5)]);
        let b = spectrum(&[(100.005, 1.0), (150.004, 0.5)]);
        assert!((forward(&a, &b, 0.01) - 1.0).abs() < 1e-12);
        assert_eq!(forward(&a, &b, 0.001), 0.0);
    }

    #[test]
    fn test_reverse_ignores_query_only_peaks() {
        let query = spectrum(&[(100.0, 1.0), (150.0, 1.0)]);
        let reference = spectrum(&[(100.0, 1.0)]);
        let pair = similarity_pair(&query, &reference, 0.01);
        assert!((pair.forward - 0.5).abs() < 1e-12);
        assert!((pair.reverse - 1.0).abs() < 1e-12);

        // swapping roles penalises the reference-only peak in both directions
        let swapped = similarity_pair(&reference, &query, 0.01);
        assert!((swapped.reverse - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_spectra_score_zero() {
        let empty = MsMsSpectrum::default();
        let a = spectrum(&[(100.0, 1.0)]);
        assert_eq!(forward(&empty, &a, 0.01), 0.0);
        assert_eq!(forward(&empty, &empty, 0.01), 0.0);
    }

    #[test]
    fn test_weighted_score() {
        let pair = SimilarityPair { forward: 0.8, reverse: 0.4 };
        assert!((pair.weighted(0.5, 0.5) - 0.6).abs() < 1e-12);
    }
}
