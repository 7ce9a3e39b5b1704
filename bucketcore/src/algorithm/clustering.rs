//! Within-bin spectrum clustering.
//!
//! Spectra of one bin are compared pairwise, the similarity matrix is turned into
//! condensed distances, an average-linkage dendrogram is built and cut at a fixed
//! mutual distance. The resulting flat clusters are ranked by size; the share of
//! spectra in the largest one is the bin's cohesion.

use itertools::Itertools;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::algorithm::similarity::symmetric_similarity;
use crate::data::spectrum::MsMsSpectrum;
use crate::error::CurationError;

/// Configuration for within-bin clustering
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Peak matching tolerance of the similarity score in Da (default: 0.015)
    pub ms2_tolerance: f64,
    /// Dendrogram cut height; spectra merged at or below it share a cluster (default: 0.2)
    pub mutual_distance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            ms2_tolerance: 0.015,
            mutual_distance: 0.2,
        }
    }
}

/// Pairwise similarity of all spectra.
///
/// Only the upper triangle is scored; the lower triangle mirrors it and the diagonal
/// is set to exactly 1.0, since accumulated rounding can leave self-scores at 0.999...
pub fn similarity_matrix(spectra: &[MsMsSpectrum], tolerance: f64) -> DMatrix<f64> {
    let n = spectra.len();

    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| symmetric_similarity(&spectra[i], &spectra[j], tolerance))
                .collect()
        })
        .collect();

    let mut matrix = DMatrix::<f64>::identity(n, n);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &similarity) in row.iter().enumerate() {
            let j = i + 1 + offset;
            matrix[(i, j)] = similarity;
            matrix[(j, i)] = similarity;
        }
    }
    matrix
}

/// Flatten `1 - similarity` into condensed form (row-major upper triangle, no diagonal).
pub fn condensed_distances(similarity: &DMatrix<f64>) -> Vec<f64> {
    let n = similarity.nrows();
    let mut condensed = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            condensed.push((1.0 - similarity[(i, j)]).max(0.0));
        }
    }
    condensed
}

#[inline]
fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + (j - i - 1)
}

/// One agglomeration step of a dendrogram.
///
/// Node ids follow the usual linkage convention: observations are `0..n`, the node
/// created by step `k` is `n + k`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dendrogram {
    pub n_observations: usize,
    pub merges: Vec<Merge>,
}

/// Average-linkage (UPGMA) agglomerative clustering of condensed distances.
///
/// The distance between two clusters is the mean of all pairwise distances between
/// their members. Ties are broken by the lowest pair of slot indices.
pub fn average_linkage(condensed: &[f64], n: usize) -> Dendrogram {
    let mut distances = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = condensed[condensed_index(n, i, j)];
            distances[(i, j)] = d;
            distances[(j, i)] = d;
        }
    }

    // slot -> (node id, size) while the slot is still active
    let mut active: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    for step in 0..n.saturating_sub(1) {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if active[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if active[j].is_none() {
                    continue;
                }
                let d = distances[(i, j)];
                if best.map_or(true, |(_, _, b)| d < b) {
                    best = Some((i, j, d));
                }
            }
        }

        let Some((a, b, height)) = best else { break };
        let (Some((id_a, size_a)), Some((id_b, size_b))) = (active[a], active[b]) else { break };
        let size = size_a + size_b;

        for k in 0..n {
            if k == a || k == b || active[k].is_none() {
                continue;
            }
            let merged = (size_a as f64 * distances[(a, k)] + size_b as f64 * distances[(b, k)]) / size as f64;
            distances[(a, k)] = merged;
            distances[(k, a)] = merged;
        }

        merges.push(Merge {
            left: id_a.min(id_b),
            right: id_a.max(id_b),
            height,
            size,
        });
        active[a] = Some((n + step, size));
        active[b] = None;
    }

    Dendrogram { n_observations: n, merges }
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

impl Dendrogram {
    /// Flat clusters from cutting the tree at `threshold` (distance criterion).
    ///
    /// Every merge at height `<= threshold` is applied. Labels are `0..k`, numbered
    /// by the first observation that belongs to each cluster.
    pub fn cut_at_distance(&self, threshold: f64) -> Vec<usize> {
        let n = self.n_observations;
        let mut parent: Vec<usize> = (0..n).collect();
        // any leaf below each node
        let mut representative: Vec<usize> = (0..n).collect();

        for merge in &self.merges {
            let left = representative[merge.left];
            let right = representative[merge.right];
            representative.push(left);
            if merge.height <= threshold {
                let (root_l, root_r) = (find_root(&mut parent, left), find_root(&mut parent, right));
                if root_l != root_r {
                    parent[root_r] = root_l;
                }
            }
        }

        let mut labels = vec![0; n];
        let mut root_labels: Vec<(usize, usize)> = Vec::new();
        for i in 0..n {
            let root = find_root(&mut parent, i);
            labels[i] = match root_labels.iter().find(|(r, _)| *r == root) {
                Some(&(_, label)) => label,
                None => {
                    let label = root_labels.len();
                    root_labels.push((root, label));
                    label
                }
            };
        }
        labels
    }
}

/// A flat cluster: indices into the bin's spectrum list.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub label: usize,
    pub members: Vec<usize>,
}

/// Flat clustering of one bin's spectra, clusters ranked by descending size.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterAssignment {
    pub labels: Vec<usize>,
    pub ranked: Vec<Cluster>,
}

impl ClusterAssignment {
    /// A single spectrum forms one cluster on its own.
    pub fn singleton() -> Self {
        ClusterAssignment {
            labels: vec![0],
            ranked: vec![Cluster { label: 0, members: vec![0] }],
        }
    }

    /// Rank flat labels by membership; equal sizes keep first-appearance order.
    pub fn from_labels(labels: Vec<usize>) -> Self {
        let ranked = labels
            .iter()
            .enumerate()
            .into_group_map_by(|&(_, label)| *label)
            .into_iter()
            .map(|(label, members)| Cluster {
                label,
                members: members.into_iter().map(|(i, _)| i).collect(),
            })
            .sorted_by_key(|c| c.members[0])
            .sorted_by(|a, b| b.members.len().cmp(&a.members.len()))
            .collect();

        ClusterAssignment { labels, ranked }
    }

    pub fn spectrum_count(&self) -> usize {
        self.labels.len()
    }

    pub fn largest(&self) -> Option<&Cluster> {
        self.ranked.first()
    }

    /// Share of the spectra that belong to the largest cluster.
    pub fn cohesion(&self) -> f64 {
        match self.largest() {
            Some(cluster) if !self.labels.is_empty() => cluster.members.len() as f64 / self.labels.len() as f64,
            _ => 0.0,
        }
    }
}

/// Cluster the cleaned spectra of one bin.
///
/// A single spectrum short-circuits to one cluster with cohesion 1.0 without
/// building a matrix or a dendrogram.
pub fn cluster_spectra(spectra: &[MsMsSpectrum], params: &ClusterParams) -> Result<ClusterAssignment, CurationError> {
    match spectra.len() {
        0 => Err(CurationError::EmptyInput),
        1 => Ok(ClusterAssignment::singleton()),
        n => {
            let similarity = similarity_matrix(spectra, params.ms2_tolerance);
            let condensed = condensed_distances(&similarity);
            let dendrogram = average_linkage(&condensed, n);
            let labels = dendrogram.cut_at_distance(params.mutual_distance);
            let assignment = ClusterAssignment::from_labels(labels);
            log::debug!(
                "clustered {} spectra into {} clusters, cohesion {:.3}",
                n,
                assignment.ranked.len(),
                assignment.cohesion()
            );
            Ok(assignment)
        }
    }
}
