//! Matching of a freshly curated bin against a reference library.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use log::{debug, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::algorithm::similarity::similarity_pair;
use crate::curation::params::MatchParams;
use crate::data::bin::{Bin, Polarity};

/// One scored reference bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub bin_id: i64,
    pub english_name: Option<String>,
    pub forward: f64,
    pub reverse: f64,
    pub weighted: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchOutcome {
    /// Candidates ranked by descending weighted similarity.
    Found(Vec<CandidateMatch>),
    NotFound,
    /// The query bin is not valid for auto-curation or carries no consensus.
    NotEligible,
}

impl MatchOutcome {
    pub fn top(&self) -> Option<&CandidateMatch> {
        self.candidates().first()
    }

    pub fn candidates(&self) -> &[CandidateMatch] {
        match self {
            MatchOutcome::Found(ranked) => ranked,
            _ => &[],
        }
    }
}

/// Precursor window a reference bin has to fall into.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateWindow {
    pub polarity: Polarity,
    pub adduct: Option<String>,
    pub mz: f64,
    pub rt: f64,
    pub mz_tolerance: f64,
    pub rt_tolerance: f64,
}

impl CandidateWindow {
    /// Window around a query bin, `None` if it has no consensus m/z or rt.
    pub fn around(query: &Bin, polarity: Polarity, params: &MatchParams) -> Option<Self> {
        Some(CandidateWindow {
            polarity,
            adduct: query.adduct.clone(),
            mz: query.consensus_mz?,
            rt: query.consensus_rt?,
            mz_tolerance: params.mz_tolerance,
            rt_tolerance: params.rt_tolerance,
        })
    }

    /// Equal polarity and adduct, flagged valid, strictly inside both tolerances.
    pub fn contains(&self, bin: &Bin) -> bool {
        let inside = |value: Option<f64>, center: f64, tolerance: f64| {
            value.map_or(false, |v| (v - center).abs() < tolerance)
        };

        bin.polarity == Some(self.polarity)
            && bin.adduct == self.adduct
            && bin.valid_for_autocuration.is_valid()
            && inside(bin.consensus_mz, self.mz, self.mz_tolerance)
            && inside(bin.consensus_rt, self.rt, self.rt_tolerance)
    }
}

/// Anything that can list reference bins inside a window.
pub trait CandidateSource {
    fn candidates(&self, window: &CandidateWindow) -> Vec<&Bin>;
}

/// Read-only snapshot of reference bins keyed by bin id.
#[derive(Clone, Debug, Default)]
pub struct ReferenceLibrary {
    bins: BTreeMap<i64, Bin>,
}

impl ReferenceLibrary {
    pub fn new(bins: impl IntoIterator<Item = Bin>) -> Self {
        ReferenceLibrary {
            bins: bins.into_iter().map(|b| (b.bin_id, b)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn get(&self, bin_id: i64) -> Option<&Bin> {
        self.bins.get(&bin_id)
    }
}

impl CandidateSource for ReferenceLibrary {
    fn candidates(&self, window: &CandidateWindow) -> Vec<&Bin> {
        self.bins.values().filter(|bin| window.contains(bin)).collect()
    }
}

/// Rank the reference bins near `query` by weighted forward/reverse similarity.
///
/// The majority consensus of the query is compared against the majority
/// consensus of every candidate. Ties keep the order of the candidate source.
pub fn match_bin<S: CandidateSource>(query: &Bin, polarity: Polarity, source: &S, params: &MatchParams) -> MatchOutcome {
    if !query.valid_for_autocuration.is_valid() {
        return MatchOutcome::NotEligible;
    }

    let spectrum = match query.majority_spectrum() {
        Ok(Some(spectrum)) if !spectrum.is_empty() => spectrum,
        Ok(_) => return MatchOutcome::NotEligible,
        Err(e) => {
            warn!("bin {}: unreadable consensus spectrum: {e}", query.bin_id);
            return MatchOutcome::NotEligible;
        }
    };

    let Some(window) = CandidateWindow::around(query, polarity, params) else {
        return MatchOutcome::NotEligible;
    };

    let mut ranked: Vec<CandidateMatch> = source
        .candidates(&window)
        .into_iter()
        .filter_map(|candidate| {
            let reference = match candidate.majority_spectrum() {
                Ok(Some(reference)) => reference,
                Ok(None) => return None,
                Err(e) => {
                    warn!("reference bin {} skipped: {e}", candidate.bin_id);
                    return None;
                }
            };
            let pair = similarity_pair(&spectrum, &reference, params.ms2_tolerance);
            Some(CandidateMatch {
                bin_id: candidate.bin_id,
                english_name: candidate.english_name.clone(),
                forward: pair.forward,
                reverse: pair.reverse,
                weighted: pair.weighted(params.weight_forward, params.weight_reverse),
            })
        })
        .collect();

    debug!("bin {}: {} candidates", query.bin_id, ranked.len());

    if ranked.is_empty() {
        return MatchOutcome::NotFound;
    }
    ranked.sort_by_key(|m| Reverse(OrderedFloat(m.weighted)));
    MatchOutcome::Found(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::bin::AutocurationFlag;

    fn bin(bin_id: i64, mz: f64, rt: f64, spectrum: &str) -> Bin {
        Bin {
            english_name: Some(format!("compound {bin_id}")),
            adduct: Some("[M+H]+".to_string()),
            polarity: Some(Polarity::Pos),
            valid_for_autocuration: AutocurationFlag::Valid,
            consensus_mz: Some(mz),
            consensus_rt: Some(rt),
            consensus_spectrum: Some(spectrum.to_string()),
            ..Bin::new(bin_id)
        }
    }

    const SPECTRUM: &str = "100.0:1.0 150.0:0.5";

    #[test]
    fn test_precursor_window() {
        let query = bin(0, 100.000, 5.0, SPECTRUM);
        let library = ReferenceLibrary::new(vec![
            bin(1, 100.005, 5.5, SPECTRUM),
            bin(2, 100.020, 5.2, SPECTRUM),
        ]);

        let outcome = match_bin(&query, Polarity::Pos, &library, &MatchParams::default());
        let ids: Vec<i64> = outcome.candidates().iter().map(|m| m.bin_id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(outcome.top().unwrap().weighted, 1.0);
    }

    #[test]
    fn test_window_bounds_are_strict() {
        let query = bin(0, 100.0, 5.0, SPECTRUM);
        let window = CandidateWindow::around(&query, Polarity::Pos, &MatchParams::default()).unwrap();
        assert!(!window.contains(&bin(1, 100.0, 6.0, SPECTRUM)));
        assert!(window.contains(&bin(2, 100.0, 5.9, SPECTRUM)));
    }

    #[test]
    fn test_filters_polarity_adduct_and_flag() {
        let query = bin(0, 100.0, 5.0, SPECTRUM);
        let mut negative = bin(1, 100.0, 5.0, SPECTRUM);
        negative.polarity = Some(Polarity::Neg);
        let mut sodium = bin(2, 100.0, 5.0, SPECTRUM);
        sodium.adduct = Some("[M+Na]+".to_string());
        let mut invalid = bin(3, 100.0, 5.0, SPECTRUM);
        invalid.valid_for_autocuration = AutocurationFlag::Invalid;

        let library = ReferenceLibrary::new(vec![negative, sodium, invalid]);
        let outcome = match_bin(&query, Polarity::Pos, &library, &MatchParams::default());
        assert_eq!(outcome, MatchOutcome::NotFound);
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let query = bin(0, 100.0, 5.0, SPECTRUM);
        let library = ReferenceLibrary::new(vec![
            bin(3, 100.0, 5.0, "100.0:1.0 300.0:1.0"),
            bin(1, 100.0, 5.0, SPECTRUM),
            bin(2, 100.0, 5.0, SPECTRUM),
        ]);

        let outcome = match_bin(&query, Polarity::Pos, &library, &MatchParams::default());
        let ids: Vec<i64> = outcome.candidates().iter().map(|m| m.bin_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(outcome.candidates()[2].weighted < 1.0);
    }

    #[test]
    fn test_unparseable_candidate_is_skipped() {
        let query = bin(0, 100.0, 5.0, SPECTRUM);
        let library = ReferenceLibrary::new(vec![bin(1, 100.0, 5.0, "garbage"), bin(2, 100.0, 5.0, SPECTRUM)]);
        let outcome = match_bin(&query, Polarity::Pos, &library, &MatchParams::default());
        assert_eq!(outcome.candidates().len(), 1);
        assert_eq!(outcome.top().unwrap().bin_id, 2);
    }

    #[test]
    fn test_not_eligible() {
        let library = ReferenceLibrary::new(vec![bin(1, 100.0, 5.0, SPECTRUM)]);
        let params = MatchParams::default();

        let mut invalid = bin(0, 100.0, 5.0, SPECTRUM);
        invalid.valid_for_autocuration = AutocurationFlag::Invalid;
        assert_eq!(match_bin(&invalid, Polarity::Pos, &library, &params), MatchOutcome::NotEligible);

        let mut unknown = bin(0, 100.0, 5.0, SPECTRUM);
        unknown.valid_for_autocuration = AutocurationFlag::Unknown;
        assert_eq!(match_bin(&unknown, Polarity::Pos, &library, &params), MatchOutcome::NotEligible);

        let mut blank = bin(0, 100.0, 5.0, SPECTRUM);
        blank.consensus_spectrum = None;
        assert_eq!(match_bin(&blank, Polarity::Pos, &library, &params), MatchOutcome::NotEligible);
        assert!(MatchOutcome::NotEligible.top().is_none());
    }

    #[test]
    fn test_query_uses_majority_sub_spectrum() {
        let query = bin(0, 100.0, 5.0, "100.0:1.0 150.0:0.5@400.0:1.0");
        let library = ReferenceLibrary::new(vec![bin(1, 100.0, 5.0, SPECTRUM)]);
        let outcome = match_bin(&query, Polarity::Pos, &library, &MatchParams::default());
        let top = outcome.top().unwrap();
        assert_eq!(top.forward, 1.0);
        assert_eq!(top.reverse, 1.0);
    }
}
