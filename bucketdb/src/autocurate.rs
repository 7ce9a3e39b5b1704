//! Matching of transient bins against a reference database.

use log::info;
use rayon::prelude::*;

use bucketcore::curation::matching::{match_bin, MatchOutcome, ReferenceLibrary};
use bucketcore::curation::params::MatchParams;
use bucketcore::data::bin::{Bin, Polarity};

use crate::error::Result;
use crate::store::BinStore;

/// A transient bin together with its match result.
#[derive(Clone, Debug, PartialEq)]
pub struct AutocurationRow {
    pub bin: Bin,
    pub outcome: MatchOutcome,
}

/// Match every bin of `transients` against an already loaded library.
pub fn match_transients(transients: Vec<Bin>, polarity: Polarity, library: &ReferenceLibrary, params: &MatchParams) -> Vec<AutocurationRow> {
    transients
        .into_par_iter()
        .map(|bin| {
            let outcome = match_bin(&bin, polarity, library, params);
            AutocurationRow { bin, outcome }
        })
        .collect()
}

/// Match the transient bins of one polarity against the valid bins of `reference`.
pub fn autocurate(reference: &mut BinStore, transient: &BinStore, polarity: Polarity, params: &MatchParams) -> Result<Vec<AutocurationRow>> {
    params.validate()?;

    let library = reference.reference_library()?;
    let transients: Vec<Bin> = transient.read_bins_with_polarity(polarity)?.into_values().collect();
    info!(
        "matching {} {polarity} transient bins against {} reference bins",
        transients.len(),
        library.len()
    );

    let rows = match_transients(transients, polarity, &library, params);

    let found = rows.iter().filter(|r| matches!(r.outcome, MatchOutcome::Found(_))).count();
    let not_eligible = rows.iter().filter(|r| r.outcome == MatchOutcome::NotEligible).count();
    info!(
        "{found} matched, {} without match, {not_eligible} not eligible",
        rows.len() - found - not_eligible
    );
    Ok(rows)
}
