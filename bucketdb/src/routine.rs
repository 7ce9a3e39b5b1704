//! The consensus routine: curate every pending bin of a database and write the results back.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use bucketcore::curation::mzrt::MzRtConsensus;
use bucketcore::curation::params::CurationParams;
use bucketcore::curation::validity::{curate_spectra, CurationStage};
use bucketcore::data::bin::AutocurationFlag;
use bucketcore::data::spectrum::{ConsensusSpectrum, MsMsSpectrum};
use bucketcore::error::CurationError;

use crate::error::Result;
use crate::store::{BinSnapshot, BinStore};

#[derive(Clone, Debug, PartialEq)]
pub enum CurationOutcome {
    Curated {
        flag: AutocurationFlag,
        stage: CurationStage,
        consensus: ConsensusSpectrum,
        /// Annotation ids of the spectra in the majority cluster.
        members: Vec<i64>,
    },
    /// No usable spectrum; the bin keeps only its m/z and rt.
    NotCurated,
}

/// Result of curating one bin.
#[derive(Clone, Debug, PartialEq)]
pub struct BinCuration {
    pub bin_id: i64,
    pub outcome: CurationOutcome,
    pub mzrt: MzRtConsensus,
}

impl BinCuration {
    pub fn flag(&self) -> AutocurationFlag {
        match &self.outcome {
            CurationOutcome::Curated { flag, .. } => *flag,
            CurationOutcome::NotCurated => AutocurationFlag::Invalid,
        }
    }
}

/// Collects per-bin results of a pass.
#[derive(Debug, Default)]
pub struct CurationBatchBuilder {
    curations: BTreeMap<i64, BinCuration>,
    failures: Vec<(i64, CurationError)>,
}

impl CurationBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, curation: BinCuration) -> &mut Self {
        self.curations.insert(curation.bin_id, curation);
        self
    }

    pub fn record_failure(&mut self, bin_id: i64, error: CurationError) -> &mut Self {
        warn!("bin {bin_id} not curated: {error}");
        self.failures.push((bin_id, error));
        self
    }

    pub fn build(self) -> CurationBatch {
        CurationBatch {
            curations: self.curations,
            failures: self.failures,
        }
    }
}

/// Finished, immutable results of a pass keyed by bin id.
#[derive(Debug, Default)]
pub struct CurationBatch {
    curations: BTreeMap<i64, BinCuration>,
    failures: Vec<(i64, CurationError)>,
}

impl CurationBatch {
    pub fn len(&self) -> usize {
        self.curations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curations.is_empty()
    }

    pub fn get(&self, bin_id: i64) -> Option<&BinCuration> {
        self.curations.get(&bin_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BinCuration> {
        self.curations.values()
    }

    pub fn failures(&self) -> &[(i64, CurationError)] {
        &self.failures
    }

    pub fn count_flag(&self, flag: AutocurationFlag) -> usize {
        self.iter().filter(|c| c.flag() == flag).count()
    }

    pub fn count_not_curated(&self) -> usize {
        self.iter()
            .filter(|c| c.outcome == CurationOutcome::NotCurated)
            .count()
    }
}

/// Curate one bin from its snapshot.
///
/// Annotations without a spectrum or with a malformed one are left out. When no
/// spectrum remains the bin is `NotCurated`; its m/z and rt are computed regardless.
pub fn curate_snapshot(snapshot: &BinSnapshot, params: &CurationParams) -> std::result::Result<BinCuration, CurationError> {
    let mzrt = MzRtConsensus::from_annotations(&snapshot.annotations);

    let mut spectra: Vec<MsMsSpectrum> = Vec::new();
    let mut annotation_ids: Vec<i64> = Vec::new();
    for annotation in &snapshot.annotations {
        let Some(text) = annotation.spectrum.as_deref() else {
            continue;
        };
        match text.parse::<MsMsSpectrum>() {
            Ok(spectrum) => {
                spectra.push(spectrum);
                annotation_ids.push(annotation.annotation_id);
            }
            Err(e) => warn!(
                "bin {}: dropping annotation {}: {e}",
                snapshot.bin_id, annotation.annotation_id
            ),
        }
    }

    let not_curated = BinCuration {
        bin_id: snapshot.bin_id,
        outcome: CurationOutcome::NotCurated,
        mzrt,
    };

    if spectra.is_empty() {
        debug!("bin {}: no spectra, m/z and rt only", snapshot.bin_id);
        return Ok(not_curated);
    }

    let decision = match curate_spectra(&spectra, params) {
        Ok(decision) => decision,
        Err(CurationError::EmptyInput) => {
            debug!("bin {}: no peaks left after cleaning", snapshot.bin_id);
            return Ok(not_curated);
        }
        Err(e) => return Err(e),
    };

    let members = decision
        .majority_members()
        .into_iter()
        .map(|i| annotation_ids[i])
        .collect();

    Ok(BinCuration {
        bin_id: snapshot.bin_id,
        outcome: CurationOutcome::Curated {
            flag: decision.flag,
            stage: decision.stage,
            consensus: decision.consensus,
            members,
        },
        mzrt,
    })
}

/// Curate snapshots in parallel on the current rayon pool.
pub fn curate_snapshots(snapshots: &[BinSnapshot], params: &CurationParams) -> CurationBatch {
    let results: Vec<(i64, std::result::Result<BinCuration, CurationError>)> = snapshots
        .par_iter()
        .map(|snapshot| (snapshot.bin_id, curate_snapshot(snapshot, params)))
        .collect();

    let mut builder = CurationBatchBuilder::new();
    for (bin_id, result) in results {
        match result {
            Ok(curation) => builder.push(curation),
            Err(e) => builder.record_failure(bin_id, e),
        };
    }
    builder.build()
}

/// Run a full consensus pass over `store` and persist every result.
///
/// Without `update` only bins that were never curated are visited.
pub fn run_consensus(store: &mut BinStore, params: &CurationParams, update: bool, num_threads: usize) -> Result<CurationBatch> {
    params.validate()?;

    let snapshots = store.snapshot(update)?;
    info!("curating {} bins on {num_threads} threads", snapshots.len());

    let thread_pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
    let batch = thread_pool.install(|| curate_snapshots(&snapshots, params));

    let report = store.write_batch(&batch);
    info!(
        "wrote {} bins: {} valid, {} invalid, {} m/z-rt only, {} failed, {} not written",
        report.written,
        batch.count_flag(AutocurationFlag::Valid),
        batch.count_flag(AutocurationFlag::Invalid) - batch.count_not_curated(),
        batch.count_not_curated(),
        batch.failures().len(),
        report.failed.len()
    );
    Ok(batch)
}
