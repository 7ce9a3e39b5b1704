//! SQLite access to the `bins`, `annotations` and `runs` tables.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, warn};
use rusqlite::{params, Connection, Params, Row};

use bucketcore::curation::matching::ReferenceLibrary;
use bucketcore::data::bin::{Annotation, AutocurationFlag, Bin, Polarity};

use crate::error::Result;
use crate::routine::{BinCuration, CurationBatch, CurationOutcome};

const BIN_COLUMNS: &str = "bin_id, english_name, inchikey, adduct, group_id, is_istd, is_known, \
     polarity, valid_for_autocuration, mzrt_only, consensus_mz, consensus_rt, consensus_spectrum";

const SAMPLE_ANNOTATIONS: &str = "SELECT a.annotation_id, a.bin_id, a.run_id, a.precursor_mz, \
     a.retention_time, a.intensity_height, a.adduct, a.spectrum, a.member_of_consensus \
     FROM annotations a JOIN runs r ON a.run_id = r.run_id \
     WHERE r.run_type = 'Sample' \
     ORDER BY a.bin_id, a.annotation_id";

/// Everything the curation of one bin needs, read up front.
#[derive(Clone, Debug, PartialEq)]
pub struct BinSnapshot {
    pub bin_id: i64,
    /// Annotations from sample runs only.
    pub annotations: Vec<Annotation>,
}

fn bin_from_row(row: &Row) -> rusqlite::Result<Bin> {
    let bin_id: i64 = row.get(0)?;
    let polarity: Option<String> = row.get(7)?;
    let polarity = match polarity.as_deref().map(str::parse::<Polarity>) {
        Some(Ok(p)) => Some(p),
        Some(Err(e)) => {
            warn!("bin {bin_id}: {e}");
            None
        }
        None => None,
    };

    Ok(Bin {
        bin_id,
        english_name: row.get(1)?,
        inchikey: row.get(2)?,
        adduct: row.get(3)?,
        group_id: row.get(4)?,
        is_istd: row.get(5)?,
        is_known: row.get(6)?,
        polarity,
        valid_for_autocuration: AutocurationFlag::from_column(row.get(8)?),
        mzrt_only: row.get(9)?,
        consensus_mz: row.get(10)?,
        consensus_rt: row.get(11)?,
        consensus_spectrum: row.get(12)?,
    })
}

fn annotation_from_row(row: &Row) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        annotation_id: row.get(0)?,
        bin_id: row.get(1)?,
        run_id: row.get(2)?,
        precursor_mz: row.get(3)?,
        retention_time: row.get(4)?,
        intensity: row.get(5)?,
        adduct: row.get(6)?,
        spectrum: row.get(7)?,
        member_of_consensus: row.get(8)?,
    })
}

fn select_bins<P: Params>(connection: &Connection, filter: &str, params: P) -> rusqlite::Result<BTreeMap<i64, Bin>> {
    let sql = format!("SELECT {BIN_COLUMNS} FROM bins {filter} ORDER BY bin_id");
    let mut stmt = connection.prepare(&sql)?;
    let bins_iter = stmt.query_map(params, bin_from_row)?;
    let mut bins = BTreeMap::new();
    for bin in bins_iter {
        let bin = bin?;
        bins.insert(bin.bin_id, bin);
    }
    Ok(bins)
}

fn select_sample_annotations(connection: &Connection) -> rusqlite::Result<BTreeMap<i64, Vec<Annotation>>> {
    let mut stmt = connection.prepare(SAMPLE_ANNOTATIONS)?;
    let annotations_iter = stmt.query_map([], annotation_from_row)?;
    let mut annotations: BTreeMap<i64, Vec<Annotation>> = BTreeMap::new();
    for annotation in annotations_iter {
        let annotation = annotation?;
        annotations.entry(annotation.bin_id).or_default().push(annotation);
    }
    Ok(annotations)
}

fn select_ids_to_curate(connection: &Connection, update: bool) -> rusqlite::Result<Vec<i64>> {
    let filter = if update { "" } else { "WHERE valid_for_autocuration IS NULL" };
    let sql = format!("SELECT bin_id FROM bins {filter} ORDER BY bin_id");
    let mut stmt = connection.prepare(&sql)?;
    let ids = stmt.query_map([], |row| row.get(0))?;
    ids.collect()
}

/// Handle owning the connection to one bin database.
#[derive(Debug)]
pub struct BinStore {
    pub connection: Connection,
}

impl BinStore {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)?;
        Ok(Self { connection })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn read_bins(&self) -> Result<BTreeMap<i64, Bin>> {
        Ok(select_bins(&self.connection, "", [])?)
    }

    /// Bins of one ionization mode, keyed by bin id.
    pub fn read_bins_with_polarity(&self, polarity: Polarity) -> Result<BTreeMap<i64, Bin>> {
        let mut bins = self.read_bins()?;
        bins.retain(|_, bin| bin.polarity == Some(polarity));
        Ok(bins)
    }

    pub fn read_bin(&self, bin_id: i64) -> Result<Option<Bin>> {
        let mut bins = select_bins(&self.connection, "WHERE bin_id = ?1", [bin_id])?;
        Ok(bins.remove(&bin_id))
    }

    /// Sample-run annotations of every bin.
    pub fn read_sample_annotations(&self) -> Result<BTreeMap<i64, Vec<Annotation>>> {
        Ok(select_sample_annotations(&self.connection)?)
    }

    /// Reads the per-bin inputs of a consensus pass inside one read transaction.
    ///
    /// In update mode every bin is visited, otherwise only those never curated.
    pub fn snapshot(&mut self, update: bool) -> Result<Vec<BinSnapshot>> {
        let tx = self.connection.transaction()?;
        let bin_ids = select_ids_to_curate(&tx, update)?;
        let mut annotations = select_sample_annotations(&tx)?;
        tx.commit()?;

        let snapshots: Vec<BinSnapshot> = bin_ids
            .into_iter()
            .map(|bin_id| BinSnapshot {
                bin_id,
                annotations: annotations.remove(&bin_id).unwrap_or_default(),
            })
            .collect();
        debug!("snapshot of {} bins", snapshots.len());
        Ok(snapshots)
    }

    /// Every bin flagged valid for auto-curation, read in one transaction.
    pub fn reference_library(&mut self) -> Result<ReferenceLibrary> {
        let tx = self.connection.transaction()?;
        let bins = select_bins(&tx, "WHERE valid_for_autocuration = 1", [])?;
        tx.commit()?;
        Ok(ReferenceLibrary::new(bins.into_values()))
    }

    /// Persists the derived fields of one bin and its annotation membership atomically.
    pub fn write_curation(&mut self, curation: &BinCuration) -> Result<()> {
        let tx = self.connection.transaction()?;

        match &curation.outcome {
            CurationOutcome::Curated { flag, consensus, members, .. } => {
                tx.execute(
                    "UPDATE bins SET consensus_spectrum = ?1, valid_for_autocuration = ?2, mzrt_only = 0, \
                     consensus_mz = ?3, consensus_rt = ?4 WHERE bin_id = ?5",
                    params![consensus.to_string(), flag.to_column(), curation.mzrt.mz, curation.mzrt.rt, curation.bin_id],
                )?;
                tx.execute(
                    "UPDATE annotations SET member_of_consensus = 0 WHERE bin_id = ?1",
                    [curation.bin_id],
                )?;
                let mut stmt = tx.prepare("UPDATE annotations SET member_of_consensus = 1 WHERE annotation_id = ?1")?;
                for annotation_id in members {
                    stmt.execute([annotation_id])?;
                }
            }
            CurationOutcome::NotCurated => {
                tx.execute(
                    "UPDATE bins SET consensus_spectrum = NULL, valid_for_autocuration = 0, mzrt_only = 1, \
                     consensus_mz = ?1, consensus_rt = ?2 WHERE bin_id = ?3",
                    params![curation.mzrt.mz, curation.mzrt.rt, curation.bin_id],
                )?;
                tx.execute(
                    "UPDATE annotations SET member_of_consensus = 0 WHERE bin_id = ?1",
                    [curation.bin_id],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Writes every bin of a batch in its own transaction. A bin whose write fails
    /// is rolled back and reported; the remaining bins are still written.
    pub fn write_batch(&mut self, batch: &CurationBatch) -> WriteReport {
        let mut report = WriteReport::default();
        for curation in batch.iter() {
            match self.write_curation(curation) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!("bin {}: write failed: {e}", curation.bin_id);
                    report.failed.push(curation.bin_id);
                }
            }
        }
        report
    }
}

/// Outcome of writing a batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteReport {
    pub written: usize,
    /// Bins whose transaction was rolled back.
    pub failed: Vec<i64>,
}
