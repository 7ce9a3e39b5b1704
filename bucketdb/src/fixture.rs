use rusqlite::{params, Connection};

use crate::store::BinStore;

pub const SCHEMA: &str = "
CREATE TABLE bins(
    bin_id INTEGER PRIMARY KEY,
    english_name TEXT,
    inchikey TEXT,
    adduct TEXT,
    group_id INTEGER,
    is_istd INTEGER,
    is_known INTEGER,
    comment TEXT,
    polarity TEXT,
    valid_for_autocuration INTEGER,
    consensus_rt REAL,
    consensus_mz REAL,
    consensus_spectrum TEXT,
    mzrt_only INTEGER
);
CREATE TABLE annotations(
    annotation_id INTEGER PRIMARY KEY,
    precursor_mz REAL,
    retention_time REAL,
    intensity_height REAL,
    spectrum TEXT,
    bin_id INTEGER,
    adduct TEXT,
    member_of_consensus INTEGER,
    run_id TEXT
);
CREATE TABLE runs(
    run_id TEXT PRIMARY KEY,
    method_id TEXT,
    sample_des_id TEXT,
    run_type TEXT
);
";

pub fn fixture_store() -> BinStore {
    let connection = Connection::open_in_memory().unwrap();
    connection.execute_batch(SCHEMA).unwrap();
    BinStore::from_connection(connection)
}

pub fn insert_run(store: &BinStore, run_id: &str, run_type: &str) {
    store
        .connection
        .execute("INSERT INTO runs (run_id, run_type) VALUES (?1, ?2)", params![run_id, run_type])
        .unwrap();
}

pub fn insert_bin(store: &BinStore, bin_id: i64, polarity: &str, flag: Option<i64>) {
    store
        .connection
        .execute(
            "INSERT INTO bins (bin_id, english_name, adduct, polarity, valid_for_autocuration) \
             VALUES (?1, ?2, '[M+H]+', ?3, ?4)",
            params![bin_id, format!("compound {bin_id}"), polarity, flag],
        )
        .unwrap();
}

/// Reference bin with a stored consensus, ready for matching.
pub fn insert_curated_bin(store: &BinStore, bin_id: i64, polarity: &str, flag: i64, mz: f64, rt: f64, spectrum: &str) {
    insert_bin(store, bin_id, polarity, Some(flag));
    store
        .connection
        .execute(
            "UPDATE bins SET consensus_mz = ?1, consensus_rt = ?2, consensus_spectrum = ?3 WHERE bin_id = ?4",
            params![mz, rt, spectrum, bin_id],
        )
        .unwrap();
}

pub fn insert_annotation(
    store: &BinStore,
    annotation_id: i64,
    bin_id: i64,
    run_id: &str,
    mz: f64,
    rt: f64,
    spectrum: Option<&str>,
) {
    store
        .connection
        .execute(
            "INSERT INTO annotations (annotation_id, precursor_mz, retention_time, spectrum, bin_id, adduct, run_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, '[M+H]+', ?6)",
            params![annotation_id, mz, rt, spectrum, bin_id, run_id],
        )
        .unwrap();
}
