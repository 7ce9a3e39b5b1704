//! Tab separated export of auto-curation results for spreadsheet review.

use std::fs::File;
use std::io;
use std::path::Path;

use log::info;
use serde::Serialize;

use bucketcore::curation::matching::MatchOutcome;

use crate::autocurate::AutocurationRow;
use crate::error::Result;

/// Spreadsheet cells hold at most 32,767 characters.
pub const CURATION_TEXT_LIMIT: usize = 32_000;

pub const NOT_VALID: &str = "not valid for autocuration";
pub const NO_MATCH: &str = "no match found";

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    bin_id: i64,
    english_name: Option<&'a str>,
    adduct: Option<&'a str>,
    consensus_mz: Option<f64>,
    consensus_rt: Option<f64>,
    top_match_bin_id: String,
    top_match_english_name: String,
    curation_text: String,
}

/// The first `limit` characters of `text`.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Ranked candidates as JSON, cut to [`CURATION_TEXT_LIMIT`] characters.
pub fn curation_text(outcome: &MatchOutcome) -> Result<String> {
    let text = match outcome {
        MatchOutcome::Found(ranked) => serde_json::to_string(ranked)?,
        MatchOutcome::NotFound => NO_MATCH.to_string(),
        MatchOutcome::NotEligible => NOT_VALID.to_string(),
    };
    Ok(truncate_chars(&text, CURATION_TEXT_LIMIT).to_string())
}

fn record(row: &AutocurationRow) -> Result<ExportRecord<'_>> {
    let (top_id, top_name) = match &row.outcome {
        MatchOutcome::Found(_) => {
            let top = row.outcome.top();
            (
                top.map(|m| m.bin_id.to_string()).unwrap_or_default(),
                top.and_then(|m| m.english_name.clone()).unwrap_or_default(),
            )
        }
        MatchOutcome::NotFound => (NO_MATCH.to_string(), NO_MATCH.to_string()),
        MatchOutcome::NotEligible => (NOT_VALID.to_string(), NOT_VALID.to_string()),
    };

    Ok(ExportRecord {
        bin_id: row.bin.bin_id,
        english_name: row.bin.english_name.as_deref(),
        adduct: row.bin.adduct.as_deref(),
        consensus_mz: row.bin.consensus_mz,
        consensus_rt: row.bin.consensus_rt,
        top_match_bin_id: top_id,
        top_match_english_name: top_name,
        curation_text: curation_text(&row.outcome)?,
    })
}

pub fn write_export<W: io::Write>(writer: W, rows: &[AutocurationRow]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    for row in rows {
        wtr.serialize(record(row)?)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_to_path(path: &Path, rows: &[AutocurationRow]) -> Result<()> {
    let file = File::create(path)?;
    write_export(file, rows)?;
    info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketcore::curation::matching::CandidateMatch;
    use bucketcore::data::bin::Bin;

    fn candidate(bin_id: i64, name: &str) -> CandidateMatch {
        CandidateMatch {
            bin_id,
            english_name: Some(name.to_string()),
            forward: 1.0,
            reverse: 0.5,
            weighted: 0.75,
        }
    }

    fn row(bin_id: i64, outcome: MatchOutcome) -> AutocurationRow {
        AutocurationRow {
            bin: Bin {
                english_name: Some("glucose".to_string()),
                adduct: Some("[M+H]+".to_string()),
                consensus_mz: Some(181.07),
                ..Bin::new(bin_id)
            },
            outcome,
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("äöüß", 2), "äö");
    }

    #[test]
    fn test_curation_text_is_bounded() {
        let ranked: Vec<CandidateMatch> = (0..2000).map(|i| candidate(i, "a rather long compound name")).collect();
        let text = curation_text(&MatchOutcome::Found(ranked)).unwrap();
        assert_eq!(text.chars().count(), CURATION_TEXT_LIMIT);
        assert!(text.starts_with("[{\"bin_id\":0,"));
    }

    #[test]
    fn test_export_rows() {
        let rows = vec![
            row(1, MatchOutcome::Found(vec![candidate(42, "glucose"), candidate(43, "fructose")])),
            row(2, MatchOutcome::NotFound),
            row(3, MatchOutcome::NotEligible),
        ];
        let mut buffer = Vec::new();
        write_export(&mut buffer, &rows).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "bin_id\tenglish_name\tadduct\tconsensus_mz\tconsensus_rt\ttop_match_bin_id\ttop_match_english_name\tcuration_text"
        );
        assert!(lines[1].starts_with("1\tglucose\t[M+H]+\t181.07\t\t42\tglucose\t"));
        assert_eq!(lines[2], "2\tglucose\t[M+H]+\t181.07\t\tno match found\tno match found\tno match found");
        assert!(lines[3].ends_with("not valid for autocuration\tnot valid for autocuration\tnot valid for autocuration"));
    }
}
