use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::bin::Annotation;

/// Mean precursor m/z and retention time of a bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MzRtConsensus {
    pub mz: Option<f64>,
    pub rt: Option<f64>,
}

fn mean_of(values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

impl MzRtConsensus {
    /// Averages over the annotations given; run filtering is up to the caller.
    /// Missing values are skipped per quantity.
    pub fn from_annotations<'a>(annotations: impl IntoIterator<Item = &'a Annotation>) -> Self {
        let (mz, rt): (Vec<Option<f64>>, Vec<Option<f64>>) = annotations
            .into_iter()
            .map(|a| (a.precursor_mz, a.retention_time))
            .unzip();

        MzRtConsensus {
            mz: mean_of(mz.into_iter().flatten().filter(|v| v.is_finite()).collect()),
            rt: mean_of(rt.into_iter().flatten().filter(|v| v.is_finite()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(id: i64, mz: Option<f64>, rt: Option<f64>) -> Annotation {
        Annotation {
            annotation_id: id,
            bin_id: 1,
            run_id: Some("run".to_string()),
            precursor_mz: mz,
            retention_time: rt,
            intensity: None,
            adduct: None,
            spectrum: None,
            member_of_consensus: None,
        }
    }

    #[test]
    fn test_means() {
        let annotations = vec![
            annotation(1, Some(100.0), Some(5.0)),
            annotation(2, Some(100.2), Some(5.4)),
            annotation(3, None, Some(5.2)),
        ];
        let consensus = MzRtConsensus::from_annotations(&annotations);
        assert!((consensus.mz.unwrap() - 100.1).abs() < 1e-9);
        assert!((consensus.rt.unwrap() - 5.2).abs() < 1e-9);
    }

    #[test]
    fn test_no_values() {
        assert_eq!(MzRtConsensus::from_annotations(&Vec::<Annotation>::new()), MzRtConsensus { mz: None, rt: None });
        let only_rt = vec![annotation(1, None, Some(3.0))];
        assert_eq!(MzRtConsensus::from_annotations(&only_rt).mz, None);
    }
}
