use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;

use crate::error::CurationError;

/// Separator between the per-cluster sub-spectra of a stored consensus field.
pub const CONSENSUS_SEPARATOR: char = '@';

/// Separator between m/z and intensity inside one peak token.
pub const PEAK_SEPARATOR: char = ':';

/// An MS2 fragment spectrum with m/z values in ascending order.
///
/// Uses Arc<Vec<f64>> for efficient cloning - clone is O(1) instead of O(n).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct MsMsSpectrum {
    pub mz: Arc<Vec<f64>>,
    pub intensity: Arc<Vec<f64>>,
}

impl MsMsSpectrum {
    /// Constructs a new `MsMsSpectrum`, ordering the peaks by ascending m/z.
    ///
    /// # Arguments
    ///
    /// * `mz` - A vector of m/z values.
    /// * `intensity` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use bucketcore::data::spectrum::MsMsSpectrum;
    /// let spectrum = MsMsSpectrum::new(vec![200.0, 100.0], vec![20.0, 10.0]);
    /// assert_eq!(*spectrum.mz, vec![100.0, 200.0]);
    /// assert_eq!(*spectrum.intensity, vec![10.0, 20.0]);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `mz` and `intensity` differ in length.
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        assert_eq!(mz.len(), intensity.len(), "m/z and intensity must have the same length");

        if mz.windows(2).all(|w| w[0] <= w[1]) {
            return MsMsSpectrum {
                mz: Arc::new(mz),
                intensity: Arc::new(intensity),
            };
        }

        let (mz, intensity): (Vec<f64>, Vec<f64>) = mz
            .into_iter()
            .zip(intensity)
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .unzip();

        MsMsSpectrum {
            mz: Arc::new(mz),
            intensity: Arc::new(intensity),
        }
    }

    pub fn from_peaks(peaks: Vec<(f64, f64)>) -> Self {
        let (mz, intensity) = peaks.into_iter().unzip();
        MsMsSpectrum::new(mz, intensity)
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    pub fn peaks(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.mz.iter().copied().zip(self.intensity.iter().copied())
    }

    pub fn max_intensity(&self) -> Option<f64> {
        self.intensity.iter().copied().reduce(f64::max)
    }

    /// Lowest and highest m/z, `None` for an empty spectrum.
    pub fn mz_bounds(&self) -> Option<(f64, f64)> {
        Some((*self.mz.first()?, *self.mz.last()?))
    }

    pub fn mz_range(&self) -> Option<f64> {
        self.mz_bounds().map(|(lo, hi)| hi - lo)
    }

    /// Returns a copy with intensities scaled so the largest equals exactly 1.0.
    ///
    /// Empty spectra and spectra without a positive maximum are returned unchanged.
    pub fn normalized_to_max(&self) -> MsMsSpectrum {
        match self.max_intensity() {
            Some(max) if max > 0.0 && max.is_finite() => {
                // dividing the maximum by itself is exact, so the base peak ends up at 1.0
                let intensity = self.intensity.iter().map(|&i| i / max).collect();
                MsMsSpectrum {
                    mz: self.mz.clone(),
                    intensity: Arc::new(intensity),
                }
            }
            _ => self.clone(),
        }
    }

    /// Decodes only the first (majority cluster) segment of a composite consensus field.
    ///
    /// ```rust
    /// # use bucketcore::data::spectrum::MsMsSpectrum;
    /// let majority = MsMsSpectrum::decode_majority("100.0:1.0@200.0:1.0").unwrap();
    /// assert_eq!(*majority.mz, vec![100.0]);
    /// ```
    pub fn decode_majority(text: &str) -> Result<MsMsSpectrum, CurationError> {
        let first = text.split(CONSENSUS_SEPARATOR).next().unwrap_or_default();
        first.parse()
    }
}

fn parse_value(token: &str, value: &str, what: &str) -> Result<f64, CurationError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|e| CurationError::parse(token, format!("{what} is not a number ({e})")))?;
    if !parsed.is_finite() {
        return Err(CurationError::parse(token, format!("{what} is not finite")));
    }
    Ok(parsed)
}

impl FromStr for MsMsSpectrum {
    type Err = CurationError;

    /// Parses `"mz1:intensity1 mz2:intensity2 ..."`; blank text is an empty spectrum.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut mz = Vec::new();
        let mut intensity = Vec::new();

        for token in text.split_whitespace() {
            let (mz_text, intensity_text) = token
                .split_once(PEAK_SEPARATOR)
                .ok_or_else(|| CurationError::parse(token, "missing ':' between m/z and intensity"))?;
            mz.push(parse_value(token, mz_text, "m/z")?);
            intensity.push(parse_value(token, intensity_text, "intensity")?);
        }

        Ok(MsMsSpectrum::new(mz, intensity))
    }
}

/// Encodes the spectrum back into its `mz:intensity` text form.
impl Display for MsMsSpectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = self
            .peaks()
            .map(|(mz, intensity)| format!("{mz:?}{PEAK_SEPARATOR}{intensity:?}"))
            .join(" ");
        write!(f, "{text}")
    }
}

/// One consensus spectrum per similarity cluster, majority cluster first.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ConsensusSpectrum {
    spectra: Vec<MsMsSpectrum>,
}

impl ConsensusSpectrum {
    /// `spectra` must already be ordered by descending source-cluster membership.
    pub fn new(spectra: Vec<MsMsSpectrum>) -> Self {
        ConsensusSpectrum { spectra }
    }

    /// The consensus of the largest cluster.
    pub fn majority(&self) -> Option<&MsMsSpectrum> {
        self.spectra.first()
    }

    pub fn sub_spectra(&self) -> &[MsMsSpectrum] {
        &self.spectra
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

impl FromStr for ConsensusSpectrum {
    type Err = CurationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.trim().is_empty() {
            return Ok(ConsensusSpectrum::default());
        }
        let spectra = text
            .split(CONSENSUS_SEPARATOR)
            .map(str::parse)
            .collect::<Result<Vec<MsMsSpectrum>, _>>()?;
        Ok(ConsensusSpectrum { spectra })
    }
}

impl Display for ConsensusSpectrum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spectra.iter().join(&CONSENSUS_SEPARATOR.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sorts_peaks() {
        let spectrum: MsMsSpectrum = "150.5:20 100.25:10".parse().unwrap();
        assert_eq!(*spectrum.mz, vec![100.25, 150.5]);
        assert_eq!(*spectrum.intensity, vec![10.0, 20.0]);
        assert_eq!(spectrum.mz_range(), Some(50.25));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn test_new_rejects_unpaired_peaks() {
        MsMsSpectrum::new(vec![100.0, 200.0], vec![1.0]);
    }

    #[test]
    fn test_empty_text_is_empty_spectrum() {
        let spectrum: MsMsSpectrum = "".parse().unwrap();
        assert!(spectrum.is_empty());
        let spectrum: MsMsSpectrum = "   ".parse().unwrap();
        assert!(spectrum.is_empty());
    }

    #[test]
    fn test_missing_colon_is_parse_error() {
        let err = "100.0:1.0 150.0".parse::<MsMsSpectrum>().unwrap_err();
        match err {
            CurationError::Parse { token, .. } => assert_eq!(token, "150.0"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_is_parse_error() {
        assert!("100.0:abc".parse::<MsMsSpectrum>().is_err());
        assert!("x:1.0".parse::<MsMsSpectrum>().is_err());
        assert!("100.0:nan".parse::<MsMsSpectrum>().is_err());
    }

    #[test]
    fn test_round_trip_canonical_text() {
        let text = "100.0:1.0 150.25:0.5 210.125:0.03125";
        let spectrum: MsMsSpectrum = text.parse().unwrap();
        assert_eq!(spectrum.to_string(), text);
    }

    #[test]
    fn test_normalized_to_max() {
        let spectrum = MsMsSpectrum::new(vec![100.0, 200.0, 300.0], vec![3.0, 7.0, 1.0]);
        let normalized = spectrum.normalized_to_max();
        assert_eq!(normalized.max_intensity(), Some(1.0));
        assert!(normalized.intensity.iter().all(|&i| i <= 1.0));
    }

    #[test]
    fn test_composite_majority_is_first_segment() {
        let text = "100.0:1.0 120.0:0.5@300.0:1.0";
        let consensus: ConsensusSpectrum = text.parse().unwrap();
        assert_eq!(consensus.len(), 2);
        assert_eq!(*consensus.majority().unwrap().mz, vec![100.0, 120.0]);
        assert_eq!(*consensus.sub_spectra()[1].mz, vec![300.0]);
        assert_eq!(consensus.to_string(), text);

        let majority = MsMsSpectrum::decode_majority(text).unwrap();
        assert_eq!(&majority, consensus.majority().unwrap());
    }
}
