pub mod error;

// data module
pub mod data {
    pub mod spectrum;
    pub mod bin;
}

// algorithm module
pub mod algorithm {
    pub mod similarity;
    pub mod cleaning;
    pub mod clustering;
    pub mod consensus;
}

// curation module
pub mod curation {
    pub mod params;
    pub mod validity;
    pub mod matching;
    pub mod mzrt;
}
