use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;

use bucketcore::curation::params::{CurationParams, MatchParams};
use bucketcore::data::bin::Polarity;
use bucketdb::autocurate::autocurate;
use bucketdb::export::export_to_path;
use bucketdb::routine::run_consensus;
use bucketdb::store::BinStore;

/// Consensus spectra and auto-curation for bin databases
#[derive(Parser)]
#[command(name = "bucketdb", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build consensus spectra and validity flags for the bins of a database
    Consensus(ConsensusArgs),
    /// Match the bins of a transient database against a reference database
    Autocurate(AutocurateArgs),
}

#[derive(Args, Debug)]
struct ConsensusArgs {
    /// SQLite bin database
    #[arg(long)]
    db: PathBuf,

    /// Recompute every bin, not only those never curated
    #[arg(long)]
    update: bool,

    /// JSON file with curation parameters; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of worker threads
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

#[derive(Args, Debug)]
struct AutocurateArgs {
    /// Reference bin database
    #[arg(long)]
    db: PathBuf,

    /// Transient bin database to curate
    #[arg(long)]
    transient: PathBuf,

    /// Ionization mode, pos or neg
    #[arg(long)]
    polarity: Polarity,

    /// Output TSV path
    #[arg(long)]
    out: PathBuf,

    /// JSON file with matching parameters; missing keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Consensus(args) => {
            let params = match &args.config {
                Some(path) => CurationParams::from_json_file(path)?,
                None => CurationParams::default(),
            };
            let mut store = BinStore::open(&args.db)?;
            let batch = run_consensus(&mut store, &params, args.update, args.threads)?;
            info!("consensus pass over {} finished, {} bins", args.db.display(), batch.len());
        }
        Command::Autocurate(args) => {
            let params = match &args.config {
                Some(path) => MatchParams::from_json_file(path)?,
                None => MatchParams::default(),
            };
            let mut reference = BinStore::open(&args.db)?;
            let transient = BinStore::open(&args.transient)?;
            let rows = autocurate(&mut reference, &transient, args.polarity, &params)?;
            export_to_path(&args.out, &rows)?;
        }
    }

    Ok(())
}
