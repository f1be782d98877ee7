use crate::search::{RunConfig, SearchReport};
use crate::universe::{AssetUniverse, UniverseError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// On-disk universe description: raw daily closes, or precomputed moments.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UniverseFile {
    Closes {
        tickers: Vec<String>,
        closes: Vec<Vec<f64>>,
    },
    Moments {
        tickers: Vec<String>,
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
    },
}

impl UniverseFile {
    pub fn into_universe(self) -> Result<AssetUniverse, UniverseError> {
        match self {
            UniverseFile::Closes { tickers, closes } => {
                AssetUniverse::from_price_history(tickers, &closes)
            }
            UniverseFile::Moments { tickers, mu, cov } => AssetUniverse::new(tickers, mu, cov),
        }
    }
}

pub fn load_universe(path: &Path) -> Result<AssetUniverse> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open universe file {}", path.display()))?;
    let description: UniverseFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse universe file {}", path.display()))?;
    description
        .into_universe()
        .with_context(|| format!("Invalid universe in {}", path.display()))
}

pub fn load_run_config(path: &Path) -> Result<RunConfig> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open run config {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse run config {}", path.display()))
}

pub fn write_report(path: &Path, report: &SearchReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}
