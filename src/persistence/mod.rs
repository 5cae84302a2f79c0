//! CSV Persistence Module
//!
//! Audit trail of consensus prices and resolution attempts, one file per day:
//! `prices/prices_YYYY-MM-DD.csv` and `resolutions/resolutions_YYYY-MM-DD.csv`.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;

use crate::error::ResolutionError;
use crate::resolver::ResolutionReport;
use crate::types::ConsensusPrice;

/// Consensus observation for CSV storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub timestamp: i64,
    pub asset: String,
    /// Decimal string, never rounded through f64
    pub price: String,
    pub confidence: f64,
    pub source_count: usize,
    /// Contributing source ids joined with `;`
    pub sources: String,
    #[serde(default)]
    pub tag: Option<String>,
}

impl From<&ConsensusPrice> for PriceRecord {
    fn from(consensus: &ConsensusPrice) -> Self {
        Self {
            timestamp: consensus.computed_at.timestamp(),
            asset: consensus.asset_id.clone(),
            price: consensus.price.to_string(),
            confidence: consensus.confidence,
            source_count: consensus.contributing_source_count,
            sources: consensus
                .sources
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            tag: None,
        }
    }
}

/// One resolution attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub timestamp: i64,
    pub market_id: String,
    pub state: String,
    #[serde(default)]
    pub winning_side: Option<String>,
    #[serde(default)]
    pub final_price: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub retryable: bool,
}

impl ResolutionRecord {
    pub fn from_attempt(
        market_id: Address,
        attempt: &Result<ResolutionReport, ResolutionError>,
    ) -> Self {
        let timestamp = Utc::now().timestamp();
        let market_id = format!("{:#x}", market_id);
        match attempt {
            Ok(report) => Self {
                timestamp,
                market_id,
                state: report.state.to_string(),
                winning_side: report.decision.as_ref().map(|d| d.winning_side.to_string()),
                final_price: report.decision.as_ref().map(|d| d.consensus.price.to_string()),
                tx_hash: report
                    .receipt
                    .as_ref()
                    .map(|r| format!("{:#x}", r.transaction_id)),
                outcome: report.receipt.as_ref().map(|r| r.outcome.to_string()),
                error: None,
                retryable: false,
            },
            Err(e) => Self {
                timestamp,
                market_id,
                state: "rejected".to_string(),
                winning_side: None,
                final_price: None,
                tx_hash: None,
                outcome: None,
                error: Some(e.to_string()),
                retryable: e.is_retryable(),
            },
        }
    }
}

/// Append-only writer that rolls over to a new file when the UTC date changes
struct DailyWriter {
    dir: PathBuf,
    prefix: &'static str,
    current: Option<(NaiveDate, csv::Writer<std::fs::File>)>,
}

impl DailyWriter {
    fn new(dir: PathBuf, prefix: &'static str) -> Self {
        Self {
            dir,
            prefix,
            current: None,
        }
    }

    fn writer_for(&mut self, date: NaiveDate) -> Result<&mut csv::Writer<std::fs::File>> {
        let stale = !matches!(&self.current, Some((open, _)) if *open == date);
        if stale {
            let filename = format!("{}_{}.csv", self.prefix, date.format("%Y-%m-%d"));
            let writer = CsvPersistence::create_writer(&self.dir, &filename)?;
            self.current = Some((date, writer));
        }
        match self.current.as_mut() {
            Some((_, writer)) => Ok(writer),
            None => anyhow::bail!("{} writer unavailable", self.prefix),
        }
    }

    fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let prefix = self.prefix;
        let writer = self.writer_for(Utc::now().date_naive())?;
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write {} record", prefix))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {} writer", prefix))?;
        Ok(())
    }
}

/// CSV persistence manager
pub struct CsvPersistence {
    data_dir: PathBuf,
    tag: Option<String>,
    price_writer: Arc<AsyncRwLock<DailyWriter>>,
    resolution_writer: Arc<AsyncRwLock<DailyWriter>>,
}

impl CsvPersistence {
    /// Create a new CSV persistence manager
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);

        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        fs::create_dir_all(data_dir.join("prices"))?;
        fs::create_dir_all(data_dir.join("resolutions"))?;

        Ok(Self {
            price_writer: Arc::new(AsyncRwLock::new(DailyWriter::new(
                data_dir.join("prices"),
                "prices",
            ))),
            resolution_writer: Arc::new(AsyncRwLock::new(DailyWriter::new(
                data_dir.join("resolutions"),
                "resolutions",
            ))),
            data_dir,
            tag: None,
        })
    }

    /// Stamp every price row with the agent tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    /// Save a consensus observation
    pub async fn save_price(&self, consensus: &ConsensusPrice) -> Result<()> {
        let mut record = PriceRecord::from(consensus);
        record.tag = self.tag.clone();
        self.price_writer.write().await.append(&record)
    }

    /// Save one resolution attempt
    pub async fn save_resolution(&self, record: ResolutionRecord) -> Result<()> {
        self.resolution_writer.write().await.append(&record)
    }

    /// Load consensus history for one collection over the last `days` days
    pub fn load_price_history(&self, asset: &str, days: u32) -> Result<Vec<PriceRecord>> {
        let mut records = Vec::new();

        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let filename = format!("prices_{}.csv", date.format("%Y-%m-%d"));
            let path = self.data_dir.join("prices").join(&filename);

            if path.exists() {
                let file = std::fs::File::open(&path).context("Failed to open price file")?;
                let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

                for result in reader.deserialize() {
                    let record: PriceRecord =
                        result.context("Failed to deserialize price record")?;
                    if record.asset == asset {
                        records.push(record);
                    }
                }
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    /// Load today's resolution attempts
    pub fn load_resolutions_today(&self) -> Result<Vec<ResolutionRecord>> {
        let filename = format!("resolutions_{}.csv", Utc::now().format("%Y-%m-%d"));
        let path = self.data_dir.join("resolutions").join(filename);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).context("Failed to open resolution file")?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        reader
            .deserialize()
            .map(|row| row.context("Failed to deserialize resolution record"))
            .collect()
    }
}
