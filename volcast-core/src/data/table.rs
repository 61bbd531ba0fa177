//! Keyed price-table store.
//!
//! Layout: `{data_dir}/{TABLE}.parquet` plus a `{TABLE}.meta.json` sidecar.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Fail / replace / append write modes
//! - Reads return the most recent N rows in ascending date order
//! - Metadata sidecar per table (hash, date range, row count)

use super::provider::DataError;
use crate::domain::PriceBar;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Refuse to write if the table exists.
    Fail,
    /// Drop the existing table before writing.
    Replace,
    /// Merge into the existing table; incoming rows win on duplicate dates.
    Append,
}

/// Trait for the tabular store the lifecycle reads training data from.
pub trait TableStore: Send + Sync {
    /// Write rows under `table`, returning the number of distinct dates
    /// written (repeated dates in `rows` collapse to the last one).
    fn write(&self, table: &str, rows: &[PriceBar], mode: WriteMode) -> Result<usize, DataError>;

    /// Read rows ascending by date; `limit` keeps only the most recent N.
    fn read(&self, table: &str, limit: Option<usize>) -> Result<Vec<PriceBar>, DataError>;

    /// Whether a table with this name exists.
    fn exists(&self, table: &str) -> bool;
}

/// Metadata sidecar for a stored table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub table: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub row_count: usize,
    pub data_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

/// Parquet-backed table store, one file per table.
pub struct ParquetTableStore {
    data_dir: PathBuf,
}

impl ParquetTableStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of the store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.parquet"))
    }

    fn meta_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.meta.json"))
    }

    /// Metadata for a table, if it has been written.
    pub fn table_meta(&self, table: &str) -> Option<TableMeta> {
        let content = fs::read_to_string(self.meta_path(table)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load every row of a table, ascending by date.
    fn load_all(&self, table: &str) -> Result<Vec<PriceBar>, DataError> {
        self.read(table, None)
    }

    fn write_meta(&self, table: &str, bars: &[PriceBar]) -> Result<(), DataError> {
        let (first, last) = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => (first.date, last.date),
            _ => return Err(DataError::StoreError("no rows to describe".into())),
        };
        let meta = TableMeta {
            table: table.to_string(),
            start_date: first,
            end_date: last,
            row_count: bars.len(),
            data_hash: blake3::hash(
                &serde_json::to_vec(bars)
                    .map_err(|e| DataError::StoreError(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::StoreError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(table), meta_json)
            .map_err(|e| DataError::StoreError(format!("meta write: {e}")))
    }
}

impl TableStore for ParquetTableStore {
    fn write(&self, table: &str, rows: &[PriceBar], mode: WriteMode) -> Result<usize, DataError> {
        validate_table_name(table)?;
        if rows.is_empty() {
            return Err(DataError::StoreError("no rows to write".into()));
        }

        let exists = self.exists(table);
        let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
        match mode {
            WriteMode::Fail if exists => {
                return Err(DataError::TableExists {
                    table: table.to_string(),
                })
            }
            WriteMode::Append if exists => {
                for bar in self.load_all(table)? {
                    by_date.insert(bar.date, bar);
                }
            }
            _ => {}
        }
        for bar in rows {
            by_date.insert(bar.date, bar.clone());
        }
        let written = rows.iter().map(|b| b.date).collect::<BTreeSet<_>>().len();
        let merged: Vec<PriceBar> = by_date.into_values().collect();

        fs::create_dir_all(&self.data_dir)
            .map_err(|e| DataError::StoreError(format!("failed to create dir: {e}")))?;

        let df = bars_to_dataframe(&merged)?;
        let path = self.table_path(table);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::StoreError(format!("atomic rename failed: {e}"))
        })?;
        self.write_meta(table, &merged)?;

        debug!(table, ?mode, written, total = merged.len(), "table written");
        Ok(written)
    }

    fn read(&self, table: &str, limit: Option<usize>) -> Result<Vec<PriceBar>, DataError> {
        validate_table_name(table)?;
        let path = self.table_path(table);
        if !path.exists() {
            return Err(DataError::TableNotFound {
                table: table.to_string(),
            });
        }

        let mut lf = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())
            .map_err(|e| DataError::ParquetError(format!("scan: {e}")))?
            .sort(["date"], SortMultipleOptions::default());
        if let Some(n) = limit {
            lf = lf.tail(n as IdxSize);
        }
        let df = lf
            .collect()
            .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

        dataframe_to_bars(&df)
    }

    fn exists(&self, table: &str) -> bool {
        self.table_path(table).exists()
    }
}

/// Table names become file names, so keep them to a conservative charset.
fn validate_table_name(table: &str) -> Result<(), DataError> {
    let ok = !table.is_empty()
        && !table.starts_with('.')
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='));
    if ok {
        Ok(())
    } else {
        Err(DataError::InvalidTableName(table.to_string()))
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn bars_to_dataframe(bars: &[PriceBar]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|b| (b.date - epoch()).num_days() as i32)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, DataError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("missing column '{name}': {e}")))
    };
    let float = |name: &str| {
        column(name)?
            .f64()
            .map(|ca| ca.clone())
            .map_err(|e| DataError::ParquetError(format!("{name} column type: {e}")))
    };

    let date_ca = column("date")?
        .date()
        .map_err(|e| DataError::ParquetError(format!("date column type: {e}")))?
        .clone();
    let open_ca = float("open")?;
    let high_ca = float("high")?;
    let low_ca = float("low")?;
    let close_ca = float("close")?;
    let vol_ca = float("volume")?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;

        bars.push(PriceBar {
            date: epoch() + chrono::Duration::days(date_days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0.0),
        });
    }

    Ok(bars)
}
