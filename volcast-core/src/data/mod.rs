//! Market data: provider trait, Alpha Vantage client, Parquet table store.

pub mod alpha_vantage;
pub mod provider;
pub mod table;

pub use alpha_vantage::{AlphaVantageConfig, AlphaVantageProvider};
pub use provider::{DataError, FetchResult, MarketDataSource, OutputSize};
pub use table::{ParquetTableStore, TableMeta, TableStore, WriteMode};
