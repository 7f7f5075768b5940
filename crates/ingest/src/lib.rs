//! Walks scan roots into the index.
//!
//! One run creates one scan. Every root is checked before the scan row is
//! written, so a misconfigured root never leaves an empty scan behind. Each
//! object is then interned, hashed only when its modification time or size
//! changed since an earlier scan, and appended. The transaction is committed
//! every few directories; a crash loses at most the records since the last
//! commit and leaves the scan incomplete.
//!
//! ```no_run
//! use fchange_config::Config;
//! use fchange_ingest::Ingester;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let db = config.database.connect().await?;
//! let summary = Ingester::from_config(&db, &config).scan_enabled_roots().await?;
//! println!("scan {}: {} files, {} hashed", summary.scanid, summary.files, summary.hashed);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod filter;
mod ingester;
mod record;

pub use crate::filter::ExtensionFilter;
pub use crate::ingester::{IngestEvent, IngestOptions, IngestSummary, Ingester};
pub use crate::record::Effort;
