//! `bedcensus-recon` — ICU bed-census reconciliation engine.
//!
//! Turns raw, irregular bed-count readings from a legacy and a primary source
//! into one dense daily table per unit. The engine receives pre-loaded tables
//! and returns the canonical records; the CLI owns file IO.

pub mod config;
pub mod correction;
pub mod daily;
pub mod derived;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod load;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod reduce;
pub mod registry;
pub mod spread;

pub use config::CensusConfig;
pub use daily::DailyPolicy;
pub use engine::run;
pub use error::CensusError;
pub use load::{parse_table, SourceFormat};
pub use model::{CanonicalRecord, CensusInput, CensusResult, RawReading, RawTable};
pub use registry::UnitRegistry;
