pub mod datasets;
pub mod db;
pub mod error;
pub mod geometry;
pub mod import;
pub mod merge;
pub mod normalize;
pub mod options;
pub mod staging;
pub mod store;
pub mod values;

pub use error::{ImportError, Result};
pub use import::{run_import, ImportReceipt, ImportRequest};
pub use normalize::{normalize_dataset, NormalizationSummary};
pub use options::{ImportOptions, ScenarioStatus, ScenarioType};
pub use store::{MemoryStore, NormalizeStore, PgStore};
