pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::TomlConfig;

pub use crate::adapters::{
    sink::StorageSink,
    source::{ApiSource, CsvSource},
    storage::LocalStorage,
};
pub use crate::core::{
    allocator::{allocate, allocate_default, PrecedencePolicy},
    etl::EtlEngine,
    pipeline::ReconcilePipeline,
    warnings::WarningCollector,
};
pub use crate::domain::model::{AllocationResult, LineItem, PriceSource};
pub use crate::utils::error::{EtlError, Result};
