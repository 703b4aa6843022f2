pub mod allocator;
pub mod etl;
pub mod mapping;
pub mod pipeline;
pub mod warnings;

pub use crate::domain::model::{LineItem, Record, Transaction};
pub use crate::domain::ports::{ConfigProvider, Pipeline, RecordSink, RecordSource, Storage};
pub use crate::utils::error::Result;
