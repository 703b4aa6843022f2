// Adapters layer: concrete implementations for external systems (storage, record sources, record sinks).

pub mod sink;
pub mod source;
pub mod storage;
