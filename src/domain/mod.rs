// Domain layer: models and ports. The allocator and pipeline depend on these, never the reverse.

pub mod model;
pub mod ports;
