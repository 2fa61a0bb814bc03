// Domain layer: models and ports. Adapters and the engine depend on this, never the reverse.

pub mod model;
pub mod ports;
