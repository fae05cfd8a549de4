pub mod aggregation;
pub mod registry;
pub mod sink;

pub use aggregation::*;
pub use registry::*;
pub use sink::*;
