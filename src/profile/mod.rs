pub mod ramp;
pub mod stage;

pub use ramp::*;
pub use stage::*;
