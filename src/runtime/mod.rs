pub mod executor;
pub mod runner;

pub use executor::*;
pub use runner::*;
