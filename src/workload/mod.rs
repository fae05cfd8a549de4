pub mod payload;
pub mod sampling;
pub mod storefront;

pub use payload::*;
pub use sampling::*;
pub use storefront::*;
