pub mod cleanup;
pub mod extraction;
pub mod mosaic;
pub mod vectorization;

pub use cleanup::*;
pub use extraction::*;
pub use mosaic::*;
pub use vectorization::*;
