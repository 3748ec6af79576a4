//! Vector index engine: exact flat search, four-artifact persistence,
//! optional device residency, and a single-writer shared handle.
#![deny(unused_imports)]

pub mod accelerator;
pub mod flat;
pub mod shared;
pub mod store;

pub use accelerator::{Accelerator, DeviceMatrix};
pub use flat::{FlatIndex, Residency, SearchHit, NO_MATCH};
pub use shared::SharedIndex;
