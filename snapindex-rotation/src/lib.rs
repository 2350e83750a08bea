//! # Snapindex Rotation
//!
//! Publication and consumption of index-rotation state. The offline rebuild
//! publishes [`IndexMetadata`](snapindex_core::metadata::IndexMetadata) for
//! each index it produces; online hosts read it through a watched cache and
//! pick which physical index to use with the lag-aware
//! [`LaggedIndexSelector`].
//!
//! The coordination service is abstracted behind [`Coordinator`], a watched
//! key/value store; [`MemoryCoordinator`] backs tests and single-process
//! runs.

mod coordinator;
mod error;
mod registry;
mod selector;

pub use coordinator::{Coordinator, CoordinatorEvent, MemoryCoordinator};
pub use error::{Error, Result};
pub use registry::{CoordRotationRegistry, NoopRotationRegistry, RotationRegistry};
pub use selector::LaggedIndexSelector;
