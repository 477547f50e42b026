pub mod memory;
pub mod snapshot;

pub use memory::{InMemoryMarkerStore, MarkerMapMetadata};
pub use snapshot::Snapshot;
