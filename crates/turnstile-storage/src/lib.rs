mod entity;
pub mod memory;
pub mod traits;

pub use memory::{EntitlementStore, KindStats, Keyspace, StoreStats};
pub use traits::{EntitlementReader, EntitlementWriter, Entity, WriteOutcome};
