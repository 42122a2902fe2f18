pub mod admin;
pub mod fixtures;
pub mod memory;
pub mod suite;

pub use admin::{TableAdmin, TableSchema};
pub use memory::InMemoryCluster;
pub use suite::{IngestSuite, SuiteError, SuiteOptions, SuiteReport};
