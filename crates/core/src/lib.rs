pub mod config;
pub mod error;
pub mod model;
pub mod ports;

pub use config::{load_dotenv, ConfigCheck, SuiteConfig};
pub use error::{IngestError, QueryError, QueueError};
pub use model::*;
pub use ports::*;
