pub mod config;
pub mod error;
pub mod model;
pub mod recorder;
pub mod store;

pub use error::{Result, TallyError};
pub use recorder::{RecordSummary, ViolationRecorder};
