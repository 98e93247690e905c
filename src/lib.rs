pub mod buffer;
pub mod config;
pub mod erp;
pub mod error;
pub mod flows;
pub mod mapping;
pub mod normalize;
pub mod remote;

pub use error::SyncError;
pub use flows::SyncOutcome;
