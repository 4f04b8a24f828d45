//! CLI commands implementation

pub mod analyze;
pub mod init;
pub mod jobs;

pub use analyze::*;
pub use init::*;
pub use jobs::*;
