//! Tracing setup: a bootstrap subscriber at `info`, re-filtered from `[log].filter`.
//! Raw tokens never reach a log line; hashes appear only as `TokenHash::short()`.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
