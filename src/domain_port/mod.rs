// store

mod validation_cache;

pub use validation_cache::*;

// repo

mod auth_repo;
mod refresh_token_repo;

pub use auth_repo::*;
pub use refresh_token_repo::*;
