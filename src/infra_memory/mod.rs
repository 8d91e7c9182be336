mod auth_repo_memory;
mod refresh_token_repo_memory;
mod validation_cache_memory;

pub use auth_repo_memory::*;
pub use refresh_token_repo_memory::*;
pub use validation_cache_memory::*;
