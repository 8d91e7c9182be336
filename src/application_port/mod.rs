mod auth_service;
mod cookie_policy;
mod token_codec;

pub use auth_service::*;
pub use cookie_policy::*;
pub use token_codec::*;
