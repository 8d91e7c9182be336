mod auth_service_impl;
mod cookie_policy_resolver;
mod credential_verifier_impl;
mod opaque_token;
mod refresh_token_store;
mod rotation_manager;
mod token_codec_impl;

pub use auth_service_impl::*;
pub use cookie_policy_resolver::*;
pub use credential_verifier_impl::*;
pub use opaque_token::*;
pub use refresh_token_store::*;
pub use rotation_manager::*;
pub use token_codec_impl::*;
