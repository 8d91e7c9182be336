mod cookie_policy;
mod owner;
mod refresh_token;

pub use cookie_policy::*;
pub use owner::*;
pub use refresh_token::*;
