mod cleanup_worker;
mod secrets;
mod server;

pub use cleanup_worker::*;
pub use secrets::*;
pub use server::*;
