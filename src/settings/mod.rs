//! TOML settings loaded through `config`, with the file path taken from `--settings`.
//! Secrets are never read from these files; see `server::Secrets`.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
