use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tokenward", about = "Access/refresh credential issuer")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
}
