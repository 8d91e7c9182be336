use clap::Parser;
use tokenward::application_impl::hash_password;

/// Prints an argon2id PHC string for the `auth_credential.password_hash` column.
#[derive(Parser, Debug)]
struct Args {
    password: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("{}", hash_password(&args.password)?);
    Ok(())
}
