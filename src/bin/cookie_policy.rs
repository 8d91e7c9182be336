use clap::Parser;
use tokenward::application_impl::CookiePolicyResolver;
use tokenward::domain_model::RequestContext;
use tokenward::logger::*;
use tokenward::server::resolver_config;
use tokenward::settings::parse_settings;

/// Shows which cookie the configured resolver would emit for one request.
///
/// $ cargo run --bin cookie_policy -- --host app.example.com --https --origin https://www.example.com
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    settings: Option<String>,
    #[arg(long)]
    host: String,
    #[arg(long)]
    https: bool,
    #[arg(long)]
    origin: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let logger = Logger::new_bootstrap();
    let settings = parse_settings(args.settings.as_deref())?;
    logger.reload_from_config(&LogConfig::from(&settings.log))?;

    let resolver = CookiePolicyResolver::new(resolver_config(
        &settings.cookie,
        settings.auth.refresh_ttl_secs,
    )?);
    let mut ctx = RequestContext::new(args.host, args.https);
    if let Some(origin) = args.origin {
        ctx = ctx.with_origin(origin);
    }

    let policy = resolver.resolve(&ctx)?;
    println!("{:#?}", policy);
    println!("Set-Cookie: {}", policy.set_cookie_header("TOKEN"));
    Ok(())
}
