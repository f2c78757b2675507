//! `stremsrc` CLI - Resolve streams for a movie or episode from the terminal

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use stremsrc::{resolver, HeaderProfile, MediaKind, Resolver, ResolverConfig, StreamRecord};

#[derive(Parser)]
#[command(name = "stremsrc")]
#[command(about = "Resolve playable HLS streams from VidSRC embed pages")]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve streams for a media identifier
    Resolve {
        /// Identifier: `tt0120737` for movies, `<id>:<season>:<episode>` for series
        id: String,

        /// Media kind (movie, series)
        #[arg(short, long, default_value = "movie")]
        kind: String,

        /// Print addon-style JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Generate outbound header profiles
    Headers {
        /// Number of profiles to generate
        #[arg(short, long, default_value = "3")]
        count: usize,

        /// Origin used for the Referer header
        #[arg(long)]
        origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match cli.command {
        Commands::Resolve { id, kind, json } => cmd_resolve(&id, &kind, json).await?,
        Commands::Headers { count, origin } => cmd_headers(count, origin.as_deref())?,
    }

    Ok(())
}

async fn cmd_resolve(id: &str, kind: &str, as_json: bool) -> Result<()> {
    let kind: MediaKind = kind.parse()?;
    let config = ResolverConfig::load()?;
    let resolver = Resolver::new(config)?;

    let streams = resolver.resolve(id, kind).await?;
    let listing = resolver::records(&streams);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&addon_streams(&listing))?);
        return Ok(());
    }

    if listing.is_empty() {
        eprintln!("No streams found for {id}");
        return Ok(());
    }

    for record in &listing {
        let marker = if record.is_adaptive { "HLS" } else { "FILE" };
        println!("[{marker}] {}", record.display_title);
        println!("      {}", record.url);
        println!("      Referer: {}/", record.referer_origin);
    }
    Ok(())
}

/// Map records to the addon stream shape: players must proxy the Referer,
/// so none of these are web-ready.
fn addon_streams(listing: &[StreamRecord]) -> serde_json::Value {
    let streams: Vec<_> = listing
        .iter()
        .map(|r| {
            json!({
                "title": r.display_title,
                "url": r.url,
                "behaviorHints": {
                    "notWebReady": true,
                    "proxyHeaders": { "request": { "Referer": format!("{}/", r.referer_origin) } }
                }
            })
        })
        .collect();
    json!({ "streams": streams })
}

fn cmd_headers(count: usize, origin: Option<&str>) -> Result<()> {
    let origin = match origin {
        Some(o) => o.to_string(),
        None => ResolverConfig::load()?.default_origin,
    };

    for i in 0..count {
        let profile = HeaderProfile::generate(&origin);
        println!("Profile {}:", i + 1);
        println!("   user-agent: {}", profile.user_agent);
        println!("   accept: {}", profile.accept);
        println!("   accept-language: {}", profile.accept_language);
        println!("   referer: {}", profile.referer);
    }
    Ok(())
}
