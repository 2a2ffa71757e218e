//! 🚀 repx-cli - the front door, the bouncer, the maitre d' of repx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use repx::app_config::{RunOverrides, load_config};
use repx::supervisors::RunRequest;

/// 🔎 Bulk lookups against the DNS-intelligence API.
#[derive(Debug, Parser)]
#[command(name = "repx", version, about)]
struct Args {
    /// trial mode: single-shot lookups, no IPv6, no full detail
    #[arg(long)]
    trial: bool,
    /// IPv4 address to query
    #[arg(short = 'i', long)]
    ipv4: Option<String>,
    /// IPv6 address to query (needs --full)
    #[arg(long)]
    ipv6: Option<String>,
    /// nameserver to query
    #[arg(short = 's', long)]
    ns: Option<String>,
    /// CNAME to query
    #[arg(short = 'n', long)]
    cname: Option<String>,
    /// TXT name to query
    #[arg(short = 't', long)]
    txt: Option<String>,
    /// MX name to query
    #[arg(short = 'x', long)]
    mx: Option<String>,
    /// file of targets, one per line; each line's kind is auto-detected
    #[arg(short = 'l', long)]
    list_file: Option<PathBuf>,
    /// full mode: fetch ASN, country, city and friends (A/AAAA)
    #[arg(short = 'f', long)]
    full: bool,
    /// max records per target (0 = no cap)
    #[arg(short = 'm', long)]
    max: Option<usize>,
    /// page size for paginated requests
    #[arg(short = 'p', long)]
    page_size: Option<usize>,
    /// write records to the output directory
    #[arg(short = 'o', long)]
    output: bool,
    /// number of concurrent lookup workers
    #[arg(short = 'T', long)]
    threads: Option<usize>,
    /// debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
    /// config file
    #[arg(short = 'c', long, default_value = "config.toml")]
    config: PathBuf,
}

impl Args {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            page_size: self.page_size,
            threads: self.threads,
            max_records_per_target: self.max,
            output_enabled: self.output,
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            trial: self.trial,
            full: self.full,
            ipv4: self.ipv4.clone(),
            ipv6: self.ipv6.clone(),
            ns: self.ns.clone(),
            cname: self.cname.clone(),
            txt: self.txt.clone(),
            mx: self.mx.clone(),
            list_file: self.list_file.clone(),
        }
    }
}

/// 📡 RUST_LOG wins. Otherwise --verbose means debug, and the config's level covers the rest.
fn init_tracing(config_level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { config_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 🚀 main() - where it all begins. The "I pressed enter and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Parse args (clap does the judging)
/// 2. Load config (the moment of truth)
/// 3. Init tracing (so we can see what goes wrong, and when)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Handle errors (cry, then exit 1)
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 🔧 config before logging, because the log level lives in the config
    let app_config = load_config(&args.config)
        .context("💀 In repx-cli, main, we couldn't load the config. Take a look at the file and the REPX_* env vars.")?;
    init_tracing(&app_config.log.level, args.verbose);

    let result = repx::run(&app_config, &args.overrides(), &args.request()).await;

    match result {
        Ok(summary) => {
            println!("{}", summary.render());
            if summary.is_total_failure() {
                error!("💀 every lookup in this run failed");
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("transport failure")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: the DNS API does not seem reachable. \
                    Check [api] host in the config (or REPX_API__HOST), your network, \
                    and whether a proxy is eating the request. ☕"
                );
            }

            // 🗑️ Exit with prejudice. No draining, no encore.
            std::process::exit(1);
        }
    }
}
