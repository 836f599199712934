//! downline - inspect and repair referral network ranks
//!
//! Usage:
//!   downline rank <user> [--no-cache]
//!   downline update <user>
//!   downline propagate <user>
//!   downline invalidate <user>
//!   downline recompute-all
//!   downline link <user> <sponsor>
//!   downline unlink <user>
//!   downline remove <user>
//!   downline list

mod cli;

use downline_rank::EngineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_usage() {
    eprintln!("downline - Inspect and repair referral network ranks");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  downline rank <user> [--no-cache]   Show a user's rank");
    eprintln!("  downline update <user>              Recompute and store a user's rank");
    eprintln!("  downline propagate <user>           Recompute a user and their upline");
    eprintln!("  downline invalidate <user>          Drop cached ranks up the sponsor chain");
    eprintln!("  downline recompute-all              Recompute every rank");
    eprintln!("  downline link <user> <sponsor>      Add or move a user under a sponsor");
    eprintln!("  downline unlink <user>              Make a user a root");
    eprintln!("  downline remove <user>              Delete a user");
    eprintln!("  downline list                       List all users");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --snapshot <path>  Network snapshot file (default: {})", cli::DEFAULT_SNAPSHOT);
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DOWNLINE_SNAPSHOT            Snapshot path");
    eprintln!("  DOWNLINE_CHILDREN_TTL_SECS   Children map cache lifetime (default: 30)");
    eprintln!("  DOWNLINE_MAX_UPLINE_HOPS     Upline walk cap (default: 100)");
    eprintln!("  DOWNLINE_RANK_NAMESPACE      Rank cache key prefix (default: rank)");
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "downline=info,downline_rank=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| matches!(a.as_str(), "-h" | "--help" | "help")) {
        print_usage();
        std::process::exit(0);
    }

    let invocation = match cli::parse_args(&args, std::env::var("DOWNLINE_SNAPSHOT").ok()) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match cli::run(&invocation, config).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
