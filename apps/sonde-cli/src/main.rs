use anyhow::Context;
use clap::{Parser, Subcommand};
use sonde_db::repositories::{OutboundRepository, OutboundStore};
use sonde_engine::Prober;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe proxy outbounds: reachability, latency, landing IP", long_about = None)]
struct Args {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every probeable outbound
    ProbeAll {
        /// Worker count; 0 picks the pipeline default (50 plain, 10 enriched)
        #[arg(long, default_value_t = 0)]
        concurrency: usize,
        /// Run the full landing-IP pipeline instead of reachability only
        #[arg(long)]
        landing: bool,
    },
    /// Probe specific outbounds by tag
    Probe {
        #[arg(required = true)]
        tags: Vec<String>,
        #[arg(long, default_value_t = 0)]
        concurrency: usize,
        #[arg(long)]
        landing: bool,
    },
    /// Print one outbound row as stored
    Show { tag: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonde=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let pool = sonde_db::connect(&args.database_url).await?;
    let repo = Arc::new(OutboundRepository::new(pool));

    // No proxy runtime is attached in CLI mode: SOCKS5 outbounds get the full
    // pipeline, everything else reachability only.
    let prober = Prober::new(repo.clone(), None);

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, draining in-flight probes...");
            canceller.cancel();
        }
    });

    match args.command {
        Command::ProbeAll {
            concurrency,
            landing,
        } => {
            let results = prober.test_all(concurrency, landing, cancel).await?;
            info!("collected {} probe results", results.len());
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Probe {
            tags,
            concurrency,
            landing,
        } => {
            let results = prober
                .test_selected(&tags, concurrency, landing, cancel)
                .await?;
            info!("collected {} probe results", results.len());
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Show { tag } => {
            let row = repo
                .get_by_tag(&tag)
                .await?
                .with_context(|| format!("no outbound with tag {tag}"))?;
            println!("{}", serde_json::to_string_pretty(&row)?);
        }
    }

    Ok(())
}
