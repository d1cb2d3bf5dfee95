//! aioreq – fetch many endpoints at once, or run the slow demo server they
//! can be pointed at.
//
//  $ aioreq serve --config aioreq.toml
//  $ aioreq get 127.0.0.1:5000 --repeat 20
use std::time::Instant;

use aioreq::config::Config;
use aioreq::logging::init_logging;
use aioreq::server::DemoServer;
use aioreq::{metrics, Coordinator, Endpoint, FailurePolicy};

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "aioreq", version, about = "Concurrent GET client & demo server")]
struct Cli {
    /// Path to config TOML (env AIOREQ_CONFIG is used when omitted)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send `GET / HTTP/1.0` to every endpoint concurrently.
    Get {
        /// Endpoints as host:port
        #[arg(required = true)]
        endpoints: Vec<Endpoint>,
        /// Request each endpoint this many times
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,
        /// Failure policy (wait_all or fail_fast), overrides the config
        #[arg(long)]
        policy: Option<FailurePolicy>,
        /// Print every payload
        #[arg(long)]
        print: bool,
        /// Print process counters when done
        #[arg(long)]
        stats: bool,
    },
    /// Run the demo server until Ctrl+C.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let cfg: Config = Config::load(cli.config.as_deref())?;

    match cli.cmd {
        Command::Get {
            endpoints,
            repeat,
            policy,
            print,
            stats,
        } => {
            let mut client_cfg = cfg.client;
            if let Some(policy) = policy {
                client_cfg.failure_policy = policy;
            }

            let targets: Vec<Endpoint> = endpoints
                .iter()
                .flat_map(|ep| std::iter::repeat(ep.clone()).take(repeat))
                .collect();

            let started = Instant::now();
            let payloads = Coordinator::new(client_cfg).run(targets).await?;
            info!(
                responses = payloads.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "All GET request responses received."
            );

            if print {
                for p in &payloads {
                    println!("{}", String::from_utf8_lossy(p));
                    println!("#--------------------------------------------------");
                }
            }
            if stats {
                print!("{}", metrics::snapshot());
            }
        }
        Command::Serve => {
            let server = DemoServer::bind(&cfg.server).await?;
            println!("demo server listening on {}", server.local_addr()?);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Received SIGINT (Ctrl+C)"),
                    Err(e) => {
                        error!("cannot listen for Ctrl+C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
                let _ = shutdown_tx.send(true);
            });

            server.run(shutdown_rx).await?;
        }
    }
    Ok(())
}
