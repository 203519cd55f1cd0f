//! SubVT command-line client.
//!
//! Follows one live feed of a network and prints a line per snapshot change:
//!   subvt network-status
//!   subvt --network kusama validators --inactive
//!   subvt validator <account-id>
//!
//! Without `--config` the local catalogue is used, which points at
//! `subvt-mock-backend` on 127.0.0.1:7888.

mod config;
mod follow;
mod render;
mod retry;

use clap::{Parser, Subcommand};
use config::{Config, NetworkConfig};
use render::Token;
use retry::Backoff;
use std::path::PathBuf;
use subvt_client::{BlockMarkers, Feed, SubscriptionEngine, WsConnector};
use subvt_feeds::{
    AccountId, FeedKind, NetworkStatusFeed, ValidatorDetailsFeed, ValidatorListFeed,
    ValidatorListKind,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "subvt")]
#[command(about = "Follow SubVT live network and validator feeds")]
struct Cli {
    /// Network catalogue (TOML)
    #[arg(short, long, env = "SUBVT_CONFIG")]
    config: Option<PathBuf>,

    /// Network to follow; defaults to the first one in the catalogue
    #[arg(short, long, env = "SUBVT_NETWORK")]
    network: Option<String>,

    /// Give up after this many consecutive failed attempts
    #[arg(long, env = "SUBVT_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Print snapshots as JSON instead of text
    #[arg(long, env = "SUBVT_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the network status feed
    NetworkStatus,

    /// Follow the validator list
    Validators {
        /// Follow inactive validators instead of the active set
        #[arg(long)]
        inactive: bool,
    },

    /// Follow one validator's details
    Validator {
        /// Validator account id
        account: String,
    },

    /// List the networks in the catalogue
    Networks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("subvt_cli=info".parse()?)
                .add_directive("subvt_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Command::Networks = cli.command {
        list_networks(&config);
        return Ok(());
    }

    let network = config.network(cli.network.as_deref())?;
    let token = Token {
        ticker: network.token_ticker.clone(),
        decimals: network.token_decimals,
    };
    let runner = Runner {
        config: &config,
        network,
        max_retries: cli.max_retries,
        json: cli.json,
    };

    match cli.command {
        Command::NetworkStatus => {
            runner
                .run(FeedKind::NetworkStatus, NetworkStatusFeed, vec![], |status, _| {
                    render::network_status(status, &token)
                })
                .await
        }
        Command::Validators { inactive } => {
            let kind = if inactive {
                ValidatorListKind::Inactive
            } else {
                ValidatorListKind::Active
            };
            runner
                .run(
                    FeedKind::ValidatorList,
                    ValidatorListFeed,
                    ValidatorListFeed::parameters(kind),
                    |list, markers| render::validator_list(list, &token, markers),
                )
                .await
        }
        Command::Validator { account } => {
            let account = AccountId::new(account);
            runner
                .run(
                    FeedKind::ValidatorDetails,
                    ValidatorDetailsFeed,
                    ValidatorDetailsFeed::parameters(&account),
                    |details, _| render::validator_details(details, &token),
                )
                .await
        }
        Command::Networks => Ok(()),
    }
}

struct Runner<'a> {
    config: &'a Config,
    network: &'a NetworkConfig,
    max_retries: Option<u32>,
    json: bool,
}

impl Runner<'_> {
    async fn run<F>(
        &self,
        kind: FeedKind,
        feed: F,
        parameters: Vec<String>,
        line: impl Fn(&F::Snapshot, &BlockMarkers) -> String,
    ) -> anyhow::Result<()>
    where
        F: Feed,
    {
        let endpoint = self.network.feed_endpoint(kind)?;
        let engine = SubscriptionEngine::new(feed, WsConnector, self.config.engine.clone());
        tracing::info!(network = %self.network.name, feed = %kind, %endpoint, "following");

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        follow::follow(
            &engine,
            &endpoint,
            parameters,
            Backoff::new(self.max_retries),
            shutdown,
            |snapshot, markers| {
                if self.json {
                    match serde_json::to_string(snapshot) {
                        Ok(json) => println!("{json}"),
                        Err(e) => tracing::warn!("Failed to encode snapshot: {}", e),
                    }
                } else {
                    println!("{}", line(snapshot, markers));
                }
            },
        )
        .await
    }
}

fn list_networks(config: &Config) {
    for network in &config.networks {
        println!(
            "{} ({}, {} decimals)",
            network.name, network.token_ticker, network.token_decimals
        );
        for (service, endpoint) in network.endpoints() {
            match endpoint {
                Ok(endpoint) => println!("  {service:<18} {endpoint}"),
                Err(e) => println!("  {service:<18} invalid: {e}"),
            }
        }
    }
}
