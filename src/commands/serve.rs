use crate::config::RelayConfig;
use crate::server::start_web_server;
use anyhow::{bail, Context, Result};
use clap::Parser;
use once_cell::sync::Lazy;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::select;
use tracing::{info, warn};
use url::Url;

/// Base URL of the Gemini OpenAI-compatible API. Used when neither the command
/// line nor the configuration file specify an upstream.
pub(crate) const DEFAULT_UPSTREAM_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";

const DEFAULT_LISTEN_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);

// Shared reqwest client used for every upstream request. Keeping a single
// client around means connections to the upstream are reused across handler
// invocations.
pub(crate) static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("gemini-relay/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("Unable to create reqwest client")
});

#[derive(Parser, Clone)]
pub struct CliArguments {
    /// Base URL of the upstream API that all requests are forwarded to.
    ///
    /// The inbound path and query string are appended to this URL as-is, so
    /// the value should include any fixed API prefix, for example
    /// `https://generativelanguage.googleapis.com/v1beta/openai`.
    #[clap(long, env)]
    upstream_url: Option<Url>,

    /// The listen address for the relay's web server.
    #[clap(short, long, env)]
    listen_address: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
struct Arguments {
    upstream_url: Url,
    listen_address: SocketAddr,
}

impl Arguments {
    /// Merge the CLI arguments with the configuration file. Values given on
    /// the command line take precedence over the config file, which takes
    /// precedence over the built-in defaults.
    fn new(args: CliArguments, config: RelayConfig) -> Self {
        let upstream_url = args.upstream_url.or(config.upstream_url).unwrap_or_else(|| {
            Url::parse(DEFAULT_UPSTREAM_URL).expect("default upstream URL is valid")
        });

        Arguments {
            upstream_url,
            listen_address: args
                .listen_address
                .or(config.listen_address)
                .unwrap_or(DEFAULT_LISTEN_ADDRESS),
        }
    }
}

pub async fn handle_command(args: CliArguments, config: RelayConfig) -> Result<()> {
    let args = Arguments::new(args, config);

    if let Err(err) = check_upstream(&args.upstream_url).await {
        warn!(?err, "Failed to make request to {}", args.upstream_url);
    }

    info!("Forwarding all requests to {}", args.upstream_url);

    let listen_address = args.listen_address;
    let upstream_url = args.upstream_url;
    let web_server_task = async move { start_web_server(&listen_address, upstream_url).await };

    select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT signal received, exiting...");
            Ok(())
        }

        Err(err) = web_server_task => {
            bail!("Web server exited with an error: {err:?}");
        }

        else => {
            Ok(())
        }
    }
}

/// Probe the upstream once at startup. Only transport failures are reported;
/// the response status is ignored since the upstream may well return an error
/// status for its bare base URL.
async fn check_upstream(url: &Url) -> Result<()> {
    CLIENT
        .get(url.as_str())
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .context("upstream is not reachable")?;

    Ok(())
}
