use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures_util::StreamExt;
use tracing::info;
use ws_discovery::transport::udp::{self, UdpConfig};
use ws_discovery::{
    ClientConfig, DiscoveryClient, FindCriteria, FindEvent, ProtocolVersion, QualifiedName,
    ResolveCriteria, ScopeMatchBy, WS_DISCOVERY_11, WS_DISCOVERY_APRIL_2005, WS_DISCOVERY_CD1,
};

#[derive(Parser)]
#[clap(name = "probe")]
#[clap(about = "Find WS-Discovery endpoints on the local network")]
struct Args {
    /// Protocol version: 1.1, cd1 or 2005
    #[clap(long, default_value = "1.1")]
    version: String,

    /// Seconds to wait for responses
    #[clap(long, default_value = "3")]
    timeout: u64,

    /// Enable verbose logging
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Probe by type and scope
    Find {
        /// Contract type in `{namespace}Name` form
        #[clap(long = "type")]
        types: Vec<QualifiedName>,
        /// Scope URI
        #[clap(long = "scope")]
        scopes: Vec<String>,
        /// Scope match rule URI
        #[clap(long)]
        match_by: Option<String>,
        /// Stop after this many matches
        #[clap(long)]
        max: Option<u32>,
    },
    /// Resolve an endpoint address
    Resolve {
        /// Endpoint address, e.g. urn:uuid:...
        address: String,
    },
}

fn protocol(name: &str) -> Result<&'static ProtocolVersion> {
    match name {
        "1.1" => Ok(&WS_DISCOVERY_11),
        "cd1" => Ok(&WS_DISCOVERY_CD1),
        "2005" => Ok(&WS_DISCOVERY_APRIL_2005),
        other => anyhow::bail!("unknown protocol version {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(level).init();

    let (channel, incoming) = udp::bind(UdpConfig::client()).await?;
    info!("Listening for responses on {}", channel.local_addr());

    let config = ClientConfig::default().version(protocol(&args.version)?);
    let client = DiscoveryClient::ad_hoc(config, Arc::new(channel), incoming)?;
    let wait = Duration::from_secs(args.timeout);

    match args.command {
        Command::Find {
            types,
            scopes,
            match_by,
            max,
        } => {
            let mut criteria = FindCriteria::new().with_duration(wait);
            for name in types {
                criteria = criteria.with_type(name);
            }
            for scope in scopes {
                criteria = criteria.with_scope(scope);
            }
            if let Some(uri) = match_by {
                criteria = criteria.with_scope_match_by(ScopeMatchBy::from_uri(&uri));
            }
            if let Some(max) = max {
                criteria = criteria.with_max_results(max);
            }

            let mut found = 0;
            let mut events = client.find_stream(criteria);
            while let Some(event) = events.next().await {
                match event {
                    FindEvent::Match(m) => {
                        found += 1;
                        info!(
                            "{} v{} types={:?} scopes={:?} xaddrs={:?}",
                            m.endpoint.address,
                            m.endpoint.version,
                            m.endpoint
                                .contract_type_names
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>(),
                            m.endpoint.scopes,
                            m.endpoint.listen_uris
                        );
                    }
                    FindEvent::ProxyAvailable(p) => {
                        info!("Discovery proxy available at {:?}", p.endpoint.listen_uris);
                    }
                }
            }
            info!("{found} endpoint(s) found");
        }
        Command::Resolve { address } => {
            let response = client
                .resolve(ResolveCriteria::new(address).with_duration(wait))
                .await?;
            match response.endpoint {
                Some(endpoint) => info!("Resolved {} to {:?}", endpoint.address, endpoint.listen_uris),
                None => info!("No response"),
            }
        }
    }

    Ok(())
}
