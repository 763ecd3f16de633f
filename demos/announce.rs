use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use ws_discovery::transport::udp::{self, UdpConfig};
use ws_discovery::{
    EndpointAddress, EndpointCatalog, EndpointDiscoveryMetadata, QualifiedName, ServiceConfig,
    ServiceHost,
};

#[derive(Parser)]
#[clap(name = "announce")]
#[clap(about = "Publish an endpoint over WS-Discovery until interrupted")]
struct Args {
    /// Endpoint address, generates a urn:uuid if not provided
    #[clap(long)]
    address: Option<String>,

    /// Contract type in `{namespace}Name` form
    #[clap(long = "type")]
    types: Vec<QualifiedName>,

    /// Scope URI
    #[clap(long = "scope")]
    scopes: Vec<String>,

    /// Transport address the endpoint listens on
    #[clap(long = "xaddr")]
    listen_uris: Vec<String>,

    /// Metadata version
    #[clap(long, default_value = "1")]
    metadata_version: u32,

    /// Act as a discovery proxy, also answering for announced endpoints
    #[clap(long)]
    proxy: bool,

    /// Enable verbose logging
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(level).init();

    let address = args
        .address
        .map(EndpointAddress::new)
        .unwrap_or_else(EndpointAddress::random);
    let mut endpoint = EndpointDiscoveryMetadata::new(address).with_version(args.metadata_version);
    for name in args.types {
        endpoint = endpoint.with_type(name);
    }
    for scope in args.scopes {
        endpoint = endpoint.with_scope(scope);
    }
    for uri in args.listen_uris {
        endpoint = endpoint.with_listen_uri(uri);
    }

    let catalog = Arc::new(if args.proxy {
        EndpointCatalog::proxy()
    } else {
        EndpointCatalog::new()
    });
    catalog.publish(endpoint.clone());

    let host = ServiceHost::builder(ServiceConfig::default().announce(endpoint.clone()))
        .discovery_service(catalog.clone())
        .announcement_handler(catalog)
        .build()?;

    let (channel, incoming) = udp::bind(UdpConfig::service()).await?;
    info!("Serving {} on {}", endpoint.address, channel.local_addr());
    let guard = Arc::new(host).serve(Arc::new(channel), incoming).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    guard.shutdown().await?;

    Ok(())
}
