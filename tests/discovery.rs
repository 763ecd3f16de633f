use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Notify;
use tokio::time::timeout;
use ws_discovery::service::{Completion, ServiceGuard};
use ws_discovery::transport::memory::{LoopbackRequestChannel, MemoryNetwork};
use ws_discovery::transport::{DuplexChannel, Received, RequestReplyChannel, Target};
use ws_discovery::wire::{DiscoveryMessage, Envelope};
use ws_discovery::{
    ClientConfig, DiscoveryClient, DiscoveryMessageSequence, DiscoveryService, EndpointCatalog,
    EndpointDiscoveryMetadata, Error, FindCriteria, FindDisposition, FindEvent, QualifiedName,
    ResolveCriteria, ServiceConfig, ServiceHost, VersionRegistry, WS_DISCOVERY_11,
    WS_DISCOVERY_APRIL_2005,
};

fn printer_type() -> QualifiedName {
    QualifiedName::new("http://example.com/devices", "Printer")
}

fn printer() -> EndpointDiscoveryMetadata {
    EndpointDiscoveryMetadata::new("urn:uuid:6c7a2f1e-0000-4000-8000-000000000001")
        .with_type(printer_type())
        .with_scope("http://example.com/building1/floor2")
        .with_listen_uri("http://192.0.2.10:8080/print")
        .with_version(1)
}

fn short(criteria: FindCriteria) -> FindCriteria {
    criteria.with_duration(Duration::from_millis(300))
}

async fn serve_catalog(network: &MemoryNetwork) -> anyhow::Result<(ServiceGuard, Arc<EndpointCatalog>)> {
    let catalog = Arc::new(EndpointCatalog::new());
    catalog.publish(printer());
    let host = ServiceHost::builder(ServiceConfig::default())
        .discovery_service(catalog.clone())
        .build()?;
    let (channel, incoming) = network.join();
    let guard = Arc::new(host).serve(Arc::new(channel), incoming).await?;
    Ok((guard, catalog))
}

fn ad_hoc_client(network: &MemoryNetwork, config: ClientConfig) -> anyhow::Result<DiscoveryClient> {
    let (channel, incoming) = network.join();
    Ok(DiscoveryClient::ad_hoc(config, Arc::new(channel), incoming)?)
}

/// Counts calls and always answers with the printer.
#[derive(Default)]
struct CountingService {
    calls: AtomicUsize,
}

#[async_trait]
impl DiscoveryService for CountingService {
    async fn find(&self, _criteria: &FindCriteria) -> ws_discovery::Result<Vec<EndpointDiscoveryMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![printer()])
    }

    async fn resolve(
        &self,
        _criteria: &ResolveCriteria,
    ) -> ws_discovery::Result<Option<EndpointDiscoveryMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(printer()))
    }
}

/// Blocks inside `find` until released.
#[derive(Default)]
struct GatedService {
    calls: AtomicUsize,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl DiscoveryService for GatedService {
    async fn find(&self, _criteria: &FindCriteria) -> ws_discovery::Result<Vec<EndpointDiscoveryMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.release.notified().await;
        Ok(vec![printer()])
    }

    async fn resolve(
        &self,
        _criteria: &ResolveCriteria,
    ) -> ws_discovery::Result<Option<EndpointDiscoveryMetadata>> {
        Ok(None)
    }
}

/// Answers with the printer and applies a fixed disposition to both requests.
struct ProxyingService {
    disposition: FindDisposition,
}

#[async_trait]
impl DiscoveryService for ProxyingService {
    async fn find(&self, _criteria: &FindCriteria) -> ws_discovery::Result<Vec<EndpointDiscoveryMetadata>> {
        Ok(vec![printer()])
    }

    async fn resolve(
        &self,
        _criteria: &ResolveCriteria,
    ) -> ws_discovery::Result<Option<EndpointDiscoveryMetadata>> {
        Ok(Some(printer()))
    }

    fn find_disposition(&self, _criteria: &FindCriteria) -> FindDisposition {
        self.disposition.clone()
    }

    fn resolve_disposition(&self, _criteria: &ResolveCriteria) -> FindDisposition {
        self.disposition.clone()
    }
}

fn discovery_proxy() -> EndpointDiscoveryMetadata {
    EndpointDiscoveryMetadata::new("urn:uuid:proxy").with_listen_uri("http://192.0.2.1:5357/proxy")
}

async fn serve_proxying(network: &MemoryNetwork, disposition: FindDisposition) -> anyhow::Result<ServiceGuard> {
    let host = ServiceHost::builder(ServiceConfig::default())
        .discovery_service(Arc::new(ProxyingService { disposition }))
        .build()?;
    let (channel, incoming) = network.join();
    Ok(Arc::new(host).serve(Arc::new(channel), incoming).await?)
}

struct UnpluggedChannel;

#[async_trait]
impl DuplexChannel for UnpluggedChannel {
    async fn send(&self, _message: &str, _target: Target) -> ws_discovery::Result<()> {
        Err(Error::transport("network unreachable"))
    }
}

struct SilentProxy;

#[async_trait]
impl RequestReplyChannel for SilentProxy {
    async fn request(&self, _message: String) -> ws_discovery::Result<Option<String>> {
        std::future::pending().await
    }
}

struct AbsentProxy;

#[async_trait]
impl RequestReplyChannel for AbsentProxy {
    async fn request(&self, _message: String) -> ws_discovery::Result<Option<String>> {
        Ok(None)
    }
}

fn probe_from(client: SocketAddr, criteria: FindCriteria) -> Received {
    Received {
        message: Envelope::new(&WS_DISCOVERY_11, DiscoveryMessage::Probe(Some(criteria))).encode(),
        from: client,
    }
}

#[test_log::test(tokio::test)]
async fn ad_hoc_find_returns_matching_endpoint() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let response = client
        .find(short(FindCriteria::for_type(printer_type())).with_max_results(1))
        .await?;

    assert_eq!(response.len(), 1);
    assert_eq!(response.endpoints[0].endpoint, printer());
    assert!(response.endpoints[0].sequence.is_some());
    assert!(!client.is_request_response());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn probe_with_no_match_completes_empty() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let criteria = short(FindCriteria::for_type(QualifiedName::new(
        "http://example.com/devices",
        "Scanner",
    )));
    let response = client.find(criteria).await?;

    assert!(response.is_empty());
    assert!(response.proxies.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn scopes_narrow_ad_hoc_results() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let inside = client
        .find(short(FindCriteria::new().with_scope("http://example.com/building1")).with_max_results(1))
        .await?;
    assert_eq!(inside.len(), 1);

    let outside = client
        .find(short(FindCriteria::new().with_scope("http://example.com/building2")))
        .await?;
    assert!(outside.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn older_protocol_versions_interoperate() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(
        &network,
        ClientConfig::default().version(&WS_DISCOVERY_APRIL_2005),
    )?;

    let resolved = client
        .resolve(ResolveCriteria::new(printer().address).with_duration(Duration::from_secs(2)))
        .await?;
    assert_eq!(resolved.endpoint, Some(printer()));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn find_stream_yields_matches_as_they_arrive() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let events: Vec<FindEvent> = client
        .find_stream(short(FindCriteria::for_type(printer_type())).with_max_results(1))
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], FindEvent::Match(found) if found.endpoint == printer()));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn duplicate_proxy_hello_is_delivered_once() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (proxy_a, mut proxy_a_rx) = network.join();
    let (proxy_b, mut proxy_b_rx) = network.join();
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let find = tokio::spawn(async move { client.find(short(FindCriteria::new())).await });

    let probe = timeout(Duration::from_secs(1), proxy_a_rx.recv())
        .await?
        .expect("probe reaches the first proxy");
    let _ = proxy_b_rx.recv().await;
    let request = Envelope::decode(&VersionRegistry::new(), &probe.message)?;

    let proxy = discovery_proxy();
    let hello = || {
        Envelope::new(&WS_DISCOVERY_11, DiscoveryMessage::Hello(Some(proxy.clone())))
            .with_relates_to(request.headers.message_id.clone())
            .with_app_sequence(DiscoveryMessageSequence::new(42, 1))
            .encode()
    };
    proxy_a.send(&hello(), Target::Peer(probe.from)).await?;
    proxy_b.send(&hello(), Target::Peer(probe.from)).await?;

    let response = find.await??;
    assert!(response.is_empty());
    assert_eq!(response.proxies.len(), 1);
    assert_eq!(response.proxies[0].endpoint, proxy);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn responses_without_app_sequence_are_accepted() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (responder, mut responder_rx) = network.join();
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let find = tokio::spawn(async move { client.find(short(FindCriteria::new())).await });

    let probe = responder_rx.recv().await.expect("probe arrives");
    let request = Envelope::decode(&VersionRegistry::new(), &probe.message)?;
    let matches = Envelope::new(
        &WS_DISCOVERY_11,
        DiscoveryMessage::ProbeMatches(vec![printer()]),
    )
    .with_relates_to(request.headers.message_id);
    responder.send(&matches.encode(), Target::Peer(probe.from)).await?;

    let response = find.await??;
    assert_eq!(response.len(), 1);
    assert_eq!(response.endpoints[0].sequence, None);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn retransmitted_response_is_counted_once() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (responder, mut responder_rx) = network.join();
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let find = tokio::spawn(async move { client.find(short(FindCriteria::new())).await });

    let probe = responder_rx.recv().await.expect("probe arrives");
    let request = Envelope::decode(&VersionRegistry::new(), &probe.message)?;
    let matches = Envelope::new(
        &WS_DISCOVERY_11,
        DiscoveryMessage::ProbeMatches(vec![printer()]),
    )
    .with_relates_to(request.headers.message_id)
    .encode();
    responder.send(&matches, Target::Peer(probe.from)).await?;
    responder.send(&matches, Target::Peer(probe.from)).await?;

    let response = find.await??;
    assert_eq!(response.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn overflowing_duration_in_a_foreign_probe_is_ignored() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_guard, _) = serve_catalog(&network).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;
    let (stranger, _stranger_rx) = network.join();

    let probe = Envelope::new(
        &WS_DISCOVERY_11,
        DiscoveryMessage::Probe(Some(FindCriteria::new().with_duration(Duration::from_secs(5)))),
    )
    .encode();
    let overflowing = probe.replace("PT5S", "P1DT18446744073709551615S");
    assert_ne!(overflowing, probe);
    stranger.send(&overflowing, Target::Multicast).await?;

    let response = client
        .find(short(FindCriteria::for_type(printer_type())).with_max_results(1))
        .await?;
    assert_eq!(response.len(), 1);
    assert_eq!(response.endpoints[0].endpoint, printer());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn redirected_probe_announces_only_the_proxy() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let _guard = serve_proxying(&network, FindDisposition::Redirect(discovery_proxy())).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let response = client.find(short(FindCriteria::new())).await?;
    assert!(response.is_empty());
    assert_eq!(response.proxies.len(), 1);
    assert_eq!(response.proxies[0].endpoint, discovery_proxy());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn redirected_resolve_returns_the_proxy() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let _guard = serve_proxying(&network, FindDisposition::Redirect(discovery_proxy())).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let response = client
        .resolve(ResolveCriteria::new(printer().address).with_duration(Duration::from_millis(300)))
        .await?;
    assert_eq!(response.endpoint, None);
    assert_eq!(response.proxies.len(), 1);
    assert_eq!(response.proxies[0].endpoint, discovery_proxy());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn proxy_announcement_precedes_matches_in_sequence() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let _guard = serve_proxying(&network, FindDisposition::RespondAndAnnounce(discovery_proxy())).await?;
    let client = ad_hoc_client(&network, ClientConfig::default())?;

    let found = client.find(short(FindCriteria::new())).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found.proxies.len(), 1);
    let hello = found.proxies[0].sequence.clone().expect("hello is sequenced");
    let matches = found.endpoints[0].sequence.clone().expect("matches are sequenced");
    assert_eq!(hello.instance_id, matches.instance_id);
    assert!(hello.message_number < matches.message_number);

    let resolved = client
        .resolve(ResolveCriteria::new(printer().address).with_duration(Duration::from_secs(2)))
        .await?;
    assert_eq!(resolved.endpoint, Some(printer()));
    assert_eq!(resolved.proxies.len(), 1);
    let hello = resolved.proxies[0].sequence.clone().expect("hello is sequenced");
    let matches = resolved.sequence.expect("matches are sequenced");
    assert!(hello.message_number < matches.message_number);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn malformed_resolve_completes_without_dispatch() -> anyhow::Result<()> {
    let service = Arc::new(CountingService::default());
    let host = ServiceHost::builder(ServiceConfig::default())
        .discovery_service(service.clone())
        .build()?;
    let network = MemoryNetwork::new();
    let (channel, _incoming) = network.join();
    let channel: Arc<dyn DuplexChannel> = Arc::new(channel);
    let from: SocketAddr = "127.0.0.1:3702".parse()?;

    let resolve = || Envelope::new(&WS_DISCOVERY_11, DiscoveryMessage::Resolve(None)).encode();
    let empty_body = resolve();
    let no_address = resolve().replace(
        "<s:Body></s:Body>",
        "<s:Body><d:Resolve><wsa:EndpointReference/></d:Resolve></s:Body>",
    );
    for message in [empty_body, no_address, "<not-xml".to_string()] {
        let completion = host.process(&channel, Received { message, from }).await?;
        assert_eq!(completion, Completion::Dropped);
    }
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn managed_resolve_with_one_match_returns_that_endpoint() -> anyhow::Result<()> {
    let catalog = Arc::new(EndpointCatalog::new());
    catalog.publish(printer());
    let host = ServiceHost::builder(ServiceConfig::default())
        .discovery_service(catalog)
        .build()?;
    let channel = LoopbackRequestChannel::new(Arc::new(host));
    let client = DiscoveryClient::managed(ClientConfig::default(), Arc::new(channel))?;
    assert!(client.is_request_response());

    let resolved = client.resolve(ResolveCriteria::new(printer().address)).await?;
    assert_eq!(resolved.endpoint, Some(printer()));
    assert!(resolved.sequence.is_some());

    let unknown = client.resolve(ResolveCriteria::new("urn:uuid:unknown")).await?;
    assert_eq!(unknown.endpoint, None);

    let found = client.find(FindCriteria::for_type(printer_type())).await?;
    assert_eq!(found.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn managed_absent_reply_means_no_match() -> anyhow::Result<()> {
    let client = DiscoveryClient::managed(ClientConfig::default(), Arc::new(AbsentProxy))?;
    assert!(client.find(FindCriteria::new()).await?.is_empty());
    assert_eq!(client.resolve(ResolveCriteria::new("urn:uuid:x")).await?.endpoint, None);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn managed_calls_time_out() -> anyhow::Result<()> {
    let client = DiscoveryClient::managed(ClientConfig::default(), Arc::new(SilentProxy))?;
    let err = client
        .find(FindCriteria::new().with_duration(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn unregistered_client_version_is_rejected() {
    let config = ClientConfig::default().registry(VersionRegistry::empty().with(&WS_DISCOVERY_APRIL_2005));
    let result = DiscoveryClient::managed(config, Arc::new(AbsentProxy));
    assert!(matches!(result, Err(Error::UnknownVersion(_))));
}

#[test_log::test(tokio::test)]
async fn transport_failure_propagates() -> anyhow::Result<()> {
    let network = MemoryNetwork::new();
    let (_unused, incoming) = network.join();
    let client = DiscoveryClient::ad_hoc(ClientConfig::default(), Arc::new(UnpluggedChannel), incoming)?;
    let err = client.find(short(FindCriteria::new())).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    let host = ServiceHost::builder(ServiceConfig::default())
        .discovery_service(Arc::new(CountingService::default()))
        .build()?;
    let channel: Arc<dyn DuplexChannel> = Arc::new(UnpluggedChannel);
    let err = host
        .process(&channel, probe_from("127.0.0.1:9".parse()?, FindCriteria::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancellation_before_dispatch_skips_the_service() -> anyhow::Result<()> {
    let service = Arc::new(CountingService::default());
    let host = Arc::new(
        ServiceHost::builder(ServiceConfig::default())
            .discovery_service(service.clone())
            .build()?,
    );
    let network = MemoryNetwork::new();
    let (channel, _) = network.join();
    let (client, mut client_rx) = network.join();

    let handle = host.spawn_process(Arc::new(channel), probe_from(client.local_addr(), FindCriteria::new()));
    handle.cancel();

    assert_eq!(handle.join().await?, Completion::Cancelled);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    assert!(client_rx.try_recv().is_err());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancellation_during_dispatch_discards_the_result() -> anyhow::Result<()> {
    let service = Arc::new(GatedService::default());
    let host = Arc::new(
        ServiceHost::builder(ServiceConfig::default())
            .discovery_service(service.clone())
            .build()?,
    );
    let network = MemoryNetwork::new();
    let (channel, _) = network.join();
    let (client, mut client_rx) = network.join();

    let handle = host.spawn_process(Arc::new(channel), probe_from(client.local_addr(), FindCriteria::new()));
    service.started.notified().await;
    handle.cancel();
    service.release.notify_one();

    assert_eq!(handle.join().await?, Completion::Cancelled);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert!(client_rx.try_recv().is_err());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn duplex_probe_response_goes_back_to_the_sender() -> anyhow::Result<()> {
    let host = Arc::new(
        ServiceHost::builder(ServiceConfig::default())
            .discovery_service(Arc::new(CountingService::default()))
            .build()?,
    );
    let network = MemoryNetwork::new();
    let (channel, _) = network.join();
    let (client, mut client_rx) = network.join();
    let (_bystander, mut bystander_rx) = network.join();

    let handle = host.spawn_process(Arc::new(channel), probe_from(client.local_addr(), FindCriteria::new()));
    assert_eq!(handle.join().await?, Completion::ResponseSent);

    let reply = client_rx.recv().await.expect("response delivered");
    let reply = Envelope::decode(&VersionRegistry::new(), &reply.message)?;
    assert_eq!(reply.body, DiscoveryMessage::ProbeMatches(vec![printer()]));
    assert!(bystander_rx.try_recv().is_err());
    Ok(())
}
