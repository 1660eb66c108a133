//! End-to-end pipeline tests for the pricing engine
//!
//! Drives the full service through its public surface: updates published
//! into the channel transport flow through the consumer, ingester, and
//! calculator, fan out to subscribers, and become visible on the query path.

use std::sync::Arc;
use std::time::Duration;

use pricing_engine::broadcast::{BroadcastConfig, Broadcaster, Subscription};
use pricing_engine::calculator::PricingCalculator;
use pricing_engine::consumer::{
    channel_transport, ConsumerConfig, ConsumerHandle, PricingConsumer, UpdatePublisher,
};
use pricing_engine::events::{topics, PricingEvent, UpdateEnvelope};
use pricing_engine::ingestion::UpdateIngester;
use pricing_engine::metrics::ServiceMetrics;
use pricing_engine::query::PricingQueryService;
use rust_decimal::Decimal;
use serde_json::json;
use types::ids::Sku;
use types::material::Material;
use types::snapshot::{OfflineStrategy, PricingSnapshot};

struct Pipeline {
    publisher: UpdatePublisher,
    broadcaster: Arc<Broadcaster>,
    query: PricingQueryService,
    metrics: Arc<ServiceMetrics>,
    handle: ConsumerHandle,
}

fn start_pipeline() -> Pipeline {
    let metrics = Arc::new(ServiceMetrics::new());
    let calculator = PricingCalculator::with_defaults().into_shared();
    let broadcaster = Arc::new(Broadcaster::new(BroadcastConfig::default(), metrics.clone()));
    let ingester = UpdateIngester::new(calculator.clone(), metrics.clone());
    let query = PricingQueryService::new(calculator);
    let (publisher, transport) = channel_transport(64);

    let handle = PricingConsumer::spawn(
        transport,
        ingester,
        broadcaster.clone(),
        ConsumerConfig {
            poll_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(20),
        },
    );

    Pipeline {
        publisher,
        broadcaster,
        query,
        metrics,
        handle,
    }
}

/// Wait for the next pricing update on a subscription, skipping keepalives.
async fn next_pricing_update(subscription: &mut Subscription) -> (Sku, PricingSnapshot) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match subscription.receiver.recv().await {
                Some(PricingEvent::PricingUpdate { sku, pricing, .. }) => {
                    return (sku, pricing);
                }
                Some(_) => continue,
                None => panic!("subscription closed while waiting for pricing update"),
            }
        }
    })
    .await
    .expect("timed out waiting for pricing update")
}

#[tokio::test]
async fn pricing_pipeline_end_to_end() {
    let pipeline = start_pipeline();
    let mut subscription = pipeline.broadcaster.subscribe();
    let ring = Sku::new("RING_001");

    // Rate alone prices nothing
    pipeline
        .publisher
        .publish_rate(Material::Gold, Decimal::from(75_500_000_i64))
        .await
        .unwrap();

    // Weights arrive: the SKU becomes priceable and the change fans out
    pipeline
        .publisher
        .publish_weights(
            &ring,
            Material::Gold,
            "5.5".parse().unwrap(),
            Decimal::ZERO,
            Decimal::from(500_000),
            Decimal::from(15),
        )
        .await
        .unwrap();

    let (sku, snapshot) = next_pricing_update(&mut subscription).await;
    assert_eq!(sku, ring);
    assert_eq!(snapshot.base_price, Decimal::from(415_750_000_i64));
    assert_eq!(snapshot.final_price, Decimal::from(477_962_500_i64));

    // The query path sees the same snapshot, fresh
    let response = pipeline.query.get_pricing(&ring, OfflineStrategy::Freeze);
    assert!(response.success);
    assert!(!response.is_expired);
    assert_eq!(
        response.data.unwrap().final_price,
        Decimal::from(477_962_500_i64)
    );

    // A new rate reprices the SKU with no weights update involved
    pipeline
        .publisher
        .publish_rate(Material::Gold, Decimal::from(80_000_000_i64))
        .await
        .unwrap();

    let (sku, snapshot) = next_pricing_update(&mut subscription).await;
    assert_eq!(sku, ring);
    assert_eq!(snapshot.rate_used, Decimal::from(80_000_000_i64));
    assert_eq!(snapshot.final_price, Decimal::from(506_575_000_i64));

    let response = pipeline.query.get_pricing(&ring, OfflineStrategy::Freeze);
    assert_eq!(
        response.data.unwrap().final_price,
        Decimal::from(506_575_000_i64)
    );

    // An out-of-order rate (version 1 is long past) is dropped silently
    pipeline
        .publisher
        .send(UpdateEnvelope {
            topic: topics::RATES.to_string(),
            key: Some("gold".to_string()),
            payload: json!({
                "rate": 1,
                "rate_version": 1,
                "timestamp": "2020-01-01T00:00:00Z"
            }),
        })
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while pipeline.metrics.snapshot().updates_stale == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stale rate was never observed");

    let response = pipeline.query.get_pricing(&ring, OfflineStrategy::Freeze);
    assert_eq!(
        response.data.unwrap().final_price,
        Decimal::from(506_575_000_i64)
    );

    // Shutdown terminates subscriber streams rather than hanging them
    pipeline.handle.stop().await;
    loop {
        match subscription.receiver.recv().await {
            Some(_) => continue, // drain anything already queued
            None => break,
        }
    }
}

#[tokio::test]
async fn rate_fanout_covers_only_matching_material() {
    let pipeline = start_pipeline();

    for (sku, material) in [
        ("RING_GOLD_001", Material::Gold),
        ("RING_GOLD_002", Material::Gold),
        ("RING_SILVER_001", Material::Silver),
    ] {
        pipeline
            .publisher
            .publish_weights(
                &Sku::new(sku),
                material,
                "5.5".parse().unwrap(),
                Decimal::ZERO,
                Decimal::from(500_000),
                Decimal::from(15),
            )
            .await
            .unwrap();
    }

    let mut subscription = pipeline.broadcaster.subscribe();
    pipeline
        .publisher
        .publish_rate(Material::Gold, Decimal::from(75_500_000_i64))
        .await
        .unwrap();

    let (sku1, _) = next_pricing_update(&mut subscription).await;
    let (sku2, _) = next_pricing_update(&mut subscription).await;
    let mut repriced = vec![sku1.as_str().to_string(), sku2.as_str().to_string()];
    repriced.sort();
    assert_eq!(repriced, vec!["RING_GOLD_001", "RING_GOLD_002"]);

    // The silver SKU stays unpriced: no rate for silver yet
    let response = pipeline
        .query
        .get_pricing(&Sku::new("RING_SILVER_001"), OfflineStrategy::Freeze);
    assert!(!response.success);

    pipeline.handle.stop().await;
}

#[tokio::test]
async fn new_subscriber_receives_connected_dump() {
    let pipeline = start_pipeline();
    let ring = Sku::new("RING_001");

    pipeline
        .publisher
        .publish_rate(Material::Gold, Decimal::from(75_500_000_i64))
        .await
        .unwrap();
    pipeline
        .publisher
        .publish_weights(
            &ring,
            Material::Gold,
            "5.5".parse().unwrap(),
            Decimal::ZERO,
            Decimal::from(500_000),
            Decimal::from(15),
        )
        .await
        .unwrap();

    // Wait until the snapshot is queryable
    tokio::time::timeout(Duration::from_secs(2), async {
        while !pipeline.query.get_pricing(&ring, OfflineStrategy::Freeze).success {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("snapshot never became queryable");

    // A late subscriber gets the full dump up front
    let mut subscription = pipeline
        .broadcaster
        .subscribe_with_snapshot(pipeline.query.get_all_pricing().data);

    match tokio::time::timeout(Duration::from_secs(2), subscription.receiver.recv())
        .await
        .unwrap()
        .unwrap()
    {
        PricingEvent::Connected { pricing, .. } => {
            assert_eq!(pricing.len(), 1);
            assert_eq!(
                pricing.get(&ring).unwrap().final_price,
                Decimal::from(477_962_500_i64)
            );
        }
        other => panic!("Expected connected event, got {}", other.label()),
    }

    pipeline.handle.stop().await;
}

#[tokio::test]
async fn external_snapshot_installs_and_fans_out() {
    let pipeline = start_pipeline();
    let pendant = Sku::new("PENDANT_GOLD_001");
    let mut subscription = pipeline.broadcaster.subscribe();

    // A peer aggregator supplies a snapshot for a SKU this instance has
    // never priced itself
    let peer_snapshot = PricingSnapshot {
        sku: pendant.clone(),
        material: Material::Gold,
        weight_gram: "3.2".parse().unwrap(),
        stone_weight: Decimal::ZERO,
        labor_cost: Decimal::from(400_000),
        markup_percent: Decimal::from(10),
        rate_used: Decimal::from(75_500_000_i64),
        base_price: Decimal::from(242_000_000_i64),
        final_price: Decimal::from(266_200_000_i64),
        snapshot_version: 100,
        ttl_sec: 300,
        as_of: chrono::Utc::now(),
    };
    pipeline.publisher.publish_snapshot(&peer_snapshot).await.unwrap();

    let (sku, snapshot) = next_pricing_update(&mut subscription).await;
    assert_eq!(sku, pendant);
    assert_eq!(snapshot.final_price, Decimal::from(266_200_000_i64));

    // Redelivery of the same version is dropped
    pipeline.publisher.publish_snapshot(&peer_snapshot).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while pipeline.metrics.snapshot().updates_stale == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("duplicate snapshot was never observed as stale");

    let response = pipeline.query.get_pricing(&pendant, OfflineStrategy::Freeze);
    assert!(response.success);
    assert_eq!(
        response.data.unwrap().final_price,
        Decimal::from(266_200_000_i64)
    );

    pipeline.handle.stop().await;
}
