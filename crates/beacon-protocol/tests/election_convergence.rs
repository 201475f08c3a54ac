//! Integration tests: several discover instances on one relay hub.
//!
//! The clock is paused, so timer-driven behavior runs deterministically.

use std::time::Duration;

use beacon_protocol::{
    Discover, DiscoverConfig, DiscoverError, DiscoverEvent, RelayHub, TransportConfig,
};
use tokio::sync::broadcast;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();
}

fn on_hub(hub: &RelayHub) -> TransportConfig {
    TransportConfig::new().relay(hub.clone()).ignore_process(false)
}

fn node(hub: &RelayHub, weight: f64) -> DiscoverConfig {
    DiscoverConfig::new().weight(weight).transport(on_hub(hub))
}

fn drain(rx: &mut broadcast::Receiver<DiscoverEvent>) -> Vec<DiscoverEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A lone instance promotes itself on its first check.
#[tokio::test(start_paused = true)]
async fn lone_instance_promotes_within_one_check() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let solo = Discover::new(node(&hub, 1.0)).unwrap();
    let mut events = solo.events();
    solo.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert!(!solo.me().await.unwrap().is_master);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let me = solo.me().await.unwrap();
    assert!(me.is_master);
    assert!(me.is_master_eligible);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(DiscoverEvent::HelloEmitted)));
    assert!(events.iter().any(|e| matches!(e, DiscoverEvent::Started)));
    assert!(events.iter().any(|e| matches!(e, DiscoverEvent::Check)));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, DiscoverEvent::Promotion { .. }))
            .count(),
        1
    );
}

/// Weights 10 and 20, started together: the heavier one ends up sole master.
#[tokio::test(start_paused = true)]
async fn heavier_instance_wins() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let light = Discover::new(node(&hub, 10.0)).unwrap();
    let heavy = Discover::new(node(&hub, 20.0)).unwrap();
    let mut light_events = light.events();

    light.start().await.unwrap();
    heavy.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(heavy.me().await.unwrap().is_master);
    assert!(!light.me().await.unwrap().is_master);

    let seen_by_light = light.nodes().await;
    assert_eq!(seen_by_light.len(), 1);
    assert_eq!(seen_by_light[0].id, heavy.instance_id());
    assert!(seen_by_light[0].is_master);
    assert_eq!(seen_by_light[0].weight, 20.0);

    let seen_by_heavy = heavy.nodes().await;
    assert_eq!(seen_by_heavy.len(), 1);
    assert_eq!(seen_by_heavy[0].id, light.instance_id());
    assert!(!seen_by_heavy[0].is_master);

    let events = drain(&mut light_events);
    let added = events
        .iter()
        .filter(|e| matches!(e, DiscoverEvent::Added { node } if node.id == heavy.instance_id()))
        .count();
    assert_eq!(added, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, DiscoverEvent::Master { node } if node.id == heavy.instance_id())));
    assert!(!events
        .iter()
        .any(|e| matches!(e, DiscoverEvent::Promotion { .. })));
}

/// A stopped master is evicted after its timeout and a survivor takes over.
#[tokio::test(start_paused = true)]
async fn stopped_master_is_evicted_and_replaced() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let light = Discover::new(node(&hub, 10.0)).unwrap();
    let heavy = Discover::new(node(&hub, 20.0)).unwrap();
    light.start().await.unwrap();
    heavy.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(heavy.me().await.unwrap().is_master);

    let mut light_events = light.events();
    assert!(heavy.stop().await);

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert!(light.nodes().await.is_empty());
    assert!(light.me().await.unwrap().is_master);

    let events = drain(&mut light_events);
    let removed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            DiscoverEvent::Removed { node } => Some(node.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![heavy.instance_id().to_string()]);
    assert!(events
        .iter()
        .any(|e| matches!(e, DiscoverEvent::Promotion { .. })));
}

/// A permanently demoted instance never promotes, even alone.
#[tokio::test(start_paused = true)]
async fn permanent_demotion_blocks_promotion() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let solo = Discover::new(node(&hub, 100.0)).unwrap();
    solo.demote(true).await.unwrap();
    let mut events = solo.events();
    solo.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;

    let me = solo.me().await.unwrap();
    assert!(!me.is_master);
    assert!(!me.is_master_eligible);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, DiscoverEvent::Promotion { .. })));

    // An explicit promote restores eligibility.
    solo.promote().await.unwrap();
    let me = solo.me().await.unwrap();
    assert!(me.is_master && me.is_master_eligible);
}

/// Instances with different keys never see each other and raise no errors.
#[tokio::test(start_paused = true)]
async fn mismatched_keys_stay_invisible() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let a = Discover::new(
        DiscoverConfig::new()
            .weight(1.0)
            .transport(on_hub(&hub).key("alpha")),
    )
    .unwrap();
    let b = Discover::new(
        DiscoverConfig::new()
            .weight(2.0)
            .transport(on_hub(&hub).key("beta")),
    )
    .unwrap();
    let mut b_events = b.events();

    a.start().await.unwrap();
    b.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(a.nodes().await.is_empty());
    assert!(b.nodes().await.is_empty());

    let events = drain(&mut b_events);
    assert!(!events.iter().any(|e| matches!(
        e,
        DiscoverEvent::Added { .. }
            | DiscoverEvent::HelloReceived { .. }
            | DiscoverEvent::Error { .. }
    )));
}

/// Peers see each other's advertisement after the next announcement.
#[tokio::test(start_paused = true)]
async fn advertisement_propagates() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let a = Discover::new(node(&hub, 1.0)).unwrap();
    let b = Discover::new(node(&hub, 2.0)).unwrap();
    a.start().await.unwrap();
    b.start().await.unwrap();

    a.advertise(Some(serde_json::json!({"http": 8080})))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let mut ads = Vec::new();
    b.each_node(|node| ads.push(node.advertisement.clone())).await;
    assert_eq!(ads, vec![Some(serde_json::json!({"http": 8080}))]);
}

/// An observer tracks announcers without announcing or competing.
#[tokio::test(start_paused = true)]
async fn observer_tracks_without_announcing() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let observer = Discover::new(
        DiscoverConfig::new()
            .client(true)
            .weight(1_000.0)
            .transport(on_hub(&hub)),
    )
    .unwrap();
    let announcer = Discover::new(
        DiscoverConfig::new()
            .server(true)
            .weight(1.0)
            .transport(on_hub(&hub)),
    )
    .unwrap();

    observer.start().await.unwrap();
    announcer.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let seen = observer.nodes().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, announcer.instance_id());
    assert!(announcer.nodes().await.is_empty());

    assert!(!observer.me().await.unwrap().is_master);
    assert!(announcer.me().await.unwrap().is_master);
}

/// Announce-only instances still listen, so they settle on one master.
#[tokio::test(start_paused = true)]
async fn announce_only_instances_converge() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let announcer = |weight: f64| {
        Discover::new(
            DiscoverConfig::new()
                .server(true)
                .weight(weight)
                .transport(on_hub(&hub)),
        )
        .unwrap()
    };
    let light = announcer(10.0);
    let heavy = announcer(20.0);

    light.start().await.unwrap();
    heavy.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(heavy.me().await.unwrap().is_master);
    assert!(!light.me().await.unwrap().is_master);

    let seen_by_light = light.nodes().await;
    assert_eq!(seen_by_light.len(), 1);
    assert_eq!(seen_by_light[0].id, heavy.instance_id());
    assert!(seen_by_light[0].is_master);
    assert_eq!(heavy.nodes().await.len(), 1);
}

/// Named channels ride on the same medium.
#[tokio::test(start_paused = true)]
async fn channels_deliver_between_instances() {
    init_tracing();

    let hub = RelayHub::new(1024);
    let a = Discover::new(node(&hub, 1.0)).unwrap();
    let b = Discover::new(node(&hub, 2.0)).unwrap();
    a.start().await.unwrap();
    b.start().await.unwrap();

    let mut jobs = b.join("jobs").await.unwrap();
    assert!(matches!(
        b.join("jobs").await,
        Err(DiscoverError::AlreadyJoined(_))
    ));

    a.send("jobs", Some(serde_json::json!({"id": 7}))).await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(1), jobs.recv())
        .await
        .expect("channel message timed out")
        .unwrap();
    assert_eq!(msg.channel(), "jobs");
    assert_eq!(msg.sender(), a.instance_id());
    assert_eq!(msg.data().unwrap()["id"], 7);

    a.send("jobs", None).await.unwrap();
    let bare = tokio::time::timeout(Duration::from_secs(1), jobs.recv())
        .await
        .expect("channel message timed out")
        .unwrap();
    assert_eq!(bare.sender(), a.instance_id());
    assert!(bare.data().is_none());

    assert!(matches!(
        a.send("hello", None).await,
        Err(DiscoverError::ReservedEvent(_))
    ));
    assert!(matches!(
        b.join("master").await,
        Err(DiscoverError::ReservedEvent(_))
    ));

    assert!(b.leave("jobs").await);
    assert!(!b.leave("jobs").await);

    a.stop().await;
    assert!(matches!(
        a.send("jobs", None).await,
        Err(DiscoverError::NotRunning)
    ));
}
