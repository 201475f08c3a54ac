//! Transports meeting on a Redis pub/sub channel.
//!
//! Needs a reachable Redis server; set `REDIS_URL` to override the local
//! default.

use std::time::Duration;

use beacon_transport::{Transport, TransportConfig};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into())
}

#[tokio::test]
#[ignore] // Manual run: cargo test -p beacon-transport --test redis_relay -- --ignored
async fn redis_channel_exchange() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();

    let config = || {
        TransportConfig::new()
            .redis(redis_url())
            .redis_channel("beacon-redis-relay-test")
            .ignore_process(false)
    };
    let mut node_b = Transport::bind(config()).await.unwrap();
    let node_a_config = config().host_name("node-a");
    let mut node_a = Transport::bind(node_a_config).await.unwrap();

    let payload = Some(serde_json::json!({"isMaster": false, "weight": 3.0}));
    node_a.send("hello", payload.clone()).await.unwrap();
    node_a.send("hello", payload).await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), node_b.recv())
        .await
        .expect("redis recv timed out")
        .unwrap();
    assert!(first.envelope.is_hello());
    assert_eq!(first.envelope.iid, node_a.instance_id());
    assert_eq!(first.envelope.host_name, "node-a");
    assert!(!first.repeat);

    let second = tokio::time::timeout(Duration::from_secs(5), node_b.recv())
        .await
        .expect("redis recv timed out")
        .unwrap();
    assert!(second.repeat);

    node_a.stop();
    node_b.stop();
}
