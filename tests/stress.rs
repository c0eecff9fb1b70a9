//! Throughput and Concurrency Tests
//!
//! Tests that many independent messages are handled correctly when
//! processed concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use winter_supplement::core::calculate;
use winter_supplement::{
    CalculationRequest, Config, FamilyComposition, InMemoryTransport, MessageHandler, Router,
    Transport,
};

fn payload(id: &str, children: u64, composition: &str, in_pay: bool) -> String {
    json!({
        "id": id,
        "numberOfChildren": children,
        "familyComposition": composition,
        "familyUnitInPayForDecember": in_pay
    })
    .to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_router_handles_many_messages() {
    let transport = InMemoryTransport::new();
    for i in 0..500u64 {
        let composition = if i % 2 == 0 { "single" } else { "couple" };
        transport.push_message(
            format!("BRE/calculateWinterSupplementInput/user_{}", i),
            payload(&format!("user_{}", i), i % 7, composition, i % 3 != 0),
        );
    }

    let mut router = Router::new(Config::default(), transport.clone());
    router.connect().await;

    let published = transport.published();
    assert_eq!(published.len(), 500);

    let topics: HashSet<_> = published.iter().map(|m| m.topic.clone()).collect();
    assert_eq!(topics.len(), 500);

    for message in &published {
        let result: Value = serde_json::from_slice(&message.payload).unwrap();
        let id = result["id"].as_str().unwrap();
        assert!(message.topic.ends_with(id));

        let supplement = result["supplementAmount"].as_f64().unwrap();
        let base = result["baseAmount"].as_f64().unwrap();
        let children = result["childrenAmount"].as_f64().unwrap();
        assert_eq!(supplement, base + children);
        assert!(supplement >= 0.0);
        if result["isEligible"] == false {
            assert_eq!(supplement, 0.0);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handlers_share_nothing() {
    let transport = InMemoryTransport::new();
    transport.connect("localhost", 1883).await.unwrap();
    let handler = MessageHandler::new(Arc::new(Config::default()), Arc::new(transport.clone()));

    let mut tasks = Vec::new();
    for i in 0..100u64 {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            let topic = format!("BRE/calculateWinterSupplementInput/c{}", i);
            handler
                .process(&topic, payload(&format!("c{}", i), i, "couple", true).as_bytes())
                .await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let output_topic = task.await.unwrap().unwrap();
        assert_eq!(output_topic, format!("BRE/calculateWinterSupplementOutput/c{}", i));
    }

    for message in transport.published() {
        let result: Value = serde_json::from_slice(&message.payload).unwrap();
        let id = result["id"].as_str().unwrap();
        let children: u64 = id.trim_start_matches('c').parse().unwrap();
        assert_eq!(result["childrenAmount"], children as f64 * 20.0);
        assert_eq!(result["baseAmount"], 120.0);
    }
}

#[test]
fn test_calculation_across_threads() {
    let handles: Vec<_> = (0..8u64)
        .map(|thread| {
            std::thread::spawn(move || {
                (0..1000u64)
                    .map(|n| {
                        let request = CalculationRequest::new(
                            format!("t{}_{}", thread, n),
                            n,
                            FamilyComposition::Single,
                            true,
                        );
                        calculate(&request).supplement_amount
                    })
                    .sum::<f64>()
            })
        })
        .collect();

    // 1000 * 60 + 20 * (0 + 1 + ... + 999)
    let expected = 60_000.0 + 20.0 * 499_500.0;
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
