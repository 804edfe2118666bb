// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end alias behaviour against the in-process broker.

use aliasd_core::application::alias_server::AliasServer;
use aliasd_core::domain::broker::{Broker, Handler};
use aliasd_core::domain::config::ServerConfig;
use aliasd_core::domain::payload::Payload;
use aliasd_core::domain::registration::Registration;
use aliasd_core::infrastructure::in_memory_broker::InMemoryBroker;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct Fixture {
    hub: InMemoryBroker,
    server: Arc<AliasServer>,
    errors: mpsc::UnboundedReceiver<Payload>,
}

async fn fixture() -> Fixture {
    let hub = InMemoryBroker::new();
    let server = AliasServer::new(Arc::new(hub.client()), ServerConfig::default());
    server.initialize().await.unwrap();

    let (sender, errors) = mpsc::unbounded_channel();
    hub.watch_event(
        "meta/alias/error",
        Handler::new(move |_path, payload| {
            let sender = sender.clone();
            async move {
                let _ = sender.send(payload);
                Ok(())
            }
        }),
    )
    .await
    .unwrap();
    hub.settle().await;

    Fixture { hub, server, errors }
}

fn registration(value: Value) -> Registration {
    serde_json::from_value(value).unwrap()
}

fn entry(target: &str, alias: &str) -> Value {
    json!({
        "target": target,
        "alias": alias,
        "transform": null,
        "inverse": null,
        "description": "",
    })
}

async fn settled(hub: &InMemoryBroker) {
    timeout(Duration::from_secs(3), hub.settle())
        .await
        .expect("broker did not settle");
}

#[tokio::test]
async fn test_property_alias_round_trip() {
    let Fixture { hub, server, .. } = fixture().await;
    let device = hub.client();
    device
        .register(
            "foo/target",
            &registration(json!({
                "behaviour": "PROPERTY-1:N",
                "description": "Brightness",
                "delete_on_unregister": true,
            })),
        )
        .await
        .unwrap();

    hub.send_event(
        "meta/alias/add",
        json!({
            "target": "foo/target",
            "alias": "foo/alias",
            "transform": "value / 63.0",
            "inverse": "int(value * 63)",
            "description": "Brightness from 0 to 1.",
        })
        .into(),
    )
    .await
    .unwrap();
    hub.settle().await;

    assert_eq!(
        hub.registrations("foo/alias"),
        Some(vec![registration(json!({
            "behaviour": "PROPERTY-1:N",
            "description": "Brightness from 0 to 1.",
            "delete_on_unregister": true,
        }))])
    );
    assert_eq!(
        hub.property("meta/alias/aliases"),
        Some(server.committed().await.to_value())
    );

    device.set_property("foo/target", json!(63)).await.unwrap();
    hub.settle().await;
    assert_eq!(hub.property("foo/alias"), Some(json!(1.0)));

    hub.set_property("foo/alias", json!(2.0)).await.unwrap();
    hub.settle().await;
    assert_eq!(hub.property("foo/target"), Some(json!(126)));
    assert_eq!(hub.property("foo/alias"), Some(json!(2.0)));

    // Target disappears: alias unregistered and its value deleted
    device.unregister("foo/target").await.unwrap();
    hub.settle().await;
    assert_eq!(hub.registrations("foo/alias"), None);
    assert_eq!(hub.property("foo/target"), None);
    assert_eq!(hub.property("foo/alias"), None);
}

#[tokio::test]
async fn test_event_alias_follows_kind_change() {
    let Fixture { hub, server: _server, .. } = fixture().await;
    let device = hub.client();

    hub.send_event("meta/alias/add", json!(["foo/target", "foo/alias"]).into())
        .await
        .unwrap();
    device
        .register("foo/target", &registration(json!({"behaviour": "EVENT-1:N"})))
        .await
        .unwrap();
    hub.settle().await;

    let (sender, mut received) = mpsc::unbounded_channel();
    hub.watch_event(
        "foo/alias",
        Handler::new(move |_path, payload| {
            let sender = sender.clone();
            async move {
                let _ = sender.send(payload);
                Ok(())
            }
        }),
    )
    .await
    .unwrap();

    device.send_event("foo/target", json!("click").into()).await.unwrap();
    hub.settle().await;
    assert_eq!(received.try_recv().unwrap(), Payload::Value(json!("click")));
    assert!(received.try_recv().is_err());

    // Now a property: events are no longer forwarded
    device
        .register("foo/target", &registration(json!({"behaviour": "PROPERTY-N:1"})))
        .await
        .unwrap();
    hub.settle().await;
    assert_eq!(
        hub.registrations("foo/alias").unwrap()[0].behaviour.to_string(),
        "PROPERTY-N:1"
    );
    device.send_event("foo/target", json!("click").into()).await.unwrap();
    device.set_property("foo/target", json!(true)).await.unwrap();
    hub.settle().await;
    assert!(received.try_recv().is_err());
    assert_eq!(hub.property("foo/alias"), Some(json!(true)));
}

#[tokio::test]
async fn test_cycle_written_to_property_is_reverted() {
    let Fixture { hub, server, mut errors } = fixture().await;
    hub.send_event("meta/alias/add", json!(["a", "b"]).into())
        .await
        .unwrap();
    hub.settle().await;
    let committed = server.committed().await.to_value();

    hub.set_property("meta/alias/aliases", json!({"b": entry("a", "b"), "a": entry("b", "a")}))
        .await
        .unwrap();
    hub.settle().await;

    let Payload::Value(Value::String(message)) = errors.try_recv().unwrap() else {
        panic!("expected an error message");
    };
    assert!(message.contains("a -> b -> a") || message.contains("b -> a -> b"), "{message}");
    assert_eq!(hub.property("meta/alias/aliases"), Some(committed.clone()));
    assert_eq!(server.committed().await.to_value(), committed);
}

#[tokio::test]
async fn test_transform_errors_are_published() {
    let Fixture {
        hub,
        server: _server,
        mut errors,
    } = fixture().await;
    let device = hub.client();
    device
        .register("foo/target", &registration(json!({"behaviour": "PROPERTY-1:N"})))
        .await
        .unwrap();
    hub.send_event(
        "meta/alias/add",
        json!({"target": "foo/target", "alias": "foo/alias", "transform": "math.floor(value)"}).into(),
    )
    .await
    .unwrap();
    hub.settle().await;

    device.set_property("foo/target", json!("bad")).await.unwrap();
    hub.settle().await;

    // Passed through untouched
    assert_eq!(hub.property("foo/alias"), Some(json!("bad")));
    let error = timeout(Duration::from_secs(1), errors.recv())
        .await
        .expect("error event")
        .unwrap();
    assert!(matches!(error, Payload::Value(Value::String(ref m)) if m.contains("foo/alias")));
}

#[tokio::test]
async fn test_close_withdraws_everything() {
    let Fixture { hub, server, .. } = fixture().await;
    let device = hub.client();
    device
        .register("foo/target", &registration(json!({"behaviour": "EVENT-1:N", "on_unregister": "bye"})))
        .await
        .unwrap();
    hub.send_event("meta/alias/add", json!(["foo/target", "foo/alias"]).into())
        .await
        .unwrap();
    hub.settle().await;
    assert!(hub.registrations("foo/alias").is_some());

    server.close().await.unwrap();
    hub.settle().await;

    for path in ["meta/alias/add", "meta/alias/remove", "meta/alias/aliases", "meta/alias/error", "foo/alias"] {
        assert_eq!(hub.registrations(path), None, "{path}");
    }
    assert_eq!(hub.property("meta/alias/aliases"), None);
}

#[tokio::test]
async fn test_queued_requests_converge() {
    let Fixture { hub, server, mut errors } = fixture().await;

    hub.send_event("meta/alias/add", json!(["a/target", "a/alias"]).into())
        .await
        .unwrap();
    hub.send_event("meta/alias/add", json!(["b/target", "b/alias"]).into())
        .await
        .unwrap();
    hub.send_event("meta/alias/add", json!(["c/target", "c/alias"]).into())
        .await
        .unwrap();
    hub.send_event("meta/alias/remove", json!("a/alias").into())
        .await
        .unwrap();
    settled(&hub).await;

    let committed = server.committed().await;
    assert_eq!(
        committed.keys().cloned().collect::<Vec<_>>(),
        vec!["b/alias".to_string(), "c/alias".to_string()]
    );
    assert_eq!(hub.property("meta/alias/aliases"), Some(committed.to_value()));
    assert!(server.alias("a/alias").await.is_none());
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn test_external_write_during_add_wins() {
    let Fixture { hub, server, mut errors } = fixture().await;

    hub.send_event("meta/alias/add", json!(["a/target", "a/alias"]).into())
        .await
        .unwrap();
    hub.set_property("meta/alias/aliases", json!({"b/alias": entry("b/target", "b/alias")}))
        .await
        .unwrap();
    settled(&hub).await;

    let committed = server.committed().await;
    assert_eq!(committed.to_value(), json!({"b/alias": entry("b/target", "b/alias")}));
    assert_eq!(hub.property("meta/alias/aliases"), Some(committed.to_value()));
    assert!(server.alias("a/alias").await.is_none());
    assert!(server.alias("b/alias").await.is_some());
    assert!(errors.try_recv().is_err());

    // Still responsive afterwards
    hub.send_event("meta/alias/add", json!(["c/target", "c/alias"]).into())
        .await
        .unwrap();
    settled(&hub).await;
    assert_eq!(server.committed().await.len(), 2);
}
