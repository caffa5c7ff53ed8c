mod common;

use async_trait::async_trait;
use common::{at, memory_context, submit};
use ontopop_pipeline::app::ports::{Acknowledger, Delivery, MessageBusPort, Subscription};
use ontopop_pipeline::message::{Channel, Container, DeadLetter};
use ontopop_pipeline::pipeline::{DeliveryOutcome, StageConsumer, StageKind, StageOutcome};
use ontopop_pipeline::{OntologyMessage, PipelineError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{mpsc, oneshot};

/// Bus whose dead-letter channel is down.
struct DeadLetterOutage {
    inner: Arc<dyn MessageBusPort>,
}

#[async_trait]
impl MessageBusPort for DeadLetterOutage {
    fn service_name(&self) -> &'static str {
        "dead-letter-outage"
    }

    async fn publish(&self, channel: Channel, payload: String) -> ontopop_pipeline::Result<()> {
        if channel == Channel::DeadLetter {
            return Err(PipelineError::Bus("dead-letter channel unavailable".into()));
        }
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: Channel, consumer: &str) -> ontopop_pipeline::Result<Subscription> {
        self.inner.subscribe(channel, consumer).await
    }
}

struct FailingAcks;

impl Acknowledger for FailingAcks {
    fn ack(&self, _delivery: &Delivery) -> ontopop_pipeline::Result<()> {
        Err(PipelineError::Bus("offset store unavailable".into()))
    }
}

/// Hands the `validated` consumer a scripted stream whose acks always fail.
struct FailingAckBus {
    inner: Arc<dyn MessageBusPort>,
    validated: Mutex<Option<mpsc::Receiver<Delivery>>>,
}

#[async_trait]
impl MessageBusPort for FailingAckBus {
    fn service_name(&self) -> &'static str {
        "failing-ack"
    }

    async fn publish(&self, channel: Channel, payload: String) -> ontopop_pipeline::Result<()> {
        self.inner.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: Channel, consumer: &str) -> ontopop_pipeline::Result<Subscription> {
        let scripted = match channel {
            Channel::Validated => self.validated.lock().unwrap().take(),
            _ => None,
        };
        if let Some(rx) = scripted {
            return Ok(Subscription::new(rx, Some(Arc::new(FailingAcks))));
        }
        self.inner.subscribe(channel, consumer).await
    }
}

#[tokio::test]
async fn processes_an_ingested_delivery() {
    let dir = tempdir().unwrap();
    let ctx = memory_context(dir.path());
    let message = submit(&ctx, 1, "pizza_v1.owl", at(1, 9)).await;
    let mut validated = ctx.bus.subscribe(Channel::Validated, "audit").await.unwrap();

    let consumer = StageConsumer::new(ctx.clone(), StageKind::Validator);
    let delivery = Delivery::new(Channel::Ingested, message.to_json().unwrap());
    let outcome = consumer.handle_delivery(&delivery).await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Processed(StageOutcome::Completed { .. })));

    let published = validated.next().await.unwrap();
    let next = OntologyMessage::from_json(&published.payload).unwrap();
    assert!(next.semantically_valid);
    assert!(ctx
        .storage
        .object_exists(Container::Validated, &next.processed_filename)
        .await
        .unwrap());
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered_at_once() {
    let dir = tempdir().unwrap();
    let ctx = memory_context(dir.path());
    let mut dead_letters = ctx.bus.subscribe(Channel::DeadLetter, "audit").await.unwrap();

    let consumer = StageConsumer::new(ctx.clone(), StageKind::Parser);
    let delivery = Delivery::new(Channel::Validated, r#"{"ontologyId": "seven"}"#.to_string());
    let outcome = consumer.handle_delivery(&delivery).await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::DeadLettered {
            attempts: 1,
            error_kind: "fatal".to_string()
        }
    );

    let letter: DeadLetter = serde_json::from_str(&dead_letters.next().await.unwrap().payload).unwrap();
    assert_eq!(letter.stage, "parser");
    assert_eq!(letter.delivery_id, delivery.delivery_id);
    assert_eq!(letter.payload, delivery.payload);
}

#[tokio::test]
async fn missing_artifact_is_retried_then_dead_lettered() {
    let dir = tempdir().unwrap();
    let ctx = memory_context(dir.path());
    let mut dead_letters = ctx.bus.subscribe(Channel::DeadLetter, "audit").await.unwrap();
    let max_attempts = ctx.config.retry.max_attempts;

    let forged = OntologyMessage::new(9, 9).with_semantic_validity(true);
    let consumer = StageConsumer::new(ctx.clone(), StageKind::TriplestoreLoader);
    let delivery = Delivery::new(Channel::Validated, forged.to_json().unwrap());
    let outcome = consumer.handle_delivery(&delivery).await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::DeadLettered {
            attempts: max_attempts,
            error_kind: "transient".to_string()
        }
    );

    let letter: DeadLetter = serde_json::from_str(&dead_letters.next().await.unwrap().payload).unwrap();
    assert_eq!(letter.attempts, max_attempts);
    assert_eq!(letter.consumer, "triplestore_loader");
}

#[tokio::test]
async fn unparseable_ontology_is_not_retried() {
    let dir = tempdir().unwrap();
    let ctx = memory_context(dir.path());
    let broken = dir.path().join("broken.owl");
    std::fs::write(&broken, "this is not RDF/XML").unwrap();
    let message = OntologyMessage::new(4, 1);
    ctx.storage.create_container(Container::Ingested).await.unwrap();
    ctx.storage
        .upload_object(&broken, Container::Ingested, &message.processed_filename)
        .await
        .unwrap();

    let consumer = StageConsumer::new(ctx.clone(), StageKind::Validator);
    let delivery = Delivery::new(Channel::Ingested, message.to_json().unwrap());
    match consumer.handle_delivery(&delivery).await.unwrap() {
        DeliveryOutcome::DeadLettered { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected a dead letter, got {:?}", other),
    }
}

#[tokio::test]
async fn run_returns_when_shutdown_resolves() {
    let dir = tempdir().unwrap();
    let ctx = memory_context(dir.path());
    let consumer = StageConsumer::new(ctx, StageKind::Indexer);
    assert_eq!(consumer.kind(), StageKind::Indexer);
    consumer.run(async {}).await.unwrap();
}

#[tokio::test]
async fn consumer_stops_when_a_delivery_cannot_be_dead_lettered() {
    let dir = tempdir().unwrap();
    let mut ctx = memory_context(dir.path());
    ctx.bus = Arc::new(DeadLetterOutage { inner: ctx.bus.clone() });

    let consumer = StageConsumer::new(ctx.clone(), StageKind::Parser);
    let running = tokio::spawn(async move { consumer.run(std::future::pending::<()>()).await });
    // Give the consumer time to subscribe before publishing
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctx.bus
        .publish(Channel::Validated, r#"{"ontologyId": "seven"}"#.to_string())
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("consumer kept running past an unsettled delivery")
        .unwrap();
    assert!(matches!(result, Err(PipelineError::Bus(_))));
}

#[tokio::test]
async fn failed_ack_does_not_stop_the_consumer() {
    let dir = tempdir().unwrap();
    let mut ctx = memory_context(dir.path());
    let (tx, rx) = mpsc::channel(4);
    ctx.bus = Arc::new(FailingAckBus {
        inner: ctx.bus.clone(),
        validated: Mutex::new(Some(rx)),
    });
    let mut dead_letters = ctx.bus.subscribe(Channel::DeadLetter, "audit").await.unwrap();
    for _ in 0..2 {
        tx.send(Delivery::new(Channel::Validated, "not json".to_string()))
            .await
            .unwrap();
    }

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let consumer = StageConsumer::new(ctx.clone(), StageKind::Parser);
    let running = tokio::spawn(async move {
        consumer
            .run(async {
                let _ = stop_rx.await;
            })
            .await
    });

    // Both deliveries are handled even though every ack fails
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(5), dead_letters.next())
            .await
            .unwrap()
            .unwrap();
    }
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
