use crate::app::ports::{Delivery, Subscription};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::message::{Channel, DeadLetter, OntologyMessage};
use crate::metrics::BusMetrics;
use crate::pipeline::runner::StageRunner;
use crate::pipeline::stage::{PipelineStage, StageKind, StageOutcome};
use crate::pipeline::stages::create_stage;
use chrono::Utc;
use std::future::Future;
use tracing::{error, info, warn};

/// How a delivery left the consumer. Either way it is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Processed(StageOutcome),
    DeadLettered { attempts: u32, error_kind: String },
}

/// Binds one stage to its input channel and turns stage errors into
/// retries or dead letters.
pub struct StageConsumer {
    ctx: PipelineContext,
    stage: Box<dyn PipelineStage>,
    consumer_name: String,
}

impl StageConsumer {
    pub fn new(ctx: PipelineContext, kind: StageKind) -> Self {
        Self {
            ctx,
            stage: create_stage(kind),
            consumer_name: kind.name().to_string(),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.stage.kind()
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        self.ctx
            .bus
            .subscribe(self.kind().input_channel(), &self.consumer_name)
            .await
    }

    /// Consume until `shutdown` resolves or the subscription closes. Returns
    /// an error when a delivery can be neither processed nor dead-lettered.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let mut subscription = self.subscribe().await?;
        info!(
            "Stage {} consuming '{}'",
            self.kind(),
            self.kind().input_channel()
        );
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stage {} shutting down", self.kind());
                    return Ok(());
                }
                delivery = subscription.next() => {
                    let Some(delivery) = delivery else {
                        warn!("Subscription for {} closed", self.kind());
                        return Ok(());
                    };
                    if let Err(e) = self.handle_delivery(&delivery).await {
                        // Stop rather than consume past it; a restart resumes
                        // from the last committed offset.
                        error!(
                            "Stage {} stopping: delivery {} could not be settled: {}",
                            self.kind(), delivery.delivery_id, e
                        );
                        return Err(e);
                    }
                    if let Err(e) = subscription.ack(&delivery) {
                        warn!(
                            "Ack of delivery {} for {} failed, it will be replayed: {}",
                            delivery.delivery_id, self.consumer_name, e
                        );
                    }
                }
            }
        }
    }

    /// Run the stage with in-process retries. Errors only when the dead
    /// letter itself cannot be published.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<DeliveryOutcome> {
        BusMetrics::record_delivered(delivery.channel.as_str(), &self.consumer_name);
        let message = match OntologyMessage::from_json(&delivery.payload) {
            Ok(message) => message,
            Err(e) => return self.dead_letter(delivery, 1, &e).await,
        };

        let retry = &self.ctx.config.retry;
        let runner = StageRunner::new(&self.ctx);
        let mut attempt = 1;
        loop {
            match runner.run(self.stage.as_ref(), &message).await {
                Ok(outcome) => return Ok(DeliveryOutcome::Processed(outcome)),
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let backoff = retry.backoff(attempt);
                    warn!(
                        "Attempt {}/{} of {} failed ({}), retrying in {:?}",
                        attempt, retry.max_attempts, self.consumer_name, e, backoff
                    );
                    BusMetrics::record_retried(&self.consumer_name);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return self.dead_letter(delivery, attempt, &e).await,
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, attempts: u32, err: &PipelineError) -> Result<DeliveryOutcome> {
        let letter = DeadLetter {
            stage: self.kind().name().to_string(),
            consumer: self.consumer_name.clone(),
            delivery_id: delivery.delivery_id,
            attempts,
            error: err.to_string(),
            error_kind: err.kind().as_str().to_string(),
            failed_at: Utc::now(),
            payload: delivery.payload.clone(),
        };
        error!(
            "Dead-lettering delivery {} for {} after {} attempt(s): {}",
            delivery.delivery_id, self.consumer_name, attempts, err
        );
        self.ctx
            .bus
            .publish(Channel::DeadLetter, serde_json::to_string(&letter)?)
            .await?;
        BusMetrics::record_dead_lettered(&self.consumer_name);
        Ok(DeliveryOutcome::DeadLettered {
            attempts,
            error_kind: letter.error_kind,
        })
    }
}
