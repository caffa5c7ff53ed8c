use crate::app::ports::{Delivery, MessageBusPort, Subscription};
use crate::error::{PipelineError, Result};
use crate::message::Channel;
use crate::metrics::BusMetrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1024;

/// In-process fan-out bus. Every subscriber sees every later publish.
pub struct InMemoryMessageBus {
    senders: Mutex<HashMap<Channel, broadcast::Sender<String>>>,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: Channel) -> Result<broadcast::Sender<String>> {
        let mut senders = self
            .senders
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("bus senders"))?;
        Ok(senders
            .entry(channel)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone())
    }
}

#[async_trait]
impl MessageBusPort for InMemoryMessageBus {
    fn service_name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, channel: Channel, payload: String) -> Result<()> {
        let sender = self.sender(channel)?;
        // No subscribers is not an error; the message is simply unobserved.
        let receivers = sender.send(payload).unwrap_or(0);
        debug!("Published on '{}' to {} subscriber(s)", channel, receivers);
        BusMetrics::record_published(channel.as_str());
        Ok(())
    }

    async fn subscribe(&self, channel: Channel, consumer: &str) -> Result<Subscription> {
        let mut source = self.sender(channel)?.subscribe();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let consumer = consumer.to_string();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(Delivery::new(channel, payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Consumer '{}' lagged on '{}', {} message(s) dropped", consumer, channel, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(rx, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let bus = InMemoryMessageBus::new();
        let mut parser = bus.subscribe(Channel::Validated, "parser").await.unwrap();
        let mut loader = bus.subscribe(Channel::Validated, "triplestore-loader").await.unwrap();

        bus.publish(Channel::Validated, "m1".to_string()).await.unwrap();
        bus.publish(Channel::Parsed, "other".to_string()).await.unwrap();

        assert_eq!(parser.next().await.unwrap().payload, "m1");
        assert_eq!(loader.next().await.unwrap().payload, "m1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InMemoryMessageBus::new();
        bus.publish(Channel::Indexed, "x".to_string()).await.unwrap();
    }
}
