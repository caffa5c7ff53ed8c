use crate::app::ports::{Acknowledger, Delivery, MessageBusPort, Subscription};
use crate::error::{PipelineError, Result};
use crate::message::Channel;
use crate::metrics::BusMetrics;
use crate::pipeline::meta::PipelineMeta;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogRecord {
    delivery_id: uuid::Uuid,
    channel: String,
    published_at: DateTime<Utc>,
    payload: String,
}

/// Durable bus: one append-only NDJSON log per channel. Consumer groups
/// track a committed byte offset and replay anything unacknowledged.
pub struct LogMessageBus {
    root: PathBuf,
    meta: Arc<PipelineMeta>,
    poll_interval: Duration,
}

impl LogMessageBus {
    pub fn new(root: impl Into<PathBuf>, meta: Arc<PipelineMeta>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            meta,
            poll_interval,
        }
    }

    fn log_path(&self, channel: Channel) -> PathBuf {
        self.root.join(format!("{}.ndjson", channel.as_str()))
    }
}

fn append(path: &Path, record: &LogRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Deliveries handed out but not yet acknowledged, keyed by end offset.
/// The committable offset never passes the start of the oldest of them.
#[derive(Debug, Default)]
struct InFlight {
    outstanding: BTreeMap<u64, u64>,
    acked_through: u64,
}

impl InFlight {
    fn starting_at(offset: u64) -> Self {
        Self {
            outstanding: BTreeMap::new(),
            acked_through: offset,
        }
    }

    fn dispatched(&mut self, start: u64, end: u64) {
        self.outstanding.insert(end, start);
    }

    /// Mark the delivery ending at `end` done; returns the new commit point.
    fn acknowledged(&mut self, end: u64) -> u64 {
        self.outstanding.remove(&end);
        self.acked_through = self.acked_through.max(end);
        match self.outstanding.values().min() {
            Some(&oldest_start) => oldest_start.min(self.acked_through),
            None => self.acked_through,
        }
    }
}

struct OffsetAcknowledger {
    meta: Arc<PipelineMeta>,
    consumer_key: String,
    in_flight: Arc<Mutex<InFlight>>,
}

impl Acknowledger for OffsetAcknowledger {
    fn ack(&self, delivery: &Delivery) -> Result<()> {
        let Some(end) = delivery.offset else {
            return Ok(());
        };
        let commit = self
            .in_flight
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("in-flight table"))?
            .acknowledged(end);
        self.meta
            .set_offset(&self.consumer_key, commit, Some(&delivery.delivery_id.to_string()))
    }
}

async fn read_new_lines(path: &Path, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    // Only hand out complete lines; a trailing partial write is read next poll.
    match buf.iter().rposition(|b| *b == b'\n') {
        Some(last) => buf.truncate(last + 1),
        None => buf.clear(),
    }
    Ok(buf)
}

#[async_trait]
impl MessageBusPort for LogMessageBus {
    fn service_name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, channel: Channel, payload: String) -> Result<()> {
        let record = LogRecord {
            delivery_id: uuid::Uuid::new_v4(),
            channel: channel.as_str().to_string(),
            published_at: Utc::now(),
            payload,
        };
        let path = self.log_path(channel);
        tokio::task::spawn_blocking(move || append(&path, &record))
            .await
            .map_err(|e| PipelineError::Bus(format!("append task failed: {}", e)))??;
        BusMetrics::record_published(channel.as_str());
        Ok(())
    }

    async fn subscribe(&self, channel: Channel, consumer: &str) -> Result<Subscription> {
        let consumer_key = format!("{}@{}", consumer, channel.as_str());
        let mut offset = self.meta.get_offset(&consumer_key)?;
        let path = self.log_path(channel);
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(64);
        let in_flight = Arc::new(Mutex::new(InFlight::starting_at(offset)));

        debug!("Consumer '{}' starting at byte offset {}", consumer_key, offset);
        let task_key = consumer_key.clone();
        let task_in_flight = in_flight.clone();
        tokio::spawn(async move {
            loop {
                let chunk = match read_new_lines(&path, offset).await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Failed to read bus log {}: {}", path.display(), e);
                        Vec::new()
                    }
                };
                for line in chunk.split_inclusive(|b| *b == b'\n') {
                    let start = offset;
                    offset += line.len() as u64;
                    let text = String::from_utf8_lossy(line);
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogRecord>(text) {
                        Ok(record) => {
                            let delivery = Delivery {
                                delivery_id: record.delivery_id,
                                channel,
                                payload: record.payload,
                                offset: Some(offset),
                            };
                            if let Ok(mut table) = task_in_flight.lock() {
                                table.dispatched(start, offset);
                            }
                            if tx.send(delivery).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Skipping malformed record for '{}': {}", task_key, e),
                    }
                }
                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        let acknowledger = OffsetAcknowledger {
            meta: self.meta.clone(),
            consumer_key,
            in_flight,
        };
        Ok(Subscription::new(rx, Some(Arc::new(acknowledger))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(dir: &Path, meta: Arc<PipelineMeta>) -> LogMessageBus {
        LogMessageBus::new(dir.join("bus"), meta, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn unacknowledged_messages_are_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(PipelineMeta::open(dir.path().join("meta.db")).unwrap());
        let bus = bus(dir.path(), meta.clone());

        bus.publish(Channel::Parsed, "first".to_string()).await.unwrap();
        bus.publish(Channel::Parsed, "second".to_string()).await.unwrap();

        {
            let mut sub = bus.subscribe(Channel::Parsed, "modeller").await.unwrap();
            let first = sub.next().await.unwrap();
            assert_eq!(first.payload, "first");
            sub.ack(&first).unwrap();
            let second = sub.next().await.unwrap();
            assert_eq!(second.payload, "second");
            // not acknowledged
        }

        let mut again = bus.subscribe(Channel::Parsed, "modeller").await.unwrap();
        assert_eq!(again.next().await.unwrap().payload, "second");
    }

    #[tokio::test]
    async fn later_ack_does_not_skip_an_unacknowledged_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(PipelineMeta::open(dir.path().join("meta.db")).unwrap());
        let bus = bus(dir.path(), meta.clone());

        bus.publish(Channel::Parsed, "A".to_string()).await.unwrap();
        bus.publish(Channel::Parsed, "B".to_string()).await.unwrap();

        {
            let mut sub = bus.subscribe(Channel::Parsed, "modeller").await.unwrap();
            let a = sub.next().await.unwrap();
            assert_eq!(a.payload, "A");
            let b = sub.next().await.unwrap();
            assert_eq!(b.payload, "B");
            sub.ack(&b).unwrap();
        }

        let mut again = bus.subscribe(Channel::Parsed, "modeller").await.unwrap();
        let replayed = again.next().await.unwrap();
        assert_eq!(replayed.payload, "A");
        again.ack(&replayed).unwrap();
        let b = again.next().await.unwrap();
        assert_eq!(b.payload, "B");
    }

    #[test]
    fn commit_point_waits_for_the_oldest_outstanding_delivery() {
        let mut table = InFlight::starting_at(0);
        table.dispatched(0, 10);
        table.dispatched(10, 25);
        table.dispatched(25, 40);
        assert_eq!(table.acknowledged(25), 0);
        assert_eq!(table.acknowledged(10), 25);
        assert_eq!(table.acknowledged(40), 40);
    }

    #[tokio::test]
    async fn consumer_groups_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(PipelineMeta::open(dir.path().join("meta.db")).unwrap());
        let bus = bus(dir.path(), meta);

        bus.publish(Channel::Validated, "m".to_string()).await.unwrap();
        let mut parser = bus.subscribe(Channel::Validated, "parser").await.unwrap();
        let mut loader = bus.subscribe(Channel::Validated, "triplestore-loader").await.unwrap();
        let d = parser.next().await.unwrap();
        parser.ack(&d).unwrap();
        assert_eq!(loader.next().await.unwrap().payload, "m");
    }
}
