//! In-process fan-out of job transitions to streaming clients.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use adreel_models::{JobEvent, VideoJob};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct JobEventBus {
    tx: broadcast::Sender<JobEvent>,
    seq: Arc<AtomicU64>,
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl JobEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish the persisted state of `job`. Having no subscribers is fine.
    pub fn publish(&self, job: &VideoJob) -> JobEvent {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let event = JobEvent::from_job(job, seq);
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        trace!(job_id = %job.id, seq, receivers, "Published job event");
        event
    }

    /// Snapshot event for a job without advancing the sequence.
    pub fn snapshot(&self, job: &VideoJob) -> JobEvent {
        JobEvent::from_job(job, self.seq.load(Ordering::Relaxed))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::JobId;

    #[tokio::test]
    async fn test_events_carry_increasing_sequence() {
        let bus = JobEventBus::default();
        let mut rx = bus.subscribe();
        let job = VideoJob::new(JobId::from_string("op-12345678"), "s1", "lake", "ops/op-12345678", 1.5);

        bus.publish(&job);
        bus.publish(&job);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.seq > first.seq);
        assert_eq!(first.job_id, job.id);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = JobEventBus::new(4);
        let job = VideoJob::new(JobId::from_string("op-12345678"), "s1", "lake", "ops/op-12345678", 1.5);
        assert_eq!(bus.publish(&job).seq, 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
