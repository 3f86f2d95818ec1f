//! Conversation dispatcher: fixed shards of (bounded queue, worker).
//!
//! A subscriber always hashes to the same shard and a shard handles one
//! message at a time, so each subscriber's messages are processed in arrival
//! order. Different subscribers on different shards run in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use linktracker_core::config::DispatcherConfig;
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::{MessageHandler, Messenger};
use linktracker_core::types::{IncomingMessage, SubscriberId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub struct Dispatcher {
    shards: Vec<mpsc::Sender<IncomingMessage>>,
    workers: Vec<JoinHandle<usize>>,
}

impl Dispatcher {
    /// Spawn one worker per shard.
    pub fn start(
        handler: Arc<dyn MessageHandler>,
        messenger: Arc<dyn Messenger>,
        config: &DispatcherConfig,
    ) -> Self {
        let count = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (shards, workers) = (0..count)
            .map(|index| {
                let (tx, rx) = mpsc::channel(capacity);
                let worker = tokio::spawn(run_shard(index, rx, handler.clone(), messenger.clone()));
                (tx, worker)
            })
            .unzip();

        tracing::info!("📨 Dispatcher started: {count} shard(s), queue {capacity}");
        Self { shards, workers }
    }

    /// Shard owning `subscriber` among `shards`.
    pub fn shard_for(subscriber: SubscriberId, shards: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        subscriber.hash(&mut hasher);
        (hasher.finish() % shards.max(1) as u64) as usize
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Queue a message on its subscriber's shard. Waits while that shard's
    /// queue is full.
    pub async fn submit(&self, message: IncomingMessage) -> Result<()> {
        let shard = Self::shard_for(message.subscriber, self.shards.len());
        self.shards[shard]
            .send(message)
            .await
            .map_err(|e| LinkTrackerError::Channel(format!("shard {shard} closed, dropped message from {}", e.0.subscriber)))
    }

    /// Feed `inbound` into the shards until it ends or `shutdown` fires, then
    /// shut down. Returns the number of messages handled.
    pub async fn run<S>(self, inbound: S, mut shutdown: watch::Receiver<bool>) -> usize
    where
        S: Stream<Item = IncomingMessage> + Send,
    {
        let mut inbound = std::pin::pin!(inbound);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                // A dropped sender also ends intake.
                changed = shutdown.changed() => if changed.is_err() { break },
                next = inbound.next() => match next {
                    Some(message) => {
                        if let Err(e) = self.submit(message).await {
                            tracing::warn!("⚠️ {e}");
                        }
                    }
                    None => {
                        tracing::info!("📨 Inbound stream ended");
                        break;
                    }
                },
            }
        }
        self.shutdown().await
    }

    /// Close every shard queue and wait for the workers to finish what is
    /// already queued. Returns the number of messages handled.
    pub async fn shutdown(self) -> usize {
        let Dispatcher { shards, workers } = self;
        drop(shards);

        let mut handled = 0;
        for (index, worker) in workers.into_iter().enumerate() {
            match worker.await {
                Ok(count) => handled += count,
                Err(e) => tracing::error!("❌ Dispatcher shard {index} panicked: {e}"),
            }
        }
        tracing::info!("📨 Dispatcher stopped ({handled} message(s) handled)");
        handled
    }
}

async fn run_shard(
    index: usize,
    mut queue: mpsc::Receiver<IncomingMessage>,
    handler: Arc<dyn MessageHandler>,
    messenger: Arc<dyn Messenger>,
) -> usize {
    let mut handled = 0;
    while let Some(message) = queue.recv().await {
        let reply = handler.handle(&message).await;
        handled += 1;
        if reply.is_empty() {
            continue;
        }
        if let Err(e) = messenger.deliver(message.subscriber, &reply).await {
            tracing::warn!("⚠️ Reply to {} via {} failed: {e}", message.subscriber, messenger.name());
        }
    }
    tracing::debug!("Shard {index} drained after {handled} message(s)");
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records what it sees; a short pause per message widens race windows.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<IncomingMessage>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, message: &IncomingMessage) -> String {
            let pause = (message.subscriber.0 as u64 * 7 + message.text.len() as u64) % 3;
            tokio::time::sleep(Duration::from_millis(pause)).await;
            self.seen.lock().unwrap().push(message.clone());
            if message.text.starts_with("quiet") {
                String::new()
            } else {
                format!("echo {}", message.text)
            }
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<(SubscriberId, String)>>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((subscriber, text.to_string()));
            Ok(())
        }
    }

    fn config(workers: usize, queue_capacity: usize) -> DispatcherConfig {
        DispatcherConfig {
            workers,
            queue_capacity,
        }
    }

    /// Interleaved messages from several subscribers.
    fn traffic(subscribers: i64, per_subscriber: usize) -> Vec<IncomingMessage> {
        (0..per_subscriber)
            .flat_map(|n| (1..=subscribers).map(move |s| IncomingMessage::new(s, format!("msg {n}"))))
            .collect()
    }

    fn per_subscriber(messages: &[IncomingMessage]) -> HashMap<SubscriberId, Vec<String>> {
        let mut grouped: HashMap<SubscriberId, Vec<String>> = HashMap::new();
        for m in messages {
            grouped.entry(m.subscriber).or_default().push(m.text.clone());
        }
        grouped
    }

    #[test]
    fn test_shard_for_is_stable_and_in_range() {
        for shards in 1..10 {
            for id in -50..50 {
                let s = Dispatcher::shard_for(SubscriberId(id), shards);
                assert!(s < shards);
                assert_eq!(s, Dispatcher::shard_for(SubscriberId(id), shards));
            }
        }
        assert_eq!(Dispatcher::shard_for(SubscriberId(5), 0), 0);
    }

    #[tokio::test]
    async fn test_per_subscriber_order_for_any_worker_count() {
        let sent = traffic(6, 15);
        let expected = per_subscriber(&sent);

        for workers in [1, 2, 3, 8] {
            let handler = Arc::new(RecordingHandler::default());
            let dispatcher = Dispatcher::start(
                handler.clone(),
                Arc::new(RecordingMessenger::default()),
                &config(workers, 2),
            );
            for message in sent.clone() {
                dispatcher.submit(message).await.unwrap();
            }
            assert_eq!(dispatcher.shutdown().await, sent.len());

            let seen = handler.seen.lock().unwrap();
            assert_eq!(per_subscriber(&seen), expected, "order broken with {workers} worker(s)");
        }
    }

    #[tokio::test]
    async fn test_run_until_stream_ends_delivers_replies() {
        let handler = Arc::new(RecordingHandler::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = Dispatcher::start(handler, messenger.clone(), &config(4, 8));
        let (_tx, shutdown) = watch::channel(false);

        let inbound = futures::stream::iter(vec![
            IncomingMessage::new(1, "hello"),
            IncomingMessage::new(2, "quiet please"),
            IncomingMessage::new(1, "again"),
        ]);
        assert_eq!(dispatcher.run(inbound, shutdown).await, 3);

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                (SubscriberId(1), "echo hello".to_string()),
                (SubscriberId(1), "echo again".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_intake() {
        let dispatcher = Dispatcher::start(
            Arc::new(RecordingHandler::default()),
            Arc::new(RecordingMessenger::default()),
            &config(2, 4),
        );
        let (tx, shutdown) = watch::channel(false);
        let run = tokio::spawn(dispatcher.run(futures::stream::pending::<IncomingMessage>(), shutdown));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let handled = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run returns after shutdown")
            .unwrap();
        assert_eq!(handled, 0);
    }

    /// Parks on "hold" until released.
    #[derive(Default)]
    struct GatedHandler {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl MessageHandler for GatedHandler {
        async fn handle(&self, message: &IncomingMessage) -> String {
            if message.text == "hold" {
                self.started.notify_one();
                self.release.notified().await;
            }
            String::new()
        }
    }

    #[tokio::test]
    async fn test_submit_waits_while_shard_queue_is_full() {
        let handler = Arc::new(GatedHandler::default());
        let dispatcher = Dispatcher::start(
            handler.clone(),
            Arc::new(RecordingMessenger::default()),
            &config(1, 1),
        );

        dispatcher.submit(IncomingMessage::new(1, "hold")).await.unwrap();
        handler.started.notified().await;
        // Worker busy, this one fills the single queue slot.
        dispatcher.submit(IncomingMessage::new(1, "queued")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            dispatcher.submit(IncomingMessage::new(1, "overflow")),
        )
        .await;
        assert!(blocked.is_err(), "submit returned while the queue was full");

        handler.release.notify_one();
        assert_eq!(dispatcher.shutdown().await, 2);
    }
}
