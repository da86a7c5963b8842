//! The engine poll loop.
//!
//! The engine yields one message per receive call. The loop sleeps for the
//! time elapsed since the last message (capped at `max_receive_interval`)
//! and then polls with a zero timeout, so it polls eagerly right after
//! activity and backs off when idle.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tdbridge_core::Engine;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

use crate::fanout::Fanout;
use crate::metrics::ENGINE_MESSAGES_TOTAL;

/// Wait before the next poll, given the time since the last message.
pub fn receive_delay(since_last: Duration, max_receive_interval: Duration) -> Duration {
    since_last.min(max_receive_interval)
}

/// Sole consumer of engine messages.
pub struct EnginePoller {
    engine: Arc<dyn Engine>,
    fanout: Arc<Fanout>,
    max_receive_interval: Duration,
}

impl EnginePoller {
    /// Create a poller publishing into `fanout`.
    pub fn new(engine: Arc<dyn Engine>, fanout: Arc<Fanout>, max_receive_interval: Duration) -> Self {
        Self {
            engine,
            fanout,
            max_receive_interval,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// A bad message never ends the loop; the fan-out logs and drops it.
    #[instrument(skip_all, name = "engine_poller")]
    pub async fn run(self, cancel: CancellationToken) {
        info!(max_receive_interval_ms = self.max_receive_interval.as_millis(), "engine poll loop started");
        let mut last_received = Instant::now();

        loop {
            let wait = receive_delay(last_received.elapsed(), self.max_receive_interval);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            // Zero timeout: the call returns immediately and never parks the worker.
            let Some(raw) = self.engine.receive(Duration::ZERO) else {
                continue;
            };
            last_received = Instant::now();
            counter!(ENGINE_MESSAGES_TOTAL).increment(1);

            let delivered = self.fanout.publish(&raw);
            trace!(delivered, "engine message fanned out");
        }

        info!("engine poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdbridge_core::testing::MemoryEngine;

    #[test]
    fn delay_is_elapsed_time_when_recent() {
        let max = Duration::from_millis(100);
        assert_eq!(receive_delay(Duration::ZERO, max), Duration::ZERO);
        assert_eq!(
            receive_delay(Duration::from_millis(30), max),
            Duration::from_millis(30)
        );
    }

    #[test]
    fn delay_is_capped_when_idle() {
        let max = Duration::from_millis(100);
        assert_eq!(receive_delay(Duration::from_secs(60), max), max);
    }

    #[test]
    fn zero_cap_never_waits() {
        assert_eq!(
            receive_delay(Duration::from_secs(5), Duration::ZERO),
            Duration::ZERO
        );
    }

    fn spawn_poller(
        engine: Arc<MemoryEngine>,
        fanout: Arc<Fanout>,
        max: Duration,
    ) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(EnginePoller::new(engine, fanout, max).run(cancel.clone()));
        (cancel, handle)
    }

    #[tokio::test]
    async fn messages_are_published_in_engine_order() {
        let engine = Arc::new(MemoryEngine::silent());
        for i in 0..5 {
            engine.push(format!(r#"{{"@type":"update","seq":{i}}}"#));
        }
        let fanout = Arc::new(Fanout::new());
        let (_sub, mut rx) = fanout.subscribe(1, 16);
        let (cancel, handle) = spawn_poller(engine.clone(), fanout, Duration::from_millis(20));

        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert!(msg.contains(&format!(r#""seq":{i}"#)));
        }
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(engine.pending(), 0);
    }

    #[tokio::test]
    async fn malformed_message_does_not_stop_loop() {
        let engine = Arc::new(MemoryEngine::silent());
        engine.push("garbage");
        engine.push(r#"{"@type":"after"}"#);
        let fanout = Arc::new(Fanout::new());
        let (_sub, mut rx) = fanout.subscribe(1, 16);
        let (cancel, handle) = spawn_poller(engine, fanout, Duration::from_millis(20));

        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("after"));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn idle_loop_still_delivers_within_cap() {
        let engine = Arc::new(MemoryEngine::silent());
        let fanout = Arc::new(Fanout::new());
        let (_sub, mut rx) = fanout.subscribe(1, 16);
        let (cancel, handle) = spawn_poller(engine.clone(), fanout, Duration::from_millis(50));

        // Let the loop go idle past the cap, then inject a message.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let injected_at = Instant::now();
        engine.push(r#"{"@type":"late"}"#);

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.contains("late"));
        // One capped wait plus scheduling slack.
        assert!(injected_at.elapsed() < Duration::from_millis(500));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_stops_idle_loop() {
        let engine = Arc::new(MemoryEngine::silent());
        let (cancel, handle) =
            spawn_poller(engine, Arc::new(Fanout::new()), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
