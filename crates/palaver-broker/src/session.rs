// Inactivity session timers
// Decision: One timer pair per sender, guarded by a generation counter. Every
// inbound turn resets the pair; a fire only proceeds if its generation is
// still the live one, so a reset that races a fire always wins. The map lock
// is never held across an outbound send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use palaver_core::OutboundChannel;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_WARNING_TEXT: &str =
    "Are you still there? This session will close soon if there is no reply.";
const DEFAULT_END_TEXT: &str = "This session has been closed due to inactivity.";

struct TimerPair {
    generation: u64,
    inactivity: JoinHandle<()>,
    end_session: Option<JoinHandle<()>>,
}

impl TimerPair {
    fn abort(&self) {
        self.inactivity.abort();
        if let Some(end) = &self.end_session {
            end.abort();
        }
    }
}

#[derive(Clone)]
pub struct SessionTimers {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    timers: Mutex<HashMap<String, TimerPair>>,
    channel: Arc<dyn OutboundChannel>,
    warning_window: Duration,
    end_window: Duration,
    warning_text: String,
    end_text: String,
    next_generation: AtomicU64,
}

impl SessionTimers {
    pub fn new(
        channel: Arc<dyn OutboundChannel>,
        warning_window: Duration,
        end_window: Duration,
        warning_text: Option<String>,
        end_text: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                timers: Mutex::new(HashMap::new()),
                channel,
                warning_window,
                end_window,
                warning_text: warning_text.unwrap_or_else(|| DEFAULT_WARNING_TEXT.to_string()),
                end_text: end_text.unwrap_or_else(|| DEFAULT_END_TEXT.to_string()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Cancel any pending timers for the sender and start a fresh pair.
    /// Called on every inbound turn.
    pub async fn reset(&self, cellphone: &str) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let warn_task = TimerInner::spawn_warning(&self.inner, cellphone.to_string(), generation);

        let mut timers = self.inner.timers.lock().await;
        if let Some(previous) = timers.insert(
            cellphone.to_string(),
            TimerPair {
                generation,
                inactivity: warn_task,
                end_session: None,
            },
        ) {
            previous.abort();
            debug!(cellphone = %cellphone, "Replaced pending session timers");
        }
    }

    /// Drop the sender's timers without firing them
    pub async fn cancel(&self, cellphone: &str) {
        if let Some(pair) = self.inner.timers.lock().await.remove(cellphone) {
            pair.abort();
        }
    }

    /// Abort every pending timer. Called on shutdown.
    pub async fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().await;
        for (_, pair) in timers.drain() {
            pair.abort();
        }
        info!("Session timers stopped");
    }

    pub async fn active_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }
}

impl TimerInner {
    fn spawn_warning(this: &Arc<Self>, cellphone: String, generation: u64) -> JoinHandle<()> {
        let this = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(this.warning_window).await;
            if !this.is_current(&cellphone, generation).await {
                return;
            }

            info!(cellphone = %cellphone, "Inactivity window elapsed, sending warning");
            if let Err(err) = this.channel.send(&cellphone, &this.warning_text).await {
                warn!(cellphone = %cellphone, error = %err, "Inactivity warning send failed");
            }

            let end_task = Self::spawn_end(&this, cellphone.clone(), generation);
            // the pair may have been reset while the send was in flight
            if !this.attach_end(&cellphone, generation, end_task).await {
                debug!(cellphone = %cellphone, "Timer pair reset during warning, end timer dropped");
            }
        })
    }

    fn spawn_end(this: &Arc<Self>, cellphone: String, generation: u64) -> JoinHandle<()> {
        let this = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(this.end_window).await;
            if !this.remove_if_current(&cellphone, generation).await {
                return;
            }

            info!(cellphone = %cellphone, "Session ended for inactivity");
            if let Err(err) = this.channel.send(&cellphone, &this.end_text).await {
                warn!(cellphone = %cellphone, error = %err, "Session end send failed");
            }
        })
    }

    async fn is_current(&self, cellphone: &str, generation: u64) -> bool {
        self.timers
            .lock()
            .await
            .get(cellphone)
            .map(|pair| pair.generation == generation)
            .unwrap_or(false)
    }

    /// Attach the end timer to its pair, or abort it if the pair was reset
    async fn attach_end(&self, cellphone: &str, generation: u64, task: JoinHandle<()>) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.get_mut(cellphone) {
            Some(pair) if pair.generation == generation => {
                pair.end_session = Some(task);
                true
            }
            _ => {
                task.abort();
                false
            }
        }
    }

    /// Remove the pair only if it is still the live generation
    async fn remove_if_current(&self, cellphone: &str, generation: u64) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.get(cellphone) {
            Some(pair) if pair.generation == generation => {
                timers.remove(cellphone);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingChannel {
        sends: Mutex<Vec<(String, String)>>,
        count: AtomicU32,
    }

    #[async_trait]
    impl OutboundChannel for RecordingChannel {
        async fn send(&self, recipient: &str, text: &str) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.sends
                .lock()
                .await
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn timers(channel: Arc<RecordingChannel>, warn_ms: u64, end_ms: u64) -> SessionTimers {
        SessionTimers::new(
            channel,
            Duration::from_millis(warn_ms),
            Duration::from_millis(end_ms),
            Some("warning".to_string()),
            Some("goodbye".to_string()),
        )
    }

    #[tokio::test]
    async fn test_double_reset_leaves_one_live_pair() {
        let channel = Arc::new(RecordingChannel::default());
        let timers = timers(channel.clone(), 10_000, 10_000);

        timers.reset("549351").await;
        timers.reset("549351").await;

        assert_eq!(timers.active_count().await, 1);
        timers.shutdown().await;
    }

    #[tokio::test]
    async fn test_warning_then_end_fire_once_each() {
        let channel = Arc::new(RecordingChannel::default());
        let timers = timers(channel.clone(), 20, 20);

        timers.reset("549351").await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let sends = channel.sends.lock().await.clone();
        assert_eq!(
            sends,
            vec![
                ("549351".to_string(), "warning".to_string()),
                ("549351".to_string(), "goodbye".to_string()),
            ]
        );
        // state removed after the end fires
        assert_eq!(timers.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_reset_before_warning_suppresses_fire() {
        let channel = Arc::new(RecordingChannel::default());
        let timers = timers(channel.clone(), 50, 50);

        timers.reset("549351").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        timers.reset("549351").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        timers.cancel("549351").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(channel.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reset_between_warning_and_end_suppresses_end() {
        let channel = Arc::new(RecordingChannel::default());
        let timers = timers(channel.clone(), 20, 200);

        timers.reset("549351").await;
        // let the warning fire, then come back before the end window elapses
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(channel.count.load(Ordering::SeqCst), 1);

        timers.reset("549351").await;
        timers.cancel("549351").await;
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(channel.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timers_are_per_sender() {
        let channel = Arc::new(RecordingChannel::default());
        let timers = timers(channel.clone(), 20, 10_000);

        timers.reset("111").await;
        timers.reset("222").await;
        timers.cancel("222").await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let sends = channel.sends.lock().await.clone();
        assert_eq!(sends, vec![("111".to_string(), "warning".to_string())]);
        timers.shutdown().await;
    }
}
