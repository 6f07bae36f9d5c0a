use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use busview_api::{RecordSource, TransportError};

use crate::error::IngestError;
use crate::window::BoundedWindow;

// ═══════════════════════════════════════════════════════════════
//  Settings / state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    /// Bounded wait of one transport poll.
    pub poll_timeout: Duration,
    /// How long `stop()` waits for the task before aborting it.
    pub stop_grace: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
            stop_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Stopped,
    Running,
    Stopping,
}

struct Shared {
    state: Mutex<IngestState>,
    batches: AtomicU64,
    records: AtomicU64,
    transient_errors: AtomicU64,
}

// ═══════════════════════════════════════════════════════════════
//  IngestionLoop
// ═══════════════════════════════════════════════════════════════

/// Single writer of the window: polls the transport and appends each
/// batch in the order received.
///
/// A `Transient` poll error is logged and polling continues. Any other
/// poll error ends the loop for good; the state drops back to
/// `Stopped` and the error is reported by the next `stop()`. There is no
/// reconnect, a new source has to be passed to `start()`.
pub struct IngestionLoop {
    window: Arc<BoundedWindow>,
    settings: IngestSettings,
    shared: Arc<Shared>,
    task: Option<(CancellationToken, JoinHandle<Result<(), TransportError>>)>,
}

impl IngestionLoop {
    pub fn new(window: Arc<BoundedWindow>, settings: IngestSettings) -> Self {
        Self {
            window,
            settings,
            shared: Arc::new(Shared {
                state: Mutex::new(IngestState::Stopped),
                batches: AtomicU64::new(0),
                records: AtomicU64::new(0),
                transient_errors: AtomicU64::new(0),
            }),
            task: None,
        }
    }

    pub fn state(&self) -> IngestState {
        *self.shared.state.lock()
    }

    /// Non-empty batches appended so far.
    pub fn batches(&self) -> u64 {
        self.shared.batches.load(Ordering::Relaxed)
    }

    /// Records appended so far (including ones since evicted).
    pub fn records(&self) -> u64 {
        self.shared.records.load(Ordering::Relaxed)
    }

    /// Poll errors of kind `Transient` that were skipped.
    pub fn transient_errors(&self) -> u64 {
        self.shared.transient_errors.load(Ordering::Relaxed)
    }

    /// Subscribe `source` to `topic` and spawn the poll task.
    ///
    /// Must be called from within a tokio runtime. `RecordSource::poll`
    /// futures are dropped on stop, so they have to be cancel-safe.
    pub fn start(&mut self, mut source: Box<dyn RecordSource>, topic: &str) -> Result<(), IngestError> {
        {
            let mut state = self.shared.state.lock();
            if *state != IngestState::Stopped {
                return Err(IngestError::AlreadyRunning);
            }
            source.subscribe(topic).map_err(|e| IngestError::Subscribe {
                topic: topic.to_string(),
                source: e,
            })?;
            *state = IngestState::Running;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let window = self.window.clone();
        let shared = self.shared.clone();
        let poll_timeout = self.settings.poll_timeout;
        let topic_name = topic.to_string();

        let handle = tokio::spawn(async move {
            tracing::info!(topic = %topic_name, "ingestion started");
            let result = run_loop(source, &window, &shared, poll_timeout, &task_token).await;
            *shared.state.lock() = IngestState::Stopped;
            match &result {
                Ok(()) => tracing::info!(topic = %topic_name, "ingestion stopped"),
                Err(e) => tracing::error!(
                    topic = %topic_name,
                    error = ?e,
                    "transport poll failed, ingestion halted"
                ),
            }
            result
        });

        // A previous task, if any, has already finished.
        self.task = Some((token, handle));
        Ok(())
    }

    /// Signal the task and wait up to the grace period for it to exit.
    ///
    /// A poll in flight is dropped as soon as the signal is seen rather than
    /// awaited to completion. The memory source only moves its cursor once
    /// it has a batch to return, so nothing is skipped. A Kafka poll dropped
    /// mid-drain can lose the records it already took, which only matters
    /// to a window that is being shut down anyway.
    ///
    /// Calling it on a stopped loop is a no-op. Past the grace period the
    /// task is aborted and `StopTimeout` is returned.
    pub async fn stop(&mut self) -> Result<(), IngestError> {
        let Some((token, mut handle)) = self.task.take() else {
            return Ok(());
        };

        {
            let mut state = self.shared.state.lock();
            if *state == IngestState::Running {
                *state = IngestState::Stopping;
            }
        }
        token.cancel();

        match tokio::time::timeout(self.settings.stop_grace, &mut handle).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(IngestError::Transport(e)),
            Ok(Err(join_err)) => {
                *self.shared.state.lock() = IngestState::Stopped;
                Err(IngestError::Panicked(join_err.to_string()))
            }
            Err(_) => {
                handle.abort();
                *self.shared.state.lock() = IngestState::Stopped;
                tracing::warn!(grace = ?self.settings.stop_grace, "ingestion task aborted");
                Err(IngestError::StopTimeout(self.settings.stop_grace))
            }
        }
    }
}

impl Drop for IngestionLoop {
    fn drop(&mut self) {
        if let Some((token, _)) = &self.task {
            token.cancel();
        }
    }
}

async fn run_loop(
    mut source: Box<dyn RecordSource>,
    window: &BoundedWindow,
    shared: &Shared,
    poll_timeout: Duration,
    token: &CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            polled = source.poll(poll_timeout) => polled,
        };
        let batch = match polled {
            Ok(batch) => batch,
            Err(e) if e.is_transient() => {
                shared.transient_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "transient poll error, polling again");
                continue;
            }
            Err(e) => return Err(e),
        };
        if batch.is_empty() {
            continue;
        }

        let n = batch.len();
        window.append_batch(batch);
        shared.batches.fetch_add(1, Ordering::Relaxed);
        shared.records.fetch_add(n as u64, Ordering::Relaxed);
        tracing::debug!(records = n, window = window.len(), "ingested batch");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;

    use busview_api::Record;

    use super::*;

    /// Replays scripted poll results, then idles for the poll timeout.
    struct ScriptedSource {
        steps: VecDeque<Result<Vec<Record>, TransportError>>,
        subscribed: Option<String>,
        reject_subscribe: bool,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Result<Vec<Record>, TransportError>>) -> Self {
            Self {
                steps: steps.into(),
                subscribed: None,
                reject_subscribe: false,
            }
        }
    }

    impl RecordSource for ScriptedSource {
        fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
            if self.reject_subscribe {
                return Err(TransportError::new(format!("unknown topic '{topic}'")));
            }
            self.subscribed = Some(topic.to_string());
            Ok(())
        }

        fn poll(
            &mut self,
            timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, TransportError>> + Send + '_>> {
            Box::pin(async move {
                assert!(self.subscribed.is_some(), "poll before subscribe");
                match self.steps.pop_front() {
                    Some(step) => step,
                    None => {
                        tokio::time::sleep(timeout).await;
                        Ok(Vec::new())
                    }
                }
            })
        }
    }

    /// Blocks its worker thread inside poll, ignoring cancellation.
    struct StuckSource;

    impl RecordSource for StuckSource {
        fn subscribe(&mut self, _topic: &str) -> Result<(), TransportError> {
            Ok(())
        }

        fn poll(
            &mut self,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Record>, TransportError>> + Send + '_>> {
            Box::pin(async {
                std::thread::sleep(Duration::from_millis(300));
                Ok(Vec::new())
            })
        }
    }

    fn rec(offset: i64, key: &str, value: &str) -> Record {
        Record::new(0, 0, offset, Some(key.to_string()), value)
    }

    fn fast_settings() -> IngestSettings {
        IngestSettings {
            poll_timeout: Duration::from_millis(10),
            stop_grace: Duration::from_secs(1),
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn ingests_batches_newest_first_with_eviction() {
        let window = Arc::new(BoundedWindow::new(2).unwrap());
        let mut ingest = IngestionLoop::new(window.clone(), fast_settings());
        let source = ScriptedSource::new(vec![
            Ok(vec![rec(0, "a", "1"), rec(1, "b", "2")]),
            Ok(vec![]),
            Ok(vec![rec(2, "c", "3")]),
        ]);

        ingest.start(Box::new(source), "demo").unwrap();
        assert_eq!(ingest.state(), IngestState::Running);
        wait_until(|| ingest.records() == 3).await;

        let snap = window.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!((snap[0].offset(), snap[0].key(), snap[0].value()), (2, Some("c"), "3"));
        assert_eq!((snap[1].offset(), snap[1].key(), snap[1].value()), (1, Some("b"), "2"));
        assert_eq!(ingest.batches(), 2);

        ingest.stop().await.unwrap();
        assert_eq!(ingest.state(), IngestState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window, fast_settings());
        ingest.start(Box::new(ScriptedSource::new(vec![])), "demo").unwrap();

        let err = ingest
            .start(Box::new(ScriptedSource::new(vec![])), "demo")
            .unwrap_err();
        assert!(matches!(err, IngestError::AlreadyRunning));

        ingest.stop().await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_failure_keeps_loop_stopped() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window, fast_settings());
        let mut source = ScriptedSource::new(vec![]);
        source.reject_subscribe = true;

        let err = ingest.start(Box::new(source), "nope").unwrap_err();
        assert!(matches!(err, IngestError::Subscribe { ref topic, .. } if topic == "nope"));
        assert_eq!(ingest.state(), IngestState::Stopped);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window, fast_settings());
        ingest.stop().await.unwrap();
        ingest.stop().await.unwrap();
        assert_eq!(ingest.state(), IngestState::Stopped);
    }

    #[tokio::test]
    async fn transport_error_halts_loop_and_keeps_window() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window.clone(), fast_settings());
        let source = ScriptedSource::new(vec![
            Ok(vec![rec(0, "a", "1")]),
            Err(TransportError::io("broker gone")),
            Ok(vec![rec(1, "b", "2")]),
        ]);

        ingest.start(Box::new(source), "demo").unwrap();
        wait_until(|| ingest.state() == IngestState::Stopped).await;

        assert_eq!(window.len(), 1);
        assert_eq!(ingest.records(), 1);

        let err = ingest.stop().await.unwrap_err();
        assert!(matches!(err, IngestError::Transport(ref e) if e.message() == "broker gone"));

        // The window keeps serving after the loop died.
        window.clear();
        assert!(window.is_empty());
    }

    #[tokio::test]
    async fn transient_error_keeps_loop_running() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window.clone(), fast_settings());
        let source = ScriptedSource::new(vec![
            Err(TransportError::transient("unknown topic or partition")),
            Err(TransportError::transient("unknown topic or partition")),
            Ok(vec![rec(0, "a", "1")]),
        ]);

        ingest.start(Box::new(source), "demo").unwrap();
        wait_until(|| window.len() == 1).await;

        assert_eq!(ingest.state(), IngestState::Running);
        assert_eq!(ingest.transient_errors(), 2);
        ingest.stop().await.unwrap();
    }

    #[tokio::test]
    async fn restart_after_failure_with_new_source() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(window.clone(), fast_settings());

        ingest
            .start(Box::new(ScriptedSource::new(vec![Err(TransportError::io("down"))])), "demo")
            .unwrap();
        wait_until(|| ingest.state() == IngestState::Stopped).await;

        ingest
            .start(Box::new(ScriptedSource::new(vec![Ok(vec![rec(5, "k", "v")])])), "demo")
            .unwrap();
        wait_until(|| window.len() == 1).await;
        ingest.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stuck_poll_is_aborted_after_grace() {
        let window = Arc::new(BoundedWindow::new(4).unwrap());
        let mut ingest = IngestionLoop::new(
            window,
            IngestSettings {
                poll_timeout: Duration::from_millis(10),
                stop_grace: Duration::from_millis(50),
            },
        );

        ingest.start(Box::new(StuckSource), "demo").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = ingest.stop().await.unwrap_err();
        assert!(matches!(err, IngestError::StopTimeout(d) if d == Duration::from_millis(50)));
        assert_eq!(ingest.state(), IngestState::Stopped);
    }
}
