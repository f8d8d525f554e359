use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, warn};

use crate::probes::Probe;

const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverConfig {
    pub interval: Duration,
}

impl ObserverConfig {
    pub fn with_interval_ms(ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(ms),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self::with_interval_ms(DEFAULT_INTERVAL_MS)
    }
}

/// A key that is already known and never changes.
pub fn known_key(key: impl Into<String>) -> watch::Receiver<Option<String>> {
    let (_tx, rx) = watch::channel(Some(key.into()));
    rx
}

type Until<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type MakeProbe<P> = Box<dyn Fn(&str) -> P + Send + Sync>;

enum Source<P> {
    Fixed(P),
    /// The probe depends on a key that may not be known yet.
    Keyed {
        key: watch::Receiver<Option<String>>,
        make: MakeProbe<P>,
    },
}

/// Re-reads a [`Probe`] on an interval and publishes the value whenever it
/// changes.
///
/// The first read happens as soon as the observer is spawned. An `until`
/// predicate makes the observer stop after publishing the first value that
/// satisfies it.
pub struct PollingObserver<P: Probe> {
    source: Source<P>,
    config: ObserverConfig,
    until: Option<Until<P::Output>>,
}

impl<P: Probe> PollingObserver<P> {
    pub fn new(probe: P) -> Self {
        Self {
            source: Source::Fixed(probe),
            config: ObserverConfig::default(),
            until: None,
        }
    }

    /// Stay idle while `key` is `None`. Each time it changes to a new value,
    /// `make` builds the probe to poll with.
    pub fn keyed(
        key: watch::Receiver<Option<String>>,
        make: impl Fn(&str) -> P + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: Source::Keyed {
                key,
                make: Box::new(make),
            },
            config: ObserverConfig::default(),
            until: None,
        }
    }

    pub fn config(mut self, config: ObserverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn until(mut self, done: impl Fn(&P::Output) -> bool + Send + Sync + 'static) -> Self {
        self.until = Some(Arc::new(done));
        self
    }

    /// Start polling on the current tokio runtime.
    pub fn spawn(self) -> ObserverHandle<P::Output> {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(self, tx, cancel.clone()));

        ObserverHandle {
            rx,
            cancel: cancel.clone(),
            task,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }
}

/// Owner of a running observer. Dropping it stops the polling task.
pub struct ObserverHandle<T> {
    rx: watch::Receiver<Option<T>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl<T> ObserverHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Last published value, `None` before the first successful read.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    /// The current value (if any), then every change. Ends once the observer
    /// stops.
    pub fn stream(&self) -> impl Stream<Item = T> + Send + 'static {
        changes(self.rx.clone(), |value: &Option<T>| value.clone())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the observer stopped, after cancellation or because its
    /// `until` predicate was satisfied.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Stream of the values of a watch channel: the current one first, then one
/// per change, skipping values `project` maps to `None`. Intermediate values
/// may be coalesced.
pub(crate) fn changes<T, U, F>(mut rx: watch::Receiver<T>, project: F) -> impl Stream<Item = U> + Send + 'static
where
    T: Send + Sync + 'static,
    U: Send + 'static,
    F: Fn(&T) -> Option<U> + Send + Sync + 'static,
{
    rx.mark_changed();
    futures_util::stream::unfold((rx, project), |(mut rx, project)| async move {
        loop {
            if rx.changed().await.is_err() {
                return None;
            }
            let next = project(&rx.borrow_and_update());
            if let Some(value) = next {
                return Some((value, (rx, project)));
            }
        }
    })
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Cancelled,
    Finished,
    KeyChanged,
}

async fn run<P: Probe>(
    observer: PollingObserver<P>,
    tx: watch::Sender<Option<P::Output>>,
    cancel: CancellationToken,
) {
    let PollingObserver {
        source,
        config,
        until,
    } = observer;
    let until = until.as_deref();

    match source {
        Source::Fixed(probe) => {
            poll(Arc::new(probe), &tx, &config, until, &cancel, std::future::pending::<()>()).await;
        }
        Source::Keyed { mut key, make } => loop {
            let current = key.borrow_and_update().clone();
            let Some(id) = current else {
                debug!("Observer idle until its key is known");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = key.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
                continue;
            };

            let probe = Arc::new(make(&id));
            let exit = poll(probe, &tx, &config, until, &cancel, key_change(&mut key)).await;
            if exit != Exit::KeyChanged {
                return;
            }
            debug!("Observer key changed from {}", id);
        },
    }
}

async fn key_change(key: &mut watch::Receiver<Option<String>>) {
    if key.changed().await.is_err() {
        // Sender gone: the key is final
        std::future::pending::<()>().await;
    }
}

async fn poll<P: Probe>(
    probe: Arc<P>,
    tx: &watch::Sender<Option<P::Output>>,
    config: &ObserverConfig,
    until: Option<&(dyn Fn(&P::Output) -> bool + Send + Sync)>,
    cancel: &CancellationToken,
    key_changed: impl Future<Output = ()>,
) -> Exit {
    tokio::pin!(key_changed);

    // tokio panics on a zero period
    let mut interval = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick completes immediately
        tokio::select! {
            _ = cancel.cancelled() => return Exit::Cancelled,
            _ = &mut key_changed => return Exit::KeyChanged,
            _ = interval.tick() => {}
        }

        // A read still running when the observer is cancelled is discarded
        let value = tokio::select! {
            _ = cancel.cancelled() => return Exit::Cancelled,
            _ = &mut key_changed => return Exit::KeyChanged,
            value = read(&probe) => value,
        };
        let Some(value) = value else {
            continue;
        };

        let finished = until.is_some_and(|done| done(&value));
        publish(tx, value);
        if finished {
            debug!("Observer condition met, stopping");
            return Exit::Finished;
        }
    }
}

async fn read<P: Probe>(probe: &Arc<P>) -> Option<P::Output> {
    let probe = Arc::clone(probe);
    match tokio::task::spawn_blocking(move || probe.read()).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("Observer read failed, keeping last value: {}", e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}

/// Store `value` and wake subscribers, unless it equals the current value.
fn publish<T: PartialEq>(tx: &watch::Sender<Option<T>>, value: T) -> bool {
    tx.send_if_modified(|current| {
        if current.as_ref() == Some(&value) {
            return false;
        }
        *current = Some(value);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::pin::pin;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    const TICK: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Default)]
    struct Counter {
        value: AtomicI64,
        reads: AtomicUsize,
        failing: AtomicBool,
    }

    struct CounterProbe(Arc<Counter>);

    impl Probe for CounterProbe {
        type Output = i64;

        fn read(&self) -> anyhow::Result<i64> {
            self.0.reads.fetch_add(1, Ordering::SeqCst);
            if self.0.failing.load(Ordering::SeqCst) {
                anyhow::bail!("store unavailable");
            }
            Ok(self.0.value.load(Ordering::SeqCst))
        }
    }

    fn config() -> ObserverConfig {
        ObserverConfig { interval: TICK }
    }

    #[tokio::test]
    async fn reads_immediately() {
        let counter = Arc::new(Counter::default());
        counter.value.store(7, Ordering::SeqCst);

        // Interval far longer than the wait: only the immediate read can answer
        let handle = PollingObserver::new(CounterProbe(counter))
            .config(ObserverConfig::with_interval_ms(60_000))
            .spawn();
        let mut stream = pin!(handle.stream());

        let first = timeout(WAIT, stream.next()).await.unwrap();
        assert_eq!(first, Some(7));
    }

    #[tokio::test]
    async fn emits_only_changes() {
        let counter = Arc::new(Counter::default());
        let handle = PollingObserver::new(CounterProbe(counter.clone()))
            .config(config())
            .spawn();
        let mut stream = pin!(handle.stream());

        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(0));

        // Several ticks with no change emit nothing
        sleep(TICK * 5).await;
        assert!(timeout(TICK * 3, stream.next()).await.is_err());

        counter.value.store(3, Ordering::SeqCst);
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(3));
        assert_eq!(handle.current(), Some(3));
    }

    #[tokio::test]
    async fn until_stops_the_observer() {
        let counter = Arc::new(Counter::default());
        let handle = PollingObserver::new(CounterProbe(counter.clone()))
            .config(config())
            .until(|count| *count >= 2)
            .spawn();
        let mut stream = pin!(handle.stream());

        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(0));
        counter.value.store(2, Ordering::SeqCst);
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(2));

        // Terminal: the stream ends and no further reads happen
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), None);
        let reads = counter.reads.load(Ordering::SeqCst);
        sleep(TICK * 5).await;
        assert_eq!(counter.reads.load(Ordering::SeqCst), reads);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_polling() {
        let counter = Arc::new(Counter::default());
        let handle = PollingObserver::new(CounterProbe(counter.clone()))
            .config(config())
            .spawn();
        sleep(TICK * 3).await;
        drop(handle);

        // Let a read that was already in flight settle
        sleep(TICK * 2).await;
        let reads = counter.reads.load(Ordering::SeqCst);
        sleep(TICK * 5).await;
        assert_eq!(counter.reads.load(Ordering::SeqCst), reads);
    }

    #[tokio::test]
    async fn read_errors_keep_the_last_value() {
        let counter = Arc::new(Counter::default());
        counter.value.store(5, Ordering::SeqCst);
        let handle = PollingObserver::new(CounterProbe(counter.clone()))
            .config(config())
            .spawn();
        let mut stream = pin!(handle.stream());
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(5));

        counter.failing.store(true, Ordering::SeqCst);
        let reads = counter.reads.load(Ordering::SeqCst);
        sleep(TICK * 5).await;
        assert!(counter.reads.load(Ordering::SeqCst) > reads);
        assert_eq!(handle.current(), Some(5));

        counter.failing.store(false, Ordering::SeqCst);
        counter.value.store(6, Ordering::SeqCst);
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn keyed_observer_waits_for_its_key() {
        let counter = Arc::new(Counter::default());
        let (key_tx, key_rx) = watch::channel(None);

        let probe_counter = counter.clone();
        let handle = PollingObserver::keyed(key_rx, move |_key| CounterProbe(probe_counter.clone()))
            .config(config())
            .spawn();

        sleep(TICK * 5).await;
        assert_eq!(counter.reads.load(Ordering::SeqCst), 0);
        assert_eq!(handle.current(), None);

        key_tx.send_replace(Some("c1".to_string()));
        let mut stream = pin!(handle.stream());
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(0));
        assert!(counter.reads.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn known_key_starts_immediately() {
        let counter = Arc::new(Counter::default());
        let probe_counter = counter.clone();
        let handle = PollingObserver::keyed(known_key("c1"), move |_key| CounterProbe(probe_counter.clone()))
            .config(config())
            .spawn();

        let mut stream = pin!(handle.stream());
        assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), Some(0));
    }
}
