use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long deliveries are coalesced before a batch is processed.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

type IdentityFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
type ProcessFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

struct State<T> {
    queue: Vec<T>,
    job: Option<JoinHandle<()>>,
}

struct Inner<T> {
    window: Duration,
    identity: IdentityFn<T>,
    process: ProcessFn<T>,
    state: Mutex<State<T>>,
}

/// Collapses repeated deliveries of the same item into a single processing
/// call.
///
/// Native store bridges can redeliver the same transaction or error several
/// times in rapid succession (bridge restarts, reload cycles). Items sharing
/// an identity key within the debounce window are processed once; the first
/// queued item per key wins. Genuinely distinct concurrent items all survive,
/// in enqueue order.
pub struct DebouncedProcessor<T: Send + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> DebouncedProcessor<T> {
    pub fn new<I, P>(identity: I, process: P) -> Self
    where
        I: Fn(&T) -> String + Send + Sync + 'static,
        P: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self::with_window(DEBOUNCE_WINDOW, identity, process)
    }

    pub fn with_window<I, P>(window: Duration, identity: I, process: P) -> Self
    where
        I: Fn(&T) -> String + Send + Sync + 'static,
        P: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                window,
                identity: Arc::new(identity),
                process: Arc::new(process),
                state: Mutex::new(State {
                    queue: Vec::new(),
                    job: None,
                }),
            }),
        }
    }

    /// Enqueue an item unless one with the same identity key is already
    /// queued, and schedule a processing pass if none is pending.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, item: T) {
        let mut state = self.inner.state.lock().expect("debounce lock poisoned");
        let key = (self.inner.identity)(&item);
        if state
            .queue
            .iter()
            .any(|queued| (self.inner.identity)(queued) == key)
        {
            debug!("dropping duplicate delivery for key {key:?}");
            return;
        }
        state.queue.push(item);
        if state.job.is_none() {
            let inner = Arc::clone(&self.inner);
            state.job = Some(tokio::spawn(async move {
                tokio::time::sleep(inner.window).await;
                let batch = {
                    let mut state = inner.state.lock().expect("debounce lock poisoned");
                    state.job = None;
                    std::mem::take(&mut state.queue)
                };
                for item in batch {
                    (inner.process)(item).await;
                }
            }));
        }
    }

    /// Cancel any pending processing pass and drop the queue unprocessed.
    pub fn cleanup(&self) {
        let mut state = self.inner.state.lock().expect("debounce lock poisoned");
        if let Some(job) = state.job.take() {
            job.abort();
        }
        state.queue.clear();
    }
}

impl<T: Send + 'static> Drop for DebouncedProcessor<T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
