use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, broadcast};
use weft_domain::{Action, Effect, PreferenceStore, ThreadsState};

/// Wall clock in unix milliseconds. Injected so tests can drive time.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(weft_domain::now_unix_ms)
}

struct StoreInner {
    state: ThreadsState,
    rev: u64,
}

#[derive(Default)]
struct EffectQueue {
    pending: VecDeque<Effect>,
    draining: bool,
}

/// Runs reducer effects against the preference store in dispatch order, off the async
/// workers.
struct EffectRunner {
    prefs: Arc<dyn PreferenceStore>,
    queue: Mutex<EffectQueue>,
    idle: Notify,
}

impl EffectRunner {
    fn lock(&self) -> MutexGuard<'_, EffectQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn submit(self: &Arc<Self>, effects: Vec<Effect>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            for effect in effects {
                self.run(effect);
            }
            return;
        };
        let start = {
            let mut queue = self.lock();
            queue.pending.extend(effects);
            !std::mem::replace(&mut queue.draining, true)
        };
        if start {
            let runner = self.clone();
            handle.spawn_blocking(move || runner.drain());
        }
    }

    fn drain(&self) {
        loop {
            let effect = {
                let mut queue = self.lock();
                match queue.pending.pop_front() {
                    Some(effect) => effect,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };
            self.run(effect);
        }
        self.idle.notify_waiters();
    }

    fn run(&self, effect: Effect) {
        let result = match effect {
            Effect::SaveCustomThreadName {
                workspace_id,
                thread_id,
                name,
            } => self
                .prefs
                .save_custom_thread_name(&workspace_id, &thread_id, name.as_deref()),
            Effect::SavePinnedThreads {
                workspace_id,
                pinned,
            } => self.prefs.save_pinned_threads(&workspace_id, &pinned),
        };
        if let Err(err) = result {
            tracing::error!(error = %err, "effect failed");
        }
    }

    async fn flush(&self) {
        loop {
            let idle = self.idle.notified();
            let mut idle = std::pin::pin!(idle);
            idle.as_mut().enable();
            if !self.lock().draining {
                return;
            }
            idle.await;
        }
    }
}

/// The single shared state container. All writes go through [`Store::dispatch`].
pub struct Store {
    inner: Mutex<StoreInner>,
    updates: broadcast::Sender<u64>,
    effects: Arc<EffectRunner>,
    clock: Clock,
}

impl Store {
    pub fn new(prefs: Arc<dyn PreferenceStore>, clock: Clock) -> Self {
        let (updates, _) = broadcast::channel::<u64>(256);
        Self {
            inner: Mutex::new(StoreInner {
                state: ThreadsState::new(),
                rev: 0,
            }),
            updates,
            effects: Arc::new(EffectRunner {
                prefs,
                queue: Mutex::new(EffectQueue::default()),
                idle: Notify::new(),
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Applies `action`, notifies subscribers and queues the resulting effects. Returns the
    /// new revision.
    pub fn dispatch(&self, action: Action) -> u64 {
        let (rev, effects) = {
            let mut inner = self.lock();
            let effects = inner.state.apply(action);
            inner.rev = inner.rev.saturating_add(1);
            (inner.rev, effects)
        };
        let _ = self.updates.send(rev);
        if !effects.is_empty() {
            self.effects.submit(effects);
        }
        rev
    }

    pub fn read<R>(&self, f: impl FnOnce(&ThreadsState) -> R) -> R {
        f(&self.lock().state)
    }

    pub fn snapshot(&self) -> ThreadsState {
        self.read(ThreadsState::clone)
    }

    pub fn rev(&self) -> u64 {
        self.lock().rev
    }

    /// Receives the revision number after every dispatch.
    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Waits until every effect dispatched so far has been persisted.
    pub async fn flush_effects(&self) {
        self.effects.flush().await;
    }
}
