//! Execution contexts and quiescence tracking
//!
//! Every piece of deferred work the engine cares about runs inside an
//! [`ExecutionContext`]. A context counts the work scheduled in it (and in
//! any context forked from it) and the polls currently in progress, which is
//! what lets a [`QuiescenceTracker`] decide that a test has settled without
//! any native "current test" signal from the runtime.
//!
//! The context of the running task is ambient: it is installed in a
//! task-local for the duration of every poll of tracked work, so nested
//! callbacks can find it with [`ExecutionContext::current`].

mod fault;
mod properties;
mod tracker;

pub use fault::{skip, Fault, SkipSignal};
pub use properties::Properties;
pub use tracker::{QuiescenceTracker, Settlement};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use tracker::TrackerState;

tokio::task_local! {
    static CURRENT: ExecutionContext;
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique context identifier
pub type ContextId = u64;

/// Handle to an isolated tracking scope
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    name: String,
    parent: Option<ExecutionContext>,
    properties: Properties,
    state: Mutex<ContextState>,
}

#[derive(Default)]
struct ContextState {
    /// Outstanding work scheduled here or in any descendant
    pending: usize,
    /// Polls of this context's (or a descendant's) work in progress
    nesting: usize,
    /// Live work scheduled here or in any descendant, for cancellation
    tasks: Vec<AbortHandle>,
    tracker: Option<TrackerState>,
}

impl ExecutionContext {
    fn create(
        name: impl Into<String>,
        parent: Option<ExecutionContext>,
        properties: Properties,
        tracker: Option<TrackerState>,
    ) -> Self {
        let properties = match &parent {
            Some(parent) => parent.properties().merged(&properties),
            None => properties,
        };
        let context = Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                parent,
                properties,
                state: Mutex::new(ContextState {
                    tracker,
                    ..ContextState::default()
                }),
            }),
        };
        debug!(context = context.id(), name = %context.name(), "context created");
        context
    }

    /// A new root context with no parent and no tracker
    pub fn root(name: impl Into<String>, properties: Properties) -> Self {
        Self::create(name, None, properties, None)
    }

    /// The ambient context of the running task, if any
    pub fn current() -> Option<ExecutionContext> {
        CURRENT.try_with(|context| context.clone()).ok()
    }

    /// Fork a child context. The child inherits this context's properties
    /// (overlaid with `properties`) and counts its own pending work, which
    /// this context also sees.
    pub fn fork(&self, name: impl Into<String>, properties: Properties) -> ExecutionContext {
        Self::create(name, Some(self.clone()), properties, None)
    }

    pub(crate) fn fork_tracked(
        parent: Option<ExecutionContext>,
        name: impl Into<String>,
        properties: Properties,
        tracker: TrackerState,
    ) -> ExecutionContext {
        Self::create(name, parent, properties, Some(tracker))
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&ExecutionContext> {
        self.inner.parent.as_ref()
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn property<T: std::any::Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.inner.properties.get(key)
    }

    /// Outstanding deferred work in this context and its descendants
    pub fn pending(&self) -> usize {
        self.state().pending
    }

    pub fn nesting(&self) -> usize {
        self.state().nesting
    }

    pub fn has_tracker(&self) -> bool {
        self.state().tracker.is_some()
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn is_within(&self, other: &ExecutionContext) -> bool {
        self.lineage().any(|context| context.id() == other.id())
    }

    /// Run `future` with this context installed as the ambient context
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.clone(), future).await
    }

    /// Run a synchronous closure with this context installed
    pub fn enter_sync<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self.clone(), f)
    }

    /// Schedule deferred work in this context
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_work();
        let handle = tokio::spawn(TrackedWork {
            context: self.clone(),
            future: Some(future.boxed()),
        });
        let abort = handle.abort_handle();
        for context in self.lineage() {
            let mut state = context.state();
            state.tasks.retain(|task| !task.is_finished());
            state.tasks.push(abort.clone());
        }
        handle
    }

    /// Abort all outstanding work in this context and its descendants
    pub fn cancel(&self) {
        let tasks = std::mem::take(&mut self.state().tasks);
        let live = tasks.iter().filter(|task| !task.is_finished()).count();
        if live > 0 {
            debug!(context = self.id(), name = %self.name(), live, "cancelling outstanding work");
        }
        for task in tasks {
            task.abort();
        }
    }

    /// Register an observer notified just before this context (or the
    /// nearest tracked ancestor) declares itself stable. The observer may
    /// schedule more work, which postpones stability.
    pub fn on_idle<F>(&self, observer: F)
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        match self.tracker_owner() {
            Some(owner) => tracker::add_idle_observer(&owner, Arc::new(observer)),
            None => warn!(
                context = self.id(),
                "idle observer registered on a context without a tracker; ignoring"
            ),
        }
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.inner.state.lock()
    }

    fn lineage(&self) -> impl Iterator<Item = &ExecutionContext> {
        std::iter::successors(Some(self), |&context| context.parent())
    }

    /// Nearest context, starting at `self`, that owns a tracker
    fn tracker_owner(&self) -> Option<ExecutionContext> {
        self.lineage().find(|context| context.has_tracker()).cloned()
    }

    fn add_work(&self) {
        for context in self.lineage() {
            context.state().pending += 1;
        }
    }

    fn complete_work(&self) {
        for context in self.lineage() {
            let mut state = context.state();
            state.pending = state.pending.saturating_sub(1);
        }
        for context in self.lineage() {
            tracker::check_stable(context);
        }
    }

    fn enter(&self) {
        for context in self.lineage() {
            context.state().nesting += 1;
        }
    }

    fn leave(&self) {
        for context in self.lineage() {
            let mut state = context.state();
            state.nesting = state.nesting.saturating_sub(1);
        }
    }

    /// Attribute a fault to the nearest tracked context
    fn report_fault(&self, fault: Fault) {
        match self.tracker_owner() {
            Some(owner) => tracker::deliver_fault(&owner, fault),
            None => warn!(
                context = self.id(),
                name = %self.name(),
                "unhandled fault outside any tracked context: {}", fault
            ),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("parent", &self.parent().map(ExecutionContext::id))
            .finish()
    }
}

/// Work scheduled inside a context. Installs the context for each poll,
/// maintains the nesting counter, and routes errors and panics to the
/// owning tracker before releasing its pending slot.
struct TrackedWork {
    context: ExecutionContext,
    future: Option<BoxFuture<'static, anyhow::Result<()>>>,
}

impl Future for TrackedWork {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = &mut *self;
        let Some(future) = this.future.as_mut() else {
            return Poll::Ready(());
        };

        let context = this.context.clone();
        context.enter();
        let polled = panic::catch_unwind(AssertUnwindSafe(|| {
            CURRENT.sync_scope(context.clone(), || future.as_mut().poll(cx))
        }));
        context.leave();

        let fault = match polled {
            Ok(Poll::Pending) => return Poll::Pending,
            Ok(Poll::Ready(Ok(()))) => None,
            Ok(Poll::Ready(Err(error))) => Some(Fault::from_error(error)),
            Err(payload) => Some(Fault::from_panic(payload)),
        };

        this.future = None;
        if let Some(fault) = fault {
            context.report_fault(fault);
        }
        context.complete_work();
        Poll::Ready(())
    }
}

impl Drop for TrackedWork {
    fn drop(&mut self) {
        // aborted or dropped by the runtime before finishing
        if self.future.take().is_some() {
            self.context.complete_work();
        }
    }
}

/// Schedule deferred work in the ambient context. Outside any context the
/// work runs untracked and its errors are only logged.
pub fn spawn<F>(future: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    match ExecutionContext::current() {
        Some(context) => context.spawn(future),
        None => tokio::spawn(async move {
            if let Err(error) = future.await {
                warn!("unhandled error in untracked work: {:#}", error);
            }
        }),
    }
}

/// Timer-style deferred work: run `callback` after `delay` in the ambient context
pub fn defer<F>(delay: Duration, callback: F) -> JoinHandle<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    spawn(async move {
        tokio::time::sleep(delay).await;
        callback()
    })
}
