//! Quiescence tracker
//!
//! Wraps one invocation in a fresh tracked context and settles exactly once:
//! stable when the invocation and everything it scheduled has finished, or
//! error when a fault escapes any of that work.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::{ExecutionContext, Fault, Properties, CURRENT};

pub(super) type IdleObserver = Arc<dyn Fn(&ExecutionContext) + Send + Sync>;

/// Terminal outcome of a tracked invocation
#[derive(Debug)]
pub enum Settlement {
    /// No pending work remains and nothing is executing
    Stable,
    /// A fault escaped the context
    Error(Fault),
}

impl Settlement {
    pub fn is_stable(&self) -> bool {
        matches!(self, Settlement::Stable)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settled {
    Stable,
    Error,
}

/// Tracker bookkeeping stored in the owning context's state
pub(crate) struct TrackerState {
    settled: Option<Settled>,
    sender: Option<oneshot::Sender<Settlement>>,
    idle: Vec<IdleObserver>,
}

impl TrackerState {
    fn new(sender: oneshot::Sender<Settlement>) -> Self {
        Self {
            settled: None,
            sender: Some(sender),
            idle: Vec::new(),
        }
    }
}

/// Runs one invocation inside an isolated, uniquely identified context
/// and reports when that context goes quiet.
pub struct QuiescenceTracker {
    context: ExecutionContext,
    receiver: oneshot::Receiver<Settlement>,
}

impl QuiescenceTracker {
    /// Create a tracker whose context is forked from the ambient context,
    /// or from nothing when there is none.
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self::with_parent(ExecutionContext::current(), name, properties)
    }

    pub fn with_parent(
        parent: Option<ExecutionContext>,
        name: impl Into<String>,
        properties: Properties,
    ) -> Self {
        let (sender, receiver) = oneshot::channel();
        let context =
            ExecutionContext::fork_tracked(parent, name, properties, TrackerState::new(sender));
        Self { context, receiver }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Invoke `body` in the tracked context and wait for its settlement.
    /// Work still outstanding when the run ends (or is dropped on a
    /// deadline) is cancelled.
    pub async fn run<F>(self, body: F) -> Settlement
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let Self { context, receiver } = self;
        let _cancel = CancelOnDrop(context.clone());
        context.spawn(body);

        match receiver.await {
            Ok(settlement) => settlement,
            Err(_) => Settlement::Error(Fault::from_error(anyhow::anyhow!(
                "context {} was dropped before it settled",
                context.id()
            ))),
        }
    }
}

struct CancelOnDrop(ExecutionContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub(super) fn add_idle_observer(owner: &ExecutionContext, observer: IdleObserver) {
    if let Some(tracker) = owner.state().tracker.as_mut() {
        tracker.idle.push(observer);
    }
}

/// Declare stability if `context` owns a tracker and has gone quiet.
///
/// Idle observers run first at nesting depth one; anything they schedule
/// cancels this attempt, and the completion of that work triggers the
/// next one.
pub(super) fn check_stable(context: &ExecutionContext) {
    let observers = {
        let mut state = context.state();
        let quiet = state.nesting == 0 && state.pending == 0;
        let Some(tracker) = state.tracker.as_ref() else {
            return;
        };
        if !quiet || tracker.settled.is_some() {
            return;
        }
        let observers = tracker.idle.clone();
        state.nesting += 1;
        observers
    };

    for observer in &observers {
        let notified = panic::catch_unwind(AssertUnwindSafe(|| {
            CURRENT.sync_scope(context.clone(), || observer(context))
        }));
        if let Err(payload) = notified {
            deliver_fault(context, Fault::from_panic(payload));
        }
    }

    let sender = {
        let mut state = context.state();
        state.nesting = state.nesting.saturating_sub(1);
        if state.nesting > 0 || state.pending > 0 {
            return;
        }
        let Some(tracker) = state.tracker.as_mut() else {
            return;
        };
        if tracker.settled.is_some() {
            return;
        }
        tracker.settled = Some(Settled::Stable);
        tracker.sender.take()
    };

    debug!(context = context.id(), name = %context.name(), "context stable");
    deliver(context, sender, Settlement::Stable);
}

/// Settle `owner` with `fault`, or log it when the context already settled
pub(super) fn deliver_fault(owner: &ExecutionContext, fault: Fault) {
    let (sender, previous) = {
        let mut state = owner.state();
        let Some(tracker) = state.tracker.as_mut() else {
            return;
        };
        match tracker.settled {
            None => {
                tracker.settled = Some(Settled::Error);
                (tracker.sender.take(), None)
            }
            Some(previous) => (None, Some(previous)),
        }
    };

    match previous {
        None => {
            debug!(context = owner.id(), name = %owner.name(), "context faulted: {}", fault);
            deliver(owner, sender, Settlement::Error(fault));
        }
        Some(Settled::Stable) => error!(
            context = owner.id(),
            name = %owner.name(),
            "fault reported after the context already settled stable (tracker bookkeeping defect): {}",
            fault
        ),
        Some(Settled::Error) => warn!(
            context = owner.id(),
            name = %owner.name(),
            "secondary fault after the context already failed: {}", fault
        ),
    }
}

fn deliver(
    context: &ExecutionContext,
    sender: Option<oneshot::Sender<Settlement>>,
    settlement: Settlement,
) {
    let Some(sender) = sender else {
        return;
    };
    if let Err(settlement) = sender.send(settlement) {
        match settlement {
            Settlement::Stable => debug!(
                context = context.id(),
                "context settled after its run was abandoned"
            ),
            Settlement::Error(fault) => warn!(
                context = context.id(),
                name = %context.name(),
                "fault arrived after the run was abandoned: {}", fault
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{defer, spawn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn explode(message: &'static str) -> anyhow::Result<()> {
        panic!("{}", message)
    }

    #[tokio::test]
    async fn test_sync_body_settles_stable() {
        let tracker = QuiescenceTracker::new("sync", Properties::new());
        assert!(tracker.run(async { Ok(()) }).await.is_stable());
    }

    #[tokio::test]
    async fn test_waits_for_deferred_work() {
        let finished = Arc::new(AtomicUsize::new(0));
        let seen = finished.clone();

        let tracker = QuiescenceTracker::new("deferred", Properties::new());
        let settlement = tracker
            .run(async move {
                defer(Duration::from_millis(30), move || {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                Ok(())
            })
            .await;

        assert!(settlement.is_stable());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_in_deferred_work_is_attributed() {
        let tracker = QuiescenceTracker::new("deferred error", Properties::new());
        let settlement = tracker
            .run(async {
                defer(Duration::from_millis(10), || anyhow::bail!("late failure"));
                Ok(())
            })
            .await;

        match settlement {
            Settlement::Error(fault) => assert!(fault.to_string().contains("late failure")),
            Settlement::Stable => panic!("expected an error settlement"),
        }
    }

    #[tokio::test]
    async fn test_panic_in_nested_spawn_is_attributed() {
        let tracker = QuiescenceTracker::new("nested panic", Properties::new());
        let settlement = tracker
            .run(async {
                spawn(async {
                    spawn(async { explode("deep panic") });
                    Ok(())
                });
                Ok(())
            })
            .await;

        match settlement {
            Settlement::Error(Fault::Panic { message }) => assert_eq!(message, "deep panic"),
            other => panic!("unexpected settlement: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_observer_can_reschedule() {
        let rounds = Arc::new(AtomicUsize::new(0));
        let counter = rounds.clone();

        let tracker = QuiescenceTracker::new("idle", Properties::new());
        tracker.context().on_idle(move |context| {
            // chain two extra rounds of work before going stable
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                context.spawn(async { Ok(()) });
            }
        });

        assert!(tracker.run(async { Ok(()) }).await.is_stable());
        assert_eq!(rounds.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unrelated_context_is_ignored() {
        let unrelated = ExecutionContext::root("background", Properties::new());
        let (release, hold) = oneshot::channel::<()>();
        unrelated.spawn(async move {
            let _ = hold.await;
            Ok(())
        });

        let tracker = QuiescenceTracker::with_parent(None, "isolated", Properties::new());
        assert!(tracker.run(async { Ok(()) }).await.is_stable());
        assert_eq!(unrelated.pending(), 1);

        release.send(()).unwrap();
    }

    #[tokio::test]
    async fn test_child_without_tracker_bubbles_to_owner() {
        let tracker = QuiescenceTracker::new("owner", Properties::new());
        let owner_id = tracker.context().id();

        let settlement = tracker
            .run(async move {
                let context = ExecutionContext::current().expect("ambient context");
                assert_eq!(context.id(), owner_id);
                let child = context.fork("child", Properties::new());
                child.spawn(async { anyhow::bail!("child failure") });
                Ok(())
            })
            .await;

        assert!(!settlement.is_stable());
    }

    #[tokio::test]
    async fn test_abandoned_run_cancels_its_work() {
        let outer = ExecutionContext::root("outer", Properties::new());
        let tracker = QuiescenceTracker::with_parent(Some(outer.clone()), "hangs", Properties::new());
        let run = tracker.run(async {
            spawn(futures::future::pending::<anyhow::Result<()>>());
            futures::future::pending::<()>().await;
            Ok(())
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(20), run).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(outer.pending(), 0);
    }

    #[tokio::test]
    async fn test_settles_only_once() {
        let tracker = QuiescenceTracker::new("twice", Properties::new());
        let settlement = tracker
            .run(async {
                spawn(async { anyhow::bail!("first") });
                spawn(async { anyhow::bail!("second") });
                Ok(())
            })
            .await;

        // the second fault is logged, never delivered
        assert!(matches!(settlement, Settlement::Error(_)));
    }
}
