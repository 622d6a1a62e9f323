//! Lifecycle hooks
//!
//! Subjects and suites are lifecycle containers: they hold `before`/`after`
//! handlers and fire them around every test, outermost container first for
//! `before` and last for `after`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::context::{Fault, Properties, QuiescenceTracker, Settlement};
use crate::error::SettleError;

/// A lifecycle handler
pub type Hook = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`Hook`]
pub fn hook<F, Fut>(handler: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || handler().boxed())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Before,
    After,
}

impl FromStr for LifecycleEvent {
    type Err = SettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(LifecycleEvent::Before),
            "after" => Ok(LifecycleEvent::After),
            _ => Err(SettleError::UnknownEvent(s.to_string())),
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Before => write!(f, "before"),
            LifecycleEvent::After => write!(f, "after"),
        }
    }
}

/// Handlers per event, in registration order
#[derive(Default)]
pub struct HookRegistry {
    hooks: Mutex<HashMap<LifecycleEvent, Vec<Hook>>>,
}

impl HookRegistry {
    pub fn add(&self, event: LifecycleEvent, hook: Hook) {
        self.hooks.lock().entry(event).or_default().push(hook);
    }

    pub fn handlers(&self, event: LifecycleEvent) -> Vec<Hook> {
        self.hooks.lock().get(&event).cloned().unwrap_or_default()
    }

    pub fn len(&self, event: LifecycleEvent) -> usize {
        self.hooks.lock().get(&event).map_or(0, Vec::len)
    }

    /// Run this level's handlers one after another, each to quiescence.
    /// `before` stops at the first failure; `after` runs every handler and
    /// reports the first failure.
    pub async fn run(&self, event: LifecycleEvent, timeout: Duration) -> Result<(), Fault> {
        let mut first_fault = None;
        for handler in self.handlers(event) {
            if let Err(fault) = run_hook(event, handler, timeout).await {
                if event == LifecycleEvent::Before {
                    return Err(fault);
                }
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("before", &self.len(LifecycleEvent::Before))
            .field("after", &self.len(LifecycleEvent::After))
            .finish()
    }
}

async fn run_hook(event: LifecycleEvent, handler: Hook, timeout: Duration) -> Result<(), Fault> {
    let tracker = QuiescenceTracker::new(format!("{event} hook"), Properties::new());
    let body = async move { handler().await };

    match tokio::time::timeout(timeout, tracker.run(body)).await {
        Ok(Settlement::Stable) => Ok(()),
        Ok(Settlement::Error(fault)) => Err(fault),
        Err(_) => Err(Fault::from_error(anyhow::anyhow!(
            "{event} hook timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// A node that owns lifecycle handlers and may have a parent container
#[async_trait]
pub trait LifecycleContainer: Send + Sync {
    fn hooks(&self) -> &HookRegistry;

    fn parent_container(&self) -> Option<Arc<dyn LifecycleContainer>>;

    fn add_event_listener(&self, event: LifecycleEvent, handler: Hook) {
        self.hooks().add(event, handler);
    }

    /// Fire `event` through the container chain: ancestors first for
    /// `before`, this level first for `after`.
    async fn fire_event(&self, event: LifecycleEvent, timeout: Duration) -> Result<(), Fault> {
        let parent = self.parent_container();
        match event {
            LifecycleEvent::Before => {
                if let Some(parent) = parent {
                    parent.fire_event(event, timeout).await?;
                }
                self.hooks().run(event, timeout).await
            }
            LifecycleEvent::After => {
                let local = self.hooks().run(event, timeout).await;
                let outer = match parent {
                    Some(parent) => parent.fire_event(event, timeout).await,
                    None => Ok(()),
                };
                local.and(outer)
            }
        }
    }
}
