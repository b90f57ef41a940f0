use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskgraph::{Args, Value, Work};

/// Records which work items were invoked, and how often.
///
/// Every [`Work`] produced by a recorder pushes its label onto a shared log
/// before running, so tests can assert on call counts and on order.
#[derive(Clone, Default)]
pub struct CallRecorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work that records `label` and runs `f`.
    pub fn work<F>(&self, label: &str, f: F) -> Work
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let log = Arc::clone(&self.log);
        let label = label.to_string();
        Work::sync(move |args| {
            log.lock().unwrap().push(label.clone());
            f(args)
        })
    }

    /// Work that records `label` and returns `value`.
    pub fn constant(&self, label: &str, value: impl Into<Value>) -> Work {
        let value = value.into();
        self.work(label, move |_| Ok(value.clone()))
    }

    /// Work that records `label` and fails with `message`.
    pub fn failing(&self, label: &str, message: &str) -> Work {
        let message = message.to_string();
        self.work(label, move |_| Err(anyhow::anyhow!("{message}")))
    }

    /// Async work that records `label`, sleeps, then returns `value`.
    pub fn delayed(&self, label: &str, delay: Duration, value: impl Into<Value>) -> Work {
        let log = Arc::clone(&self.log);
        let label = label.to_string();
        let value = value.into();
        Work::from_async(move |_| {
            log.lock().unwrap().push(label.clone());
            let value = value.clone();
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
        })
    }

    pub fn calls(&self, label: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|l| *l == label).count()
    }

    pub fn total(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn order(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in self.log.lock().unwrap().iter() {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Tracks how many probe units run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Async work that holds a slot for `delay`.
    pub fn async_work(&self, delay: Duration) -> Work {
        let probe = self.clone();
        Work::from_async(move |_| {
            let probe = probe.clone();
            async move {
                probe.enter();
                tokio::time::sleep(delay).await;
                probe.leave();
                Ok(Value::Null)
            }
        })
    }

    /// Blocking work that holds a slot for `delay`.
    pub fn sync_work(&self, delay: Duration) -> Work {
        let probe = self.clone();
        Work::sync(move |_| {
            probe.enter();
            std::thread::sleep(delay);
            probe.leave();
            Ok(Value::Null)
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}
