// src/work.rs

//! Units of work wrapped by task nodes.
//!
//! A [`Work`] is tagged as synchronous or asynchronous when it is built and
//! runners branch on that tag; nothing inspects the body afterwards.
//! A [`WorkTable`] maps string keys to work so graphs can be described in
//! configuration and so process workers can resolve work by reference.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;

use crate::value::{Args, Value};

/// Boxed future returned by asynchronous work.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

pub type SyncFn = dyn Fn(Args) -> anyhow::Result<Value> + Send + Sync;
pub type AsyncFn = dyn Fn(Args) -> WorkFuture + Send + Sync;

/// The callable itself.
#[derive(Clone)]
pub enum WorkBody {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// A work item plus the optional key it was resolved from.
#[derive(Clone)]
pub struct Work {
    body: WorkBody,
    key: Option<String>,
}

impl Work {
    /// Wrap a blocking function.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            body: WorkBody::Sync(Arc::new(f)),
            key: None,
        }
    }

    /// Wrap an async function. Any graph containing async work is executed by
    /// the cooperative runner.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let body: Arc<AsyncFn> = Arc::new(move |args| Box::pin(f(args)) as WorkFuture);
        Self {
            body: WorkBody::Async(body),
            key: None,
        }
    }

    /// Attach the table key this work can be referenced by.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, WorkBody::Async(_))
    }

    pub fn body(&self) -> &WorkBody {
        &self.body
    }

    /// Invoke synchronous work on the current thread.
    ///
    /// Panics inside the body are converted into errors. Calling this on
    /// async work is an error; such work must be awaited via
    /// [`Work::to_future`].
    pub fn call_blocking(&self, args: Args) -> anyhow::Result<Value> {
        match &self.body {
            WorkBody::Sync(f) => call_catching_panics(f.as_ref(), args),
            WorkBody::Async(_) => Err(anyhow!(
                "async work cannot be invoked outside the cooperative runner"
            )),
        }
    }

    /// Produce a future for this work. Synchronous bodies yield to the
    /// scheduler once and then run inline.
    pub fn to_future(&self, args: Args) -> WorkFuture {
        match &self.body {
            WorkBody::Async(f) => f(args),
            WorkBody::Sync(f) => {
                let f = Arc::clone(f);
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    f(args)
                })
            }
        }
    }
}

impl fmt::Debug for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_async() { "async" } else { "sync" };
        f.debug_struct("Work")
            .field("kind", &kind)
            .field("key", &self.key)
            .finish()
    }
}

pub(crate) fn call_catching_panics(f: &SyncFn, args: Args) -> anyhow::Result<Value> {
    match panic::catch_unwind(AssertUnwindSafe(|| f(args))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("task panicked: {}", panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Lookup table from string keys to work.
#[derive(Clone, Default)]
pub struct WorkTable {
    entries: BTreeMap<String, Work>,
}

impl WorkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register work under `key`; the stored copy remembers its key.
    pub fn insert(&mut self, key: impl Into<String>, work: Work) -> &mut Self {
        let key = key.into();
        self.entries.insert(key.clone(), work.with_key(key));
        self
    }

    /// Builder-style variant of [`WorkTable::insert`].
    pub fn with(mut self, key: impl Into<String>, work: Work) -> Self {
        self.insert(key, work);
        self
    }

    pub fn get(&self, key: &str) -> Option<Work> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for WorkTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entries_remember_their_key() {
        let table = WorkTable::new().with("one", Work::sync(|_| Ok(Value::Int(1))));
        let work = table.get("one").expect("registered");
        assert_eq!(work.key(), Some("one"));
        assert!(!work.is_async());
        assert_eq!(work.call_blocking(Args::new()).unwrap(), Value::Int(1));
    }

    #[test]
    fn panics_become_errors() {
        let work = Work::sync(|_| panic!("boom"));
        let err = work.call_blocking(Args::new()).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn async_work_refuses_blocking_calls() {
        let work = Work::from_async(|_| async { Ok(Value::Null) });
        assert!(work.is_async());
        assert!(work.call_blocking(Args::new()).is_err());
    }
}
