// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Observable value cell.
//
// An `Observable` holds one current value and an ordered set of subscriber
// callbacks. `set` replaces the value and then calls every subscriber in
// registration order. The cell's own lock is released before dispatch, so a
// subscriber may cancel itself or register others without deadlocking, and
// it is never held while the owning log holds its write lock across I/O.
//
// Live queries use `wait_until`: the waiter is registered and the current
// value re-checked under the same lock, which closes the missed-wakeup
// window between "is the data there yet" and "tell me when it is".

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ObservableError;

/// What a subscriber is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification<'a, T> {
    /// The cell now holds this value.
    Value(&'a T),
    /// The cell was closed; the subscription is over.
    Closed,
}

type Callback<T> = Arc<dyn Fn(Notification<'_, T>) -> Result<(), ObservableError> + Send + Sync>;

struct Inner<T> {
    value: T,
    closed: bool,
    next_id: u64,
    subscribers: BTreeMap<u64, Callback<T>>,
}

/// A shared value cell with change notification.
///
/// Clones share the same cell.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("closed", &inner.closed)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn callback<T, F>(f: F) -> Callback<T>
where
    F: Fn(Notification<'_, T>) -> Result<(), ObservableError> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl<T> Observable<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                closed: false,
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// Current value.
    pub fn value(&self) -> T {
        lock(&self.inner).value.clone()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// Replace the value and notify subscribers in registration order.
    ///
    /// Subscriber errors are logged and do not stop dispatch.
    pub fn set(&self, value: T) -> Result<(), ObservableError> {
        let subscribers: Vec<Callback<T>> = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return Err(ObservableError::Closed);
            }
            inner.value = value.clone();
            inner.subscribers.values().cloned().collect()
        };
        for subscriber in subscribers {
            if let Err(e) = subscriber(Notification::Value(&value)) {
                warn!(error = %e, "observable subscriber failed");
            }
        }
        Ok(())
    }

    /// Register a subscriber for every later `set` and for the final close.
    ///
    /// The returned handle removes the subscriber when cancelled or dropped.
    /// On an already closed cell the subscriber receives `Closed` at once.
    pub fn register<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(Notification<'_, T>) -> Result<(), ObservableError> + Send + Sync + 'static,
    {
        let id = {
            let mut inner = lock(&self.inner);
            if !inner.closed {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.subscribers.insert(id, callback(subscriber));
                Some(id)
            } else {
                drop(inner);
                if let Err(e) = subscriber(Notification::Closed) {
                    warn!(error = %e, "observable subscriber failed on close");
                }
                None
            }
        };
        match id {
            Some(id) => Subscription::new(Arc::downgrade(&self.inner), id),
            None => Subscription::noop(),
        }
    }

    /// Close the cell and send the terminal notification to every subscriber.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) {
        let subscribers: Vec<Callback<T>> = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return;
            }
            inner.closed = true;
            std::mem::take(&mut inner.subscribers).into_values().collect()
        };
        for subscriber in subscribers {
            if let Err(e) = subscriber(Notification::Closed) {
                warn!(error = %e, "observable subscriber failed on close");
            }
        }
    }

    /// Wait until the value satisfies `pred`, returning that value.
    ///
    /// Returns immediately if the current value already matches. Fails with
    /// `Cancelled` when `cancel` fires and with `Closed` when the cell is
    /// closed first. The subscription is gone by the time this returns.
    pub async fn wait_until<P>(
        &self,
        pred: P,
        cancel: &CancellationToken,
    ) -> Result<T, ObservableError>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, ObservableError>>();
        let tx = Mutex::new(Some(tx));

        let _subscription = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return Err(ObservableError::Closed);
            }
            if pred(&inner.value) {
                return Ok(inner.value.clone());
            }
            let id = inner.next_id;
            inner.next_id += 1;
            let waiter = callback(move |n| {
                let outcome = match n {
                    Notification::Value(v) if pred(v) => Ok(v.clone()),
                    Notification::Value(_) => return Ok(()),
                    Notification::Closed => Err(ObservableError::Closed),
                };
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(outcome);
                }
                Ok(())
            });
            inner.subscribers.insert(id, waiter);
            Subscription::new(Arc::downgrade(&self.inner), id)
        };

        tokio::select! {
            outcome = rx => outcome.unwrap_or(Err(ObservableError::Closed)),
            _ = cancel.cancelled() => Err(ObservableError::Cancelled),
        }
    }
}

/// Handle to a registered subscriber.
///
/// Dropping the handle cancels the subscription; call [`Subscription::detach`]
/// to keep it for the lifetime of the observable.
#[must_use = "dropping a Subscription unregisters the subscriber"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<T: Send + 'static>(cell: Weak<Mutex<Inner<T>>>, id: u64) -> Self {
        Self {
            cancel: Some(Box::new(move || {
                if let Some(cell) = cell.upgrade() {
                    lock(&cell).subscribers.remove(&id);
                }
            })),
        }
    }

    fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unregister the subscriber.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the subscriber registered after this handle is dropped.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
