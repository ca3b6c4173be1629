//! Synchronous state subjects and derived selections
//!
//! A [`StateSubject`] holds the latest value of something (the whole state
//! tree, or one feature store's slice) and calls its listeners synchronously
//! every time a new value is published. A [`Selection`] maps that value and
//! filters out consecutive duplicates per subscriber.
//!
//! Listeners run outside of every lock, so a listener may dispatch, subscribe
//! or unsubscribe while it is being notified.

use crate::lock;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerEntry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Listener<T>,
}

impl<T> Clone for ListenerEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Latest value plus synchronous listeners (a behavior subject)
pub(crate) struct StateSubject<T> {
    current: Mutex<T>,
    listeners: Mutex<Vec<ListenerEntry<T>>>,
    next_id: AtomicU64,
}

impl<T> StateSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(initial: T) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    pub(crate) fn value(&self) -> T {
        lock(&self.current).clone()
    }

    /// Publish a new value and notify every active listener
    pub(crate) fn next(&self, value: T) {
        *lock(&self.current) = value.clone();

        let listeners = lock(&self.listeners).clone();
        for entry in listeners {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(&value);
            }
        }
    }

    /// Register a listener and immediately call it with the current value
    pub(crate) fn subscribe(self: &Arc<Self>, callback: Listener<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        lock(&self.listeners).push(ListenerEntry {
            id,
            active: Arc::clone(&active),
            callback: Arc::clone(&callback),
        });

        let subject: Weak<Self> = Arc::downgrade(self);
        let flag = Arc::clone(&active);
        let subscription = Subscription::new(move || {
            flag.store(false, Ordering::Release);
            if let Some(subject) = subject.upgrade() {
                lock(&subject.listeners).retain(|entry| entry.id != id);
            }
        });

        let current = self.value();
        if active.load(Ordering::Acquire) {
            callback(&current);
        }

        subscription
    }

    pub(crate) fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// Handle to an active listener
///
/// Dropping the handle unsubscribes. Call [`detach`](Self::detach) to keep the
/// listener for the lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop receiving values
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the listener alive without holding the handle
    pub fn detach(mut self) {
        self.cancel = None;
    }

    /// Whether this handle still controls a listener
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A mapped, duplicate-suppressing view over a subject
///
/// Every subscriber receives the current derived value on subscription and
/// afterwards only values that differ from the last one it received.
pub struct Selection<T, R> {
    subject: Arc<StateSubject<T>>,
    map: Arc<dyn Fn(&T) -> R + Send + Sync>,
}

impl<T, R> Clone for Selection<T, R> {
    fn clone(&self) -> Self {
        Self {
            subject: Arc::clone(&self.subject),
            map: Arc::clone(&self.map),
        }
    }
}

impl<T, R> fmt::Debug for Selection<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection").finish_non_exhaustive()
    }
}

impl<T, R> Selection<T, R>
where
    T: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Send + Sync + 'static,
{
    pub(crate) fn new<F>(subject: Arc<StateSubject<T>>, map: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Self {
            subject,
            map: Arc::new(map),
        }
    }

    /// The derived value for the latest published source value
    #[must_use]
    pub fn get(&self) -> R {
        (self.map)(&self.subject.value())
    }

    /// Call `callback` with the current value and every distinct change
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        let map = Arc::clone(&self.map);
        let last: Mutex<Option<R>> = Mutex::new(None);

        self.subject.subscribe(Arc::new(move |source: &T| {
            let value = map(source);
            {
                let mut last = lock(&last);
                if last.as_ref() == Some(&value) {
                    return;
                }
                *last = Some(value.clone());
            }
            callback(value);
        }))
    }

    /// Derive a further selection from this one
    #[must_use]
    pub fn map<U, F>(&self, project: F) -> Selection<T, U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let map = Arc::clone(&self.map);
        Selection::new(Arc::clone(&self.subject), move |source: &T| project(map(source)))
    }

    /// Receive the distinct values as an async stream
    ///
    /// The stream starts with the current value and stays subscribed until it
    /// is dropped.
    #[must_use]
    pub fn stream(&self) -> StoreStream<R> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value| {
            let _ = sender.send(value);
        });

        StoreStream::new(async_stream::stream! {
            let _subscription = subscription;
            while let Some(value) = receiver.recv().await {
                yield value;
            }
        })
    }
}

/// Boxed stream type handed out by the runtime
pub struct StoreStream<T> {
    inner: Pin<Box<dyn Stream<Item = T> + Send>>,
}

impl<T> StoreStream<T> {
    pub(crate) fn new<St>(stream: St) -> Self
    where
        St: Stream<Item = T> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl<T> Stream for StoreStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<T> fmt::Debug for StoreStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreStream").finish_non_exhaustive()
    }
}
