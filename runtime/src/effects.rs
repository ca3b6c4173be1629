//! Effect execution with fault isolation
//!
//! An effect is a factory turning a source stream into a stream of
//! `Result<O, E>`. The runner spawns it on the current Tokio runtime and hands
//! every `Ok` item to a sink (dispatch for store effects, `set_state` for
//! feature-store effects).
//!
//! # Error Handling Strategy
//!
//! **Handled faults**: a pipeline that maps its own failures to fallback items
//! never reaches the runner's recovery path.
//!
//! **Unhandled faults**: an `Err` item, or a panic while building or polling
//! the pipeline, is logged and counted, the failed pipeline is dropped and the
//! factory is called again against the *same* source. The source is shared
//! between pipelines, so items the failed pipeline had not pulled yet are
//! delivered to the next one. After `max_resubscriptions` rebuilds the effect
//! stops.

use crate::StoreError;
use crate::config::EffectConfig;
use crate::metrics::names;
use crate::subject::StoreStream;
use futures::{FutureExt, Stream, StreamExt, future};
use slicestore_core::action::Action;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Stream of applied actions handed to store effects
pub type Actions = StoreStream<Action>;

/// Stream of trigger payloads handed to feature-store effects
pub type Payloads<P> = StoreStream<P>;

impl StoreStream<Action> {
    /// Keep only actions whose type is one of `types`
    pub fn of_type<I, T>(self, types: I) -> impl Stream<Item = Action> + Send
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let allowed: Vec<String> = types.into_iter().map(Into::into).collect();
        self.filter(move |action| {
            future::ready(allowed.iter().any(|allowed| action.is(allowed)))
        })
    }
}

/// A long-lived input shared by all incarnations of one effect
pub(crate) struct EffectSource<T> {
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> EffectSource<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// A fresh view on the source; items are taken only when polled
    pub(crate) fn stream(&self) -> StoreStream<T> {
        let receiver = Arc::clone(&self.receiver);
        StoreStream::new(async_stream::stream! {
            loop {
                let next = receiver.lock().await.recv().await;
                match next {
                    Some(item) => yield item,
                    None => break,
                }
            }
        })
    }
}

/// Handle to a running effect
#[derive(Debug)]
pub struct EffectHandle {
    task: JoinHandle<()>,
}

impl EffectHandle {
    /// Stop the effect; in-flight work of its pipeline is dropped
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the effect completed, stopped or was cancelled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Function feeding payloads into a feature-store effect
pub struct EffectTrigger<P> {
    sender: mpsc::UnboundedSender<P>,
}

impl<P> EffectTrigger<P> {
    pub(crate) const fn new(sender: mpsc::UnboundedSender<P>) -> Self {
        Self { sender }
    }

    /// Feed one payload into the effect pipeline
    ///
    /// Payloads sent after the effect stopped are dropped.
    pub fn trigger(&self, payload: P) {
        if self.sender.send(payload).is_err() {
            tracing::debug!("Effect is no longer running, payload dropped");
        }
    }
}

impl<P> Clone for EffectTrigger<P> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<P> fmt::Debug for EffectTrigger<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectTrigger")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Why a pipeline incarnation ended
enum Outcome {
    Completed,
    SinkClosed,
    Fault(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "effect panicked".to_string())
}

/// Spawn an effect with the resubscribe-on-fault policy
///
/// `sink` receives every successful item and returns `false` once its target
/// (store or feature store) is gone, which stops the effect.
pub(crate) fn spawn_effect<T, O, E, F, St, K>(
    name: String,
    source: EffectSource<T>,
    factory: F,
    config: EffectConfig,
    mut sink: K,
) -> Result<EffectHandle, StoreError>
where
    T: Send + 'static,
    O: Send + 'static,
    E: fmt::Display + Send + 'static,
    F: Fn(StoreStream<T>) -> St + Send + Sync + 'static,
    St: Stream<Item = Result<O, E>> + Send + 'static,
    K: FnMut(O) -> bool + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

    let task = runtime.spawn(async move {
        let mut resubscriptions = 0_u32;

        loop {
            let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| factory(source.stream()))) {
                Err(payload) => Outcome::Fault(panic_message(payload.as_ref())),
                Ok(pipeline) => {
                    let mut pipeline = Box::pin(pipeline);
                    loop {
                        match AssertUnwindSafe(pipeline.next()).catch_unwind().await {
                            Ok(Some(Ok(item))) => {
                                if !sink(item) {
                                    break Outcome::SinkClosed;
                                }
                            },
                            Ok(Some(Err(error))) => break Outcome::Fault(error.to_string()),
                            Ok(None) => break Outcome::Completed,
                            Err(payload) => break Outcome::Fault(panic_message(payload.as_ref())),
                        }
                    }
                },
            };

            match outcome {
                Outcome::Completed => {
                    tracing::debug!(effect = %name, "Effect completed");
                    return;
                },
                Outcome::SinkClosed => {
                    tracing::debug!(effect = %name, "Effect target dropped, stopping effect");
                    return;
                },
                Outcome::Fault(error) => {
                    metrics::counter!(names::EFFECT_FAULTS, "effect" => name.clone()).increment(1);

                    if resubscriptions >= config.max_resubscriptions {
                        metrics::counter!(names::EFFECT_EXHAUSTED, "effect" => name.clone())
                            .increment(1);
                        tracing::error!(
                            effect = %name,
                            error = %error,
                            resubscriptions,
                            "Effect failed after exhausting resubscriptions, stopping effect"
                        );
                        return;
                    }

                    resubscriptions += 1;
                    tracing::warn!(
                        effect = %name,
                        error = %error,
                        resubscriptions,
                        "An error occurred in the effect, resubscribing"
                    );
                    tokio::task::yield_now().await;
                },
            }
        }
    });

    Ok(EffectHandle { task })
}
