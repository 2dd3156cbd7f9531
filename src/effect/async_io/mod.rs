//! `AsyncIO` - deferred asynchronous effects.
//!
//! `AsyncIO<A>` describes an asynchronous computation producing an `A`.
//! Nothing happens until the value is awaited, so an `AsyncIO` can be built,
//! passed around and stored without running any of its side effects. Every
//! primitive in this crate (signals, synchronized references, mutexes,
//! fibers) hands out its operations as `AsyncIO` values.
//!
//! # impl `Future`
//!
//! `AsyncIO` implements `Future` via `pin_project_lite`, so it can be awaited
//! directly:
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = AsyncIO::pure(10)
//!         .fmap(|x| x * 2)
//!         .flat_map(|x| AsyncIO::pure(x + 1))
//!         .await;
//!     assert_eq!(result, 21);
//! }
//! ```
//!
//! # Evaluation Semantics
//!
//! `AsyncIO::pure(value)` holds an already-computed value. `fmap` and
//! `flat_map` on a `Pure` state apply their function immediately, without
//! boxing. Anything with side effects must go through `AsyncIO::new`, whose
//! closure only runs on first poll:
//!
//! ```rust,ignore
//! // Runs when awaited, not when built.
//! let effect = AsyncIO::new(|| async {
//!     println!("acquiring");
//!     42
//! });
//! ```
//!
//! | Scenario                          | Use                                  |
//! |-----------------------------------|--------------------------------------|
//! | Wrapping a computed value         | `AsyncIO::pure(value)`               |
//! | Pure transformation chain         | `.fmap(\|x\| transform(x))`          |
//! | Touching shared state, sleeping   | `AsyncIO::new(\|\| async { ... })`   |

pub mod runtime;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use pin_project_lite::pin_project;

type BoxedFuture<A> = Pin<Box<dyn Future<Output = A> + Send>>;

// =============================================================================
// AsyncIO Struct Definition
// =============================================================================

pin_project! {
    /// A deferred asynchronous effect producing a value of type `A`.
    ///
    /// # Monad Laws
    ///
    /// 1. **Left Identity**: `AsyncIO::pure(a).flat_map(f) == f(a)`
    /// 2. **Right Identity**: `m.flat_map(AsyncIO::pure) == m`
    /// 3. **Associativity**: `m.flat_map(f).flat_map(g) == m.flat_map(|x| f(x).flat_map(g))`
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// let effect = AsyncIO::new(|| async { 40 }).fmap(|x| x + 2);
    /// assert_eq!(effect.await, 42);
    /// ```
    #[must_use = "AsyncIO does nothing unless awaited"]
    pub struct AsyncIO<A> {
        #[pin]
        state: AsyncIOState<A>,
    }
}

pin_project! {
    /// Internal state machine for `AsyncIO`.
    ///
    /// - `Pure` -> `Completed`
    /// - `Defer` -> `Running` -> `Completed`
    /// - `FlatMap` -> `FlatMapRunning` -> `Completed`
    #[project = AsyncIOStateProj]
    enum AsyncIOState<A> {
        Pure {
            value: Option<A>,
        },
        Defer {
            thunk: Option<Box<dyn FnOnce() -> BoxedFuture<A> + Send>>,
        },
        Running {
            #[pin]
            future: BoxedFuture<A>,
        },
        // The continuation stays a typed thunk until the first poll, so building
        // long chains never allocates futures that are not run.
        FlatMap {
            continuation_thunk: Option<Box<dyn FnOnce() -> AsyncIO<A> + Send>>,
        },
        FlatMapRunning {
            #[pin]
            inner: Box<AsyncIO<A>>,
        },
        Completed,
    }
}

// =============================================================================
// Future Implementation
// =============================================================================

impl<A> Future for AsyncIO<A> {
    type Output = A;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state.as_mut().project() {
                AsyncIOStateProj::Pure { value } => {
                    let result = value.take().expect(
                        "AsyncIO internal error: Pure value was already consumed. \
                         This indicates the AsyncIO was polled after completion.",
                    );
                    this.state.set(AsyncIOState::Completed);
                    return Poll::Ready(result);
                }
                AsyncIOStateProj::Defer { thunk } => {
                    let thunk = thunk.take().expect(
                        "AsyncIO internal error: Defer thunk was already consumed. \
                         This indicates a state machine invariant violation.",
                    );
                    let future = thunk();
                    this.state.set(AsyncIOState::Running { future });
                }
                AsyncIOStateProj::Running { future } => match future.poll(context) {
                    Poll::Ready(result) => {
                        this.state.set(AsyncIOState::Completed);
                        return Poll::Ready(result);
                    }
                    Poll::Pending => return Poll::Pending,
                },
                AsyncIOStateProj::FlatMap { continuation_thunk } => {
                    let thunk = continuation_thunk.take().expect(
                        "AsyncIO internal error: FlatMap continuation_thunk was already consumed. \
                         This indicates a state machine invariant violation.",
                    );
                    this.state.set(AsyncIOState::FlatMapRunning {
                        inner: Box::new(thunk()),
                    });
                }
                AsyncIOStateProj::FlatMapRunning { mut inner } => {
                    match inner.as_mut().poll(context) {
                        Poll::Ready(result) => {
                            this.state.set(AsyncIOState::Completed);
                            return Poll::Ready(result);
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
                AsyncIOStateProj::Completed => {
                    panic!(
                        "AsyncIO internal error: AsyncIO was polled after completion. \
                         Futures should not be polled after returning Poll::Ready."
                    );
                }
            }
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

impl<A: 'static> AsyncIO<A> {
    /// Creates a new `AsyncIO` from an async closure.
    ///
    /// The closure is not called until the `AsyncIO` is first polled.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// let effect = AsyncIO::new(|| async {
    ///     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    ///     42
    /// });
    /// ```
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = A> + Send + 'static,
    {
        Self {
            state: AsyncIOState::Defer {
                thunk: Some(Box::new(move || Box::pin(action()))),
            },
        }
    }

    /// Creates an `AsyncIO` from a future that has not been polled yet.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = A> + Send + 'static,
    {
        Self {
            state: AsyncIOState::Defer {
                thunk: Some(Box::new(move || Box::pin(future))),
            },
        }
    }
}

impl<A: Send + 'static> AsyncIO<A> {
    /// Wraps an already-computed value.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// assert_eq!(AsyncIO::pure(42).await, 42);
    /// ```
    pub const fn pure(value: A) -> Self {
        Self {
            state: AsyncIOState::Pure { value: Some(value) },
        }
    }
}

// =============================================================================
// Functor Operations
// =============================================================================

impl<A: Send + 'static> AsyncIO<A> {
    /// Transforms the produced value.
    ///
    /// On a `Pure` value the function is applied immediately without any
    /// allocation; otherwise the application is deferred.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// assert_eq!(AsyncIO::pure(21).fmap(|x| x * 2).await, 42);
    /// ```
    pub fn fmap<B, F>(self, function: F) -> AsyncIO<B>
    where
        F: FnOnce(A) -> B + Send + 'static,
        B: Send + 'static,
    {
        match self {
            Self {
                state: AsyncIOState::Pure { value: Some(a) },
            } => AsyncIO::pure(function(a)),
            other => AsyncIO::new(move || async move { function(other.await) }),
        }
    }
}

// =============================================================================
// Monad Operations
// =============================================================================

impl<A: Send + 'static> AsyncIO<A> {
    /// Chains an effect computed from this effect's value.
    ///
    /// A `Pure` receiver applies the continuation immediately; otherwise a
    /// `FlatMap` state defers building the continuation until first poll.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// let effect = AsyncIO::pure(10).flat_map(|x| AsyncIO::pure(x * 2));
    /// assert_eq!(effect.await, 20);
    /// ```
    pub fn flat_map<B, F>(self, function: F) -> AsyncIO<B>
    where
        F: FnOnce(A) -> AsyncIO<B> + Send + 'static,
        B: Send + 'static,
    {
        match self {
            Self {
                state: AsyncIOState::Pure { value: Some(a) },
            } => function(a),
            other => AsyncIO {
                state: AsyncIOState::FlatMap {
                    continuation_thunk: Some(Box::new(move || {
                        AsyncIO::new(move || async move { function(other.await).await })
                    })),
                },
            },
        }
    }
}

// =============================================================================
// Time
// =============================================================================

impl AsyncIO<()> {
    /// Waits for `duration` once awaited.
    ///
    /// This is a plain delay: it is not an interruption point. Fibers that
    /// should be interruptible while sleeping use [`crate::fiber::sleep`].
    pub fn delay_async(duration: Duration) -> Self {
        Self::new(move || async move {
            tokio::time::sleep(duration).await;
        })
    }
}

impl<A: Send + 'static> AsyncIO<A> {
    /// Returns `Some(value)` if the effect finishes within `duration`.
    ///
    /// On timeout the effect is dropped.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    /// use std::time::Duration;
    ///
    /// let slow = AsyncIO::delay_async(Duration::from_secs(10))
    ///     .timeout(Duration::from_millis(100));
    /// assert_eq!(slow.await, None);
    /// ```
    pub fn timeout(self, duration: Duration) -> AsyncIO<Option<A>> {
        AsyncIO::new(move || async move { tokio::time::timeout(duration, self).await.ok() })
    }
}

// =============================================================================
// Panics
// =============================================================================

impl<A: Send + 'static> AsyncIO<A> {
    /// Converts a panic raised while running the effect into an error value.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use fibrous::effect::AsyncIO;
    ///
    /// let panicking = AsyncIO::new(|| async { panic!("oops") });
    /// let recovered = panicking.catch_async(|_| "recovered".to_string());
    /// assert_eq!(recovered.await, Err::<(), _>("recovered".to_string()));
    /// ```
    pub fn catch_async<E, F>(self, handler: F) -> AsyncIO<Result<A, E>>
    where
        F: FnOnce(Box<dyn std::any::Any + Send>) -> E + Send + 'static,
        E: Send + 'static,
    {
        AsyncIO::new(move || async move {
            AssertUnwindSafe(self)
                .catch_unwind()
                .await
                .map_err(handler)
        })
    }
}

/// Renders a panic payload the way `std` does for `&str` and `String`.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// =============================================================================
// Display Implementation
// =============================================================================

impl<A> std::fmt::Display for AsyncIO<A> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "<AsyncIO>")
    }
}

impl<A> std::fmt::Debug for AsyncIO<A> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("AsyncIO { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[rstest]
    fn display_is_opaque() {
        assert_eq!(format!("{}", AsyncIO::pure(42)), "<AsyncIO>");
    }

    #[rstest]
    #[tokio::test]
    async fn new_is_deferred_until_awaited() {
        let executed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&executed);
        let effect = AsyncIO::new(move || async move {
            flag.store(true, Ordering::SeqCst);
            7
        });

        assert!(!executed.load(Ordering::SeqCst));
        assert_eq!(effect.await, 7);
        assert!(executed.load(Ordering::SeqCst));
    }

    #[rstest]
    #[tokio::test]
    async fn flat_map_on_deferred_runs_in_order() {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);

        let effect = AsyncIO::new(move || async move {
            first.lock().push("first");
            1
        })
        .flat_map(move |x| {
            AsyncIO::new(move || async move {
                second.lock().push("second");
                x + 1
            })
        });

        assert_eq!(effect.await, 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[rstest]
    #[tokio::test]
    async fn fmap_on_pure_is_immediate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let effect = AsyncIO::pure(20).fmap(move |x| {
            counter.fetch_add(1, Ordering::SeqCst);
            x + 1
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(effect.await, 21);
    }

    #[rstest]
    #[tokio::test]
    async fn catch_async_renders_panic_payloads() {
        let effect: AsyncIO<i32> = AsyncIO::new(|| async { panic!("boom") });
        let outcome = effect.catch_async(|payload| panic_message(payload.as_ref())).await;
        assert_eq!(outcome, Err("boom".to_string()));

        let formatted: AsyncIO<i32> = AsyncIO::new(|| async { panic!("code {}", 7) });
        let outcome = formatted.catch_async(|payload| panic_message(payload.as_ref())).await;
        assert_eq!(outcome, Err("code 7".to_string()));
    }
}
