//! Cell whose updates are serialized, even across suspension.
//!
//! A [`SynchronizedRef`] holds a value that can only be changed through a
//! modifier effect. Modifiers run one at a time in arrival order, and a
//! modifier may suspend (create a signal, resolve one, sleep) while it holds
//! the cell. No other update can observe or change the value until it
//! completes.
//!
//! The modifier works on a clone of the current value and returns the next
//! one. The stored value is only replaced once the modifier's effect has
//! finished, so a modifier that is abandoned midway leaves the previous value
//! untouched.
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//! use fibrous::sync::SynchronizedRef;
//!
//! let counter = SynchronizedRef::make(0).await;
//! let previous = counter
//!     .modify_uninterruptible(|n| AsyncIO::pure((n, n + 1)))
//!     .await;
//! assert_eq!(previous, 0);
//! assert_eq!(counter.get().await, 1);
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::effect::AsyncIO;
use crate::fiber::{self, Interrupted};

/// A shared cell with serialized, effectful read-modify-write.
///
/// Clones share the same cell.
pub struct SynchronizedRef<V> {
    cell: Arc<Mutex<V>>,
}

impl<V: Clone + Send + 'static> SynchronizedRef<V> {
    /// Creates a cell holding `initial`.
    pub fn new(initial: V) -> Self {
        Self {
            cell: Arc::new(Mutex::new(initial)),
        }
    }

    /// Effect creating a cell holding `initial`.
    pub fn make(initial: V) -> AsyncIO<Self> {
        AsyncIO::new(move || async move { Self::new(initial) })
    }

    /// Reads the current value, waiting for any modifier in progress.
    pub fn get(&self) -> AsyncIO<V> {
        let cell = Arc::clone(&self.cell);
        AsyncIO::new(move || async move { cell.lock().await.clone() })
    }

    /// Replaces the value, waiting for any modifier in progress.
    pub fn set(&self, value: V) -> AsyncIO<()> {
        let cell = Arc::clone(&self.cell);
        AsyncIO::new(move || async move {
            *cell.lock().await = value;
        })
    }

    /// Runs `modifier` on the current value and stores the value it returns.
    ///
    /// Waiting for earlier modifiers is an interruptible suspension point. An
    /// interruption observed there means the modifier never ran.
    pub fn modify<R, F>(&self, modifier: F) -> AsyncIO<Result<R, Interrupted>>
    where
        F: FnOnce(V) -> AsyncIO<(R, V)> + Send + 'static,
        R: Send + 'static,
    {
        let cell = Arc::clone(&self.cell);
        AsyncIO::new(move || async move {
            let guard = fiber::suspend(cell.lock_owned()).await?;
            Ok(commit(guard, modifier).await)
        })
    }

    /// Like [`modify`](Self::modify), but the wait cannot be interrupted.
    pub fn modify_uninterruptible<R, F>(&self, modifier: F) -> AsyncIO<R>
    where
        F: FnOnce(V) -> AsyncIO<(R, V)> + Send + 'static,
        R: Send + 'static,
    {
        let cell = Arc::clone(&self.cell);
        AsyncIO::new(move || async move {
            let guard = cell.lock_owned().await;
            commit(guard, modifier).await
        })
    }

    /// Replaces the value with the result of `updater`.
    pub fn update<F>(&self, updater: F) -> AsyncIO<Result<(), Interrupted>>
    where
        F: FnOnce(V) -> AsyncIO<V> + Send + 'static,
    {
        self.modify(move |value| updater(value).fmap(|next| ((), next)))
    }
}

async fn commit<V, R, F>(mut guard: OwnedMutexGuard<V>, modifier: F) -> R
where
    V: Clone,
    F: FnOnce(V) -> AsyncIO<(R, V)>,
{
    let (result, next) = modifier((*guard).clone()).await;
    *guard = next;
    result
}

impl<V> Clone for SynchronizedRef<V> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<V: Clone + Default + Send + 'static> Default for SynchronizedRef<V> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

impl<V: fmt::Debug> fmt::Debug for SynchronizedRef<V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = formatter.debug_struct("SynchronizedRef");
        match self.cell.try_lock() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &format_args!("<modifying>")),
        };
        debug.finish()
    }
}

static_assertions::assert_impl_all!(SynchronizedRef<Vec<u8>>: Send, Sync, Clone);
