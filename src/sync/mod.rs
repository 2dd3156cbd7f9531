//! Synchronization primitives built on fibers.
//!
//! - [`Signal`]: one-shot notification with any number of waiters.
//! - [`SynchronizedRef`]: a cell whose effectful updates run one at a time.
//! - [`Mutex`]: fair lock whose waiters queue on signals, safe to interrupt
//!   at any point.
//! - [`Semaphore`]: the same protocol with a permit count.
//!
//! # Examples
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//! use fibrous::fiber::Fiber;
//! use fibrous::sync::Mutex;
//!
//! let mutex = Mutex::make().await;
//! mutex.acquire().await?;
//!
//! // Queues behind the current holder.
//! let waiter = Fiber::fork(mutex.acquire()).await;
//!
//! // Interrupting the waiter removes it from the queue.
//! waiter.interrupt().await.unwrap_err();
//! assert_eq!(mutex.snapshot().await.waiting, 0);
//! ```

mod mutex;
mod queued;
mod semaphore;
mod signal;
mod synchronized;
mod wait_queue;

pub use mutex::{Mutex, MutexSnapshot};
pub use semaphore::{Semaphore, SemaphoreError};
pub use signal::{Signal, SignalId};
pub use synchronized::SynchronizedRef;
