//! # fibrous
//!
//! A fair, interruption-safe asynchronous mutex, together with the small
//! fiber runtime and synchronization building blocks it is made of.
//!
//! ## Overview
//!
//! - **Effect**: [`AsyncIO`](effect::AsyncIO), a lazy asynchronous effect
//!   that every operation in the crate returns.
//! - **Fibers**: [`Fiber`](fiber::Fiber) forks effects onto tokio, with
//!   cooperative interruption and `uninterruptible_mask`/`Restore` masking.
//! - **Sync**: [`Signal`](sync::Signal) (one-shot notification),
//!   [`SynchronizedRef`](sync::SynchronizedRef) (serialized read-modify-write
//!   cell), and the queued locks built from them:
//!   [`Mutex`](sync::Mutex) and [`Semaphore`](sync::Semaphore).
//!
//! Waiters on a `Mutex` are served strictly in arrival order. A waiter that
//! is interrupted while queued removes itself, and a waiter interrupted just
//! after the lock was handed to it passes the lock on, so the lock is never
//! leaked.
//!
//! ## Feature Flags
//!
//! - `effect`: `AsyncIO` and the shared runtime
//! - `fiber`: fibers and interruption (implies `effect`)
//! - `sync`: signals, synchronized references, mutex, semaphore (implies `fiber`)
//! - `full`: Enable all features
//!
//! ## Example
//!
//! ```rust,ignore
//! use fibrous::prelude::*;
//!
//! let mutex = Mutex::make().await;
//! let total = mutex
//!     .with_lock(AsyncIO::new(|| async { Ok(1 + 1) }))
//!     .await?;
//! assert_eq!(total, 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and functions.
///
/// # Usage
///
/// ```rust
/// use fibrous::prelude::*;
/// ```
pub mod prelude {

    #[cfg(feature = "effect")]
    pub use crate::effect::*;

    #[cfg(feature = "fiber")]
    pub use crate::fiber::{
        Fiber, FiberError, FiberId, InterruptStatus, Interrupted, Restore, uninterruptible_mask,
    };

    #[cfg(feature = "sync")]
    pub use crate::sync::*;
}

#[cfg(feature = "effect")]
pub mod effect;

#[cfg(feature = "fiber")]
pub mod fiber;

#[cfg(feature = "sync")]
pub mod sync;
