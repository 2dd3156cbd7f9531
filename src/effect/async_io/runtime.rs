//! Shared tokio runtime for fibers and `AsyncIO`.
//!
//! Fibers are tokio tasks, so something has to own a runtime when the caller
//! is plain synchronous code. This module provides:
//!
//! 1. **Global Runtime**: a lazily-built multi-thread runtime with one worker
//!    per CPU, created once and never dropped.
//! 2. **Handle Lookup**: [`handle`] prefers the runtime the caller is already
//!    running on, so fibers forked from a `#[tokio::test]` stay on the test's
//!    runtime (and its paused clock). Outside any runtime the global handle is
//!    cached per thread.
//! 3. **Blocking Execution**: [`try_run_blocking`] drives a future from
//!    synchronous code, using `block_in_place` when already on a
//!    multi-thread runtime.
//!
//! # Examples
//!
//! ```rust,ignore
//! use fibrous::effect::async_io::runtime::run_blocking;
//! use fibrous::sync::Mutex;
//!
//! let snapshot = run_blocking(async {
//!     let mutex = Mutex::make().await;
//!     mutex.snapshot().await
//! });
//! assert!(!snapshot.locked);
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

// =============================================================================
// Global Runtime
// =============================================================================

static GLOBAL_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("fibrous-worker")
        .enable_all()
        .build()
        .expect("Failed to create global tokio runtime")
});

/// Returns the global runtime, building it on first use.
#[inline]
#[must_use]
pub fn global() -> &'static Runtime {
    &GLOBAL_RUNTIME
}

// =============================================================================
// Handle Caching
// =============================================================================

thread_local! {
    static CACHED_HANDLE: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

/// Returns a handle to the current runtime, or to the global one.
///
/// 1. Inside a tokio runtime: `Handle::current()`.
/// 2. Otherwise: the global runtime's handle, cached per thread.
#[inline]
#[must_use]
pub fn handle() -> Handle {
    if let Ok(current_handle) = Handle::try_current() {
        return current_handle;
    }

    CACHED_HANDLE.with(|cached| {
        cached
            .borrow_mut()
            .get_or_insert_with(|| global().handle().clone())
            .clone()
    })
}

// =============================================================================
// Blocking Error
// =============================================================================

/// Reasons [`try_run_blocking`] cannot drive a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockingError {
    /// `block_in_place` is only available on multi-thread runtimes.
    #[error(
        "cannot execute blocking operation in current-thread runtime: \
         block_in_place is only supported in multi-thread runtimes"
    )]
    CurrentThreadRuntime,

    /// A runtime flavor this module does not know how to block on.
    #[error(
        "cannot execute blocking operation: \
         the runtime flavor is not supported for blocking execution"
    )]
    UnsupportedRuntimeFlavor,
}

// =============================================================================
// Blocking Execution
// =============================================================================

/// Drives `future` to completion from synchronous code.
///
/// - Inside a multi-thread runtime: `block_in_place` on the current handle.
/// - Inside a current-thread runtime: `Err(BlockingError::CurrentThreadRuntime)`.
/// - Outside a runtime: `block_on` on the global runtime.
///
/// # Errors
///
/// Returns a [`BlockingError`] when called from a runtime that cannot block.
#[inline]
pub fn try_run_blocking<F, T>(future: F) -> Result<T, BlockingError>
where
    F: Future<Output = T>,
{
    let Ok(current_handle) = Handle::try_current() else {
        return Ok(global().block_on(future));
    };

    match current_handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => Ok(tokio::task::block_in_place(|| {
            current_handle.block_on(future)
        })),
        RuntimeFlavor::CurrentThread => Err(BlockingError::CurrentThreadRuntime),
        _ => Err(BlockingError::UnsupportedRuntimeFlavor),
    }
}

/// Panicking variant of [`try_run_blocking`].
///
/// # Panics
///
/// Panics if called from a current-thread runtime, or if the future panics.
#[inline]
pub fn run_blocking<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    try_run_blocking(future).expect("run_blocking failed")
}
