//! Effect type used by every primitive in the crate.
//!
//! [`AsyncIO`] describes an asynchronous computation without running it.
//! Operations such as `Mutex::acquire` or `Signal::wait` return `AsyncIO`
//! values; they run when awaited, typically inside a fiber.
//!
//! ```rust,ignore
//! use fibrous::effect::AsyncIO;
//!
//! let effect = AsyncIO::pure(10)
//!     .fmap(|x| x * 2)
//!     .flat_map(|x| AsyncIO::pure(x + 1));
//! assert_eq!(effect.await, 21);
//! ```

pub mod async_io;

pub use async_io::AsyncIO;
