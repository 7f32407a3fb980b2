//! Fixed-capacity lock-free circular buffers for handing a stream of messages from one thread to another.
//!
//! A buffer decouples a fast-arriving source, such as a bus delivering discrete frames, from a consumer that
//! processes them at its own pace. Storage is allocated once up front and no operation ever locks or blocks.
//!
//! ```
//! use weir::Buffer;
//!
//! let (mut producer, mut consumer) = weir::bounded::<u32>(5)?;
//! assert_eq!(producer.capacity(), 8);
//!
//! producer.enqueue(1).unwrap();
//! producer.force_enqueue(2);
//!
//! assert_eq!(consumer.dequeue(), Some(1));
//! assert_eq!(consumer.dequeue(), Some(2));
//! assert_eq!(consumer.dequeue(), None);
//! # Ok::<(), weir::Error>(())
//! ```
mod buffer;
mod builder;
mod capacity;
pub mod channel;
mod error;
pub mod io;
mod signal;
mod spsc;

pub use crate::buffer::Buffer;
pub use crate::builder::{Builder, OverflowPolicy};
pub use crate::capacity::DEFAULT_CAPACITY;
pub use crate::error::{Error, Full};
pub use crate::spsc::{bounded, Consumer, Producer};
