//! Core systems for Horizon Palette.
//!
//! This crate provides the building blocks the palette crate is assembled from:
//!
//! - **Signal/Slot System**: Type-safe fan-out of change notifications
//! - **Dispatch**: Marshalling work onto the UI thread
//! - **Thread Affinity**: Checking which thread an operation runs on
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_palette_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Dispatch Example
//!
//! ```
//! use horizon_palette_core::DispatchQueue;
//!
//! // The queue belongs to the thread that creates it.
//! let queue = DispatchQueue::new();
//! let dispatcher = queue.dispatcher();
//!
//! std::thread::spawn(move || {
//!     dispatcher.post(|| println!("running on the UI thread")).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(queue.process_pending(), 1);
//! ```

pub mod dispatch;
mod error;
pub mod logging;
pub mod signal;
pub mod thread_check;

pub use dispatch::{DispatchQueue, Dispatcher};
pub use error::DispatchError;
pub use logging::PerfSpan;
pub use signal::{ConnectionId, ConnectionType, Signal};
pub use thread_check::ThreadAffinity;
