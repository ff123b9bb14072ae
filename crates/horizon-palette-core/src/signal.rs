//! Signal/slot system for Horizon Palette.
//!
//! A [`Signal<Args>`] fans a value out to every connected slot. Producers such
//! as the preference watcher own a signal; consumers connect closures to it.
//!
//! # Connection Types
//!
//! - **Direct**: the slot runs immediately on the emitting thread.
//! - **Queued**: the slot is posted to a [`Dispatcher`] and runs on the thread
//!   that drains the matching [`DispatchQueue`](crate::dispatch::DispatchQueue).
//!
//! Slots are invoked in connection order. For a single slot, successive
//! emissions from one thread are delivered in emission order.
//!
//! # Example
//!
//! ```
//! use horizon_palette_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! text_changed.emit("Hello, World!".to_string());
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatch::Dispatcher;
use crate::logging::targets;

const TARGET: &str = targets::SIGNAL;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// How a connected slot is invoked when the signal is emitted.
#[derive(Clone, Debug, Default)]
pub enum ConnectionType {
    /// Invoke the slot immediately on the emitting thread.
    #[default]
    Direct,
    /// Post the slot invocation to the given dispatcher.
    Queued(Dispatcher),
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Slot<Args>,
    connection_type: ConnectionType,
}

/// A type-safe signal that can have multiple connected slots.
///
/// `Signal<Args>` is `Send + Sync` and can be shared between threads. The
/// connection list is snapshotted before slots run, so slots may connect or
/// disconnect (including themselves) without deadlocking.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot that runs directly on the emitting thread.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Direct)
    }

    /// Connect a slot that runs on the dispatcher's thread.
    ///
    /// ```
    /// use horizon_palette_core::{DispatchQueue, Signal};
    ///
    /// let queue = DispatchQueue::new();
    /// let signal = Signal::<i32>::new();
    /// signal.connect_queued(&queue.dispatcher(), |n| println!("{}", n));
    ///
    /// signal.emit(42);
    /// assert_eq!(queue.process_pending(), 1);
    /// ```
    pub fn connect_queued<F>(&self, dispatcher: &Dispatcher, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Queued(dispatcher.clone()))
    }

    /// Connect a slot with a specific connection type.
    pub fn connect_with_type<F>(&self, slot: F, connection_type: ConnectionType) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let connection = Connection {
            slot: Arc::new(slot),
            connection_type,
        };
        self.connections.lock().insert(connection)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// Direct slots run before this returns; queued slots are posted to their
    /// dispatchers. A queued slot whose dispatcher has shut down is skipped
    /// with a warning.
    #[tracing::instrument(skip_all, target = "horizon_palette_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let snapshot: Vec<(Slot<Args>, ConnectionType)> = {
            let connections = self.connections.lock();
            connections
                .values()
                .map(|conn| (conn.slot.clone(), conn.connection_type.clone()))
                .collect()
        };
        tracing::trace!(target: TARGET, connection_count = snapshot.len(), "emitting signal");

        for (slot, connection_type) in snapshot {
            match connection_type {
                ConnectionType::Direct => slot(&args),
                ConnectionType::Queued(dispatcher) => {
                    let args = args.clone();
                    if let Err(err) = dispatcher.post(move || slot(&args)) {
                        tracing::warn!(target: TARGET, error = %err, "queued slot skipped");
                    }
                }
            }
        }
    }
}
