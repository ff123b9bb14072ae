//! Queued invocations for cross-thread delivery to a designated thread.
//!
//! GUI toolkits usually require visual state to be mutated from one thread.
//! A [`DispatchQueue`] is created on that thread and drained there; any thread
//! holding a [`Dispatcher`] can post closures to it.
//!
//! # How It Works
//!
//! 1. The owning thread creates a `DispatchQueue` and hands out cloned
//!    `Dispatcher`s to whoever needs to reach it.
//!
//! 2. Other threads call [`Dispatcher::post`], or [`Dispatcher::invoke`]
//!    which runs inline when already on the owning thread.
//!
//! 3. The owning thread calls [`DispatchQueue::process_pending`] or
//!    [`DispatchQueue::wait_and_process`] from its event loop; invocations run
//!    in the order they were posted.
//!
//! ```
//! use horizon_palette_core::dispatch::DispatchQueue;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let queue = DispatchQueue::new();
//! let dispatcher = queue.dispatcher();
//! let ran = Arc::new(AtomicBool::new(false));
//!
//! let ran_clone = ran.clone();
//! std::thread::spawn(move || {
//!     dispatcher.post(move || ran_clone.store(true, Ordering::SeqCst)).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(queue.process_pending(), 1);
//! assert!(ran.load(Ordering::SeqCst));
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};

use crate::error::DispatchError;
use crate::logging::targets;
use crate::thread_check::ThreadAffinity;

const TARGET: &str = targets::DISPATCH;

/// A type-erased invocation that runs later on the dispatch thread.
type QueuedInvocation = Box<dyn FnOnce() + Send>;

/// A cloneable handle for posting work to a [`DispatchQueue`].
#[derive(Clone)]
pub struct Dispatcher {
    sender: Sender<QueuedInvocation>,
    affinity: ThreadAffinity,
    pending: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Queue a closure to run on the dispatch thread.
    pub fn post<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(f))
    }

    /// Run the closure now if on the dispatch thread, otherwise queue it.
    pub fn invoke<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_dispatch_thread() {
            f();
            Ok(())
        } else {
            self.post(f)
        }
    }

    /// Returns true if the caller is on the thread that drains the queue.
    pub fn is_dispatch_thread(&self) -> bool {
        self.affinity.is_same_thread()
    }

    /// Number of invocations posted but not yet executed.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn enqueue(&self, invocation: QueuedInvocation) -> Result<(), DispatchError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(invocation).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!(target: TARGET, "dispatch queue closed, dropping invocation");
            return Err(DispatchError::QueueClosed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread", &self.affinity.thread_id())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// The receiving end of a dispatcher, owned by the designated thread.
///
/// `DispatchQueue` is deliberately `!Send`: it is bound to the thread that
/// created it. Dropping it closes the queue; later posts fail with
/// [`DispatchError::QueueClosed`].
pub struct DispatchQueue {
    receiver: Receiver<QueuedInvocation>,
    dispatcher: Dispatcher,
    _not_send: PhantomData<*const ()>,
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    /// Create a queue bound to the calling thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            receiver,
            dispatcher: Dispatcher {
                sender,
                affinity: ThreadAffinity::current(),
                pending: Arc::new(AtomicUsize::new(0)),
            },
            _not_send: PhantomData,
        }
    }

    /// Get a handle for posting to this queue.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Run every invocation that is currently queued.
    ///
    /// Returns the number of invocations executed.
    pub fn process_pending(&self) -> usize {
        self.dispatcher.affinity.assert_same_thread();

        let mut executed = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(invocation) => {
                    self.run(invocation);
                    executed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if executed > 0 {
            tracing::trace!(target: TARGET, executed, "processed queued invocations");
        }
        executed
    }

    /// Block up to `timeout` for at least one invocation, then drain the queue.
    ///
    /// Returns the number of invocations executed (0 on timeout).
    pub fn wait_and_process(&self, timeout: Duration) -> usize {
        self.dispatcher.affinity.assert_same_thread();

        let deadline = Instant::now() + timeout;
        match self.receiver.recv_deadline(deadline) {
            Ok(invocation) => {
                self.run(invocation);
                1 + self.process_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn run(&self, invocation: QueuedInvocation) {
        self.dispatcher.pending.fetch_sub(1, Ordering::AcqRel);
        invocation();
    }
}
