//! Thread affinity verification.
//!
//! Palette application and other UI mutations must happen on the thread that
//! owns the toolkit. [`ThreadAffinity`] records that thread and lets callers
//! check (or assert) that they are on it.
//!
//! ```
//! use horizon_palette_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! std::thread::spawn(move || {
//!     assert!(!affinity.is_same_thread());
//! })
//! .join()
//! .unwrap();
//! ```

use std::thread::ThreadId;

/// The thread an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// The bound thread's ID.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns true if the calling thread is the bound thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Panic if called from a thread other than the bound one.
    #[track_caller]
    pub fn assert_same_thread(&self) {
        if !self.is_same_thread() {
            panic!(
                "thread affinity violation: expected {:?}, called from {:?}",
                self.thread_id,
                std::thread::current().id()
            );
        }
    }
}
