//! Frame sink: the single displayable frame and its resource lifecycle
//!
//! A [`FrameStore`] turns raw frames into renderable handles and releases
//! them again. [`FrameSink`] guarantees at most one handle is live at a time
//! and that every superseded handle is released exactly once, after its
//! replacement has been installed.

use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{trace, warn};

use crate::types::Frame;

/// Creates and releases renderable frame handles
pub trait FrameStore: Send + Sync + 'static {
    /// Opaque reference usable by a renderer
    type Handle: Clone + Send + Sync + std::fmt::Debug + 'static;

    /// Allocate a renderable resource for `frame`
    fn create(&self, frame: Frame) -> Self::Handle;

    /// Free the resource behind `handle`
    fn release(&self, handle: Self::Handle);
}

/// Holds the currently displayed frame handle
pub struct FrameSink<S: FrameStore> {
    store: S,
    current: Mutex<Option<S::Handle>>,
    published: watch::Sender<Option<S::Handle>>,
}

impl<S: FrameStore> FrameSink<S> {
    pub fn new(store: S) -> Self {
        let (published, _) = watch::channel(None);
        Self { store, current: Mutex::new(None), published }
    }

    /// Install a handle for `frame`, then release the one it replaces.
    pub fn publish(&self, frame: Frame) -> S::Handle {
        let sequence = frame.sequence;
        let handle = self.store.create(frame);

        let previous = self.lock_current().replace(handle.clone());
        self.published.send_replace(Some(handle.clone()));

        if let Some(previous) = previous {
            self.store.release(previous);
        }

        trace!("Published frame {}", sequence);
        handle
    }

    /// Release the current handle and leave the sink empty
    pub fn clear(&self) {
        let previous = self.lock_current().take();
        if let Some(previous) = previous {
            self.published.send_replace(None);
            self.store.release(previous);
            trace!("Frame sink cleared");
        }
    }

    /// Handle currently on display
    pub fn current(&self) -> Option<S::Handle> {
        self.lock_current().clone()
    }

    /// Watch receiver for the displayed handle (`None` when cleared)
    pub fn subscribe(&self) -> watch::Receiver<Option<S::Handle>> {
        self.published.subscribe()
    }

    /// Stream of published handles for a rendering collaborator.
    ///
    /// Yields the current handle immediately if there is one, then every
    /// subsequent publish. Latest-wins: a slow consumer skips frames.
    pub fn frames(&self) -> impl Stream<Item = S::Handle> + 'static {
        WatchStream::new(self.published.subscribe()).filter_map(|handle| async move { handle })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<S::Handle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: FrameStore> Drop for FrameSink<S> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<S: FrameStore + std::fmt::Debug> std::fmt::Debug for FrameSink<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink").field("store", &self.store).field("current", &self.current()).finish()
    }
}

/// Handle issued by [`MemoryFrameStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    id: u64,
    frame: Frame,
}

impl FrameHandle {
    /// Store-unique identifier, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

/// In-process frame store that keeps frames in memory and accounts for
/// every handle it issues.
#[derive(Debug, Default)]
pub struct MemoryFrameStore {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
    released: AtomicU64,
}

impl MemoryFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles created and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handles released so far
    pub fn released_handles(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    /// Handles created so far
    pub fn created_handles(&self) -> u64 {
        self.next_id.load(Ordering::Acquire)
    }
}

impl FrameStore for MemoryFrameStore {
    type Handle = FrameHandle;

    fn create(&self, frame: Frame) -> FrameHandle {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        self.live.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
        FrameHandle { id, frame }
    }

    fn release(&self, handle: FrameHandle) {
        if self.live.lock().unwrap_or_else(PoisonError::into_inner).remove(&handle.id) {
            self.released.fetch_add(1, Ordering::AcqRel);
        } else {
            warn!("Frame handle {} released twice", handle.id);
        }
    }
}
