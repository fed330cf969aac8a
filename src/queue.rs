use crate::context::RequestContext;
use crate::error::Result;
use crate::request::{Direction, IoStatus};

/// Block command submission substrate.
///
/// Implementations must be safe to call from several threads at once; the
/// driver performs no locking around them.
pub trait CommandQueue: Send + Sync {
    /// Command slot reserved for one request. Dropping it frees the slot.
    type Slot: Send + 'static;

    /// Reserves a slot for a transfer in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueFull`](crate::Error::QueueFull) when every slot
    /// is in use.
    fn alloc_slot(&self, direction: Direction) -> Result<Self::Slot>;

    /// Starts `io` and returns without waiting.
    ///
    /// On success the queue later calls `io.complete(..)` from its own
    /// completion path. On error `io` is dropped, releasing its resources
    /// without running the callback.
    fn execute_nowait(&self, io: Box<RequestContext<Self::Slot>>) -> Result<()>;

    /// Runs `io` and blocks until the device finishes it.
    fn execute(&self, io: &mut RequestContext<Self::Slot>) -> Result<IoStatus>;
}
