use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::address::{LinearOffset, PhysicalAddress};
use crate::buffer::TransferBuffer;
use crate::command::DeviceCommand;
use crate::request::{Callback, Direction, FlashRequest, IoStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Created,
    Staged,
    Submitted,
    Completed,
}

/// Counters shared by the driver and its in-flight contexts.
#[derive(Debug, Default)]
pub struct DriverState {
    in_flight: AtomicUsize,
    submitted: AtomicU64,
    completed: AtomicU64,
}

impl DriverState {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub(crate) fn note_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }
}

/// Lifecycle state plus the driver's in-flight accounting.
struct Lifecycle {
    state: ContextState,
    driver: Arc<DriverState>,
}

impl Lifecycle {
    fn new(driver: Arc<DriverState>) -> Self {
        driver.in_flight.fetch_add(1, Ordering::AcqRel);
        Lifecycle {
            state: ContextState::Created,
            driver,
        }
    }

    fn advance(&mut self, from: ContextState, to: ContextState) {
        debug_assert_eq!(self.state, from, "bad transition to {:?}", to);
        self.state = to;
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        match self.state {
            ContextState::Completed => {
                self.driver.completed.fetch_add(1, Ordering::Relaxed);
            }
            // also reached when the queue rejects a submission
            state => debug!("request context released in state {:?}", state),
        }
        self.driver.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything one in-flight command owns.
///
/// Fields drop in release order: command, buffer, context, slot.
pub struct RequestContext<S> {
    direction: Direction,
    phyaddr: PhysicalAddress,
    offset: LinearOffset,
    request: FlashRequest,
    callback: Callback,
    command: Box<DeviceCommand>,
    buffer: TransferBuffer,
    lifecycle: Lifecycle,
    slot: S,
}

impl<S> RequestContext<S> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        driver: Arc<DriverState>,
        direction: Direction,
        offset: LinearOffset,
        request: FlashRequest,
        callback: Callback,
        command: Box<DeviceCommand>,
        buffer: TransferBuffer,
        slot: S,
    ) -> Self {
        RequestContext {
            direction,
            phyaddr: request.phyaddr,
            offset,
            request,
            callback,
            command,
            buffer,
            lifecycle: Lifecycle::new(driver),
            slot,
        }
    }

    /// Pre-submission data movement.
    pub(crate) fn stage(&mut self) {
        self.buffer.stage(self.direction, &self.request.payload);
        self.lifecycle
            .advance(ContextState::Created, ContextState::Staged);
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.lifecycle
            .advance(ContextState::Staged, ContextState::Submitted);
    }

    pub fn state(&self) -> ContextState {
        self.lifecycle.state
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn phyaddr(&self) -> PhysicalAddress {
        self.phyaddr
    }

    pub fn offset(&self) -> LinearOffset {
        self.offset
    }

    pub fn command(&self) -> &DeviceCommand {
        &self.command
    }

    /// Device-facing data area.
    pub fn transfer(&self) -> &TransferBuffer {
        &self.buffer
    }

    pub fn transfer_mut(&mut self) -> &mut TransferBuffer {
        &mut self.buffer
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    /// Runs the completion sequence. Called once by the queue.
    pub fn complete(self: Box<Self>, status: IoStatus) {
        let RequestContext {
            direction,
            phyaddr,
            offset,
            mut request,
            callback,
            command,
            buffer,
            mut lifecycle,
            slot,
        } = *self;
        lifecycle.advance(ContextState::Submitted, ContextState::Completed);

        match status {
            IoStatus::Success => buffer.commit(direction, &mut request.payload),
            other => warn!("{:?} {} => {} failed: {:?}", direction, phyaddr, offset, other),
        }
        request.status = status;

        debug!("{:?} {} => {} completed", direction, phyaddr, offset);
        callback(request);

        drop(command);
        drop(buffer);
        drop(lifecycle);
        drop(slot);
    }
}

impl<S> std::fmt::Debug for RequestContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("state", &self.lifecycle.state)
            .field("direction", &self.direction)
            .field("phyaddr", &self.phyaddr)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::buffer::BufferAllocator;
    use crate::command::CommandBuilder;
    use crate::config::UNIT_SIZE;
    use crate::request::RequestKind;

    type Events = Arc<Mutex<Vec<String>>>;

    struct LoggingAllocator(Events);

    impl BufferAllocator for LoggingAllocator {
        fn alloc_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
            Some(vec![0; size].into_boxed_slice())
        }

        fn free(&self, data: Box<[u8]>) {
            self.0.lock().unwrap().push("buffer".into());
            drop(data);
        }
    }

    struct LoggingSlot {
        events: Events,
        driver: Arc<DriverState>,
    }

    impl Drop for LoggingSlot {
        fn drop(&mut self) {
            let line = format!("slot in_flight={}", self.driver.in_flight());
            self.events.lock().unwrap().push(line);
        }
    }

    fn context(
        kind: RequestKind,
        direction: Direction,
        payload: Vec<u8>,
        events: &Events,
    ) -> (Box<RequestContext<LoggingSlot>>, Arc<DriverState>) {
        let driver = Arc::new(DriverState::default());
        let mut buffer = TransferBuffer::alloc(Arc::new(LoggingAllocator(events.clone()))).unwrap();
        let offset = LinearOffset(5 << 6);
        let command = CommandBuilder::new(1).build(direction, offset, &mut buffer);
        let log = events.clone();
        let ctx = RequestContext::new(
            driver.clone(),
            direction,
            offset,
            FlashRequest::new(kind, PhysicalAddress::new(0, 0, 5), payload),
            Box::new(move |_: FlashRequest| log.lock().unwrap().push("callback".into())),
            command,
            buffer,
            LoggingSlot {
                events: events.clone(),
                driver: driver.clone(),
            },
        );
        (Box::new(ctx), driver)
    }

    #[test]
    fn stage_moves_through_states() {
        let events = Events::default();
        let (mut ctx, driver) = context(
            RequestKind::Write,
            Direction::Write,
            vec![0xAB; UNIT_SIZE],
            &events,
        );
        assert_eq!(ctx.state(), ContextState::Created);
        assert_eq!(driver.in_flight(), 1);

        ctx.stage();
        assert_eq!(ctx.state(), ContextState::Staged);
        assert!(ctx.transfer().first_unit().iter().all(|&b| b == 0xAB));

        ctx.mark_submitted();
        assert_eq!(ctx.state(), ContextState::Submitted);
    }

    #[test]
    fn completion_releases_after_callback_in_order() {
        let events = Events::default();
        let (mut ctx, driver) = context(
            RequestKind::Write,
            Direction::Write,
            vec![1; UNIT_SIZE],
            &events,
        );
        ctx.stage();
        ctx.mark_submitted();
        ctx.complete(IoStatus::Success);

        assert_eq!(
            *events.lock().unwrap(),
            vec!["callback", "buffer", "slot in_flight=0"]
        );
        assert_eq!(driver.completed(), 1);
        assert_eq!(driver.in_flight(), 0);
    }

    #[test]
    fn read_commits_before_callback() {
        let driver = Arc::new(DriverState::default());
        let mut buffer = TransferBuffer::alloc(Arc::new(crate::buffer::HeapAllocator)).unwrap();
        let command = CommandBuilder::new(1).build(Direction::Read, LinearOffset(0), &mut buffer);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut ctx = Box::new(RequestContext::new(
            driver,
            Direction::Read,
            LinearOffset(0),
            FlashRequest::with_page(RequestKind::Read, PhysicalAddress::default()),
            Box::new(move |r: FlashRequest| *sink.lock().unwrap() = Some(r)),
            command,
            buffer,
            (),
        ));
        ctx.stage();
        ctx.mark_submitted();
        ctx.transfer_mut().as_mut_slice()[..UNIT_SIZE].fill(0x5A);
        ctx.transfer_mut().as_mut_slice()[UNIT_SIZE] = 0xFF;
        ctx.complete(IoStatus::Success);

        let done = seen.lock().unwrap().take().unwrap();
        assert_eq!(done.status, IoStatus::Success);
        assert_eq!(done.payload, vec![0x5A; UNIT_SIZE]);
    }

    #[test]
    fn failed_read_leaves_payload_alone() {
        let events = Events::default();
        let driver = Arc::new(DriverState::default());
        let mut buffer = TransferBuffer::alloc(Arc::new(LoggingAllocator(events.clone()))).unwrap();
        let command = CommandBuilder::new(1).build(Direction::Read, LinearOffset(0), &mut buffer);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let mut ctx = Box::new(RequestContext::new(
            driver,
            Direction::Read,
            LinearOffset(0),
            FlashRequest::with_page(RequestKind::GcRead, PhysicalAddress::default()),
            Box::new(move |r: FlashRequest| *sink.lock().unwrap() = Some(r)),
            command,
            buffer,
            (),
        ));
        ctx.stage();
        ctx.mark_submitted();
        ctx.transfer_mut().as_mut_slice().fill(0x11);
        ctx.complete(IoStatus::DeviceError { sct: 2, sc: 0x81 });

        let done = seen.lock().unwrap().take().unwrap();
        assert_eq!(done.status, IoStatus::DeviceError { sct: 2, sc: 0x81 });
        assert!(done.payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn dropped_context_releases_without_callback() {
        let events = Events::default();
        let (mut ctx, driver) = context(
            RequestKind::GcErase,
            Direction::Erase,
            Vec::new(),
            &events,
        );
        ctx.stage();
        ctx.mark_submitted();
        drop(ctx);

        assert_eq!(*events.lock().unwrap(), vec!["buffer", "slot in_flight=0"]);
        assert_eq!(driver.completed(), 0);
        assert_eq!(driver.in_flight(), 0);
    }
}
