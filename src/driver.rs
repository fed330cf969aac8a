use std::sync::Arc;

use log::{debug, trace};

use crate::address::Granularity;
use crate::buffer::{BufferAllocator, HeapAllocator, TransferBuffer};
use crate::command::CommandBuilder;
use crate::config::{DriverConfig, SubmitMode, UNIT_SIZE};
use crate::context::{DriverState, RequestContext};
use crate::error::{Error, Result};
use crate::queue::CommandQueue;
use crate::request::{Direction, FlashRequest};
use crate::router::{route, Route};

pub struct Driver<Q: CommandQueue> {
    queue: Arc<Q>,
    allocator: Arc<dyn BufferAllocator>,
    config: DriverConfig,
    builder: CommandBuilder,
    state: Arc<DriverState>,
}

impl<Q: CommandQueue> std::fmt::Debug for Driver<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<Q: CommandQueue> Driver<Q> {
    pub fn new(queue: Arc<Q>, config: DriverConfig) -> Result<Self> {
        Self::with_allocator(queue, Arc::new(HeapAllocator), config)
    }

    /// Fails with [`Error::InvalidGeometry`] if the widths do not fit the
    /// offset register.
    pub fn with_allocator(
        queue: Arc<Q>,
        allocator: Arc<dyn BufferAllocator>,
        config: DriverConfig,
    ) -> Result<Self> {
        config.geometry.validate()?;
        Ok(Driver {
            queue,
            allocator,
            builder: CommandBuilder::new(config.namespace_id),
            config,
            state: Arc::new(DriverState::default()),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight()
    }

    pub fn submitted(&self) -> u64 {
        self.state.submitted()
    }

    pub fn completed(&self) -> u64 {
        self.state.completed()
    }

    /// `callback` runs exactly once if this returns `Ok`, never on `Err`.
    /// Panics on request kinds this device has no handler for.
    pub fn send_cmd<F>(&self, request: FlashRequest, callback: F) -> Result<()>
    where
        F: FnOnce(FlashRequest) + Send + 'static,
    {
        let direction = match route(request.kind) {
            Route::Command(direction) => direction,
            Route::NoOp => {
                callback(request);
                return Ok(());
            }
        };

        if direction != Direction::Erase && request.payload.len() < UNIT_SIZE {
            return Err(Error::InvalidPayload {
                len: request.payload.len(),
            });
        }

        let granularity = match direction {
            Direction::Erase => Granularity::Block,
            _ => Granularity::Page,
        };
        let offset = self.config.geometry.translate(request.phyaddr, granularity);
        trace!("{:?}: {} => {}", direction, request.phyaddr, offset);

        let mut buffer = TransferBuffer::alloc(self.allocator.clone())?;
        let command = self.builder.build(direction, offset, &mut buffer);
        let slot = self.queue.alloc_slot(direction)?;

        let mut ctx = Box::new(RequestContext::new(
            self.state.clone(),
            direction,
            offset,
            request,
            Box::new(callback),
            command,
            buffer,
            slot,
        ));
        ctx.stage();
        ctx.mark_submitted();

        let phyaddr = ctx.phyaddr();
        let submitted = match self.config.mode {
            SubmitMode::NonBlocking => self.queue.execute_nowait(ctx),
            SubmitMode::Blocking => self.queue.execute(&mut ctx).map(|status| ctx.complete(status)),
        };
        if let Err(e) = submitted {
            debug!("{:?} {} not accepted by queue: {}", direction, phyaddr, e);
            return Err(e);
        }
        self.state.note_submitted();
        Ok(())
    }

    /// Status-code entry point: `0` once submitted, a negative errno otherwise.
    pub fn submit<F>(&self, request: FlashRequest, callback: F) -> i32
    where
        F: FnOnce(FlashRequest) + Send + 'static,
    {
        match self.send_cmd(request, callback) {
            Ok(()) => 0,
            Err(e) => e.status_code(),
        }
    }
}
