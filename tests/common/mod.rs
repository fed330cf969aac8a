//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dumbssd::{
    BufferAllocator, CommandQueue, DeviceCommand, Direction, Error, IoStatus, RequestContext,
    Result,
};

/// Counts allocations and releases, optionally failing past a limit.
#[derive(Default)]
pub struct TrackingAllocator {
    pub allocs: AtomicUsize,
    pub frees: AtomicUsize,
    pub limit: Option<usize>,
}

impl TrackingAllocator {
    pub fn limited(limit: usize) -> Self {
        TrackingAllocator {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocs() - self.frees()
    }
}

impl BufferAllocator for TrackingAllocator {
    fn alloc_zeroed(&self, size: usize) -> Option<Box<[u8]>> {
        if let Some(limit) = self.limit {
            if self.live() >= limit {
                return None;
            }
        }
        self.allocs.fetch_add(1, Ordering::SeqCst);
        Some(vec![0; size].into_boxed_slice())
    }

    fn free(&self, data: Box<[u8]>) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        drop(data);
    }
}

/// What the device saw at submission time.
#[derive(Clone)]
pub struct Snapshot {
    pub command: DeviceCommand,
    pub direction: Direction,
    pub transfer: Vec<u8>,
}

/// Queue that records submissions and completes them on demand.
#[derive(Default)]
pub struct RecordingQueue {
    pub snapshots: Mutex<Vec<Snapshot>>,
    pub held: Mutex<Vec<Box<RequestContext<()>>>>,
    pub reject: bool,
}

impl RecordingQueue {
    pub fn rejecting() -> Self {
        RecordingQueue {
            reject: true,
            ..Default::default()
        }
    }

    fn record(&self, io: &RequestContext<()>) {
        self.snapshots.lock().unwrap().push(Snapshot {
            command: io.command().clone(),
            direction: io.direction(),
            transfer: io.transfer().as_slice().to_vec(),
        });
    }

    /// Fills the first unit of every held read, then completes all.
    pub fn complete_all(&self, fill: u8, status: IoStatus) -> usize {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        let n = held.len();
        for mut io in held {
            if io.direction() == Direction::Read {
                io.transfer_mut().as_mut_slice()[..4096].fill(fill);
            }
            io.complete(status);
        }
        n
    }
}

impl CommandQueue for RecordingQueue {
    type Slot = ();

    fn alloc_slot(&self, _direction: Direction) -> Result<()> {
        Ok(())
    }

    fn execute_nowait(&self, io: Box<RequestContext<()>>) -> Result<()> {
        if self.reject {
            return Err(Error::Submit("queue stopped".into()));
        }
        self.record(&io);
        self.held.lock().unwrap().push(io);
        Ok(())
    }

    fn execute(&self, io: &mut RequestContext<()>) -> Result<IoStatus> {
        if self.reject {
            return Err(Error::Submit("queue stopped".into()));
        }
        self.record(io);
        if io.direction() == Direction::Read {
            io.transfer_mut().as_mut_slice()[..4096].fill(0x77);
        }
        Ok(IoStatus::Success)
    }
}
