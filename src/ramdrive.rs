use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::address::{Granularity, LinearOffset, PhysicalAddress};
use crate::command::{DeviceCommand, Opcode};
use crate::config::{Geometry, ERASE_OFFSET_WORD, UNIT_SIZE};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::queue::CommandQueue;
use crate::request::{Direction, IoStatus};

/// Generic command status: invalid opcode.
pub const STATUS_INVALID_OPCODE: IoStatus = IoStatus::DeviceError { sct: 0, sc: 0x01 };
/// Generic command status: invalid field, here a slot of the wrong direction.
pub const STATUS_INVALID_FIELD: IoStatus = IoStatus::DeviceError { sct: 0, sc: 0x02 };
/// Media error: page programmed twice without an erase.
pub const STATUS_WRITE_FAULT: IoStatus = IoStatus::DeviceError { sct: 2, sc: 0x80 };

pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Command slot of a [`RamDrive`].
#[derive(Debug)]
pub struct RamSlot {
    tag: u16,
    direction: Direction,
    free: Arc<AtomicUsize>,
}

impl RamSlot {
    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Drop for RamSlot {
    fn drop(&mut self) {
        self.free.fetch_add(1, Ordering::AcqRel);
    }
}

type Pending = Box<RequestContext<RamSlot>>;

pub struct RamDrive {
    geometry: Geometry,
    free: Arc<AtomicUsize>,
    next_tag: AtomicU16,
    pages: Mutex<HashMap<LinearOffset, Box<[u8]>>>,
    pending: Mutex<VecDeque<Pending>>,
    reorder: Option<Mutex<SmallRng>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RamDrive {
    pub fn new(geometry: Geometry, depth: usize) -> Result<Self> {
        geometry.validate()?;
        Ok(RamDrive {
            geometry,
            free: Arc::new(AtomicUsize::new(depth)),
            next_tag: AtomicU16::new(0),
            pages: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            reorder: None,
        })
    }

    /// Completes pending commands in a random order seeded by `seed`.
    pub fn with_reordering(mut self, seed: u64) -> Self {
        self.reorder = Some(Mutex::new(SmallRng::seed_from_u64(seed)));
        self
    }

    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    /// Submitted commands not yet completed.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn programmed_pages(&self) -> usize {
        lock(&self.pages).len()
    }

    /// Contents of a programmed page.
    pub fn page(&self, addr: PhysicalAddress) -> Option<Vec<u8>> {
        let ofs = self.geometry.translate(addr, Granularity::Page);
        lock(&self.pages).get(&ofs).map(|p| p.to_vec())
    }

    /// Executes and completes up to `max` pending commands (0 = all).
    ///
    /// Returns the number of completions processed. Callbacks run on the
    /// calling thread and may submit new commands.
    pub fn process_completions(&self, max: usize) -> usize {
        let mut done = 0;
        while max == 0 || done < max {
            let Some(mut io) = self.next_pending() else {
                break;
            };
            let status = self.run(&mut io);
            io.complete(status);
            done += 1;
        }
        done
    }

    fn next_pending(&self) -> Option<Pending> {
        let mut pending = lock(&self.pending);
        match &self.reorder {
            Some(rng) if pending.len() > 1 => {
                let at = lock(rng).gen_range(0..pending.len());
                pending.swap_remove_back(at)
            }
            _ => pending.pop_front(),
        }
    }

    fn run(&self, io: &mut RequestContext<RamSlot>) -> IoStatus {
        let Some(cmd) = DeviceCommand::decode(&io.command().encode()) else {
            return STATUS_INVALID_OPCODE;
        };
        trace!("tag {} executing {:?}", io.slot().tag(), cmd.opcode);

        // reads need a device-to-host slot, writes and erases host-to-device
        if io.slot().direction().to_device() == (cmd.opcode == Opcode::Read) {
            debug!(
                "tag {}: {:?} on a {:?} slot",
                io.slot().tag(),
                cmd.opcode,
                io.slot().direction()
            );
            return STATUS_INVALID_FIELD;
        }

        match cmd.opcode {
            Opcode::Read => {
                let ofs = LinearOffset(cmd.slba().unwrap_or_default() as u32);
                let pages = lock(&self.pages);
                let unit = &mut io.transfer_mut().as_mut_slice()[..UNIT_SIZE];
                match pages.get(&ofs) {
                    Some(page) => unit.copy_from_slice(page),
                    None => unit.fill(0),
                }
                IoStatus::Success
            }
            Opcode::Write => {
                let ofs = LinearOffset(cmd.slba().unwrap_or_default() as u32);
                let mut pages = lock(&self.pages);
                if pages.contains_key(&ofs) {
                    return STATUS_WRITE_FAULT;
                }
                pages.insert(ofs, io.transfer().first_unit().into());
                IoStatus::Success
            }
            Opcode::Erase => {
                let target = io.transfer().read_word(ERASE_OFFSET_WORD) as u32;
                let shift = self.geometry.channel_shift();
                let mut pages = lock(&self.pages);
                let before = pages.len();
                pages.retain(|ofs, _| ofs.0 >> shift != target >> shift);
                debug!("erase {:x}: {} pages cleared", target, before - pages.len());
                IoStatus::Success
            }
        }
    }
}

impl CommandQueue for RamDrive {
    type Slot = RamSlot;

    fn alloc_slot(&self, direction: Direction) -> Result<RamSlot> {
        self.free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| Error::QueueFull)?;
        Ok(RamSlot {
            tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
            direction,
            free: self.free.clone(),
        })
    }

    fn execute_nowait(&self, io: Box<RequestContext<RamSlot>>) -> Result<()> {
        lock(&self.pending).push_back(io);
        Ok(())
    }

    fn execute(&self, io: &mut RequestContext<RamSlot>) -> Result<IoStatus> {
        Ok(self.run(io))
    }
}
