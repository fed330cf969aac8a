use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byte_unit::Byte;
use log::*;
use num_integer::Integer;

use dumbssd::config::*;
use dumbssd::ramdrive::{RamDrive, DEFAULT_QUEUE_DEPTH};
use dumbssd::{
    block_on, completion, Driver, DriverConfig, Error, FlashRequest, PhysicalAddress, RequestKind,
    Result, SubmitMode,
};

type PageId = BaseType;

#[derive(Default)]
pub struct Counters {
    pub writes: AtomicU64,
    pub reads: AtomicU64,
    pub erases: AtomicU64,
    pub errors: AtomicU64,
}

/// Drives page traffic through the command layer into a ram drive.
pub struct Exerciser {
    drive: Arc<RamDrive>,
    driver: Driver<RamDrive>,
    // fill byte last written to each logical page
    expected: Vec<Option<u8>>,
    generation: u8,
    counters: Arc<Counters>,
}

impl Exerciser {
    pub fn new(mode: SubmitMode, seed: u64) -> Result<Self> {
        let config = DriverConfig::default().with_mode(mode);
        let drive = Arc::new(RamDrive::new(config.geometry, DEFAULT_QUEUE_DEPTH)?.with_reordering(seed));
        let driver = Driver::new(drive.clone(), config)?;

        trace!("ALL_PAGES: {}", ALL_PAGES);
        trace!(
            "Emulated capacity: {} bytes, {}",
            CAPACITY,
            Byte::from(CAPACITY).get_appropriate_unit(true).to_string()
        );
        trace!(
            "Transfer buffer: {}",
            Byte::from(TRANSFER_SIZE).get_appropriate_unit(true).to_string()
        );

        Ok(Exerciser {
            drive,
            driver,
            expected: vec![None; ALL_PAGES],
            generation: 0,
            counters: Arc::default(),
        })
    }

    pub fn max_lpn(&self) -> PageId {
        ALL_PAGES - 1
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Stripes logical pages across channels, then blocks.
    fn locate(&self, lpn: PageId) -> PhysicalAddress {
        let (rest, page) = lpn.div_rem(&PAGES_PER_BLOCK);
        let (block, channel) = rest.div_rem(&CHANNELS);
        PhysicalAddress::new(channel as u32, block as u32, page as u32)
    }

    fn pattern(&self, lpn: PageId) -> u8 {
        (lpn as u8).wrapping_mul(31).wrapping_add(self.generation)
    }

    /// Submits, draining completions and retrying while the queue is full.
    fn issue<F>(&self, request: FlashRequest, callback: F) -> Result<()>
    where
        F: FnOnce(FlashRequest) + Send + Clone + 'static,
    {
        loop {
            match self.driver.send_cmd(request.clone(), callback.clone()) {
                Err(Error::QueueFull) => {
                    self.drive.process_completions(0);
                }
                other => return other,
            }
        }
    }

    fn drain(&self) {
        while self.driver.in_flight() > 0 {
            self.drive.process_completions(0);
        }
    }

    fn on_done(counters: Arc<Counters>) -> impl FnOnce(FlashRequest) + Send + Clone + 'static {
        move |r: FlashRequest| {
            if !r.status.is_success() {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("{:?} {} failed: {:?}", r.kind, r.phyaddr, r.status);
            }
        }
    }

    /// Erases every block, then writes every page once.
    pub fn precondition(&mut self) -> Result<()> {
        for block in 0..BLOCKS {
            for channel in 0..CHANNELS {
                let addr = PhysicalAddress::new(channel as u32, block as u32, 0);
                let req = FlashRequest::new(RequestKind::GcErase, addr, Vec::new());
                self.issue(req, Self::on_done(self.counters.clone()))?;
                self.counters.erases.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.drain();

        for lpn in 0..=self.max_lpn() {
            self.write(lpn)?;
        }
        self.drain();
        Ok(())
    }

    fn write(&mut self, lpn: PageId) -> Result<()> {
        let fill = self.pattern(lpn);
        let req = FlashRequest::new(RequestKind::Write, self.locate(lpn), vec![fill; UNIT_SIZE]);
        self.issue(req, Self::on_done(self.counters.clone()))?;
        self.expected[lpn] = Some(fill);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reads one page and checks it against the last write.
    pub fn verify(&self, lpn: PageId) -> Result<bool> {
        let (tx, rx) = completion();
        let kind = if lpn % 2 == 0 { RequestKind::Read } else { RequestKind::MetaRead };
        let req = FlashRequest::with_page(kind, self.locate(lpn));
        self.driver.send_cmd(req, tx.into_callback())?;
        let done = block_on(rx, || {
            self.drive.process_completions(0);
        })?;
        self.counters.reads.fetch_add(1, Ordering::Relaxed);

        let want = self.expected[lpn].unwrap_or(0);
        let ok = done.payload.iter().all(|&b| b == want);
        if !ok {
            error!("lpn {} at {} does not hold {:#x}", lpn, done.phyaddr, want);
        }
        Ok(ok)
    }

    /// Reads every page of a block, erases it, then programs a new generation.
    pub fn rewrite_block(&mut self, channel: BaseType, block: BaseType) -> Result<()> {
        self.generation = self.generation.wrapping_add(1);
        let first = (block * CHANNELS + channel) * PAGES_PER_BLOCK;

        for lpn in first..first + PAGES_PER_BLOCK {
            let req = FlashRequest::with_page(RequestKind::GcRead, self.locate(lpn));
            self.issue(req, Self::on_done(self.counters.clone()))?;
        }
        self.drain();

        let addr = PhysicalAddress::new(channel as u32, block as u32, 0);
        let req = FlashRequest::new(RequestKind::GcErase, addr, Vec::new());
        self.issue(req, Self::on_done(self.counters.clone()))?;
        self.counters.erases.fetch_add(1, Ordering::Relaxed);
        self.drain();

        for lpn in first..first + PAGES_PER_BLOCK {
            let fill = self.pattern(lpn);
            let req = FlashRequest::new(RequestKind::GcWrite, self.locate(lpn), vec![fill; UNIT_SIZE]);
            self.issue(req, Self::on_done(self.counters.clone()))?;
            self.expected[lpn] = Some(fill);
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
        }
        self.drain();
        Ok(())
    }

    pub fn report(&self) {
        info!(
            "writes {} reads {} erases {} errors {} (submitted {}, completed {})",
            self.counters.writes.load(Ordering::Relaxed),
            self.counters.reads.load(Ordering::Relaxed),
            self.counters.erases.load(Ordering::Relaxed),
            self.counters.errors.load(Ordering::Relaxed),
            self.driver.submitted(),
            self.driver.completed(),
        );
    }
}
