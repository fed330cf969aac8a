use crate::address::PhysicalAddress;
use crate::config::UNIT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Read,
    GcRead,
    RmwRead,
    MetaRead,
    ReadDummy,
    Write,
    GcWrite,
    RmwWrite,
    MetaWrite,
    GcErase,
    /// Trim carries no flash command for this device.
    Trim,
    /// A raw kind code outside the known enumeration.
    Unknown(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
    Erase,
}

impl Direction {
    /// Host-to-device transfer. Erase counts, its target travels in the payload.
    pub fn to_device(self) -> bool {
        !matches!(self, Direction::Read)
    }
}

/// Status reported by the queue for a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoStatus {
    /// Not completed by the device (fresh, or a dummy request).
    #[default]
    Pending,
    Success,
    /// Status code type and status code from the completion entry.
    DeviceError { sct: u8, sc: u8 },
}

impl IoStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, IoStatus::Success)
    }
}

/// Handed back through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRequest {
    pub kind: RequestKind,
    pub phyaddr: PhysicalAddress,
    pub payload: Vec<u8>,
    pub status: IoStatus,
}

impl FlashRequest {
    pub fn new(kind: RequestKind, phyaddr: PhysicalAddress, payload: Vec<u8>) -> Self {
        FlashRequest {
            kind,
            phyaddr,
            payload,
            status: IoStatus::Pending,
        }
    }

    /// Request with a zeroed one-page payload.
    pub fn with_page(kind: RequestKind, phyaddr: PhysicalAddress) -> Self {
        Self::new(kind, phyaddr, vec![0; UNIT_SIZE])
    }
}

/// Invoked exactly once with the original request.
pub type Callback = Box<dyn FnOnce(FlashRequest) + Send + 'static>;
