//! Command-issuing layer for a dumb-SSD flash device.
//!
//! ```
//! use std::sync::Arc;
//! use dumbssd::{Driver, DriverConfig, FlashRequest, PhysicalAddress, RequestKind};
//! use dumbssd::ramdrive::RamDrive;
//!
//! let drive = Arc::new(RamDrive::new(Default::default(), 8)?);
//! let driver = Driver::new(drive.clone(), DriverConfig::default())?;
//!
//! let page = vec![0xAB; 4096];
//! let req = FlashRequest::new(RequestKind::Write, PhysicalAddress::new(3, 10, 5), page);
//! driver.send_cmd(req, |done| assert!(done.status.is_success()))?;
//!
//! drive.process_completions(0);
//! assert_eq!(driver.in_flight(), 0);
//! # Ok::<(), dumbssd::Error>(())
//! ```

pub mod address;
pub mod buffer;
pub mod command;
pub mod complete;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod queue;
pub mod ramdrive;
pub mod request;
pub mod router;

pub use address::{translate, Granularity, LinearOffset, PhysicalAddress};
pub use buffer::{BufferAllocator, HeapAllocator, TransferBuffer};
pub use command::{CommandBuilder, DeviceCommand, Opcode};
pub use complete::{block_on, completion, CompletionReceiver, CompletionSender};
pub use config::{DriverConfig, Geometry, SubmitMode};
pub use context::{ContextState, RequestContext};
pub use driver::Driver;
pub use error::{Error, Result};
pub use queue::CommandQueue;
pub use request::{Callback, Direction, FlashRequest, IoStatus, RequestKind};
