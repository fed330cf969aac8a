//! Error types for the command layer

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, Error>;

const ENOMEM: i32 = 12;
const EINVAL: i32 = 22;
const ECANCELED: i32 = 125;

/// Error type for driver operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Context, command or transfer buffer allocation failed
    #[error("Memory allocation failed ({0} bytes)")]
    OutOfMemory(usize),

    /// No free command slot in the underlying queue
    #[error("No free command slot in queue")]
    QueueFull,

    /// The underlying queue refused the submission
    #[error("Submission rejected: {0}")]
    Submit(String),

    /// Address widths leave no room for the block field
    #[error("Invalid geometry: slice {slice_bits}, page {page_bits}, channel {channel_bits} bits")]
    InvalidGeometry {
        slice_bits: u32,
        page_bits: u32,
        channel_bits: u32,
    },

    /// Caller page buffer is not one transfer unit
    #[error("Invalid payload length: {len}")]
    InvalidPayload { len: usize },

    /// Request released without completing
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Negative errno reported through the status-code entry point.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::OutOfMemory(_) | Error::QueueFull | Error::Submit(_) => -ENOMEM,
            Error::InvalidGeometry { .. } | Error::InvalidPayload { .. } => -EINVAL,
            Error::Cancelled => -ECANCELED,
        }
    }
}
