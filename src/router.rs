use log::error;

use crate::request::{Direction, RequestKind};

/// Handler selected for a request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Command(Direction),
    /// Completed synchronously without touching the device.
    NoOp,
}

/// Maps a request kind onto its handler.
///
/// Kinds outside the table mean the caller and this driver disagree on the
/// enumeration, which cannot be continued from.
pub fn route(kind: RequestKind) -> Route {
    match kind {
        RequestKind::Read | RequestKind::GcRead | RequestKind::RmwRead | RequestKind::MetaRead => {
            Route::Command(Direction::Read)
        }
        RequestKind::Write
        | RequestKind::GcWrite
        | RequestKind::RmwWrite
        | RequestKind::MetaWrite => Route::Command(Direction::Write),
        RequestKind::GcErase => Route::Command(Direction::Erase),
        RequestKind::ReadDummy => Route::NoOp,
        other => {
            error!("invalid REQTYPE ({:?})", other);
            panic!("unsupported request kind {:?}", other);
        }
    }
}
