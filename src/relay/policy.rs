//! Failure and cleanup policy.
//!
//! One table for every way a session can end early: whether the client
//! still gets an error page, and how the client link is closed. The origin
//! link is always dropped immediately.

use hyper::StatusCode;

use crate::http::response::error_response;
use crate::link::{CloseMode, Link};
use crate::relay::error::RelayError;
use crate::relay::event::Side;

/// The error page owed to the client, if any.
///
/// Nothing is written once response bytes went out, after a connect
/// failure, or when the client link itself is the one that failed.
pub fn error_page(err: &RelayError, response_started: bool) -> Option<StatusCode> {
    if response_started {
        return None;
    }
    match err {
        RelayError::Connect(_) => None,
        RelayError::ClientProtocol(e) if e.is_framing() => Some(StatusCode::BAD_REQUEST),
        RelayError::ClientWrite(_)
        | RelayError::ClientClosed
        | RelayError::ClientProtocol(_)
        | RelayError::ClientSaturated => None,
        RelayError::OriginWrite(_) | RelayError::OriginClosed | RelayError::OriginProtocol(_) | RelayError::Sign(_) => {
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Failures on the client leg drop the client at once; anything else lets
/// queued bytes flush first.
pub fn client_close_mode(err: &RelayError) -> CloseMode {
    match err.side() {
        Side::Client => CloseMode::Immediate,
        Side::Origin => CloseMode::Graceful,
    }
}

/// Queue the error page for `status` on `link`. Returns false when the
/// link can no longer take it.
pub fn reject<L: Link + ?Sized>(link: &L, status: StatusCode) -> bool {
    if link.is_closed() || !link.is_writable() {
        return false;
    }
    // Completion is not awaited; a graceful close flushes the page.
    drop(link.write(error_response(status)));
    true
}
