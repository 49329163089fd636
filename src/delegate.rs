//! Asynchronous server message callbacks.
//!
//! Notices, notifications (`LISTEN`/`NOTIFY`) and parameter-status changes
//! are delivered to a capability set held by weak reference, so the
//! delegate never keeps its [`Connection`][crate::connection::Connection]
//! alive.
use crate::notice::Notice;

/// Capability set for asynchronous server messages.
pub trait Delegate: Send + Sync {
    fn on_notice(&self, _notice: &Notice) {}
    fn on_notification(&self, _process_id: i32, _channel: &str, _payload: &str) {}
    fn on_parameter_status(&self, _name: &str, _value: &str) {}
}

/// Delegate that logs everything at the levels a database client's
/// operator typically wants to see.
#[derive(Debug, Default)]
pub struct LoggingDelegate;

impl Delegate for LoggingDelegate {
    fn on_notice(&self, notice: &Notice) {
        log::info!("{notice}");
    }

    fn on_notification(&self, process_id: i32, channel: &str, payload: &str) {
        log::debug!("notification from {process_id} on {channel:?}: {payload}");
    }

    fn on_parameter_status(&self, name: &str, value: &str) {
        log::trace!("parameter status {name}={value}");
    }
}
