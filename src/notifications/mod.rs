//! Outbound notification capabilities.
//!
//! The core never talks to the host messaging layer directly; it consumes
//! these two capabilities, injected at construction time. Production wires
//! in implementations backed by the node's presence/broadcast channel, the
//! default here only logs.

use std::sync::Mutex;

use tracing::info;

/// Catalog-changed push events, named after the operations that raise them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEvent {
    Register,
    Unregister,
    DownloadStart,
    DownloadComplete,
    DownloadError,
    ApplianceDeleted,
}

impl CatalogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogEvent::Register => "register",
            CatalogEvent::Unregister => "unregister",
            CatalogEvent::DownloadStart => "download_start",
            CatalogEvent::DownloadComplete => "download_complete",
            CatalogEvent::DownloadError => "download_error",
            CatalogEvent::ApplianceDeleted => "appliance_deleted",
        }
    }
}

/// Sink for catalog-changed events and user-facing announcements.
pub trait NotificationSink: Send + Sync {
    /// Signal that the catalog changed in some way.
    fn push_event(&self, event: CatalogEvent);

    /// Free-text announcement addressed at humans watching the node.
    fn announce(&self, message: &str);
}

/// Controller for the node's presence line (e.g. "Downloading appliance...").
pub trait PresenceController: Send + Sync {
    fn set_presence(&self, status: &str);

    /// Restore whatever presence was shown before [`set_presence`] calls.
    fn restore_presence(&self);
}

/// Default sink that writes everything to the log.
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn push_event(&self, event: CatalogEvent) {
        info!("catalog changed: {}", event.as_str());
    }

    fn announce(&self, message: &str) {
        info!("announce: {}", message);
    }
}

impl PresenceController for LogNotificationSink {
    fn set_presence(&self, status: &str) {
        info!("presence: {}", status);
    }

    fn restore_presence(&self) {
        info!("presence restored");
    }
}

/// Recording implementations for tests.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<CatalogEvent>>,
    pub announcements: Mutex<Vec<String>>,
    pub presence: Mutex<Vec<String>>,
}

impl NotificationSink for RecordingSink {
    fn push_event(&self, event: CatalogEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn announce(&self, message: &str) {
        self.announcements.lock().unwrap().push(message.to_string());
    }
}

impl PresenceController for RecordingSink {
    fn set_presence(&self, status: &str) {
        self.presence.lock().unwrap().push(status.to_string());
    }

    fn restore_presence(&self) {
        self.presence.lock().unwrap().push("<restored>".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(CatalogEvent::Register.as_str(), "register");
        assert_eq!(CatalogEvent::DownloadComplete.as_str(), "download_complete");
        assert_eq!(CatalogEvent::ApplianceDeleted.as_str(), "appliance_deleted");
    }

    #[test]
    fn test_recording_sink_captures_in_order() {
        let sink = RecordingSink::default();
        sink.push_event(CatalogEvent::Register);
        sink.push_event(CatalogEvent::DownloadStart);
        sink.announce("hello");
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![CatalogEvent::Register, CatalogEvent::DownloadStart]
        );
        assert_eq!(*sink.announcements.lock().unwrap(), vec!["hello"]);
    }
}
