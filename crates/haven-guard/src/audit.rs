//! Collaborator sinks: the append-only audit trail and best-effort
//! notification delivery.
//!
//! Both are fire-and-forget from the facade's perspective. A sink that
//! errors gets a warning log and nothing else; the decision that was
//! already made stands.

use std::sync::Mutex;

use haven_core::events::AuditEvent;
use haven_core::types::HomeId;

/// Append-only audit sink.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

/// Default sink: one structured log line per event.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        tracing::info!(
            event_id = %event.id.0,
            home = ?event.home.map(|h| h.0),
            timestamp = %event.timestamp,
            %payload,
            "audit event"
        );
        Ok(())
    }
}

/// Buffering sink for tests and in-process consumers.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit buffer poisoned").clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .expect("audit buffer poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Outbound notification delivery (email, SMS, push).
pub trait Notifier: Send + Sync {
    fn notify(&self, home: &HomeId, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Default notifier: drops everything.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _home: &HomeId, _subject: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use haven_core::events::AuditPayload;
    use haven_core::types::{AlertId, AlertPriority};

    #[test]
    fn memory_sink_buffers_in_order() {
        let sink = MemoryAuditSink::new();
        for priority in [AlertPriority::Low, AlertPriority::Medium] {
            sink.record(&AuditEvent::new(
                None,
                AuditPayload::AlertRaised {
                    alert: AlertId::new(),
                    priority,
                    title: "t".to_string(),
                },
                Utc::now(),
            ))
            .unwrap();
        }

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].payload,
            AuditPayload::AlertRaised { priority: AlertPriority::Low, .. }
        ));
    }
}
