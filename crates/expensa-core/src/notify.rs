//! Notification sink
//!
//! Status changes on a report are pushed to a sink as fire-and-forget events.
//! A failing sink never fails the workflow step that triggered it.

use tracing::warn;

use crate::error::Result;
use crate::models::{NewNotification, Report};

/// Append-only receiver of report status changes
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &NewNotification) -> Result<()>;
}

/// Notify the report owner of the report's current status, logging and
/// swallowing any sink failure
pub fn emit(sink: &dyn NotificationSink, report: &Report) {
    let notification = NewNotification {
        report_id: report.id,
        user_id: report.user_id,
        status: report.status,
    };
    if let Err(e) = sink.notify(&notification) {
        warn!(
            report = %report.report_id,
            status = %report.status,
            "Failed to record notification: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::RecordingSink;

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn notify(&self, _notification: &NewNotification) -> Result<()> {
            Err(Error::InvalidData("sink offline".into()))
        }
    }

    #[test]
    fn test_emit_records_owner_and_status() {
        let sink = RecordingSink::default();
        let report = crate::test_utils::sample_report(7, 42);

        emit(&sink, &report);

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].report_id, 7);
        assert_eq!(sent[0].user_id, 42);
        assert_eq!(sent[0].status, report.status);
    }

    #[test]
    fn test_emit_swallows_sink_failure() {
        let report = crate::test_utils::sample_report(1, 1);
        // Must not panic or propagate
        emit(&FailingSink, &report);
    }
}
