use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use turnstile_storage::StoreStats;

use crate::events::IngestOutcome;
use crate::service::{Decision, DenyReason};

#[derive(Debug, Default)]
pub struct Metrics {
    request_total: AtomicU64,
    request_success: AtomicU64,
    request_error: AtomicU64,
    decisions_allowed: AtomicU64,
    decisions_denied: AtomicU64,
    denials_by_reason: [AtomicU64; DenyReason::COUNT],
    events_applied: AtomicU64,
    events_stale: AtomicU64,
    events_ignored: AtomicU64,
    events_dropped: AtomicU64,
    notifications_rejected: AtomicU64,
    removals_purged: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.request_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.request_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.request_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_total(&self) -> u64 {
        self.request_total.load(Ordering::Relaxed)
    }

    pub fn request_success(&self) -> u64 {
        self.request_success.load(Ordering::Relaxed)
    }

    pub fn request_error(&self) -> u64 {
        self.request_error.load(Ordering::Relaxed)
    }

    pub fn record_decision(&self, decision: &Decision) {
        match decision.reason {
            None => {
                self.decisions_allowed.fetch_add(1, Ordering::Relaxed);
            }
            Some(reason) => self.record_denial(reason),
        }
    }

    pub fn record_denial(&self, reason: DenyReason) {
        self.decisions_denied.fetch_add(1, Ordering::Relaxed);
        self.denials_by_reason[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn decisions_allowed(&self) -> u64 {
        self.decisions_allowed.load(Ordering::Relaxed)
    }

    pub fn decisions_denied(&self) -> u64 {
        self.decisions_denied.load(Ordering::Relaxed)
    }

    pub fn denials_for(&self, reason: DenyReason) -> u64 {
        self.denials_by_reason[reason.index()].load(Ordering::Relaxed)
    }

    pub fn record_ingest(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Stored { write, .. } if write.is_applied() => &self.events_applied,
            IngestOutcome::Stored { .. } => &self.events_stale,
            IngestOutcome::Ignored(_) => &self.events_ignored,
            IngestOutcome::Dropped(_) => &self.events_dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::Relaxed)
    }

    pub fn events_stale(&self) -> u64 {
        self.events_stale.load(Ordering::Relaxed)
    }

    pub fn events_ignored(&self) -> u64 {
        self.events_ignored.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn record_notification_rejected(&self) {
        self.notifications_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notifications_rejected(&self) -> u64 {
        self.notifications_rejected.load(Ordering::Relaxed)
    }

    pub fn record_removals_purged(&self, count: usize) {
        self.removals_purged
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn removals_purged(&self) -> u64 {
        self.removals_purged.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        counter(
            &mut output,
            "turnstile_requests_total",
            "Total number of HTTP requests.",
            self.request_total(),
        );
        counter(
            &mut output,
            "turnstile_requests_success_total",
            "Total successful HTTP requests.",
            self.request_success(),
        );
        counter(
            &mut output,
            "turnstile_requests_error_total",
            "Total HTTP requests answered with a non-2xx status.",
            self.request_error(),
        );
        counter(
            &mut output,
            "turnstile_decisions_allowed_total",
            "Authorization decisions that allowed the request.",
            self.decisions_allowed(),
        );

        counter(
            &mut output,
            "turnstile_decisions_denied_total",
            "Authorization decisions that denied the request.",
            self.decisions_denied(),
        );
        output.push_str(
            "# HELP turnstile_decisions_denied_by_reason_total Denied decisions per deny reason.\n",
        );
        output.push_str("# TYPE turnstile_decisions_denied_by_reason_total counter\n");
        for reason in DenyReason::ALL {
            let _ = writeln!(
                output,
                "turnstile_decisions_denied_by_reason_total{{reason=\"{reason}\"}} {}",
                self.denials_for(reason)
            );
        }

        counter(
            &mut output,
            "turnstile_events_applied_total",
            "Notification events applied to the store.",
            self.events_applied(),
        );
        counter(
            &mut output,
            "turnstile_events_stale_total",
            "Notification events superseded by a newer mutation.",
            self.events_stale(),
        );
        counter(
            &mut output,
            "turnstile_events_ignored_total",
            "Messages ignored as foreign or of an unknown type.",
            self.events_ignored(),
        );
        counter(
            &mut output,
            "turnstile_events_dropped_total",
            "Notifications dropped because they could not be decoded.",
            self.events_dropped(),
        );
        counter(
            &mut output,
            "turnstile_notifications_rejected_total",
            "Notifications rejected because the ingest queue was full.",
            self.notifications_rejected(),
        );
        counter(
            &mut output,
            "turnstile_removals_purged_total",
            "Removal markers purged after the retention window.",
            self.removals_purged(),
        );
        output
    }
}

pub fn render_store_gauges(stats: &StoreStats) -> String {
    let mut output = String::new();
    output.push_str("# HELP turnstile_store_records Live records per entity kind.\n");
    output.push_str("# TYPE turnstile_store_records gauge\n");
    for kind in &stats.kinds {
        let _ = writeln!(
            output,
            "turnstile_store_records{{kind=\"{}\"}} {}",
            kind.kind, kind.live
        );
    }
    output.push_str("# HELP turnstile_store_removal_markers Retained removal markers per entity kind.\n");
    output.push_str("# TYPE turnstile_store_removal_markers gauge\n");
    for kind in &stats.kinds {
        let _ = writeln!(
            output,
            "turnstile_store_removal_markers{{kind=\"{}\"}} {}",
            kind.kind, kind.removed
        );
    }
    output
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {value}");
}
