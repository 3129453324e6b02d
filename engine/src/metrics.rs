//! Business metrics for the engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `felicity_registrations_total{outcome}` - Registration attempts by outcome
//! - `felicity_teams_completed_total` - Teams that reached their size
//! - `felicity_tickets_issued_total{source}` - Tickets minted (individual, team, merchandise)
//! - `felicity_orders_total{status}` - Orders submitted and decided
//! - `felicity_event_edits_total{outcome}` - Event edits by outcome
//! - `felicity_edit_conflicts_total` - Edits that hit a stale version and were re-evaluated
//!
//! ## Histograms
//! - `felicity_team_issuance_duration_seconds` - Time to issue tickets for a completed team

use felicity_core::error::EngineError;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from installing the exporter.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Where a ticket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketSource {
    /// Individual registration
    Individual,
    /// Team completion
    Team,
    /// Approved merchandise order
    Merchandise,
}

impl TicketSource {
    const fn label(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Team => "team",
            Self::Merchandise => "merchandise",
        }
    }
}

/// Describe every metric the engine records.
///
/// Call once at start-up, before any metric is recorded.
pub fn register_engine_metrics() {
    describe_counter!(
        "felicity_registrations_total",
        "Registration attempts by outcome (confirmed or the error kind)"
    );
    describe_counter!(
        "felicity_teams_completed_total",
        "Teams whose last seat was filled"
    );
    describe_counter!(
        "felicity_tickets_issued_total",
        "Tickets minted by source (individual, team, merchandise)"
    );
    describe_counter!(
        "felicity_orders_total",
        "Merchandise orders by status (pending, approved, rejected)"
    );
    describe_counter!(
        "felicity_event_edits_total",
        "Event edits by outcome (applied or the error kind)"
    );
    describe_counter!(
        "felicity_edit_conflicts_total",
        "Event edits re-evaluated after a concurrent update"
    );
    describe_histogram!(
        "felicity_team_issuance_duration_seconds",
        "Time taken to issue tickets for every member of a completed team"
    );

    tracing::info!("Engine metrics registered");
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a recorder is
/// already installed.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    register_engine_metrics();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

pub(crate) fn outcome_label<T>(result: &Result<T, EngineError>, success: &'static str) -> &'static str {
    match result {
        Ok(_) => success,
        Err(error) => kind_label(error),
    }
}

const fn kind_label(error: &EngineError) -> &'static str {
    use felicity_core::error::ErrorKind;
    match error.kind() {
        ErrorKind::NotFound => "not_found",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::InvalidTransition => "invalid_transition",
        ErrorKind::RegistrationClosed => "registration_closed",
        ErrorKind::DeadlinePassed => "deadline_passed",
        ErrorKind::AlreadyRegistered => "already_registered",
        ErrorKind::CapacityExceeded => "capacity_exceeded",
        ErrorKind::WrongEventType => "wrong_event_type",
        ErrorKind::AlreadyMember => "already_member",
        ErrorKind::AlreadyInOtherTeam => "already_in_other_team",
        ErrorKind::TeamFull => "team_full",
        ErrorKind::AlreadyProcessed => "already_processed",
        ErrorKind::InvalidInput => "invalid_input",
        ErrorKind::OutOfStock => "out_of_stock",
        ErrorKind::Storage => "storage",
    }
}

pub(crate) fn record_registration<T>(result: &Result<T, EngineError>) {
    metrics::counter!("felicity_registrations_total", "outcome" => outcome_label(result, "confirmed"))
        .increment(1);
}

pub(crate) fn record_edit<T>(result: &Result<T, EngineError>) {
    metrics::counter!("felicity_event_edits_total", "outcome" => outcome_label(result, "applied"))
        .increment(1);
}

pub(crate) fn record_edit_conflict() {
    metrics::counter!("felicity_edit_conflicts_total").increment(1);
}

pub(crate) fn record_tickets_issued(source: TicketSource, count: u64) {
    if count > 0 {
        metrics::counter!("felicity_tickets_issued_total", "source" => source.label())
            .increment(count);
    }
}

pub(crate) fn record_team_completed(issuance_secs: f64) {
    metrics::counter!("felicity_teams_completed_total").increment(1);
    metrics::histogram!("felicity_team_issuance_duration_seconds").record(issuance_secs);
}

pub(crate) fn record_order(status: &'static str) {
    metrics::counter!("felicity_orders_total", "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use felicity_core::ids::EventId;

    #[test]
    fn outcome_labels_follow_error_kind() {
        let ok: Result<(), EngineError> = Ok(());
        assert_eq!(outcome_label(&ok, "confirmed"), "confirmed");

        let full: Result<(), EngineError> = Err(EngineError::CapacityExceeded {
            event_id: EventId::new(),
            limit: 1,
        });
        assert_eq!(outcome_label(&full, "confirmed"), "capacity_exceeded");
    }

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        register_engine_metrics();
        record_tickets_issued(TicketSource::Team, 3);
        record_team_completed(0.01);
        record_order("pending");
    }
}
