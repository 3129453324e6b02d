//! Injected dependencies shared by every workflow.

use crate::retry::RetryPolicy;
use felicity_core::environment::{Clock, SystemClock};
use felicity_core::store::EngineStore;
use felicity_core::ticket::{NoopRenderer, Ticket, TicketIssuer, TicketRenderer};
use std::sync::Arc;

/// Storage, time, ticket minting and rendering for the workflows.
///
/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct EngineEnvironment {
    /// Persistence, the sole authority on capacity and uniqueness
    pub store: Arc<dyn EngineStore>,
    /// Time source for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
    /// Fire-and-forget ticket rendering
    pub renderer: Arc<dyn TicketRenderer>,
    /// Ticket id and invite code minting
    pub issuer: TicketIssuer,
    /// Bound on edit conflict and identifier collision retries
    pub retry: RetryPolicy,
}

impl EngineEnvironment {
    /// Environment with the system clock, no rendering, the default issuer
    /// and the default retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            renderer: Arc::new(NoopRenderer),
            issuer: TicketIssuer::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TicketRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the ticket issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: TicketIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Render a persisted ticket on a background task.
    ///
    /// Failures are logged and never reach the caller. Outside a Tokio
    /// runtime the ticket is skipped.
    pub(crate) fn render_in_background(&self, ticket: Ticket) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(ticket_id = %ticket.ticket_id, "No runtime, skipping ticket rendering");
            return;
        };
        let renderer = Arc::clone(&self.renderer);
        handle.spawn(async move {
            if let Err(error) = renderer.render(&ticket).await {
                tracing::warn!(ticket_id = %ticket.ticket_id, error = %error, "Ticket rendering failed");
            }
        });
    }
}
