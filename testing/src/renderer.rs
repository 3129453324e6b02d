//! Ticket renderers for tests.

use felicity_core::ids::TicketId;
use felicity_core::ticket::{RenderError, Ticket, TicketRenderer};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Records every ticket it is asked to render.
///
/// Rendering is fire-and-forget, so tests that assert on it should wait
/// with [`RecordingRenderer::wait_for`].
#[derive(Clone, Debug, Default)]
pub struct RecordingRenderer {
    rendered: Arc<Mutex<Vec<TicketId>>>,
}

impl RecordingRenderer {
    /// Create a new empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets rendered so far, in call order.
    #[must_use]
    pub fn rendered(&self) -> Vec<TicketId> {
        self.rendered
            .lock()
            .map(|rendered| rendered.clone())
            .unwrap_or_default()
    }

    /// Poll until at least `count` tickets were rendered or ~1s elapsed.
    ///
    /// Returns the tickets rendered at that point.
    pub async fn wait_for(&self, count: usize) -> Vec<TicketId> {
        for _ in 0..100 {
            let rendered = self.rendered();
            if rendered.len() >= count {
                return rendered;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.rendered()
    }
}

impl TicketRenderer for RecordingRenderer {
    fn render<'a>(
        &'a self,
        ticket: &'a Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut rendered) = self.rendered.lock() {
                rendered.push(ticket.ticket_id.clone());
            }
            Ok(())
        })
    }
}

/// Always fails; for checking that rendering failures stay invisible.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingRenderer;

impl TicketRenderer for FailingRenderer {
    fn render<'a>(
        &'a self,
        _ticket: &'a Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
        Box::pin(async { Err(RenderError::Failed("renderer offline".to_string())) })
    }
}
