//! QR rendering through the HTTP service named in each ticket's reference.

use felicity_core::ticket::{RenderError, Ticket, TicketRenderer};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Fetches a ticket's QR reference so the image is generated and cached
/// by the QR service.
#[derive(Debug, Clone)]
pub struct HttpQrRenderer {
    client: reqwest::Client,
}

impl HttpQrRenderer {
    /// Create a renderer whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Failed`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(Self { client })
    }
}

impl TicketRenderer for HttpQrRenderer {
    fn render<'a>(
        &'a self,
        ticket: &'a Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&ticket.qr_reference)
                .send()
                .await
                .map_err(|e| RenderError::Failed(e.to_string()))?;
            response
                .error_for_status()
                .map_err(|e| RenderError::Failed(e.to_string()))?;
            tracing::debug!(ticket_id = %ticket.ticket_id, "Ticket QR rendered");
            Ok(())
        })
    }
}
