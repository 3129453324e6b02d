//! Ticket and invite-code minting, plus the outbound ticket renderer contract.
//!
//! Minting is random and collision-tolerant: global uniqueness is the storage
//! layer's job (unique constraints on ticket id and invite code). Workflows
//! re-mint when the store reports a collision.

use crate::ids::{InviteCode, TicketId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Ticket id characters: uppercase letters and digits without `0`, `O`, `1`, `I`.
pub const TICKET_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random part of a ticket id.
pub const TICKET_CODE_LEN: usize = 10;

/// Default ticket id prefix.
pub const DEFAULT_TICKET_PREFIX: &str = "FEL";

/// Default QR image service.
pub const DEFAULT_QR_BASE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";

const INVITE_CODE_BYTES: usize = 3;

/// Whether `prefix` can head a ticket id.
///
/// Ticket ids travel unescaped in QR references, so the prefix is limited to
/// ASCII letters, digits, `-` and `_`.
#[must_use]
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A minted ticket: identifier plus scannable reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Globally unique ticket identifier
    pub ticket_id: TicketId,
    /// URL of the QR code encoding the ticket id
    pub qr_reference: String,
}

/// Mints ticket identifiers and invite codes.
///
/// # Examples
///
/// ```
/// use felicity_core::ticket::TicketIssuer;
///
/// let issuer = TicketIssuer::default();
/// let ticket = issuer.issue();
/// assert!(ticket.ticket_id.as_str().starts_with("FEL-"));
/// assert!(ticket.qr_reference.ends_with(ticket.ticket_id.as_str()));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketIssuer {
    prefix: String,
    qr_base_url: String,
}

impl Default for TicketIssuer {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_PREFIX, DEFAULT_QR_BASE_URL)
    }
}

impl TicketIssuer {
    /// Issuer with a custom prefix and QR service.
    #[must_use]
    pub fn new(prefix: impl Into<String>, qr_base_url: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            qr_base_url: qr_base_url.into(),
        }
    }

    /// Ticket id prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mint a fresh ticket.
    #[must_use]
    pub fn issue(&self) -> Ticket {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(self.prefix.len() + 1 + TICKET_CODE_LEN);
        id.push_str(&self.prefix);
        id.push('-');
        for _ in 0..TICKET_CODE_LEN {
            let index = rng.gen_range(0..TICKET_ALPHABET.len());
            id.push(char::from(TICKET_ALPHABET[index]));
        }
        let ticket_id = TicketId::new(id);
        let qr_reference = self.qr_reference(&ticket_id);
        Ticket {
            ticket_id,
            qr_reference,
        }
    }

    /// QR image URL for `ticket_id`.
    #[must_use]
    pub fn qr_reference(&self, ticket_id: &TicketId) -> String {
        format!("{}?size=250x250&data={ticket_id}", self.qr_base_url)
    }

    /// Mint a fresh team invite code (6 uppercase hex characters).
    #[must_use]
    pub fn mint_invite_code(&self) -> InviteCode {
        let mut bytes = [0u8; INVITE_CODE_BYTES];
        rand::thread_rng().fill(&mut bytes);
        let mut code = String::with_capacity(INVITE_CODE_BYTES * 2);
        for byte in bytes {
            let _ = write!(code, "{byte:02X}");
        }
        InviteCode::new(code)
    }
}

/// Errors from rendering a ticket.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The rendering service could not be reached or answered with an error.
    #[error("Ticket rendering failed: {0}")]
    Failed(String),
}

/// Outbound collaborator that turns a ticket into something displayable.
///
/// Invoked fire-and-forget after the ticket is persisted; failures never
/// affect the registration that produced the ticket.
pub trait TicketRenderer: Send + Sync {
    /// Render `ticket`.
    fn render<'a>(
        &'a self,
        ticket: &'a Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>>;
}

/// Renderer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl TicketRenderer for NoopRenderer {
    fn render<'a>(
        &'a self,
        _ticket: &'a Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ticket_ids_use_prefix_and_alphabet() {
        let issuer = TicketIssuer::new("TST", "https://qr.example/");
        let ticket = issuer.issue();
        let id = ticket.ticket_id.as_str();

        let code = id.strip_prefix("TST-").unwrap_or_default();
        assert_eq!(code.len(), TICKET_CODE_LEN);
        assert!(code.bytes().all(|b| TICKET_ALPHABET.contains(&b)));
        assert_eq!(
            ticket.qr_reference,
            format!("https://qr.example/?size=250x250&data={id}")
        );
    }

    #[test]
    fn prefixes_must_be_url_safe() {
        assert!(is_valid_prefix(DEFAULT_TICKET_PREFIX));
        assert!(is_valid_prefix("FEL_2025-A"));
        for bad in ["", "FEL&x=1", "FEL#", "FEL X", "FÉL", "a/b", "q?"] {
            assert!(!is_valid_prefix(bad), "{bad:?} accepted");
        }
    }

    #[test]
    fn ticket_ids_rarely_collide() {
        let issuer = TicketIssuer::default();
        let ids: HashSet<_> = (0..1_000).map(|_| issuer.issue().ticket_id).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn invite_codes_are_six_uppercase_hex_chars() {
        let code = TicketIssuer::default().mint_invite_code();
        assert_eq!(code.as_str().len(), 6);
        assert!(
            code.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        );
    }
}
