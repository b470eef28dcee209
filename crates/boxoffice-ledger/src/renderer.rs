//! Ticket artifact rendering contract.
//!
//! Rendering (QR image, printable PDF) is a pure function of the signed
//! payload, the reservation and the resolved template. It runs after the
//! issuance transaction commits, so a renderer failure never rolls back a
//! ticket; the artifacts can be re-rendered later with the same payload.

use async_trait::async_trait;
use boxoffice_types::{Reservation, Result, SignedPayload, TemplateLayout, TicketTemplate};

/// Everything the PDF renderer needs for one ticket.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub reservation: &'a Reservation,
    pub ticket_number: &'a str,
    pub qr_image_ref: &'a str,
    /// Template actually used after fallback resolution.
    pub template: TicketTemplate,
    pub layout: &'a TemplateLayout,
}

/// A rendered ticket PDF: where it was stored plus its bytes, which are
/// attached to the delivery e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub pdf_ref: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    /// Render the QR code encoding `payload`; returns the image reference.
    async fn render_qr(&self, payload: &SignedPayload) -> Result<String>;

    /// Render the printable ticket.
    async fn render_pdf(&self, request: &RenderRequest<'_>) -> Result<RenderedPdf>;
}
