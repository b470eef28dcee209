//! Ticket artwork templates.
//!
//! Each pack is tagged with a [`TicketTemplate`] when it is snapshotted into a
//! reservation. The [`TemplateTable`] maps a template to its background image
//! and QR placement; a template missing from the table falls back to
//! [`TicketTemplate::Simple`].

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BoxofficeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketTemplate {
    Vip,
    Simple,
    Family,
    Couple,
}

impl TicketTemplate {
    /// Used when nothing more specific is configured.
    pub const FALLBACK: Self = Self::Simple;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vip => "vip",
            Self::Simple => "simple",
            Self::Family => "family",
            Self::Couple => "couple",
        }
    }
}

impl std::fmt::Display for TicketTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketTemplate {
    type Err = BoxofficeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vip" => Ok(Self::Vip),
            "simple" => Ok(Self::Simple),
            "family" => Ok(Self::Family),
            "couple" => Ok(Self::Couple),
            other => Err(BoxofficeError::InvalidInput {
                reason: format!("unknown ticket template: {other}"),
            }),
        }
    }
}

/// Where the QR code is stamped on the template, in canvas points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPosition {
    pub x: u32,
    pub y: u32,
    pub width: u32,
}

/// Rendering inputs for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateLayout {
    /// Background image key understood by the renderer.
    pub image: String,
    pub qr: QrPosition,
}

/// Immutable template → layout map with an explicit fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "HashMap<TicketTemplate, TemplateLayout>",
    into = "HashMap<TicketTemplate, TemplateLayout>"
)]
pub struct TemplateTable {
    layouts: HashMap<TicketTemplate, TemplateLayout>,
}

impl TemplateTable {
    /// Build a table.
    ///
    /// # Errors
    /// Returns `Configuration` unless the fallback template has a layout.
    pub fn new(layouts: HashMap<TicketTemplate, TemplateLayout>) -> crate::Result<Self> {
        if !layouts.contains_key(&TicketTemplate::FALLBACK) {
            return Err(BoxofficeError::Configuration(format!(
                "template table must define the fallback template `{}`",
                TicketTemplate::FALLBACK
            )));
        }
        Ok(Self { layouts })
    }

    /// Resolve `template`, falling back to the simple layout.
    #[must_use]
    pub fn resolve(&self, template: TicketTemplate) -> (TicketTemplate, &TemplateLayout) {
        match self.layouts.get(&template) {
            Some(layout) => (template, layout),
            None => (
                TicketTemplate::FALLBACK,
                &self.layouts[&TicketTemplate::FALLBACK],
            ),
        }
    }
}

impl TryFrom<HashMap<TicketTemplate, TemplateLayout>> for TemplateTable {
    type Error = BoxofficeError;

    fn try_from(layouts: HashMap<TicketTemplate, TemplateLayout>) -> crate::Result<Self> {
        Self::new(layouts)
    }
}

impl From<TemplateTable> for HashMap<TicketTemplate, TemplateLayout> {
    fn from(table: TemplateTable) -> Self {
        table.layouts
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        let qr = QrPosition {
            x: 902,
            y: 113,
            width: 186,
        };
        let layouts = [
            (TicketTemplate::Vip, "/images/vip.jpg"),
            (TicketTemplate::Simple, "/images/simple.jpg"),
            (TicketTemplate::Family, "/images/famille.jpg"),
            (TicketTemplate::Couple, "/images/couple.jpg"),
        ]
        .into_iter()
        .map(|(template, image)| {
            (
                template,
                TemplateLayout {
                    image: image.to_string(),
                    qr,
                },
            )
        })
        .collect();
        Self { layouts }
    }
}
