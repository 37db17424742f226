//! What the editor sees of the document store.
//!
//! The store itself is a collaborator; the editor only receives
//! snapshots of the parts it reacts to.

use serde::{Deserialize, Serialize};

use bitrace_export::Transform2d;
use bitrace_pipeline::{FilterSpec, ImageSource, PhysicalSize};

/// A source document, as selected in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Store identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Encoded image.
    pub image: ImageSource,
    /// Physical size, when known.
    pub physical: Option<PhysicalSize>,
    /// Placement transform, copied onto traced output.
    pub transform2d: Option<Transform2d>,
}

impl SourceDocument {
    /// A document with no physical size or transform.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: ImageSource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image,
            physical: None,
            transform2d: None,
        }
    }

    /// Set the physical size.
    #[must_use]
    pub fn with_physical(mut self, physical: PhysicalSize) -> Self {
        self.physical = Some(physical);
        self
    }

    /// Set the placement transform.
    #[must_use]
    pub fn with_transform(mut self, transform2d: Transform2d) -> Self {
        self.transform2d = Some(transform2d);
        self
    }
}

/// A machining operation with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Store identifier.
    pub id: String,
    /// Operation type, e.g. `"Laser Raster"` or `"Laser Cut"`.
    pub kind: String,
    /// Documents the operation applies to.
    #[serde(default)]
    pub documents: Vec<String>,
    /// All of the operation's fields; filter settings are among them.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Operation {
    /// Whether this is a raster operation. Only raster operations drive
    /// the filter preview.
    #[must_use]
    pub fn is_raster(&self) -> bool {
        self.kind.to_ascii_lowercase().contains("raster")
    }

    /// The filter settings among the operation's fields.
    #[must_use]
    pub fn filter_spec(&self) -> FilterSpec {
        FilterSpec::project(&self.fields)
    }

    /// Whether `document_id` is one of this operation's documents.
    #[must_use]
    pub fn applies_to(&self, document_id: &str) -> bool {
        self.documents.iter().any(|d| d == document_id)
    }
}

/// One snapshot of the store, delivered on every change notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Whether the preview is enabled by the host.
    pub enabled: bool,
    /// The current operation, if any.
    pub operation: Option<Operation>,
    /// The first selected document, if any.
    pub selected: Option<SourceDocument>,
}

impl Observation {
    /// The current operation if it is a raster operation.
    #[must_use]
    pub fn raster_operation(&self) -> Option<&Operation> {
        self.operation.as_ref().filter(|op| op.is_raster())
    }

    /// The selected document, if the raster operation applies to it.
    #[must_use]
    pub fn target_document(&self) -> Option<&SourceDocument> {
        let op = self.raster_operation()?;
        self.selected.as_ref().filter(|doc| op.applies_to(&doc.id))
    }

    /// Whether the preview surface should be shown.
    #[must_use]
    pub fn preview_visible(&self) -> bool {
        self.enabled && self.target_document().is_some()
    }
}
