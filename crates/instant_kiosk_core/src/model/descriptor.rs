//! Document and layer descriptor model.
//!
//! # Responsibility
//! - Define the metadata records the catalog, the store and the session
//!   controller exchange.
//! - Keep the default-layer invariant in one constructor.
//!
//! # Invariants
//! - A `DocumentDescriptor` always has at least one layer; the first layer is
//!   the default layer.
//! - Descriptor identity is the `document_id` alone. Title and layers may
//!   differ across fetches without creating a new identity.
//! - Layer tokens are bearer credentials and never appear in `Debug` output.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// Stable catalog identifier of a document.
pub type DocumentId = String;

const REDACTED_TOKEN: &str = "<redacted>";

/// Validation failure for descriptor construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorValidationError {
    /// `document_id` is blank.
    EmptyDocumentId,
    /// A descriptor must carry at least the default layer.
    EmptyLayers(DocumentId),
    /// A layer references a different document than its owner.
    ForeignLayer {
        document_id: DocumentId,
        layer_document_id: DocumentId,
    },
}

impl Display for DescriptorValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDocumentId => write!(f, "document_id cannot be empty"),
            Self::EmptyLayers(document_id) => {
                write!(f, "document `{document_id}` has no layers")
            }
            Self::ForeignLayer {
                document_id,
                layer_document_id,
            } => write!(
                f,
                "layer of document `{layer_document_id}` attached to document `{document_id}`"
            ),
        }
    }
}

impl Error for DescriptorValidationError {}

/// One addressable layer of a document.
///
/// Layers are replaced wholesale when their owning document is refreshed;
/// they are never mutated in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Back-reference to the owning document.
    pub document_id: DocumentId,
    /// `None` for the default layer.
    pub layer_name: Option<String>,
    /// Opaque bearer token granting access to this layer's sync session.
    pub token: String,
}

impl LayerDescriptor {
    /// Creates the default (unnamed) layer of a document.
    pub fn default_layer(document_id: impl Into<DocumentId>, token: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            layer_name: None,
            token: token.into(),
        }
    }

    /// Creates a named layer of a document.
    pub fn named(
        document_id: impl Into<DocumentId>,
        layer_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            layer_name: Some(layer_name.into()),
            token: token.into(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.layer_name.is_none()
    }
}

impl Debug for LayerDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerDescriptor")
            .field("document_id", &self.document_id)
            .field("layer_name", &self.layer_name)
            .field("token", &REDACTED_TOKEN)
            .finish()
    }
}

/// Metadata record of one catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DescriptorRecord")]
pub struct DocumentDescriptor {
    pub document_id: DocumentId,
    pub title: String,
    layers: Vec<LayerDescriptor>,
}

#[derive(Deserialize)]
struct DescriptorRecord {
    document_id: DocumentId,
    title: String,
    layers: Vec<LayerDescriptor>,
}

impl TryFrom<DescriptorRecord> for DocumentDescriptor {
    type Error = DescriptorValidationError;

    fn try_from(value: DescriptorRecord) -> Result<Self, Self::Error> {
        Self::new(value.document_id, value.title, value.layers)
    }
}

impl DocumentDescriptor {
    /// Creates a descriptor after checking the layer invariants.
    ///
    /// # Errors
    /// - `EmptyDocumentId` when `document_id` is blank.
    /// - `EmptyLayers` when `layers` is empty.
    /// - `ForeignLayer` when a layer points at another document.
    pub fn new(
        document_id: impl Into<DocumentId>,
        title: impl Into<String>,
        layers: Vec<LayerDescriptor>,
    ) -> Result<Self, DescriptorValidationError> {
        let document_id = document_id.into();
        if document_id.trim().is_empty() {
            return Err(DescriptorValidationError::EmptyDocumentId);
        }
        if layers.is_empty() {
            return Err(DescriptorValidationError::EmptyLayers(document_id));
        }
        if let Some(foreign) = layers.iter().find(|layer| layer.document_id != document_id) {
            return Err(DescriptorValidationError::ForeignLayer {
                layer_document_id: foreign.document_id.clone(),
                document_id,
            });
        }

        Ok(Self {
            document_id,
            title: title.into(),
            layers,
        })
    }

    /// Returns the default (first) layer.
    pub fn default_layer(&self) -> &LayerDescriptor {
        // `new` rejects empty layer lists.
        &self.layers[0]
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    /// Finds a layer by name; `None` selects the default layer.
    pub fn layer(&self, layer_name: Option<&str>) -> Option<&LayerDescriptor> {
        match layer_name {
            None => Some(self.default_layer()),
            Some(name) => self
                .layers
                .iter()
                .find(|layer| layer.layer_name.as_deref() == Some(name)),
        }
    }

    /// Compares title and layers in addition to identity.
    pub fn same_content(&self, other: &Self) -> bool {
        self.document_id == other.document_id
            && self.title == other.title
            && self.layers == other.layers
    }
}

impl PartialEq for DocumentDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.document_id == other.document_id
    }
}

impl Eq for DocumentDescriptor {}

impl Hash for DocumentDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.document_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorValidationError, DocumentDescriptor, LayerDescriptor};
    use std::collections::HashSet;

    #[test]
    fn new_rejects_empty_layers() {
        let err = DocumentDescriptor::new("doc", "Doc", vec![]).unwrap_err();
        assert_eq!(err, DescriptorValidationError::EmptyLayers("doc".to_string()));
    }

    #[test]
    fn new_rejects_layer_of_other_document() {
        let err = DocumentDescriptor::new(
            "doc",
            "Doc",
            vec![LayerDescriptor::default_layer("other", "t")],
        )
        .unwrap_err();
        assert!(matches!(err, DescriptorValidationError::ForeignLayer { .. }));
    }

    #[test]
    fn identity_ignores_title_and_layers() {
        let first =
            DocumentDescriptor::new("a", "Old", vec![LayerDescriptor::default_layer("a", "1")])
                .unwrap();
        let second = DocumentDescriptor::new(
            "a",
            "New",
            vec![
                LayerDescriptor::default_layer("a", "2"),
                LayerDescriptor::named("a", "review", "3"),
            ],
        )
        .unwrap();

        assert_eq!(first, second);
        assert!(!first.same_content(&second));
        let set: HashSet<_> = [first, second].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn debug_output_redacts_token() {
        let layer = LayerDescriptor::named("a", "review", "secret-jwt");
        let rendered = format!("{layer:?}");
        assert!(!rendered.contains("secret-jwt"));
        assert!(rendered.contains("review"));
    }

    #[test]
    fn layer_lookup_resolves_default_and_named() {
        let descriptor = DocumentDescriptor::new(
            "a",
            "A",
            vec![
                LayerDescriptor::default_layer("a", "1"),
                LayerDescriptor::named("a", "review", "2"),
            ],
        )
        .unwrap();

        assert_eq!(descriptor.layer(None).unwrap().token, "1");
        assert_eq!(descriptor.layer(Some("review")).unwrap().token, "2");
        assert!(descriptor.layer(Some("missing")).is_none());
    }

    #[test]
    fn deserialization_enforces_layer_invariant() {
        let json = serde_json::json!({
            "document_id": "a",
            "title": "A",
            "layers": []
        });
        assert!(serde_json::from_value::<DocumentDescriptor>(json).is_err());
    }
}
