//! Hand-off payload for the document-import collaborator.
//!
//! A traced drawing re-enters the document store as a new vector
//! document. [`ImportRequest`] bundles everything the importer needs:
//! the derived display name, the media type, the SVG markup, the parsed
//! markup tree and the source document's 2D transform.
//!
//! Markup trees coming from elsewhere may carry embedded raster images.
//! [`resolve_embedded_images`] decodes each `data:` image once so its
//! natural size is known before the importer lays it out.

use serde::{Deserialize, Serialize};

use bitrace_pipeline::{CalibratedDocument, Node, PipelineError, decode_data_url};

use crate::svg::{MarkupElement, SvgMetadata, to_markup_tree};

/// Media type of traced output.
pub const SVG_MEDIA_TYPE: &str = "image/svg+xml";

/// Attribute recording a resolved image's natural pixel width.
pub const NATURAL_WIDTH_ATTR: &str = "data-natural-width";

/// Attribute recording a resolved image's natural pixel height.
pub const NATURAL_HEIGHT_ATTR: &str = "data-natural-height";

/// Affine 2D transform `[a, b, c, d, e, f]`, as stored on documents.
pub type Transform2d = [f64; 6];

/// A traced document ready to be added to the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Display name, `"Traced <source name>"`.
    pub name: String,
    /// Always [`SVG_MEDIA_TYPE`].
    pub media_type: String,
    /// Serialized SVG.
    pub markup: String,
    /// The same document as a node tree.
    pub tree: Node<MarkupElement>,
    /// Transform copied from the source document, if it had one.
    pub transform2d: Option<Transform2d>,
}

impl ImportRequest {
    /// Build the request for `doc`, traced from the document named
    /// `source_name`.
    #[must_use]
    pub fn new(
        source_name: &str,
        doc: &CalibratedDocument,
        metadata: &SvgMetadata<'_>,
        transform2d: Option<Transform2d>,
    ) -> Self {
        let tree = to_markup_tree(doc, metadata);
        let markup = crate::svg::render(&tree);
        Self {
            name: traced_name(source_name),
            media_type: SVG_MEDIA_TYPE.to_owned(),
            markup,
            tree,
            transform2d,
        }
    }
}

/// Display name for a drawing traced from `source_name`.
#[must_use]
pub fn traced_name(source_name: &str) -> String {
    format!("Traced {source_name}")
}

/// An embedded image whose natural size was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedImage {
    /// Position of the `image` node among all `image` nodes, pre-order.
    pub index: usize,
    /// Natural width in pixels.
    pub width: u32,
    /// Natural height in pixels.
    pub height: u32,
}

/// An embedded image that could not be decoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnresolvedImage {
    /// Position of the `image` node among all `image` nodes, pre-order.
    pub index: usize,
    /// Why decoding failed.
    pub error: PipelineError,
}

/// Outcome of [`resolve_embedded_images`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImageResolution {
    /// Images decoded and annotated.
    pub resolved: Vec<ResolvedImage>,
    /// Images with a `data:` href that failed to decode.
    pub failed: Vec<UnresolvedImage>,
    /// Images skipped because their href is missing or not a `data:` URL.
    pub skipped: usize,
}

/// The `href` of an `image` element, preferring SVG 2 `href` over
/// `xlink:href`.
fn image_href(element: &MarkupElement) -> Option<&str> {
    element.get("href").or_else(|| element.get("xlink:href"))
}

/// Decode every `image` node with a `data:` href, in depth-first
/// document order, recording its natural size as
/// [`NATURAL_WIDTH_ATTR`]/[`NATURAL_HEIGHT_ATTR`].
///
/// A failure on one node never stops the walk; it is reported in
/// [`ImageResolution::failed`] and that node is left untouched.
pub fn resolve_embedded_images(tree: &mut Node<MarkupElement>) -> ImageResolution {
    let mut resolution = ImageResolution::default();
    let mut index = 0;

    let mut is_image = |el: &MarkupElement| el.name == "image";
    tree.for_each_match_mut(&mut is_image, &mut |el: &mut MarkupElement| {
        let position = index;
        index += 1;

        let Some(href) = image_href(el).filter(|h| h.starts_with("data:")) else {
            tracing::trace!(index = position, "skipping image without data: href");
            resolution.skipped += 1;
            return;
        };

        match decode_data_url(href) {
            Ok(buffer) => {
                let (width, height) = (buffer.width(), buffer.height());
                el.attrs
                    .insert(NATURAL_WIDTH_ATTR.to_owned(), width.to_string());
                el.attrs
                    .insert(NATURAL_HEIGHT_ATTR.to_owned(), height.to_string());
                resolution.resolved.push(ResolvedImage {
                    index: position,
                    width,
                    height,
                });
            }
            Err(error) => {
                tracing::warn!(index = position, %error, "embedded image failed to decode");
                resolution.failed.push(UnresolvedImage {
                    index: position,
                    error,
                });
            }
        }
    });

    resolution
}
