//! bitrace-export: pure format serializers (sans-IO)
//!
//! Converts calibrated documents into SVG markup and packages them for
//! the document-import collaborator.

pub mod import;
pub mod svg;

pub use import::{
    ImageResolution, ImportRequest, ResolvedImage, SVG_MEDIA_TYPE, Transform2d, UnresolvedImage,
    resolve_embedded_images, traced_name,
};
pub use svg::{MarkupElement, SvgMetadata, build_path_data, render, to_markup_tree, to_svg};
