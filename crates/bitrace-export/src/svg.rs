//! SVG export serializer.
//!
//! Converts a [`CalibratedDocument`] into SVG markup using the [`svg`]
//! crate for document construction, XML escaping, and path data
//! formatting.
//!
//! The root element declares the physical size (`width`/`height` in
//! millimetres) and the pixel `viewBox`. Each contour becomes its own
//! `<path>` using `M`, `L`, `C` and `z` commands; holes are separate
//! paths rather than subpaths of their outer boundary.
//!
//! The same document is available as a generic [`Node`] tree via
//! [`to_markup_tree`], which is what the import collaborator consumes.
//! [`to_svg`] renders that tree, so the two never disagree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use svg::Document;
use svg::node::element::Element;
use svg::node::element::path::Data;
use svg::node::{Node as _, Text, Value};

use bitrace_pipeline::{CalibratedDocument, Node, Polarity, Segment, VectorContour};

/// Namespace for the `<bitrace:params>` metadata element.
pub const METADATA_NAMESPACE: &str = "https://bitrace.dev/ns/1";

/// Metadata to embed in the SVG document.
///
/// All fields are optional. When present, `<title>`, `<desc>` and
/// `<metadata>` are emitted before the paths.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source document name.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized trace parameters, emitted inside `<metadata>` wrapped
    /// in a namespaced `<bitrace:params>` element so exported files
    /// carry the settings that produced them.
    pub params_json: Option<&'a str>,
}

/// One element of a markup tree: a tag name, its attributes, and
/// optional text content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupElement {
    /// Tag name, e.g. `"path"`.
    pub name: String,
    /// Attributes, sorted by name.
    pub attrs: BTreeMap<String, String>,
    /// Character data inside the element.
    pub text: Option<String>,
}

impl MarkupElement {
    /// An element with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set an attribute, returning `self` for chaining.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Build an SVG path `d` attribute string from a contour.
///
/// Returns an empty string for contours without segments.
///
/// Coordinates are formatted by the [`svg`] crate using `f32` precision.
///
/// # Examples
///
/// ```
/// use bitrace_pipeline::{Point, Polarity, Segment, VectorContour};
/// use bitrace_export::build_path_data;
///
/// let contour = VectorContour::new(
///     Point::new(10.0, 20.0),
///     vec![
///         Segment::Line { to: Point::new(30.0, 40.0) },
///         Segment::Line { to: Point::new(10.0, 20.0) },
///     ],
///     Polarity::Outer,
/// );
/// assert_eq!(build_path_data(&contour), "M10,20 L30,40 L10,20 z");
/// ```
#[must_use]
pub fn build_path_data(contour: &VectorContour) -> String {
    if contour.segments.is_empty() {
        return String::new();
    }

    let start = contour.start;
    let mut data = Data::new().move_to((start.x, start.y));
    for segment in &contour.segments {
        data = match *segment {
            Segment::Line { to } => data.line_to((to.x, to.y)),
            Segment::Cubic { c1, c2, to } => {
                data.cubic_curve_to((c1.x, c1.y, c2.x, c2.y, to.x, to.y))
            }
        };
    }
    String::from(Value::from(data.close()))
}

/// The calibrated document as a generic markup tree.
///
/// The root is an `svg` element with `xmlns`, `width`, `height` and
/// `viewBox`, followed by optional `title`, `desc` and `metadata`
/// children and one `path` per non-empty contour in trace order.
#[must_use]
pub fn to_markup_tree(doc: &CalibratedDocument, metadata: &SvgMetadata<'_>) -> Node<MarkupElement> {
    let mut root = Node::leaf(
        MarkupElement::new("svg")
            .attr("xmlns", "http://www.w3.org/2000/svg")
            .attr("width", doc.width_attr())
            .attr("height", doc.height_attr())
            .attr("viewBox", doc.view_box()),
    );

    if let Some(title) = metadata.title {
        root = root.child(Node::leaf(MarkupElement::new("title").with_text(title)));
    }
    if let Some(description) = metadata.description {
        root = root.child(Node::leaf(MarkupElement::new("desc").with_text(description)));
    }
    if let Some(params_json) = metadata.params_json {
        let params = MarkupElement::new("bitrace:params")
            .attr("xmlns:bitrace", METADATA_NAMESPACE)
            .with_text(params_json);
        root = root.child(Node::with_children(
            MarkupElement::new("metadata"),
            vec![Node::leaf(params)],
        ));
    }

    for contour in doc.contours() {
        let d = build_path_data(contour);
        if d.is_empty() {
            continue;
        }
        let polarity = match contour.polarity {
            Polarity::Outer => "outer",
            Polarity::Hole => "hole",
        };
        root = root.child(Node::leaf(
            MarkupElement::new("path")
                .attr("d", d)
                .attr("fill", "none")
                .attr("fill-rule", "evenodd")
                .attr("stroke", "black")
                .attr("data-polarity", polarity),
        ));
    }

    root
}

/// Serialize a calibrated document to an SVG string.
///
/// This is a pure function with no I/O. Zero contours still produce a
/// well-formed document with the declared size and `viewBox`.
#[must_use]
pub fn to_svg(doc: &CalibratedDocument, metadata: &SvgMetadata<'_>) -> String {
    render(&to_markup_tree(doc, metadata))
}

/// Render a markup tree whose root is an `svg` element.
///
/// Other root names are rendered too; only `svg` gets the XML
/// declaration prepended.
#[must_use]
pub fn render(tree: &Node<MarkupElement>) -> String {
    if tree.value.name == "svg" {
        let mut doc = Document::new();
        for (name, value) in &tree.value.attrs {
            doc.assign(name.as_str(), value.as_str());
        }
        for child in &tree.children {
            doc.append(to_element(child));
        }
        // The svg crate omits the XML declaration, so we prepend it.
        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
    } else {
        to_element(tree).to_string()
    }
}

fn to_element(node: &Node<MarkupElement>) -> Element {
    let mut element = Element::new(node.value.name.as_str());
    for (name, value) in &node.value.attrs {
        element.assign(name.as_str(), value.as_str());
    }
    if let Some(ref text) = node.value.text {
        element.append(Text::new(text.as_str()));
    }
    for child in &node.children {
        element.append(to_element(child));
    }
    element
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bitrace_pipeline::{Point, calibrate};

    use super::*;

    /// Shorthand: no metadata (most tests don't care about it).
    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn square(x: f64, y: f64, side: f64, polarity: Polarity) -> VectorContour {
        VectorContour::new(
            Point::new(x, y),
            vec![
                Segment::Line {
                    to: Point::new(x + side, y),
                },
                Segment::Line {
                    to: Point::new(x + side, y + side),
                },
                Segment::Line {
                    to: Point::new(x, y + side),
                },
                Segment::Line {
                    to: Point::new(x, y),
                },
            ],
            polarity,
        )
    }

    fn identity_doc(contours: &[VectorContour], w: u32, h: u32) -> CalibratedDocument {
        calibrate(contours, w, h, f64::from(w), f64::from(h)).unwrap()
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_empty_contour() {
        let contour = VectorContour::new(Point::new(5.0, 5.0), vec![], Polarity::Outer);
        assert_eq!(build_path_data(&contour), "");
    }

    #[test]
    fn build_path_data_lines() {
        let d = build_path_data(&square(10.0, 15.0, 2.5, Polarity::Outer));
        assert_eq!(d, "M10,15 L12.5,15 L12.5,17.5 L10,17.5 L10,15 z");
    }

    #[test]
    fn build_path_data_cubic() {
        let contour = VectorContour::new(
            Point::new(0.0, 0.0),
            vec![
                Segment::Cubic {
                    c1: Point::new(1.0, 2.0),
                    c2: Point::new(3.0, 4.0),
                    to: Point::new(5.0, 0.0),
                },
                Segment::Line {
                    to: Point::new(0.0, 0.0),
                },
            ],
            Polarity::Outer,
        );
        assert_eq!(build_path_data(&contour), "M0,0 C1,2,3,4,5,0 L0,0 z");
    }

    // --- Document structure ---

    #[test]
    fn empty_document_is_still_well_formed() {
        let svg = to_svg(&identity_doc(&[], 100, 50), &no_meta());
        assert!(svg.contains(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"width="100.000mm""#));
        assert!(svg.contains(r#"height="50.000mm""#));
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        assert!(svg.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn scenario_100x50_at_25x12_5_mm() {
        let rect = VectorContour::new(
            Point::new(0.0, 0.0),
            vec![
                Segment::Line {
                    to: Point::new(100.0, 0.0),
                },
                Segment::Line {
                    to: Point::new(100.0, 50.0),
                },
                Segment::Line {
                    to: Point::new(0.0, 50.0),
                },
                Segment::Line {
                    to: Point::new(0.0, 0.0),
                },
            ],
            Polarity::Outer,
        );
        let doc = calibrate(&[rect], 100, 50, 25.0, 12.5).unwrap();
        let svg = to_svg(&doc, &no_meta());
        assert!(svg.contains(r#"width="25.000mm""#));
        assert!(svg.contains(r#"height="12.500mm""#));
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        assert!(svg.contains(r#"d="M0,0 L25,0 L25,12.5 L0,12.5 L0,0 z""#));
    }

    #[test]
    fn one_path_per_contour_with_holes_separate() {
        let contours = [
            square(0.0, 0.0, 10.0, Polarity::Outer),
            square(3.0, 3.0, 4.0, Polarity::Hole),
        ];
        let svg = to_svg(&identity_doc(&contours, 10, 10), &no_meta());
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(r#"fill-rule="evenodd""#));
        assert!(svg.contains(r#"data-polarity="hole""#));
        assert!(svg.contains(r#"data-polarity="outer""#));
    }

    #[test]
    fn degenerate_contours_skipped_among_valid_ones() {
        let contours = [
            VectorContour::new(Point::new(1.0, 1.0), vec![], Polarity::Outer),
            square(0.0, 0.0, 1.0, Polarity::Outer),
        ];
        let svg = to_svg(&identity_doc(&contours, 4, 4), &no_meta());
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn svg_ends_with_closing_tag() {
        let contours = [square(0.0, 0.0, 1.0, Polarity::Outer)];
        let svg = to_svg(&identity_doc(&contours, 4, 4), &no_meta());
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    // --- Metadata ---

    #[test]
    fn title_and_desc_emitted_when_present() {
        let meta = SvgMetadata {
            title: Some("Traced logo"),
            description: Some("minority, 2px"),
            params_json: None,
        };
        let svg = to_svg(&identity_doc(&[], 4, 4), &meta);
        assert!(svg.contains("<title>Traced logo</title>"));
        assert!(svg.contains("<desc>minority, 2px</desc>"));
        assert!(!svg.contains("<metadata"));
    }

    #[test]
    fn title_appears_before_paths() {
        let meta = SvgMetadata {
            title: Some("t"),
            ..SvgMetadata::default()
        };
        let contours = [square(0.0, 0.0, 1.0, Polarity::Outer)];
        let svg = to_svg(&identity_doc(&contours, 4, 4), &meta);
        let title_pos = svg.find("<title>").unwrap();
        let path_pos = svg.find("<path").unwrap();
        assert!(title_pos < path_pos);
    }

    #[test]
    fn special_characters_are_escaped() {
        let meta = SvgMetadata {
            title: Some("A <b> & \"c\""),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&identity_doc(&[], 4, 4), &meta);
        assert!(svg.contains("&lt;b&gt;"));
        assert!(svg.contains("&amp;"));
        assert!(!svg.contains("<b>"));
    }

    #[test]
    fn params_json_is_namespaced_metadata() {
        let meta = SvgMetadata {
            params_json: Some(r#"{"turn_policy":"minority"}"#),
            ..SvgMetadata::default()
        };
        let svg = to_svg(&identity_doc(&[], 4, 4), &meta);
        assert!(svg.contains("<metadata>"));
        assert!(svg.contains("<bitrace:params"));
        assert!(svg.contains(METADATA_NAMESPACE));
        assert!(svg.contains("minority"));
    }

    // --- Markup tree ---

    #[test]
    fn markup_tree_mirrors_svg() {
        let contours = [
            square(0.0, 0.0, 10.0, Polarity::Outer),
            square(3.0, 3.0, 4.0, Polarity::Hole),
        ];
        let meta = SvgMetadata {
            title: Some("t"),
            ..SvgMetadata::default()
        };
        let tree = to_markup_tree(&identity_doc(&contours, 10, 10), &meta);
        assert_eq!(tree.value.name, "svg");
        assert_eq!(tree.value.get("viewBox"), Some("0 0 10 10"));
        let names: Vec<&str> = tree.children.iter().map(|c| c.value.name.as_str()).collect();
        assert_eq!(names, ["title", "path", "path"]);
        assert_eq!(render(&tree), to_svg(&identity_doc(&contours, 10, 10), &meta));
    }

    #[test]
    fn render_non_svg_root_has_no_declaration() {
        let tree = Node::leaf(MarkupElement::new("g").attr("id", "x"));
        let out = render(&tree);
        assert!(!out.starts_with("<?xml"));
        assert!(out.contains(r#"id="x""#));
    }
}
