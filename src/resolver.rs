//! Painting metric values onto a rendered diagram.
//!
//! Each indicator is matched against the SVG by a fixed, ordered table of lookup
//! conventions ([`STRATEGIES`]). Lookups are pure functions of the document and the
//! metric name; the first one that finds an element hands it to its painter. Metrics
//! that match nothing are skipped, since series labels need not appear in the diagram.

use crate::composite::reduce_composites;
use crate::dom::{Document, NodeId, NodeKind};
use crate::model::{self, MetricIndicator, Series};
use crate::options::{DiagramOptions, NodeSize};
use crate::text_metrics::{self, Anchor, TextStyle};
use tracing::{debug, trace, warn};

pub const VALUE_CLASS: &str = "diagram-value";
pub const MEMBER_CLASS: &str = "diagram-composite-member";
pub const VALUE_BOX_CLASS: &str = "diagram-value-box";

/// Font used to size HTML labels, matching the renderer's default label font.
const LABEL_FONT_FAMILY: &str = "\"trebuchet ms\", verdana, arial, sans-serif";
const LABEL_FONT_SIZE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Node shape carrying `data-id`.
    Shape,
    /// HTML `<span>` label, as flowchart edge labels are drawn.
    EdgeLabel,
    /// HTML `<div>` label of a node whose id differs from its text.
    AliasedDiv,
    /// Plain SVG `<text>` equal to the metric name.
    AliasedText,
    /// SVG `<text>` containing the metric name, as sequence diagram messages are drawn.
    SequenceText,
}

#[derive(Debug, Clone, Copy)]
pub struct PaintContext {
    pub use_background: bool,
    pub node_size: NodeSize,
}

impl PaintContext {
    pub fn new(options: &DiagramOptions) -> Self {
        Self {
            use_background: options.use_background,
            node_size: options.node_size,
        }
    }
}

pub type Locate = fn(&Document, NodeId, &str) -> Option<NodeId>;
pub type Paint = fn(&mut Document, NodeId, &MetricIndicator, &PaintContext);

pub struct Strategy {
    pub convention: Convention,
    pub locate: Locate,
    pub paint: Paint,
}

pub const STRATEGIES: [Strategy; 5] = [
    Strategy {
        convention: Convention::Shape,
        locate: locate_shape,
        paint: paint_shape,
    },
    Strategy {
        convention: Convention::EdgeLabel,
        locate: locate_edge_label,
        paint: paint_edge_label,
    },
    Strategy {
        convention: Convention::AliasedDiv,
        locate: locate_aliased_div,
        paint: paint_shape,
    },
    Strategy {
        convention: Convention::AliasedText,
        locate: locate_text_exact,
        paint: paint_aliased_text,
    },
    Strategy {
        convention: Convention::SequenceText,
        locate: locate_text_containing,
        paint: paint_sequence_text,
    },
];

pub fn locate_shape(doc: &Document, root: NodeId, key: &str) -> Option<NodeId> {
    doc.find(root, |d, n| d.attr(n, "data-id") == Some(key))
}

pub fn locate_edge_label(doc: &Document, root: NodeId, key: &str) -> Option<NodeId> {
    doc.find(root, |d, n| d.is_tag(n, "span") && d.text_content(n) == key)
}

pub fn locate_aliased_div(doc: &Document, root: NodeId, key: &str) -> Option<NodeId> {
    let div = doc.find(root, |d, n| d.is_tag(n, "div") && d.text_content(n) == key)?;
    doc.closest(div, |d, n| d.has_class(n, "node"))
}

pub fn locate_text_exact(doc: &Document, root: NodeId, key: &str) -> Option<NodeId> {
    doc.find(root, |d, n| d.is_tag(n, "text") && d.text_content(n) == key)
}

pub fn locate_text_containing(doc: &Document, root: NodeId, key: &str) -> Option<NodeId> {
    doc.find(root, |d, n| d.is_tag(n, "text") && d.text_content(n).contains(key))
}

/// Paints every series onto the diagram: direct indicators first, then composites,
/// then the custom style block.
pub fn update_diagram_style(
    doc: &mut Document,
    series: &[Series],
    options: &DiagramOptions,
    diagram_id: &str,
) {
    let indicators = model::indicators(series, options);
    paint_indicators(doc, &indicators, options, diagram_id);
}

pub fn paint_indicators(
    doc: &mut Document,
    indicators: &[MetricIndicator],
    options: &DiagramOptions,
    diagram_id: &str,
) {
    let Some(svg) = find_svg(doc) else {
        warn!(diagram = diagram_id, "no <svg> element to paint");
        return;
    };
    apply_size_mode(doc, svg, options.max_width);

    let ctx = PaintContext::new(options);
    for indicator in indicators {
        apply_indicator(doc, svg, indicator, &ctx);
    }
    for composite in reduce_composites(&options.composites, indicators) {
        apply_indicator(doc, svg, &composite, &ctx);
    }

    inject_style(doc, svg, diagram_id, &options.style);
}

/// Runs the lookup table for one indicator and paints the first match.
pub fn apply_indicator(
    doc: &mut Document,
    root: NodeId,
    indicator: &MetricIndicator,
    ctx: &PaintContext,
) -> Option<Convention> {
    if indicator.metric_name.is_empty() {
        return None;
    }
    for strategy in &STRATEGIES {
        if let Some(target) = (strategy.locate)(doc, root, &indicator.metric_name) {
            trace!(metric = %indicator.metric_name, convention = ?strategy.convention, "matched");
            (strategy.paint)(doc, target, indicator, ctx);
            return Some(strategy.convention);
        }
    }
    debug!(metric = %indicator.metric_name, "no diagram element matched");
    None
}

pub fn find_svg(doc: &Document) -> Option<NodeId> {
    let root = doc.root();
    if doc.is_tag(root, "svg") {
        return Some(root);
    }
    doc.find(root, |d, n| d.is_tag(n, "svg"))
}

fn apply_size_mode(doc: &mut Document, svg: NodeId, max_width: bool) {
    if max_width {
        doc.set_attr(svg, "width", "100%");
        doc.set_attr(svg, "height", "100%");
    } else if let Some(parent) = doc.parent(svg) {
        doc.set_style(parent, "overflow-y", "scroll");
    }
}

fn inject_style(doc: &mut Document, svg: NodeId, diagram_id: &str, css: &str) {
    let style = doc.create_element("style");
    let scoped = scope_css(diagram_id, css);
    if !scoped.is_empty() {
        doc.set_text(style, &scoped);
    }
    doc.append_child(svg, style);
}

/// Prefixes every selector of top-level rules with `#<diagram_id>`.
/// At-rules are copied through untouched.
pub fn scope_css(diagram_id: &str, css: &str) -> String {
    let scope = format!("#{diagram_id}");
    let mut out = String::new();
    let mut rest = css;
    while let Some(open) = rest.find('{') {
        let selectors = rest[..open].trim();
        let close = matching_brace(rest, open).unwrap_or(rest.len() - 1);
        let body = rest[open..=close].trim();
        if selectors.starts_with('@') {
            out.push_str(selectors);
        } else {
            let scoped = selectors
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if s.starts_with(&scope) {
                        s.to_string()
                    } else {
                        format!("{scope} {s}")
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&scoped);
        }
        out.push(' ');
        out.push_str(body);
        out.push('\n');
        rest = &rest[close + 1..];
    }
    out
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in text[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn paint_shape(doc: &mut Document, node: NodeId, indicator: &MetricIndicator, ctx: &PaintContext) {
    let container = label_container(doc, node);
    if let Some(container) = container {
        append_value_lines(doc, container, indicator);
        resize_label(doc, container, &ctx.node_size);
    }

    let Some(color) = indicator.color() else {
        return;
    };
    if ctx.use_background {
        for shape in shapes_outside_labels(doc, node) {
            doc.set_style(shape, "fill", color);
        }
    } else if let Some(container) = container {
        let property = if doc.is_tag(container, "text") { "fill" } else { "color" };
        doc.set_style(container, property, color);
    }
}

fn paint_edge_label(
    doc: &mut Document,
    span: NodeId,
    indicator: &MetricIndicator,
    ctx: &PaintContext,
) {
    let br = doc.create_element("br");
    let value = doc.create_element("span");
    doc.set_attr(value, "class", VALUE_CLASS);
    doc.set_text(value, &indicator.formatted());
    doc.insert_after(span, br);
    doc.insert_after(br, value);
    resize_label(doc, span, &ctx.node_size);

    let Some(color) = indicator.color() else {
        return;
    };
    if ctx.use_background {
        doc.set_style(span, "background-color", color);
        doc.set_style(value, "background-color", color);
        // Renderer-coupled: the label's node keeps its shape as the first child.
        let node = doc.closest(span, |d, n| d.has_class(n, "node") && d.has_class(n, "flowchart-label"));
        if let Some(shape) = node.and_then(|node| doc.first_element_child(node)) {
            doc.set_style(shape, "fill", color);
        }
    } else {
        doc.set_style(span, "color", color);
        doc.set_style(value, "color", color);
    }
}

fn paint_aliased_text(
    doc: &mut Document,
    text: NodeId,
    indicator: &MetricIndicator,
    ctx: &PaintContext,
) {
    let style = inherited_text_style(doc, text);
    let (x, y) = text_origin(doc, text);
    let bbox = text_metrics::text_bbox(&doc.text_content(text), x, y, &style);
    let transform = doc.attr(text, "transform").map(str::to_string);

    let rect = doc.create_element("rect");
    doc.set_attr(rect, "class", VALUE_BOX_CLASS);
    doc.set_attr(rect, "x", num(bbox.x));
    doc.set_attr(rect, "y", num(bbox.y + bbox.height));
    doc.set_attr(rect, "width", num(bbox.width));
    doc.set_attr(rect, "height", num(bbox.height));
    doc.set_attr(rect, "fill", "transparent");

    let value = doc.create_element("text");
    doc.set_attr(value, "class", VALUE_CLASS);
    doc.set_attr(value, "x", num(bbox.x + bbox.width / 2.0));
    doc.set_attr(value, "y", num(bbox.y + bbox.height * 1.5));
    doc.set_attr(value, "text-anchor", "middle");
    doc.set_attr(value, "dominant-baseline", "middle");
    doc.set_attr(value, "font-size", num(style.font_size));
    doc.set_text(value, &indicator.formatted());

    if let Some(transform) = transform {
        doc.set_attr(rect, "transform", transform.clone());
        doc.set_attr(value, "transform", transform);
    }
    doc.insert_after(text, rect);
    doc.insert_after(rect, value);

    if let Some(color) = indicator.color() {
        let target = if ctx.use_background { rect } else { value };
        doc.set_style(target, "fill", color);
    }
}

fn paint_sequence_text(
    doc: &mut Document,
    text: NodeId,
    indicator: &MetricIndicator,
    ctx: &PaintContext,
) {
    let tspan = doc.create_element("tspan");
    doc.set_attr(tspan, "class", VALUE_CLASS);
    doc.set_text(tspan, &format!(" {}", indicator.formatted()));
    doc.append_child(text, tspan);
    if let Some(color) = indicator.color() {
        let property = if ctx.use_background { "background-color" } else { "fill" };
        doc.set_style(tspan, property, color);
    }
}

/// Grows the label box around `target` to the configured minimums and re-centers it.
///
/// Needs an enclosing `<g>`, `<g class="label">` and `<foreignObject>`; does nothing
/// otherwise. The box never shrinks. Returns whether a resize happened.
pub fn resize_label(doc: &mut Document, target: NodeId, size: &NodeSize) -> bool {
    let group = doc.closest(target, |d, n| d.is_tag(n, "g"));
    let label = doc.closest(target, |d, n| d.is_tag(n, "g") && d.has_class(n, "label"));
    let object = doc.closest(target, |d, n| d.is_tag(n, "foreignObject"));
    let (Some(group), Some(label), Some(object)) = (group, label, object) else {
        return false;
    };

    doc.remove_attr(group, "transform");
    let lines = label_lines(doc, object);
    let (content_width, content_height) =
        text_metrics::lines_size(&lines, LABEL_FONT_SIZE, LABEL_FONT_FAMILY);
    let width = attr_number(doc, object, "width")
        .unwrap_or(0.0)
        .max(content_width)
        .max(size.min_width);
    let height = attr_number(doc, object, "height")
        .unwrap_or(0.0)
        .max(content_height)
        .max(size.min_height);
    doc.set_attr(object, "width", num(width));
    doc.set_attr(object, "height", num(height));
    doc.set_attr(
        label,
        "transform",
        format!("translate({}, {})", num(-width / 2.0), num(-height / 2.0)),
    );
    true
}

fn label_container(doc: &Document, node: NodeId) -> Option<NodeId> {
    if let Some(object) = doc.find(node, |d, n| d.is_tag(n, "foreignObject"))
        && let Some(container) = doc.first_element_child(object)
    {
        return Some(container);
    }
    doc.find(node, |d, n| d.is_tag(n, "text"))
}

fn append_value_lines(doc: &mut Document, container: NodeId, indicator: &MetricIndicator) {
    let mut lines = vec![(VALUE_CLASS, indicator.formatted())];
    if indicator.is_composite
        && let Some(original) = &indicator.original_name
    {
        lines.push((MEMBER_CLASS, original.clone()));
    }

    if doc.is_tag(container, "text") {
        let x = text_origin(doc, container).0;
        for (class, line) in lines {
            let tspan = doc.create_element("tspan");
            doc.set_attr(tspan, "class", class);
            doc.set_attr(tspan, "x", num(x));
            doc.set_attr(tspan, "dy", "1.2em");
            doc.set_text(tspan, &line);
            doc.append_child(container, tspan);
        }
        return;
    }

    for (class, line) in lines {
        let br = doc.create_element("br");
        doc.append_child(container, br);
        let span = doc.create_element("span");
        doc.set_attr(span, "class", class);
        doc.set_text(span, &line);
        doc.append_child(container, span);
    }
}

/// Shapes under `node`, skipping anything inside a nested `.label` group.
fn shapes_outside_labels(doc: &Document, node: NodeId) -> Vec<NodeId> {
    const SHAPES: [&str; 6] = ["rect", "circle", "ellipse", "polygon", "path", "line"];
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = doc.children(node).iter().rev().copied().collect();
    while let Some(next) = stack.pop() {
        if doc.tag(next).is_none() || doc.has_class(next, "label") {
            continue;
        }
        if SHAPES.iter().any(|shape| doc.is_tag(next, shape)) {
            out.push(next);
        }
        stack.extend(doc.children(next).iter().rev().copied());
    }
    out
}

/// Visible lines of an HTML label, split at `<br>`.
fn label_lines(doc: &Document, root: NodeId) -> Vec<String> {
    fn walk(doc: &Document, id: NodeId, lines: &mut Vec<String>) {
        match doc.kind(id) {
            NodeKind::Text(text) => {
                if let Some(line) = lines.last_mut() {
                    line.push_str(text);
                }
            }
            NodeKind::Element(_) if doc.is_tag(id, "br") => lines.push(String::new()),
            NodeKind::Element(_) => {
                for child in doc.children(id) {
                    walk(doc, *child, lines);
                }
            }
        }
    }
    let mut lines = vec![String::new()];
    walk(doc, root, &mut lines);
    lines
}

fn inherited_text_style(doc: &Document, text: NodeId) -> TextStyle {
    let inherited = |property: &str| -> Option<String> {
        let node = doc.closest(text, |d, n| {
            d.attr(n, property).is_some() || d.style(n, property).is_some()
        })?;
        doc.style(node, property)
            .or_else(|| doc.attr(node, property).map(str::to_string))
    };
    let defaults = TextStyle::default();
    TextStyle {
        font_size: inherited("font-size")
            .and_then(|v| leading_number(&v))
            .filter(|size| *size > 0.0)
            .unwrap_or(defaults.font_size),
        font_family: inherited("font-family").unwrap_or(defaults.font_family),
        anchor: inherited("text-anchor")
            .map(|v| Anchor::parse(&v))
            .unwrap_or_default(),
        middle_baseline: inherited("dominant-baseline")
            .is_some_and(|v| matches!(v.trim(), "middle" | "central")),
    }
}

/// The text's own `x`/`y`, falling back to its first `<tspan>`.
fn text_origin(doc: &Document, text: NodeId) -> (f32, f32) {
    let tspan = doc.find(text, |d, n| d.is_tag(n, "tspan"));
    let coord = |name: &str| {
        attr_number(doc, text, name)
            .or_else(|| tspan.and_then(|t| attr_number(doc, t, name)))
            .unwrap_or(0.0)
    };
    (coord("x"), coord("y"))
}

fn attr_number(doc: &Document, id: NodeId, name: &str) -> Option<f32> {
    doc.attr(id, name).and_then(leading_number)
}

/// First number in an attribute such as `12.5px` or a coordinate list `3 4 5`.
fn leading_number(value: &str) -> Option<f32> {
    let trimmed = value.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(idx, ch)| {
            !(ch.is_ascii_digit() || *ch == '.' || ((*ch == '-' || *ch == '+') && *idx == 0))
        })
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn num(value: f32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
