use crate::dom::{Document, NodeId};
use crate::error::{PanelError, Result};
use crate::theme::{ThemeMode, apply_init_config, renderer_theme};
use mermaid_rs_renderer::config::LayoutConfig;
use mermaid_rs_renderer::layout::compute_layout;
use mermaid_rs_renderer::parser::parse_mermaid;
use mermaid_rs_renderer::render::render_svg;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Interactivity hook handed back by a renderer, run against the mounted container.
pub type BindFn = Box<dyn FnOnce(&mut Document, NodeId)>;

pub struct RenderRequest<'a> {
    pub diagram_id: &'a str,
    pub source: &'a str,
    pub mode: ThemeMode,
}

pub struct Rendered {
    pub svg: String,
    pub bind: Option<BindFn>,
}

impl Rendered {
    pub fn svg(svg: impl Into<String>) -> Self {
        Self {
            svg: svg.into(),
            bind: None,
        }
    }
}

impl std::fmt::Debug for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendered")
            .field("svg", &self.svg)
            .field("bind", &self.bind.is_some())
            .finish()
    }
}

/// Turns a diagram definition into SVG markup.
pub trait DiagramRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered>;
}

/// Renders through `mermaid-rs-renderer`, honouring any `%%{init}%%` block in the source.
#[derive(Debug, Clone, Default)]
pub struct MermaidRenderer {
    pub layout: LayoutConfig,
}

impl DiagramRenderer for MermaidRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered> {
        let source = request.source;
        let mode = request.mode;
        let layout_config = &self.layout;
        // Layout can panic on inputs the parser accepts; report those like parse errors.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<String> {
            let parsed = parse_mermaid(source).map_err(|err| PanelError::Render(err.to_string()))?;
            let mut theme = renderer_theme(mode);
            if let Some(init) = &parsed.init_config {
                apply_init_config(&mut theme, init);
            }
            let layout = compute_layout(&parsed.graph, &theme, layout_config);
            Ok(render_svg(&layout, &theme, layout_config))
        }));
        match outcome {
            Ok(svg) => svg.map(Rendered::svg),
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PanelError::Render(format!("renderer panic: {msg}")))
            }
        }
    }
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, width: f32, height: f32) -> anyhow::Result<()> {
    let mut opt = usvg::Options::default();
    opt.default_size = usvg::Size::from_wh(width, height)
        .or_else(|| usvg::Size::from_wh(800.0, 600.0))
        .ok_or_else(|| anyhow::anyhow!("Invalid output size"))?;
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: &str) -> RenderRequest<'_> {
        RenderRequest {
            diagram_id: "diagram-1",
            source,
            mode: ThemeMode::Light,
        }
    }

    #[test]
    fn renders_flowchart_labels() {
        let rendered = MermaidRenderer::default()
            .render(&request("flowchart LR\n  A[Alpha] -->|go| B[Beta]"))
            .unwrap();
        assert!(rendered.svg.contains("<svg"));
        assert!(rendered.svg.contains("Alpha"));
        assert!(rendered.svg.contains(">go<"));
        assert!(rendered.bind.is_none());
    }

    #[test]
    fn rendered_svg_parses_into_document() {
        let rendered = MermaidRenderer::default()
            .render(&request("flowchart TD\n  A[Alpha] --> B[Beta]"))
            .unwrap();
        let doc = Document::parse(&rendered.svg).unwrap();
        assert!(doc.is_tag(doc.root(), "svg"));
    }

    #[test]
    fn honours_init_directive() {
        let source = "%%{init: {\"theme\": \"base\", \"themeVariables\": {\"primaryColor\": \"#ABCDEF\"}}}%%\nflowchart LR\n  A[Alpha] --> B[Beta]";
        let rendered = MermaidRenderer::default().render(&request(source)).unwrap();
        assert!(rendered.svg.contains("#ABCDEF"));
    }
}
