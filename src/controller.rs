//! Panel render pipeline.
//!
//! A render pass runs its stages strictly in order: load the definition, inject the
//! theme directive, render (retrying once without the directive), mount the SVG into
//! the panel container, run the renderer's bind hook, then paint metric values. The
//! legend is derived from the series independently of whether rendering succeeded.

use crate::dom::{Document, escape_attr, escape_text};
use crate::error::{PanelError, Result};
use crate::legend::Legend;
use crate::model::Series;
use crate::options::DiagramOptions;
use crate::render::{DiagramRenderer, RenderRequest, Rendered};
use crate::resolver::{find_svg, update_diagram_style};
use crate::theme::{ThemeMode, inject_theme};
use tracing::{debug, info, warn};

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Inject,
    Render,
    Fallback,
    Mount,
    Bind,
    Paint,
}

/// Where remote diagram definitions come from.
pub trait DefinitionFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetcher for hosts that cannot reach the network; every URL is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetch;

impl DefinitionFetcher for NoFetch {
    fn fetch(&self, url: &str) -> Result<String> {
        Err(PanelError::RemoteUnsupported(url.to_string()))
    }
}

#[cfg(feature = "http")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "http")]
impl DefinitionFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PanelError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text()?)
    }
}

/// Host-supplied facts about the panel being rendered.
#[derive(Debug, Clone)]
pub struct PanelContext {
    pub panel_id: String,
    pub mode: ThemeMode,
    pub width: f32,
    pub height: f32,
}

impl PanelContext {
    pub fn new(panel_id: impl Into<String>, mode: ThemeMode) -> Self {
        Self {
            panel_id: panel_id.into(),
            mode,
            width: 0.0,
            height: 0.0,
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn diagram_id(&self) -> String {
        format!("diagram-{}", self.panel_id)
    }

    pub fn container_id(&self) -> String {
        format!("diagram-container-{}", self.panel_id)
    }
}

#[derive(Debug)]
pub enum Container {
    Diagram(Document),
    Error(String),
}

/// The element the panel renders into, holding either the painted diagram or an error.
#[derive(Debug)]
pub struct PanelContainer {
    id: String,
    content: Container,
}

impl PanelContainer {
    pub fn content(&self) -> &Container {
        &self.content
    }

    pub fn document(&self) -> Option<&Document> {
        match &self.content {
            Container::Diagram(doc) => Some(doc),
            Container::Error(_) => None,
        }
    }

    pub fn markup(&self) -> String {
        match &self.content {
            Container::Diagram(doc) => doc.to_markup(),
            Container::Error(message) => format!(
                "<div xmlns=\"{XHTML_NS}\" class=\"diagram-container\" id=\"{}\"><div class=\"diagram-error\"><p>Error rendering diagram: {}</p></div></div>",
                escape_attr(&self.id),
                escape_text(message)
            ),
        }
    }

    /// The painted `<svg>` on its own, without the surrounding container.
    pub fn svg_markup(&self) -> Option<String> {
        let doc = self.document()?;
        find_svg(doc).map(|svg| doc.markup_of(svg))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rendered { fallback: bool },
    Failed { stage: Stage, message: String },
}

#[derive(Debug)]
pub struct PanelOutput {
    pub container: PanelContainer,
    pub legend: Legend,
    pub outcome: Outcome,
}

impl PanelOutput {
    pub fn is_rendered(&self) -> bool {
        matches!(self.outcome, Outcome::Rendered { .. })
    }
}

#[derive(Debug)]
struct StageError {
    stage: Stage,
    error: PanelError,
}

fn at(stage: Stage) -> impl FnOnce(PanelError) -> StageError {
    move |error| StageError { stage, error }
}

pub struct PanelController<R, F> {
    renderer: R,
    fetcher: F,
}

impl<R: DiagramRenderer, F: DefinitionFetcher> PanelController<R, F> {
    pub fn new(renderer: R, fetcher: F) -> Self {
        Self { renderer, fetcher }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// One full render pass. Never fails: errors end up as inline markup in the container.
    pub fn render(
        &self,
        ctx: &PanelContext,
        options: &DiagramOptions,
        series: &[Series],
    ) -> PanelOutput {
        let legend = Legend::new(series, options);
        let (content, outcome) = match self.run(ctx, options, series) {
            Ok((doc, fallback)) => {
                info!(panel = %ctx.panel_id, fallback, "diagram rendered");
                (Container::Diagram(doc), Outcome::Rendered { fallback })
            }
            Err(StageError { stage, error }) => {
                warn!(panel = %ctx.panel_id, ?stage, %error, "diagram render failed");
                let message = error.to_string();
                (
                    Container::Error(message.clone()),
                    Outcome::Failed { stage, message },
                )
            }
        };
        PanelOutput {
            container: PanelContainer {
                id: ctx.container_id(),
                content,
            },
            legend,
            outcome,
        }
    }

    fn run(
        &self,
        ctx: &PanelContext,
        options: &DiagramOptions,
        series: &[Series],
    ) -> std::result::Result<(Document, bool), StageError> {
        let diagram_id = ctx.diagram_id();

        let raw = self.load_definition(options).map_err(at(Stage::Load))?;
        debug!(stage = ?Stage::Load, bytes = raw.len(), "definition loaded");

        let injected = inject_theme(&raw, &options.theme_variables, ctx.mode);
        debug!(stage = ?Stage::Inject, injected = injected.len() != raw.len(), "theme applied");

        let (rendered, fallback) = self
            .render_with_fallback(&diagram_id, &injected, &raw, ctx.mode)
            .map_err(at(Stage::Fallback))?;

        let mut doc = mount(ctx, &diagram_id, &rendered.svg).map_err(at(Stage::Mount))?;

        if let Some(bind) = rendered.bind {
            debug!(stage = ?Stage::Bind, "binding renderer callbacks");
            let root = doc.root();
            bind(&mut doc, root);
        }

        debug!(stage = ?Stage::Paint, series = series.len(), "painting metrics");
        update_diagram_style(&mut doc, series, options, &diagram_id);
        Ok((doc, fallback))
    }

    /// The definition text: fetched when a URL is configured, otherwise inline.
    pub fn load_definition(&self, options: &DiagramOptions) -> Result<String> {
        match options.remote_url() {
            Some(url) => {
                debug!(url, "fetching diagram definition");
                self.fetcher.fetch(url)
            }
            None => Ok(options.content.clone()),
        }
    }

    /// Renders `injected`; on failure renders `raw` exactly once more under the same id.
    /// Returns whether the fallback produced the result.
    pub fn render_with_fallback(
        &self,
        diagram_id: &str,
        injected: &str,
        raw: &str,
        mode: ThemeMode,
    ) -> Result<(Rendered, bool)> {
        let primary = RenderRequest {
            diagram_id,
            source: injected,
            mode,
        };
        match self.renderer.render(&primary) {
            Ok(rendered) => Ok((rendered, false)),
            Err(err) => {
                debug!(stage = ?Stage::Render, error = %err, "retrying without theme directive");
                let fallback = RenderRequest {
                    diagram_id,
                    source: raw,
                    mode,
                };
                self.renderer
                    .render(&fallback)
                    .map(|rendered| (rendered, true))
            }
        }
    }
}

/// Wraps the renderer's SVG in the panel container and tags it with the diagram id.
fn mount(ctx: &PanelContext, diagram_id: &str, svg: &str) -> Result<Document> {
    let start = svg
        .find("<svg")
        .ok_or_else(|| PanelError::Render("renderer returned no <svg> element".to_string()))?;
    let markup = format!(
        "<div xmlns=\"{XHTML_NS}\" class=\"diagram-container\" id=\"{}\">{}</div>",
        escape_attr(&ctx.container_id()),
        &svg[start..]
    );
    let mut doc = Document::parse(&markup)?;
    let root = doc.root();
    if ctx.width > 0.0 && ctx.height > 0.0 {
        doc.set_style(root, "width", &format!("{}px", ctx.width));
        doc.set_style(root, "height", &format!("{}px", ctx.height));
    }
    if let Some(svg) = find_svg(&doc) {
        doc.set_attr(svg, "id", diagram_id);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeId;
    use std::cell::RefCell;

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><g class="node" data-id="cpu"><text x="0" y="0">CPU</text></g></svg>"#;

    /// Fails every source containing a directive, records what it was asked to render.
    #[derive(Default)]
    struct DirectiveAllergic {
        seen: RefCell<Vec<String>>,
    }

    impl DiagramRenderer for DirectiveAllergic {
        fn render(&self, request: &RenderRequest<'_>) -> Result<Rendered> {
            self.seen.borrow_mut().push(request.source.to_string());
            if request.source.contains("%%{") {
                return Err(PanelError::Render("bad directive".into()));
            }
            Ok(Rendered::svg(SVG))
        }
    }

    struct StaticFetch(Result<String>);

    impl DefinitionFetcher for StaticFetch {
        fn fetch(&self, _url: &str) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(PanelError::HttpStatus {
                    url: "http://x".into(),
                    status: 404,
                }),
            }
        }
    }

    fn options(content: &str) -> DiagramOptions {
        DiagramOptions {
            content: content.into(),
            ..DiagramOptions::default()
        }
    }

    #[test]
    fn fallback_uses_raw_definition_once() {
        let controller = PanelController::new(DirectiveAllergic::default(), NoFetch);
        let ctx = PanelContext::new("7", ThemeMode::Dark);
        let out = controller.render(&ctx, &options("graph LR\n cpu"), &[]);
        assert_eq!(out.outcome, Outcome::Rendered { fallback: true });
        let seen = controller.renderer().seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("%%{init:"));
        assert_eq!(seen[1], "graph LR\n cpu");
    }

    #[test]
    fn both_attempts_failing_reports_inline() {
        let controller = PanelController::new(DirectiveAllergic::default(), NoFetch);
        let ctx = PanelContext::new("1", ThemeMode::Light);
        let out = controller.render(&ctx, &options("%%{init: {}}%%\ngraph LR"), &[]);
        assert!(matches!(out.outcome, Outcome::Failed { stage: Stage::Fallback, .. }));
        assert_eq!(controller.renderer().seen.borrow().len(), 2);
        let markup = out.container.markup();
        assert!(markup.contains("diagram-error"));
        assert!(markup.contains("bad directive"));
        assert!(out.container.svg_markup().is_none());
    }

    #[test]
    fn remote_status_error_aborts_before_render() {
        let controller = PanelController::new(
            DirectiveAllergic::default(),
            StaticFetch(Err(PanelError::Render(String::new()))),
        );
        let mut opts = options("ignored");
        opts.content_url = Some("http://x".into());
        let out = controller.render(&PanelContext::new("1", ThemeMode::Light), &opts, &[]);
        assert!(matches!(out.outcome, Outcome::Failed { stage: Stage::Load, .. }));
        assert!(out.container.markup().contains("HTTP 404"));
        assert!(controller.renderer().seen.borrow().is_empty());
    }

    #[test]
    fn remote_definition_replaces_inline() {
        let fetcher = StaticFetch(Ok("graph TD\n remote".into()));
        let controller = PanelController::new(DirectiveAllergic::default(), fetcher);
        let mut opts = options("inline");
        opts.content_url = Some("http://x".into());
        assert_eq!(controller.load_definition(&opts).unwrap(), "graph TD\n remote");
        opts.content_url = None;
        assert_eq!(controller.load_definition(&opts).unwrap(), "inline");
    }

    #[test]
    fn mounted_svg_is_tagged_and_painted() {
        let controller = PanelController::new(DirectiveAllergic::default(), NoFetch);
        let ctx = PanelContext::new("3", ThemeMode::Light).with_size(400.0, 300.0);
        let series = vec![Series {
            label: "cpu".into(),
            values: vec![Some(12.0)],
            ..Series::default()
        }];
        let out = controller.render(&ctx, &options("graph LR"), &series);
        assert!(out.is_rendered());
        let doc = out.container.document().unwrap();
        assert_eq!(doc.style(doc.root(), "width").as_deref(), Some("400px"));
        let svg = out.container.svg_markup().unwrap();
        assert!(svg.contains("id=\"diagram-3\""));
        assert!(svg.contains("CPU"));
        assert!(svg.contains(">12<"));
        assert_eq!(out.legend.items().len(), 1);
    }

    #[test]
    fn bind_hook_runs_before_paint() {
        struct Binding;
        impl DiagramRenderer for Binding {
            fn render(&self, _request: &RenderRequest<'_>) -> Result<Rendered> {
                Ok(Rendered {
                    svg: SVG.to_string(),
                    bind: Some(Box::new(|doc: &mut Document, root: NodeId| {
                        doc.set_attr(root, "data-bound", "yes")
                    })),
                })
            }
        }
        let controller = PanelController::new(Binding, NoFetch);
        let out = controller.render(&PanelContext::new("1", ThemeMode::Light), &options("x"), &[]);
        let doc = out.container.document().unwrap();
        assert_eq!(doc.attr(doc.root(), "data-bound"), Some("yes"));
    }
}
