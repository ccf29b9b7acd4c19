use metric_diagram_panel::controller::{NoFetch, PanelContext, PanelController};
use metric_diagram_panel::model::parse_series;
use metric_diagram_panel::theme::ThemeMode;
use metric_diagram_panel::{DiagramOptions, MermaidRenderer};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PanelRender {
    html: String,
    rendered: bool,
    legend: Value,
}

fn render(
    options_json: &str,
    series_json: Option<&str>,
    dark: bool,
    panel_id: &str,
) -> Result<PanelRender, String> {
    let options = DiagramOptions::from_json(options_json).map_err(|error| error.to_string())?;
    let series = match series_json {
        Some(raw) => parse_series(raw).map_err(|error| error.to_string())?,
        None => Vec::new(),
    };
    let mode = if dark { ThemeMode::Dark } else { ThemeMode::Light };

    // The browser host fetches remote definitions itself and passes them in as content.
    let controller = PanelController::new(MermaidRenderer::default(), NoFetch);
    let out = controller.render(&PanelContext::new(panel_id, mode), &options, &series);
    let legend = serde_json::to_value(out.legend.items()).map_err(|error| error.to_string())?;
    Ok(PanelRender {
        html: out.container.markup(),
        rendered: out.is_rendered(),
        legend,
    })
}

#[wasm_bindgen]
pub fn render_panel(
    options_json: &str,
    series_json: Option<String>,
    dark: bool,
    panel_id: &str,
) -> Result<String, JsValue> {
    let result = render(options_json, series_json.as_deref(), dark, panel_id)
        .map_err(|error| JsValue::from_str(&error))?;
    serde_json::to_string(&result).map_err(|error| JsValue::from_str(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::render;

    #[test]
    fn renders_flowchart_with_metric_values() {
        let options = r#"{
            content: "flowchart LR\n  A[Alpha] --> B[Beta]",
            legend: { calcs: ["last"] },
        }"#;
        let series = r#"[{"label": "Alpha", "values": [1, 42]}]"#;

        let out = render(options, Some(series), false, "9").expect("panel should render");

        assert!(out.rendered);
        assert!(out.html.contains("diagram-9"));
        assert!(out.html.contains("Alpha"));
        assert_eq!(out.legend[0]["label"], "Alpha");
    }

    #[test]
    fn rejects_malformed_options() {
        assert!(render("{ content: ", None, true, "1").is_err());
    }
}
