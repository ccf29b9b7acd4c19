use crate::options::ThemeOverrides;
use mermaid_rs_renderer::theme::Theme;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Any `%%{ ... }%%` directive block, single- or multi-line.
static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)%%\{.*?\}%%").unwrap());

/// Theme the injected directive is built on; only it honours `themeVariables` in full.
pub const BASE_THEME: &str = "base";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    pub fn is_dark(self) -> bool {
        self == ThemeMode::Dark
    }
}

pub fn has_init_directive(source: &str) -> bool {
    DIRECTIVE_RE.is_match(source)
}

/// Overrides for `mode`, merged common first and journey last; later keys win.
pub fn merged_theme_variables(overrides: &ThemeOverrides, mode: ThemeMode) -> Map<String, Value> {
    let mut merged = Map::new();
    for palette in overrides.in_precedence_order() {
        let vars = if mode.is_dark() { &palette.dark } else { &palette.light };
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

pub fn init_directive(variables: Map<String, Value>) -> String {
    let init = json!({
        "theme": BASE_THEME,
        "themeVariables": Value::Object(variables),
    });
    format!("%%{{init: {init}}}%%")
}

/// Prepends a theme directive unless the source already carries one, in which case the
/// source is returned unchanged.
pub fn inject_theme(source: &str, overrides: &ThemeOverrides, mode: ThemeMode) -> String {
    if has_init_directive(source) {
        return source.to_string();
    }
    let directive = init_directive(merged_theme_variables(overrides, mode));
    format!("{directive}\n{source}")
}

/// Renderer palette for the panel's light/dark mode.
pub fn renderer_theme(mode: ThemeMode) -> Theme {
    let mut theme = Theme::mermaid_default();
    if mode.is_dark() {
        theme.primary_color = "#1F2020".to_string();
        theme.primary_text_color = "#CCCCCC".to_string();
        theme.primary_border_color = "#81B1DB".to_string();
        theme.line_color = "#D3D3D3".to_string();
        theme.secondary_color = "#3A3F4B".to_string();
        theme.tertiary_color = "#2B2C2F".to_string();
        theme.edge_label_background = "#585858".to_string();
        theme.cluster_background = "#302F3D".to_string();
        theme.cluster_border = "#81B1DB".to_string();
        theme.background = "#181B1F".to_string();
    }
    theme
}

/// Applies a parsed `%%{init}%%` block to the renderer theme.
pub fn apply_init_config(theme: &mut Theme, init: &Value) {
    match init.get("theme").and_then(Value::as_str) {
        Some("dark") => *theme = renderer_theme(ThemeMode::Dark),
        Some("default") | Some("neutral") | Some("forest") => *theme = Theme::mermaid_default(),
        _ => {}
    }

    let Some(vars) = init.get("themeVariables") else {
        return;
    };
    let text = |key: &str| vars.get(key).and_then(Value::as_str).map(str::to_string);

    if let Some(val) = text("primaryColor").or_else(|| text("mainBkg")) {
        theme.primary_color = val;
    }
    if let Some(val) = text("primaryTextColor") {
        theme.primary_text_color = val;
    }
    if let Some(val) = text("primaryBorderColor").or_else(|| text("nodeBorder")) {
        theme.primary_border_color = val;
    }
    if let Some(val) = text("lineColor") {
        theme.line_color = val;
    }
    if let Some(val) = text("secondaryColor") {
        theme.secondary_color = val;
    }
    if let Some(val) = text("tertiaryColor") {
        theme.tertiary_color = val;
    }
    if let Some(val) = text("textColor").filter(|_| vars.get("primaryTextColor").is_none()) {
        theme.primary_text_color = val;
    }
    if let Some(val) = text("background") {
        theme.background = val;
    }
    if let Some(val) = text("clusterBkg") {
        theme.cluster_background = val;
    }
    if let Some(val) = text("clusterBorder") {
        theme.cluster_border = val;
    }
    if let Some(val) = text("edgeLabelBackground") {
        theme.edge_label_background = val;
    }
    if let Some(val) = text("fontFamily") {
        theme.font_family = val;
    }
    let font_size = match vars.get("fontSize") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches("px").trim().parse().ok(),
        _ => None,
    };
    if let Some(size) = font_size.filter(|size| *size > 0.0) {
        theme.font_size = size as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ModePalette;

    fn palette(light: Value, dark: Value) -> ModePalette {
        ModePalette {
            light: light.as_object().cloned().unwrap_or_default(),
            dark: dark.as_object().cloned().unwrap_or_default(),
        }
    }

    fn overrides() -> ThemeOverrides {
        ThemeOverrides {
            common: palette(
                json!({"primaryColor": "#fff", "lineColor": "#000"}),
                json!({"primaryColor": "#111"}),
            ),
            flowchart: palette(json!({"primaryColor": "#eee"}), json!({})),
            user_journey: palette(json!({"lineColor": "#abc"}), json!({})),
            ..ThemeOverrides::default()
        }
    }

    #[test]
    fn later_grammars_win() {
        let light = merged_theme_variables(&overrides(), ThemeMode::Light);
        assert_eq!(light["primaryColor"], "#eee");
        assert_eq!(light["lineColor"], "#abc");
        let dark = merged_theme_variables(&overrides(), ThemeMode::Dark);
        assert_eq!(dark["primaryColor"], "#111");
        assert!(dark.get("lineColor").is_none());
    }

    #[test]
    fn injects_single_line_directive() {
        let out = inject_theme("graph LR\n A-->B", &overrides(), ThemeMode::Light);
        let (first, rest) = out.split_once('\n').unwrap();
        assert!(first.starts_with("%%{init: {"));
        assert!(first.ends_with("}%%"));
        assert!(first.contains("\"theme\":\"base\""));
        assert!(first.contains("\"primaryColor\":\"#eee\""));
        assert_eq!(rest, "graph LR\n A-->B");
    }

    #[test]
    fn existing_directive_passes_through_untouched() {
        let source = "%%{\n  init: { \"theme\": \"forest\" }\n}%%\ngraph TD\n  A --> B\n";
        assert!(has_init_directive(source));
        assert_eq!(inject_theme(source, &overrides(), ThemeMode::Dark), source);
    }

    #[test]
    fn init_config_updates_renderer_theme() {
        let mut theme = renderer_theme(ThemeMode::Light);
        apply_init_config(
            &mut theme,
            &json!({"theme": "base", "themeVariables": {"primaryColor": "#123456", "fontSize": "20px"}}),
        );
        assert_eq!(theme.primary_color, "#123456");
        assert_eq!(theme.font_size, 20.0);

        apply_init_config(&mut theme, &json!({"theme": "dark"}));
        assert_eq!(theme.background, renderer_theme(ThemeMode::Dark).background);
    }
}
