use crate::display::Threshold;
use crate::error::{PanelError, Result};
use crate::model::CompositeMetric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub const DEFAULT_VALUE_NAME: &str = "last";

/// Per-panel configuration, read from camelCase JSON (or JSON5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagramOptions {
    /// Inline diagram definition.
    pub content: String,
    /// Remote definition; takes precedence over `content` when non-empty.
    pub content_url: Option<String>,
    /// Custom CSS, scoped to the diagram id when injected.
    pub style: String,
    pub max_width: bool,
    pub use_background: bool,
    pub node_size: NodeSize,
    pub value_name: String,
    pub decimals: Option<usize>,
    pub unit: Option<String>,
    pub thresholds: Vec<Threshold>,
    pub composites: Vec<CompositeMetric>,
    pub legend: LegendOptions,
    pub theme_variables: ThemeOverrides,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            content: String::new(),
            content_url: None,
            style: String::new(),
            max_width: true,
            use_background: false,
            node_size: NodeSize::default(),
            value_name: DEFAULT_VALUE_NAME.to_string(),
            decimals: None,
            unit: None,
            thresholds: Vec::new(),
            composites: Vec::new(),
            legend: LegendOptions::default(),
            theme_variables: ThemeOverrides::default(),
        }
    }
}

impl DiagramOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        json5::from_str(text).map_err(|err| PanelError::Options(err.to_string()))
    }

    /// The remote URL to load from, if one is configured.
    pub fn remote_url(&self) -> Option<&str> {
        self.content_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSize {
    pub min_width: f32,
    pub min_height: f32,
}

impl Default for NodeSize {
    fn default() -> Self {
        Self {
            min_width: 30.0,
            min_height: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegendPlacement {
    #[default]
    Bottom,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegendOptions {
    pub show: bool,
    pub placement: LegendPlacement,
    pub as_table: bool,
    pub sort_by: Option<String>,
    pub sort_desc: bool,
    pub hide_empty: bool,
    pub hide_zero: bool,
    /// Display values shown per legend row, by reducer id.
    pub calcs: Vec<String>,
}

impl Default for LegendOptions {
    fn default() -> Self {
        Self {
            show: true,
            placement: LegendPlacement::Bottom,
            as_table: false,
            sort_by: None,
            sort_desc: false,
            hide_empty: false,
            hide_zero: false,
            calcs: vec![DEFAULT_VALUE_NAME.to_string()],
        }
    }
}

/// Light and dark variable maps for one diagram grammar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModePalette {
    pub light: Map<String, Value>,
    pub dark: Map<String, Value>,
}

/// Theme variable overrides, one palette per grammar. Merged in field order, later wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeOverrides {
    pub common: ModePalette,
    pub class_diagram: ModePalette,
    pub flowchart: ModePalette,
    pub sequence: ModePalette,
    pub state: ModePalette,
    pub user_journey: ModePalette,
}

impl ThemeOverrides {
    pub fn in_precedence_order(&self) -> [&ModePalette; 6] {
        [
            &self.common,
            &self.class_diagram,
            &self.flowchart,
            &self.sequence,
            &self.state,
            &self.user_journey,
        ]
    }
}

pub fn load_options(path: Option<&Path>) -> Result<DiagramOptions> {
    let Some(path) = path else {
        return Ok(DiagramOptions::default());
    };
    let contents = std::fs::read_to_string(path)
        .map_err(|err| PanelError::io(path.display().to_string(), err))?;
    DiagramOptions::from_json(&contents)
}
