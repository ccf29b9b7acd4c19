#[cfg(feature = "cli")]
pub mod cli;
pub mod composite;
pub mod controller;
pub mod display;
pub mod dom;
pub mod error;
pub mod legend;
pub mod model;
pub mod options;
pub mod render;
pub mod resolver;
pub mod text_metrics;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use controller::{PanelContext, PanelController, PanelOutput};
pub use error::{PanelError, Result};
pub use options::DiagramOptions;
pub use render::{DiagramRenderer, MermaidRenderer};
