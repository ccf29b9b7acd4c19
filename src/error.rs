use thiserror::Error;

pub type Result<T, E = PanelError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid panel options: {0}")]
    Options(String),

    #[error("invalid series data: {0}")]
    Series(#[from] serde_json::Error),

    #[error("rendered SVG could not be parsed: {0}")]
    Svg(#[from] roxmltree::Error),

    #[error("diagram render failed: {0}")]
    Render(String),

    #[error("failed to fetch diagram from {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[cfg(feature = "http")]
    #[error("failed to fetch diagram: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote diagram definitions are not supported here: {0}")]
    RemoteUnsupported(String),
}

impl PanelError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
