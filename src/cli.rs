use crate::controller::{HttpFetcher, PanelContext, PanelController, PanelOutput};
use crate::model::{Series, load_series};
use crate::options::{DiagramOptions, load_options};
use crate::render::{MermaidRenderer, write_output_svg};
use crate::theme::ThemeMode;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mdpanel",
    version,
    about = "Render Mermaid diagrams with live metric values painted onto them"
)]
pub struct Args {
    /// Input file (.mmd or .md) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Fetch the diagram definition from this URL instead of the input
    #[arg(short = 'u', long = "url", conflicts_with = "input")]
    pub url: Option<String>,

    /// Series JSON file
    #[arg(short = 's', long = "series")]
    pub series: Option<PathBuf>,

    /// Panel options JSON file (JSON5 accepted)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Output file. Defaults to stdout for SVG/HTML if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Dashboard theme the diagram is painted for
    #[arg(short = 't', long = "theme", value_enum, default_value = "light")]
    pub theme: ThemeArg,

    /// Panel id; the SVG gets the id `diagram-<panel id>`
    #[arg(short = 'p', long = "panelId", default_value = "1")]
    pub panel_id: String,

    /// Write the legend rows as JSON to this file
    #[arg(short = 'l', long = "legend")]
    pub legend: Option<PathBuf>,

    /// Width
    #[arg(short = 'w', long = "width", default_value_t = 1200.0)]
    pub width: f32,

    /// Height
    #[arg(short = 'H', long = "height", default_value_t = 800.0)]
    pub height: f32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
    Html,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
            OutputFormat::Html => "html",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for ThemeMode {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => ThemeMode::Light,
            ThemeArg::Dark => ThemeMode::Dark,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut options = load_options(args.config.as_deref())?;
    if let Some(url) = &args.url {
        options.content_url = Some(url.clone());
    }
    let series: Vec<Series> = match &args.series {
        Some(path) => load_series(path)?,
        None => Vec::new(),
    };

    let panels = if args.input.is_none()
        && (options.remote_url().is_some() || !options.content.trim().is_empty())
    {
        vec![options.clone()]
    } else {
        let (input, is_markdown) = read_input(args.input.as_deref())?;
        let diagrams = if is_markdown {
            extract_mermaid_blocks(&input)
        } else {
            vec![input]
        };
        panels_from_input(&options, diagrams)
    };

    if panels.is_empty() {
        return Err(anyhow::anyhow!("No Mermaid diagrams found in input"));
    }

    let outputs = if panels.len() == 1 {
        vec![args.output.clone()]
    } else {
        resolve_multi_outputs(args.output.as_deref(), args.output_format, panels.len())?
            .into_iter()
            .map(Some)
            .collect()
    };

    let controller = PanelController::new(MermaidRenderer::default(), HttpFetcher::new());
    let mut legends = Vec::new();
    let mut failed = 0;
    for ((panel_id, panel_options), output) in panel_ids(&args.panel_id, panels.len())
        .into_iter()
        .zip(panels)
        .zip(outputs)
    {
        let ctx = PanelContext::new(panel_id.clone(), args.theme.into())
            .with_size(args.width, args.height);
        let out = controller.render(&ctx, &panel_options, &series);
        if !out.is_rendered() {
            failed += 1;
        }
        write_panel(&out, &args, output.as_deref())?;
        legends.push(json!({
            "panelId": panel_id,
            "shown": out.legend.is_shown(),
            "items": out.legend.items(),
        }));
    }

    if let Some(path) = &args.legend {
        std::fs::write(path, serde_json::to_string_pretty(&legends)?)?;
        info!(path = %path.display(), "legend written");
    }

    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} diagrams failed to render",
            failed,
            legends.len()
        ));
    }
    Ok(())
}

fn write_panel(out: &PanelOutput, args: &Args, output: Option<&Path>) -> Result<()> {
    match args.output_format {
        OutputFormat::Html => write_output_svg(&out.container.markup(), output),
        OutputFormat::Svg => match out.container.svg_markup() {
            Some(svg) => write_output_svg(&svg, output),
            None => write_output_svg(&out.container.markup(), output),
        },
        OutputFormat::Png => {
            let Some(svg) = out.container.svg_markup() else {
                warn!("skipping PNG output for a diagram that failed to render");
                return Ok(());
            };
            let output = ensure_output(output, "png")?;
            write_png(&svg, &output, args.width, args.height)
        }
    }
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path, width: f32, height: f32) -> Result<()> {
    crate::render::write_output_png(svg, output, width, height)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: &Path, _width: f32, _height: f32) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| matches!(ext, "md" | "markdown"))
            .unwrap_or(false);
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

fn ensure_output(output: Option<&Path>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.to_path_buf());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

/// One set of options per definition read from the input. The input replaces both the
/// inline content and any configured URL, even when a block is empty.
fn panels_from_input(options: &DiagramOptions, diagrams: Vec<String>) -> Vec<DiagramOptions> {
    diagrams
        .into_iter()
        .map(|content| DiagramOptions {
            content,
            content_url: None,
            ..options.clone()
        })
        .collect()
}

/// One panel keeps the base id; markdown blocks become `<base>-1`, `<base>-2`, ...
fn panel_ids(base: &str, count: usize) -> Vec<String> {
    if count == 1 {
        return vec![base.to_string()];
    }
    (1..=count).map(|idx| format!("{}-{}", base, idx)).collect()
}

fn extract_mermaid_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = Vec::new();
    let mut fence = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(start_fence) = detect_mermaid_fence(trimmed) {
                in_block = true;
                fence = start_fence;
                continue;
            }
        } else if is_fence_end(trimmed, &fence) {
            in_block = false;
            blocks.push(current.join("\n"));
            current.clear();
            continue;
        }

        if in_block {
            current.push(line.to_string());
        }
    }

    blocks
}

fn detect_mermaid_fence(line: &str) -> Option<String> {
    for marker in ['`', '~', ':'] {
        let fence: String = std::iter::repeat_n(marker, 3).collect();
        if line.starts_with(&fence) {
            let rest = line.trim_start_matches(marker).trim();
            if rest.starts_with("mermaid") {
                return Some(fence);
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    if !line.starts_with(fence) {
        return false;
    }
    line[fence.len()..].trim().is_empty()
}

fn resolve_multi_outputs(
    output: Option<&Path>,
    format: OutputFormat,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let ext = format.extension();
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for markdown input"))?;
    if base.is_dir() {
        return Ok((1..=count)
            .map(|idx| base.join(format!("diagram-{}.{}", idx, ext)))
            .collect());
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("diagram");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((1..=count)
        .map(|idx| parent.join(format!("{}-{}.{}", stem, idx, ext)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_mermaid_blocks() {
        let input = r#"
text
``` mermaid
flowchart LR
  A --> B
```
more
~~~mermaid
flowchart TD
  X --> Y
~~~
::: mermaid
sequenceDiagram
  A->>B: hi
:::
```rust
fn main() {}
```
"#;
        let blocks = extract_mermaid_blocks(input);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].contains("flowchart"));
        assert!(blocks[1].contains("flowchart"));
        assert!(blocks[2].contains("sequenceDiagram"));
    }

    #[test]
    fn input_definitions_replace_configured_source() {
        let options = DiagramOptions {
            content: "graph LR\n  configured".into(),
            content_url: Some("https://example.com/d.mmd".into()),
            use_background: true,
            ..DiagramOptions::default()
        };
        let panels = panels_from_input(&options, vec![String::new(), "graph TD\n  A".into()]);
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].content, "");
        assert_eq!(panels[1].content, "graph TD\n  A");
        assert!(panels.iter().all(|p| p.remote_url().is_none() && p.use_background));
    }

    #[test]
    fn url_and_input_are_exclusive() {
        let both = Args::try_parse_from(["mdpanel", "-i", "a.mmd", "-u", "https://example.com/d.mmd"]);
        assert!(both.is_err());
        assert!(Args::try_parse_from(["mdpanel", "-u", "https://example.com/d.mmd"]).is_ok());
    }

    #[test]
    fn markdown_panels_get_numbered_ids() {
        assert_eq!(panel_ids("7", 1), vec!["7"]);
        assert_eq!(panel_ids("7", 3), vec!["7-1", "7-2", "7-3"]);
    }

    #[test]
    fn multi_outputs_follow_file_stem_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        let in_dir = resolve_multi_outputs(Some(dir.path()), OutputFormat::Html, 2).unwrap();
        assert_eq!(in_dir[1], dir.path().join("diagram-2.html"));

        let file = dir.path().join("out.svg");
        let numbered = resolve_multi_outputs(Some(&file), OutputFormat::Svg, 2).unwrap();
        assert_eq!(numbered[0], dir.path().join("out-1.svg"));

        assert!(resolve_multi_outputs(None, OutputFormat::Svg, 2).is_err());
    }

    #[test]
    fn markdown_extension_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "```mermaid\ngraph LR\n```\n").unwrap();
        let (content, is_md) = read_input(Some(&path)).unwrap();
        assert!(is_md);
        assert_eq!(extract_mermaid_blocks(&content), vec!["graph LR"]);
    }
}
