use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inkleaf_core::model::{Color, Document, Rect};
use inkleaf_core::{inspect, save_document, FsDocumentStore, SourceFormat};
use inkleaf_render::{
    draw_grid, fill_rect, pixmap_to_image, BlockLabelPainter, GridAppearance, InkLayer, LabelPainter, Pixmap,
    Transform,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "inkleaf-cli")]
#[command(about = "Inspect, migrate and render inkleaf annotation documents")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print a machine-readable summary of a document.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Rewrite a document (legacy or paged) in the current paged format.
    Migrate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Defaults to replacing FILE.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Rasterize one page's grid, ink and text to a PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 612)]
        width: u32,
        #[arg(long, default_value_t = 792)]
        height: u32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    format: &'static str,
    version: u32,
    page_count: usize,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    index: usize,
    grid: &'static str,
    strokes: usize,
    texts: usize,
}

/// Log to stderr, filtered by `INKLEAF_LOG`, then `RUST_LOG`, then `warn`.
pub fn init_tracing() {
    let filter = std::env::var("INKLEAF_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Migrate { file, output } => run_migrate(&file, output.as_deref()),
        Commands::Render {
            file,
            page,
            width,
            height,
            output,
        } => run_render(&file, page, width, height, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    let (document, format) = read_document(file)?;

    let pages = document
        .pages
        .iter()
        .enumerate()
        .map(|(index, page)| PageOutput {
            index,
            grid: page.grid.as_str(),
            strokes: page.strokes().count(),
            texts: page.texts().count(),
        })
        .collect();
    let payload = InfoOutput {
        path: file.display().to_string(),
        format: format_name(format),
        version: document.version,
        page_count: document.page_count(),
        pages,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");
    Ok(())
}

fn run_migrate(file: &Path, output: Option<&Path>) -> Result<()> {
    let (document, format) = read_document(file)?;
    let output = output.unwrap_or(file);

    save_document(&FsDocumentStore::new(), output, &document)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(from = format_name(format), pages = document.page_count(), "document migrated");

    println!("{}", output.display());
    Ok(())
}

fn run_render(file: &Path, page: usize, width: u32, height: u32, output: &Path) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let (document, _) = read_document(file)?;
    let page_index = page - 1;
    if page_index >= document.page_count() {
        anyhow::bail!(
            "page {page} is out of range; document has {} pages",
            document.page_count()
        );
    }

    let pixmap = render_page(&document, page_index, width, height)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    pixmap_to_image(&pixmap)
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

/// Page background, grid, ink and labels at one pixel per page unit.
fn render_page(document: &Document, page_index: usize, width: u32, height: u32) -> Result<Pixmap> {
    let page = document
        .pages
        .get(page_index)
        .with_context(|| format!("page {} does not exist", page_index + 1))?;
    let mut pixmap =
        Pixmap::new(width, height).with_context(|| format!("invalid image size {width}x{height}"))?;

    let area = Rect::from_xywh(0.0, 0.0, width as f32, height as f32);
    fill_rect(&mut pixmap, area, Color::WHITE);
    draw_grid(&mut pixmap, page.grid, area, 1.0, &GridAppearance::default());

    let mut ink = InkLayer::new(width, height).context("failed to allocate ink layer")?;
    ink.draw_strokes(page.strokes(), Transform::identity());
    ink.composite_onto(&mut pixmap);

    let painter = BlockLabelPainter;
    for label in page.texts() {
        painter.paint_label(&mut pixmap, label, Transform::identity());
    }
    Ok(pixmap)
}

/// Strict read: unlike the editor, the CLI reports malformed documents.
fn read_document(file: &Path) -> Result<(Document, SourceFormat)> {
    if !file.is_file() {
        anyhow::bail!("file does not exist: {}", file.display());
    }
    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    inspect(&bytes).with_context(|| format!("failed to decode {}", file.display()))
}

fn format_name(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Legacy => "legacy",
        SourceFormat::Paged => "paged",
    }
}
