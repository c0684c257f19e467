//! Lumen CLI
//!
//! Inspect, render, and generate recorded pictures.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lumen_core::Picture;
use lumen_gpu::{GpuCommand, GpuRenderer, PictureFlusher, RendererConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod samples;

use samples::Sample;

/// Configuration picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG: &str = "lumen.toml";

#[derive(Parser)]
#[command(name = "lumen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lumen picture compositor", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration (defaults to ./lumen.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flush a picture and summarize the GPU commands it produces
    Inspect {
        /// Picture file (JSON)
        picture: PathBuf,
    },

    /// Render a picture headless to PNG
    Render {
        /// Picture file (JSON)
        picture: PathBuf,

        /// Output image
        #[arg(short, long, default_value = "out.png")]
        output: PathBuf,
    },

    /// Write a built-in sample picture
    Sample {
        /// Sample to write
        #[arg(value_enum)]
        name: Sample,

        /// Output picture file
        #[arg(short, long, default_value = "picture.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Inspect { picture } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_inspect(&picture, config, cli.verbose)
        }
        Commands::Render { picture, output } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_render(&picture, &output, config)
        }
        Commands::Sample { name, output } => cmd_sample(name, &output),
    }
}

fn load_config(path: Option<&Path>) -> Result<RendererConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            debug!("No {} found, using the standard configuration", DEFAULT_CONFIG);
            return Ok(RendererConfig::default());
        }
    };

    let config = RendererConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!(
        "Loaded {}: {}x{} @ {}x",
        path.display(),
        config.flusher.width,
        config.flusher.height,
        config.flusher.device_pixel_ratio
    );
    Ok(config)
}

fn read_picture(path: &Path) -> Result<Picture> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read picture {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse picture {}", path.display()))
}

fn cmd_inspect(path: &Path, config: RendererConfig, verbose: bool) -> Result<()> {
    let picture = read_picture(path)?;
    let mut flusher = PictureFlusher::new(config.flusher);
    let list = flusher
        .flush(&picture)
        .with_context(|| format!("Failed to flush {}", path.display()))?;

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    for command in picture.commands() {
        *kinds.entry(command.kind()).or_default() += 1;
    }

    println!("Picture: {}", path.display());
    println!("  bounds: {:?}", picture.paint_bounds());
    println!("  commands: {}", picture.len());
    for (kind, count) in &kinds {
        println!("    {:<16} {}", kind, count);
    }

    let summary = list.summary();
    println!();
    println!("GPU commands: {} ({}x{})", list.len(), list.width, list.height);
    println!("  targets:       {}", summary.targets);
    println!("  binds:         {}", summary.binds);
    println!("  scissors:      {}", summary.scissors);
    println!("  draws:         {}", summary.draws);
    println!("  stencil draws: {}", summary.stencil_draws);
    println!("  vertices:      {}", list.vertices.len());
    println!("  images:        {}", list.images.len());
    println!("  gradients:     {}", list.gradients.len());

    if verbose {
        println!();
        for (i, command) in list.commands.iter().enumerate() {
            println!("  {:>4}  {}", i, describe(command));
        }
    }

    flusher.reclaim(list);
    Ok(())
}

/// One-line description of a GPU command
fn describe(command: &GpuCommand) -> String {
    match command {
        GpuCommand::AllocateTarget(desc) => format!(
            "allocate {:?} {}x{} samples={}",
            desc.id, desc.width, desc.height, desc.samples
        ),
        GpuCommand::BindTarget { target, clear } => {
            format!("bind {:?}{}", target, if *clear { " (clear)" } else { "" })
        }
        GpuCommand::SetScissor(Some(rect)) => format!(
            "scissor {},{} {}x{}",
            rect.x, rect.y, rect.width, rect.height
        ),
        GpuCommand::SetScissor(None) => "scissor off".to_string(),
        GpuCommand::Draw(draw) => format!(
            "draw {:?} blend={:?} stencil={:?} indices={} texture={:?}",
            draw.program, draw.material.blend, draw.material.stencil, draw.index_count, draw.texture
        ),
        GpuCommand::ReleaseTarget(id) => format!("release {:?}", id),
    }
}

fn cmd_render(path: &Path, output: &Path, config: RendererConfig) -> Result<()> {
    let picture = read_picture(path)?;
    let (width, height) = (config.flusher.width, config.flusher.height);

    let mut renderer =
        pollster::block_on(GpuRenderer::new(config)).context("Failed to create GPU renderer")?;
    let mut pixels = renderer
        .render_to_rgba(&picture)
        .with_context(|| format!("Failed to render {}", path.display()))?;
    unpremultiply(&mut pixels);

    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("Readback size does not match the configured target")?;
    image
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Rendered {} to {} ({}x{})", path.display(), output.display(), width, height);
    Ok(())
}

/// Convert premultiplied RGBA8 to straight alpha for PNG
fn unpremultiply(pixels: &mut [u8]) {
    for texel in pixels.chunks_exact_mut(4) {
        let a = texel[3] as u32;
        if a == 0 || a == 255 {
            continue;
        }
        for channel in &mut texel[..3] {
            *channel = ((*channel as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

fn cmd_sample(sample: Sample, output: &Path) -> Result<()> {
    let picture = sample
        .build()
        .with_context(|| format!("Failed to record {:?} sample", sample))?;
    let json = serde_json::to_string_pretty(&picture)?;
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Wrote {:?} sample ({} commands) to {}",
        sample,
        picture.len(),
        output.display()
    );
    Ok(())
}
