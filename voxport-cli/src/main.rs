//! voxport command-line interface.
//!
//! Exports raw volume files or stacks of 2-D images into a chunked,
//! compressed HDF5 dataset.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::redundant_closure_for_method_calls
)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::DynamicImage;
use ndarray::Array3;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;
use voxport_core::{Argb, ArrayVolume, Axis, Sample};
use voxport_io::{
    export_volume, ExportConfig, ExportSummary, RawLayout, RawVolume, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_DATASET,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    VoxportIo(#[from] voxport_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] voxport_core::Error),

    #[error("cannot decode image '{}': {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image '{}' differs in size or pixel type from the first image", .0.display())]
    ImageMismatch(PathBuf),

    #[error("image stack shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("no layout for '{}': pass --layout, --axes with --shape, or place a .json sidecar next to it", .0.display())]
    MissingLayout(PathBuf),
}

/// Axis that successive images are stacked along.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StackAxis {
    /// Each image is one depth plane
    Depth,
    /// Each image is one time point
    Time,
}

impl StackAxis {
    fn axis(self) -> Axis {
        match self {
            StackAxis::Depth => Axis::Depth,
            StackAxis::Time => Axis::Time,
        }
    }
}

/// Stream image volumes into chunked HDF5 datasets.
#[derive(Parser)]
#[command(name = "voxport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where and how the volume is written.
#[derive(Args, Debug)]
struct TargetArgs {
    /// Output HDF5 file (replaced if it exists)
    #[arg(short, long)]
    output: PathBuf,

    /// Dataset name inside the container
    #[arg(short, long, default_value = DEFAULT_DATASET)]
    dataset: String,

    /// Deflate level (0-9)
    #[arg(
        short = 'l',
        long,
        default_value_t = DEFAULT_COMPRESSION_LEVEL,
        allow_negative_numbers = true
    )]
    compression: i32,
}

impl TargetArgs {
    fn config(&self) -> ExportConfig {
        ExportConfig::new(&self.output)
            .with_dataset(self.dataset.as_str())
            .with_compression_level(self.compression)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a headerless little-endian raw volume
    Export {
        /// Input raw file
        input: PathBuf,

        /// JSON layout sidecar (defaults to <input>.json when present)
        #[arg(long, conflicts_with_all = ["axes", "shape"])]
        layout: Option<PathBuf>,

        /// Axis letters in file order, outermost first (e.g. tzyxc)
        #[arg(long, requires = "shape")]
        axes: Option<String>,

        /// Comma-separated extents matching --axes (e.g. 2,1,512,512,1)
        #[arg(long, requires = "axes")]
        shape: Option<String>,

        /// Element type: u8, u16, u32, f32, argb32, i16, f64
        #[arg(long, default_value = "u8")]
        dtype: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Export one or more 2-D image files as a stack
    Import {
        /// Input images, in stack order
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Axis the images are stacked along
        #[arg(long, value_enum, default_value = "depth")]
        stack: StackAxis,

        #[command(flatten)]
        target: TargetArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let start = Instant::now();
    let summary = match command {
        Commands::Export {
            input,
            layout,
            axes,
            shape,
            dtype,
            target,
        } => {
            let layout = resolve_layout(&input, layout, axes.zip(shape), &dtype)?;
            let volume = RawVolume::open(&input, layout)?;
            log::info!(
                "Reading {} as {:?}",
                volume.path().display(),
                volume.layout().dtype
            );
            export_volume(&volume, &target.config())?
        }
        Commands::Import {
            input,
            stack,
            target,
        } => import_images(&input, stack, &target.config())?,
    };
    print_summary(&summary, start);
    Ok(())
}

fn resolve_layout(
    input: &Path,
    layout: Option<PathBuf>,
    compact: Option<(String, String)>,
    dtype: &str,
) -> Result<RawLayout> {
    if let Some(path) = layout {
        return Ok(RawLayout::from_json_file(path)?);
    }
    if let Some((axes, shape)) = compact {
        return Ok(RawLayout::parse(dtype, &axes, &shape)?);
    }
    let sidecar = input.with_extension("json");
    if sidecar.is_file() {
        return Ok(RawLayout::from_json_file(sidecar)?);
    }
    Err(CliError::MissingLayout(input.to_path_buf()))
}

/// How a decoded image is turned into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Gray8,
    Gray16,
    /// Floating-point images, reduced to luminance.
    Float,
    /// Everything else, packed as ARGB words.
    Color,
}

impl ImageKind {
    fn of(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => ImageKind::Gray8,
            DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => ImageKind::Gray16,
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => ImageKind::Float,
            _ => ImageKind::Color,
        }
    }
}

fn import_images(
    inputs: &[PathBuf],
    stack: StackAxis,
    config: &ExportConfig,
) -> Result<ExportSummary> {
    let images = inputs
        .iter()
        .map(|path| {
            image::open(path).map_err(|source| CliError::Image {
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = images.first() else {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no input images",
        )));
    };

    let kind = ImageKind::of(first);
    let (width, height) = (first.width(), first.height());
    for (path, image) in inputs.iter().zip(&images) {
        if ImageKind::of(image) != kind || image.width() != width || image.height() != height {
            return Err(CliError::ImageMismatch(path.clone()));
        }
    }
    log::info!(
        "Stacking {} {:?} image(s) of {}x{} along {:?}",
        images.len(),
        kind,
        width,
        height,
        stack
    );

    let shape = (images.len(), height as usize, width as usize);
    let dims = [stack.axis(), Axis::Row, Axis::Column];
    match kind {
        ImageKind::Gray8 => {
            let planes = images.iter().map(|image| image.to_luma8().into_raw());
            export_stack(planes, shape, &dims, config)
        }
        ImageKind::Gray16 => {
            let planes = images.iter().map(|image| image.to_luma16().into_raw());
            export_stack(planes, shape, &dims, config)
        }
        ImageKind::Float => {
            let planes = images.iter().map(|image| image.to_luma32f().into_raw());
            export_stack(planes, shape, &dims, config)
        }
        ImageKind::Color => {
            let planes = images.iter().map(|image| {
                image
                    .to_rgba8()
                    .pixels()
                    .map(|pixel| {
                        let [red, green, blue, alpha] = pixel.0;
                        Argb::from_channels(alpha, red, green, blue)
                    })
                    .collect::<Vec<_>>()
            });
            export_stack(planes, shape, &dims, config)
        }
    }
}

fn export_stack<P, I>(
    planes: I,
    shape: (usize, usize, usize),
    dims: &[Axis],
    config: &ExportConfig,
) -> Result<ExportSummary>
where
    P: Copy + Into<Sample>,
    I: Iterator<Item = Vec<P>>,
{
    let data: Vec<P> = planes.flatten().collect();
    let array = Array3::from_shape_vec(shape, data)?.into_dyn();
    let volume = ArrayVolume::new(array, dims)?;
    Ok(export_volume(&volume, config)?)
}

fn print_summary(summary: &ExportSummary, start: Instant) {
    println!(
        "Wrote {}:{} in {:.2}s",
        summary.path.display(),
        summary.dataset,
        start.elapsed().as_secs_f64()
    );
    println!("Pixel type: {}", summary.kind);
    println!("Shape (tzyxc): {}", summary.shape);
    println!("Chunk (tzyxc): {}", summary.chunk);
    println!("Slices written: {}", summary.slices_written);
}
