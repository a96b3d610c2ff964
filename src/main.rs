//! PDF Shrinker CLI
//!
//! Command-line interface for shrinking PDFs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pdf_shrink::{
    shrink_file, Cleanup, GhostscriptCompressor, GhostscriptConfig, GhostscriptPreset,
    ImagePreset, PdfDocument, PdfSettings, ShrinkOptions,
};
use std::path::PathBuf;

/// Shrink a PDF by recompressing its images or rewriting it with Ghostscript
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recompress embedded images as JPEG
    Images {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Quality / size policy
        #[arg(short, long, value_enum, default_value = "moderate")]
        preset: ImagePresetArg,

        /// JPEG quality (1-100), overrides the preset
        #[arg(short, long)]
        quality: Option<u8>,

        /// Longest image edge in pixels, overrides the preset
        #[arg(short = 'd', long)]
        max_dimension: Option<u32>,

        /// Skip unreferenced-object removal, duplicate merging and stream compression
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Rewrite the whole file with Ghostscript
    Ghostscript {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Ghostscript executable
        #[arg(long)]
        gs: Option<PathBuf>,

        /// Argument set
        #[arg(short, long, value_enum, default_value = "standard")]
        preset: GhostscriptPresetArg,

        /// -dPDFSETTINGS preset
        #[arg(long, value_enum, default_value = "ebook")]
        pdf_settings: PdfSettingsArg,

        /// Image resolution cap for colour, gray and mono images
        #[arg(long, default_value = "150")]
        dpi: u32,
    },

    /// List images per page
    Inspect {
        /// Input PDF file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImagePresetArg {
    /// Quality 75, longest edge 1500 px
    Moderate,
    /// Quality 60, longest edge 1200 px
    Robust,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum GhostscriptPresetArg {
    Standard,
    Turbo,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PdfSettingsArg {
    Screen,
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl From<ImagePresetArg> for ImagePreset {
    fn from(arg: ImagePresetArg) -> Self {
        match arg {
            ImagePresetArg::Moderate => ImagePreset::Moderate,
            ImagePresetArg::Robust => ImagePreset::Robust,
        }
    }
}

impl From<GhostscriptPresetArg> for GhostscriptPreset {
    fn from(arg: GhostscriptPresetArg) -> Self {
        match arg {
            GhostscriptPresetArg::Standard => GhostscriptPreset::Standard,
            GhostscriptPresetArg::Turbo => GhostscriptPreset::Turbo,
        }
    }
}

impl From<PdfSettingsArg> for PdfSettings {
    fn from(arg: PdfSettingsArg) -> Self {
        match arg {
            PdfSettingsArg::Screen => PdfSettings::Screen,
            PdfSettingsArg::Ebook => PdfSettings::Ebook,
            PdfSettingsArg::Printer => PdfSettings::Printer,
            PdfSettingsArg::Prepress => PdfSettings::Prepress,
            PdfSettingsArg::Default => PdfSettings::Default,
        }
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    match args.command {
        Commands::Images {
            input,
            output,
            preset,
            quality,
            max_dimension,
            no_cleanup,
        } => {
            let mut options = ShrinkOptions::from(ImagePreset::from(preset));
            if let Some(quality) = quality {
                options.recompress.quality = quality;
            }
            if let Some(max_dimension) = max_dimension {
                options.recompress.max_dimension = max_dimension;
            }
            if no_cleanup {
                options.cleanup = Cleanup::none();
            }

            println!("Processing: {}", input.display());
            let outcome = shrink_file(&input, &output, &options)
                .with_context(|| format!("Failed to shrink {}", input.display()))?;

            let images = &outcome.images;
            println!("{}", "-".repeat(30));
            println!("Unique images found: {}", images.unique_images);
            println!("Optimized: {}", images.optimized);
            println!(
                "Skipped/failed: {} ({} not smaller, {} failed)",
                images.skipped(),
                images.not_smaller,
                images.failed
            );
            println!(
                "File size: {:.2} MB -> {:.2} MB",
                megabytes(outcome.file.input_bytes),
                megabytes(outcome.file.output_bytes)
            );
            println!("Output saved to: {}", output.display());
        }

        Commands::Ghostscript {
            input,
            output,
            gs,
            preset,
            pdf_settings,
            dpi,
        } => {
            let config = GhostscriptConfig {
                executable: gs,
                pdf_settings: pdf_settings.into(),
                resolution_dpi: dpi,
                ..GhostscriptConfig::preset(preset.into())
            };
            let compressor = GhostscriptCompressor::new(config);

            println!("Processing: {} -> {}", input.display(), output.display());
            let report = compressor
                .compress(&input, &output)
                .with_context(|| format!("Ghostscript could not compress {}", input.display()))?;

            println!("{}", "-".repeat(30));
            println!(
                "Size: {:.2} MB -> {:.2} MB",
                megabytes(report.input_bytes),
                megabytes(report.output_bytes)
            );
        }

        Commands::Inspect { input } => {
            let doc = PdfDocument::load(&input)?;
            let pages = doc.images_info();
            if pages.is_empty() {
                println!("No images found");
            }
            for page in pages {
                println!("Page {}:", page.page_number);
                for image in page.images {
                    println!(
                        "  {:?}: {}x{} {} {} bpc, {}, {:.1} KB{}",
                        image.object_id,
                        image.width,
                        image.height,
                        image.color_space,
                        image.bits_per_component,
                        image.filter,
                        image.size_bytes as f64 / 1024.0,
                        if image.has_smask { ", soft mask" } else { "" }
                    );
                }
            }
        }
    }

    Ok(())
}
