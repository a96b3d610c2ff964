//! Whole-file compression through Ghostscript's `pdfwrite` device.
//!
//! ## Requirements
//!
//! - Ghostscript must be installed. On Windows the default install
//!   locations are probed; elsewhere `gs` must be on the PATH, or an
//!   explicit executable must be configured.

use crate::error::{Error, Result};
use crate::pass::{ensure_distinct, FileReport};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Captured result of an external process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs an external program to completion
pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput>;
}

/// Runs programs with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// `-dPDFSETTINGS` quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfSettings {
    /// 72 dpi
    Screen,
    /// 150 dpi
    #[default]
    Ebook,
    /// 300 dpi
    Printer,
    /// 300 dpi, colour preserving
    Prepress,
    Default,
}

impl PdfSettings {
    pub fn as_str(self) -> &'static str {
        match self {
            PdfSettings::Screen => "/screen",
            PdfSettings::Ebook => "/ebook",
            PdfSettings::Printer => "/printer",
            PdfSettings::Prepress => "/prepress",
            PdfSettings::Default => "/default",
        }
    }
}

/// Image downsampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownsampleType {
    #[default]
    Average,
    Bicubic,
    Subsample,
}

impl DownsampleType {
    pub fn as_str(self) -> &'static str {
        match self {
            DownsampleType::Average => "/Average",
            DownsampleType::Bicubic => "/Bicubic",
            DownsampleType::Subsample => "/Subsample",
        }
    }
}

/// Named argument sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GhostscriptPreset {
    /// Colour downsampling type only
    #[default]
    Standard,
    /// All rendering threads, uniform downsampling, structure optimization
    Turbo,
}

/// Configuration for the Ghostscript compressor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostscriptConfig {
    /// Explicit executable; must exist when set
    pub executable: Option<PathBuf>,
    /// Install locations probed in order when no executable is set.
    /// When empty, `command_name` is resolved through the PATH.
    pub search_paths: Vec<PathBuf>,
    pub command_name: String,
    pub pdf_settings: PdfSettings,
    pub compatibility_level: String,
    /// Resolution cap for colour, gray and mono images
    pub resolution_dpi: u32,
    pub downsample: DownsampleType,
    /// Also set the gray and mono downsample types
    pub uniform_downsample: bool,
    pub rendering_threads: Option<usize>,
    pub optimize: bool,
}

impl Default for GhostscriptConfig {
    fn default() -> Self {
        Self::preset(GhostscriptPreset::Standard)
    }
}

impl GhostscriptConfig {
    pub fn preset(preset: GhostscriptPreset) -> Self {
        let standard = Self {
            executable: None,
            search_paths: default_search_paths(),
            command_name: "gs".to_string(),
            pdf_settings: PdfSettings::Ebook,
            compatibility_level: "1.4".to_string(),
            resolution_dpi: 150,
            downsample: DownsampleType::Average,
            uniform_downsample: false,
            rendering_threads: None,
            optimize: false,
        };
        match preset {
            GhostscriptPreset::Standard => standard,
            GhostscriptPreset::Turbo => Self {
                uniform_downsample: true,
                rendering_threads: Some(
                    std::thread::available_parallelism().map_or(1, |n| n.get()),
                ),
                optimize: true,
                ..standard
            },
        }
    }
}

/// Default install locations; only Windows has any
pub fn default_search_paths() -> Vec<PathBuf> {
    if cfg!(windows) {
        [
            r"C:\Program Files\gs\gs10.06.0\bin\gswin64c.exe",
            r"C:\Program Files\gs\gs10.03.0\bin\gswin64c.exe",
            r"C:\Program Files\gs\gs9.56.1\bin\gswin64c.exe",
        ]
        .iter()
        .map(PathBuf::from)
        .collect()
    } else {
        Vec::new()
    }
}

/// Rewrites whole PDFs with Ghostscript
pub struct GhostscriptCompressor<R: CommandRunner = SystemRunner> {
    config: GhostscriptConfig,
    runner: R,
}

impl GhostscriptCompressor<SystemRunner> {
    pub fn new(config: GhostscriptConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> GhostscriptCompressor<R> {
    pub fn with_runner(config: GhostscriptConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &GhostscriptConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Find the executable to run. No fallback when the configured
    /// executable or every search path is missing.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(exe) = &self.config.executable {
            if exe.is_file() {
                return Ok(exe.clone());
            }
            return Err(Error::GhostscriptNotFound(exe.display().to_string()));
        }

        if !self.config.search_paths.is_empty() {
            return self
                .config
                .search_paths
                .iter()
                .find(|p| p.is_file())
                .cloned()
                .ok_or_else(|| {
                    let tried: Vec<String> = self
                        .config
                        .search_paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect();
                    Error::GhostscriptNotFound(format!("tried {}", tried.join(", ")))
                });
        }

        Ok(PathBuf::from(&self.config.command_name))
    }

    /// The full argument list, in the order Ghostscript receives it
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let cfg = &self.config;
        let mut args: Vec<OsString> = vec![
            "-sDEVICE=pdfwrite".into(),
            format!("-dCompatibilityLevel={}", cfg.compatibility_level).into(),
            format!("-dPDFSETTINGS={}", cfg.pdf_settings.as_str()).into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
        ];

        if let Some(threads) = cfg.rendering_threads {
            args.push(format!("-dNumRenderingThreads={}", threads).into());
        }

        let downsample = cfg.downsample.as_str();
        args.push(format!("-dColorImageDownsampleType={}", downsample).into());
        if cfg.uniform_downsample {
            args.push(format!("-dGrayImageDownsampleType={}", downsample).into());
            args.push(format!("-dMonoImageDownsampleType={}", downsample).into());
        }
        if cfg.optimize {
            args.push("-dOptimize=true".into());
        }

        for channel in ["Color", "Gray", "Mono"] {
            args.push(format!("-d{}ImageResolution={}", channel, cfg.resolution_dpi).into());
        }

        let mut output_arg = OsString::from("-sOutputFile=");
        output_arg.push(output.as_os_str());
        args.push(output_arg);
        args.push(input.as_os_str().to_os_string());
        args
    }

    /// Rewrite `input` into `output`. The output file existing afterwards
    /// is the success signal, so a stale `output` is removed first and a
    /// partial one is removed on failure.
    pub fn compress(&self, input: &Path, output: &Path) -> Result<FileReport> {
        ensure_distinct(input, output)?;
        let program = self.locate()?;
        let args = self.build_args(input, output);
        remove_if_exists(output)?;

        let result = self.invoke(&program, &args, output);
        if result.is_err() {
            if let Err(e) = remove_if_exists(output) {
                log::warn!("Could not remove partial output {}: {}", output.display(), e);
            }
        }
        result?;

        FileReport::from_paths(input, output)
    }

    fn invoke(&self, program: &Path, args: &[OsString], output: &Path) -> Result<()> {
        log::info!("Using Ghostscript at {}", program.display());
        if let Some(threads) = self.config.rendering_threads {
            log::info!("Rendering with {} threads", threads);
        }

        let result = self.runner.run(program, args).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::GhostscriptNotFound(program.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

        if result.code != Some(0) {
            return Err(Error::GhostscriptFailed {
                code: result.code,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(Error::OutputMissing(output.to_path_buf()));
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
