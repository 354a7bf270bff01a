//! dcm-convert: batch converter from DCM containers to mesh formats
//!
//! Scans a directory tree for `.dcm` files, decodes each one and writes the
//! recovered mesh into a timestamped subdirectory of the output directory.

#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use libdcm::{container, decode_str, write_mesh, DecoderConfig, ExportFormat};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const ACCEPTED_EXTENSIONS: [&str; 2] = ["dcm", "DCM"];

/// Command-line arguments for the converter
#[derive(Parser, Debug)]
#[command(name = "dcm-convert", version, about = "Convert DCM packed-geometry containers to STL/PLY/OBJ")]
struct Args {
    /// Directory scanned recursively for DCM files
    #[arg(short = 'i', long = "input_dir")]
    input_dir: PathBuf,

    /// Destination directory; a timestamped subdirectory is created inside
    #[arg(short = 'o', long = "output_dir")]
    output_dir: PathBuf,

    /// Output format: stl, stlb, obj or ply
    #[arg(short = 'f', long = "format", default_value = "stl")]
    format: String,

    /// Treat checksum mismatches as fatal for the file
    #[arg(long)]
    strict: bool,

    /// Decrypt with the legacy per-block byte order
    #[arg(long)]
    swap64: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DCM_LOG", default_value = "info")]
    log: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    let format = ExportFormat::from_name(&args.format)
        .with_context(|| format!("unknown output format '{}'", args.format))?;

    if !args.input_dir.exists() {
        bail!("input directory not found: {}", args.input_dir.display());
    }

    let files = collect_input_files(&args.input_dir);
    info!(count = files.len(), dir = %args.input_dir.display(), "collected input files");
    if files.is_empty() {
        warn!("nothing to convert");
        return Ok(());
    }

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
    let out_dir = args.output_dir.join(timestamp);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    info!(dir = %out_dir.display(), "output directory created");

    let config = DecoderConfig::new()
        .with_strict_checksum(args.strict)
        .with_swap64(args.swap64);

    let mut converted = 0usize;
    for file in &files {
        match convert_file(file, &out_dir, format, &config) {
            Ok(()) => converted += 1,
            Err(err) => warn!(file = %file.display(), error = %err, "conversion failed"),
        }
    }
    info!(converted, total = files.len(), "done");

    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

/// Find every DCM file below the input directory, skipping dot-files
fn collect_input_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(true);
        if hidden || !path.is_file() {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if accepted {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

fn convert_file(
    path: &Path,
    out_dir: &Path,
    format: ExportFormat,
    config: &DecoderConfig,
) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let xml = container::read_container_bytes(&bytes)
        .with_context(|| format!("unwrapping {}", path.display()))?;

    let decoded = decode_str(&xml, config);
    for diagnostic in &decoded.diagnostics {
        warn!(file = %path.display(), %diagnostic, "decode diagnostic");
    }
    if decoded.mesh.is_empty() {
        bail!("no usable geometry in {}", path.display());
    }

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("mesh");
    let out_path = out_dir.join(stem).with_extension(format.extension());

    let file = File::create(&out_path)
        .with_context(|| format!("creating {}", out_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_mesh(&decoded.mesh, format, &mut writer)
        .with_context(|| format!("writing {}", out_path.display()))?;

    info!(
        file = %path.display(),
        output = %out_path.display(),
        vertices = decoded.mesh.vertices.len(),
        triangles = decoded.mesh.triangles.len(),
        verified = decoded.verified,
        source_app = decoded.source_app.as_deref().unwrap_or("-"),
        "converted"
    );
    Ok(())
}
