//! Crisp CLI: batch image transformation from the command line.
//!
//! Engine tunables come from CRISP_* variables; set CRISP_MODEL_BASE_URL to
//! enable remote detection and enlargement models.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crisp_cli::{init_tracing, load_asset, parse_size, result_summary, write_results};
use crisp_core::models::{
    CompressionOptions, CropMode, CropOptions, CropPosition, OutputFormat, OutputOptions,
    ProcessedResult, ProcessingConfig, ResizeOptions, TemplateSpec,
};
use crisp_core::EngineConfig;
use crisp_infra::{init_telemetry, SystemMemoryMonitor};
use crisp_plugins::{ModelId, RemoteModelConfig, RemoteModelProvider};
use crisp_processing::{ModelProvider, OfflineModelProvider, ProcessingEngine};

#[derive(Parser)]
#[command(name = "crisp", about = "Batch image transformation engine")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply one set of options to every input image
    Batch {
        /// Input image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output formats, comma separated: jpeg, png, webp, avif
        #[arg(long, value_delimiter = ',', default_value = "webp")]
        format: Vec<String>,
        /// Encoder quality in [0, 1]
        #[arg(long, default_value = "0.85")]
        quality: f32,
        /// Target output size in KB for lossy formats
        #[arg(long)]
        target_kb: Option<u32>,
        /// Resize so the longest side equals this many pixels
        #[arg(long)]
        resize: Option<u32>,
        /// Crop to WIDTHxHEIGHT
        #[arg(long)]
        crop: Option<String>,
        /// Crop mode: standard or smart
        #[arg(long, default_value = "standard")]
        mode: String,
        /// Anchor for standard crops, e.g. center, top-left
        #[arg(long, default_value = "center")]
        position: String,
        /// Rename outputs to PATTERN-01, PATTERN-02, ...
        #[arg(long)]
        rename: Option<String>,
        /// Use remote detection and enlargement models when configured
        #[arg(long)]
        ai: bool,
        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },
    /// Render one image to every template in a catalog
    Templates {
        /// Input image file
        file: PathBuf,
        /// JSON catalog; the built-in catalog is used when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Only templates for this platform
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        ai: bool,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the built-in template catalog
    Catalog,
    /// Check model ids against the model files in a directory
    VerifyModels {
        /// Directory holding model files
        dir: PathBuf,
        /// Model ids to check; defaults to those in the remote manifest
        ids: Vec<String>,
    },
}

fn parse_mode(mode: &str) -> anyhow::Result<CropMode> {
    match mode.trim().to_lowercase().as_str() {
        "standard" => Ok(CropMode::Standard),
        "smart" => Ok(CropMode::Smart),
        other => anyhow::bail!("invalid crop mode '{}', expected standard or smart", other),
    }
}

/// Remote provider when requested and configured, otherwise offline
fn model_provider(ai: bool) -> anyhow::Result<(Arc<dyn ModelProvider>, bool)> {
    if !ai {
        return Ok((Arc::new(OfflineModelProvider), false));
    }
    match RemoteModelConfig::from_env()? {
        Some(config) => {
            tracing::info!(base_url = %config.base_url, "Using remote models");
            Ok((Arc::new(RemoteModelProvider::new(config)?), true))
        }
        None => {
            tracing::warn!("--ai given but CRISP_MODEL_BASE_URL is not set, continuing without models");
            Ok((Arc::new(OfflineModelProvider), false))
        }
    }
}

fn build_engine(ai: bool) -> anyhow::Result<(ProcessingEngine, bool)> {
    let config = EngineConfig::from_env().context("Invalid CRISP_* configuration")?;
    let (provider, ai_available) = model_provider(ai)?;
    let pressure = Arc::new(SystemMemoryMonitor::new(config.memory_pressure_percent));
    let engine = ProcessingEngine::builder()
        .config(config)
        .model_provider(provider)
        .memory_pressure(pressure)
        .on_progress(|phase, percent| tracing::info!(phase, percent, "Progress"))
        .build()?;
    engine.init();
    Ok((engine, ai_available))
}

async fn finish(
    engine: ProcessingEngine,
    results: Vec<ProcessedResult>,
    out: &Path,
) -> anyhow::Result<()> {
    for result in &results {
        println!("{}", result_summary(result));
    }
    let written = write_results(out, &results).await?;
    let failed = results.iter().filter(|r| !r.is_success()).count();
    tracing::info!(written = written.len(), failed, out = %out.display(), "Results written");
    engine.dispose().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if cli.log_json {
        init_telemetry(true).map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;
    } else {
        init_tracing();
    }

    match cli.command {
        Commands::Batch {
            files,
            format,
            quality,
            target_kb,
            resize,
            crop,
            mode,
            position,
            rename,
            ai,
            out,
        } => {
            let formats = format
                .iter()
                .map(|f| OutputFormat::parse(f))
                .collect::<Result<Vec<_>, _>>()?;
            let crop_size = crop.as_deref().map(parse_size).transpose()?;
            let config = ProcessingConfig {
                compression: CompressionOptions {
                    quality,
                    target_size_kb: target_kb,
                },
                output: OutputOptions {
                    formats,
                    rename: rename.is_some(),
                    pattern: rename,
                },
                resize: ResizeOptions {
                    enabled: resize.is_some(),
                    dimension: resize,
                },
                crop: CropOptions {
                    enabled: crop_size.is_some(),
                    width: crop_size.map(|(w, _)| w),
                    height: crop_size.map(|(_, h)| h),
                    mode: parse_mode(&mode)?,
                    position: CropPosition::parse(&position)?,
                },
            };

            let mut assets = Vec::with_capacity(files.len());
            for file in &files {
                assets.push(load_asset(file).await?);
            }

            let (engine, ai_available) = build_engine(ai)?;
            let results = engine.process_batch(&assets, &config, ai_available).await?;
            finish(engine, results, &out).await?;
        }
        Commands::Templates {
            file,
            catalog,
            platform,
            ai,
            out,
        } => {
            let mut specs = match catalog {
                Some(path) => {
                    let json = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    TemplateSpec::catalog_from_json(&json)?
                }
                None => TemplateSpec::default_catalog(),
            };
            if let Some(platform) = platform {
                specs.retain(|s| s.platform.eq_ignore_ascii_case(&platform));
            }
            if specs.is_empty() {
                anyhow::bail!("no templates selected");
            }

            let asset = load_asset(&file).await?;
            let (engine, ai_available) = build_engine(ai)?;
            let results = engine.expand_templates(&asset, &specs, ai_available).await?;
            finish(engine, results, &out).await?;
        }
        Commands::Catalog => {
            let out = serde_json::to_string_pretty(&TemplateSpec::default_catalog())
                .context("Serialize catalog")?;
            println!("{}", out);
        }
        Commands::VerifyModels { dir, ids } => {
            let ids = if ids.is_empty() {
                let config = RemoteModelConfig::from_env()?
                    .context("No ids given and CRISP_MODEL_BASE_URL is not set")?;
                let manifest = RemoteModelProvider::new(config)?.manifest().await?;
                manifest.model_ids().into_iter().map(str::to_string).collect()
            } else {
                ids
            };

            let mut files = Vec::new();
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }

            let report = crisp_plugins::verify(
                ids.iter().map(String::as_str),
                files.iter().map(String::as_str),
            );
            for id in &report.malformed {
                println!("malformed  {}", id);
            }
            for id in &report.duplicates {
                println!("duplicate  {}", id);
            }
            for id in &report.missing {
                let file = ModelId::parse(id).map(|m| m.file_name()).unwrap_or_default();
                println!("missing    {} ({})", id, file);
            }
            for file in &report.unused {
                println!("unused     {}", file);
            }
            if !report.is_ok() {
                anyhow::bail!("model catalog check failed");
            }
            println!("ok: {} models verified", ids.len());
        }
    }

    Ok(())
}
