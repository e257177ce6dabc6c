//! Configuration module
//!
//! `EngineConfig` collects every tunable the engine uses: surface limits,
//! sharpen coefficients, timeouts, pool lifecycle windows and crop
//! heuristics. Defaults are hand-tuned for constrained hardware and can be
//! overridden through `CRISP_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EngineError;

// Surface limits
const MAX_SURFACE_EDGE: u32 = 4096;
const MAX_TOTAL_PIXELS: u64 = 16_777_216;
const AI_PIXEL_CEILING: u64 = 8_388_608;
const AI_MAX_EDGE: u32 = 8192;
const MAX_RESIZE_DIMENSION: u32 = 8192;
const TILE_EDGE: u32 = 512;

// Sharpen kernel
const SHARPEN_CENTER: f32 = 1.5;
const SHARPEN_NEIGHBOR: f32 = 0.125;

// Timeouts
const DECODE_TIMEOUT_SECS: u64 = 60;
const OPERATION_TIMEOUT_SECS: u64 = 30;
const LARGE_INPUT_BYTES: u64 = 20 * 1024 * 1024;

// Upscaler pool lifecycle
const POOL_IDLE_WINDOW_MS: u64 = 30_000;
const SOFT_CLEANUP_IDLE_MS: u64 = 60_000;
const MONITOR_INTERVAL_SECS: u64 = 15;
const MEMORY_PRESSURE_PERCENT: f64 = 85.0;

// Batch pacing
const INTER_IMAGE_PAUSE_MS: u64 = 25;

// Crop heuristics
const FOCAL_EDGE_THRESHOLD: f32 = 30.0;
const FOCAL_DEVIATION_THRESHOLD: f32 = 0.15;
const SUBJECT_MARGIN: f32 = 0.1;

/// Engine configuration snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Largest edge a pooled upscale surface may have
    pub max_surface_edge: u32,
    /// Largest pixel count any single surface may have
    pub max_total_pixels: u64,
    /// Inputs above this pixel count skip subject detection
    pub ai_pixel_ceiling: u64,
    /// Inputs with an edge above this skip subject detection
    pub ai_max_edge: u32,
    /// Resize targets are clamped to this dimension; no output edge may exceed it
    pub max_resize_dimension: u32,
    /// Edge of a tile for tiled CPU resampling
    pub tile_edge: u32,
    pub sharpen_center: f32,
    pub sharpen_neighbor: f32,
    pub decode_timeout: Duration,
    pub operation_timeout: Duration,
    /// Sources larger than this use the decode timeout for every step
    pub large_input_bytes: u64,
    pub pool_idle_window: Duration,
    pub soft_cleanup_idle: Duration,
    pub monitor_interval: Duration,
    pub memory_pressure_percent: f64,
    pub inter_image_pause: Duration,
    pub focal_edge_threshold: f32,
    pub focal_deviation_threshold: f32,
    /// Margin kept between a detected subject and the crop window, as a fraction of the window
    pub subject_margin: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_surface_edge: MAX_SURFACE_EDGE,
            max_total_pixels: MAX_TOTAL_PIXELS,
            ai_pixel_ceiling: AI_PIXEL_CEILING,
            ai_max_edge: AI_MAX_EDGE,
            max_resize_dimension: MAX_RESIZE_DIMENSION,
            tile_edge: TILE_EDGE,
            sharpen_center: SHARPEN_CENTER,
            sharpen_neighbor: SHARPEN_NEIGHBOR,
            decode_timeout: Duration::from_secs(DECODE_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(OPERATION_TIMEOUT_SECS),
            large_input_bytes: LARGE_INPUT_BYTES,
            pool_idle_window: Duration::from_millis(POOL_IDLE_WINDOW_MS),
            soft_cleanup_idle: Duration::from_millis(SOFT_CLEANUP_IDLE_MS),
            monitor_interval: Duration::from_secs(MONITOR_INTERVAL_SECS),
            memory_pressure_percent: MEMORY_PRESSURE_PERCENT,
            inter_image_pause: Duration::from_millis(INTER_IMAGE_PAUSE_MS),
            focal_edge_threshold: FOCAL_EDGE_THRESHOLD,
            focal_deviation_threshold: FOCAL_DEVIATION_THRESHOLD,
            subject_margin: SUBJECT_MARGIN,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable setting, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let config = Self {
            max_surface_edge: env_or("CRISP_MAX_SURFACE_EDGE", MAX_SURFACE_EDGE),
            max_total_pixels: env_or("CRISP_MAX_TOTAL_PIXELS", MAX_TOTAL_PIXELS),
            ai_pixel_ceiling: env_or("CRISP_AI_PIXEL_CEILING", AI_PIXEL_CEILING),
            ai_max_edge: env_or("CRISP_AI_MAX_EDGE", AI_MAX_EDGE),
            max_resize_dimension: env_or("CRISP_MAX_RESIZE_DIMENSION", MAX_RESIZE_DIMENSION),
            tile_edge: env_or("CRISP_TILE_EDGE", TILE_EDGE),
            sharpen_center: env_or("CRISP_SHARPEN_CENTER", SHARPEN_CENTER),
            sharpen_neighbor: env_or("CRISP_SHARPEN_NEIGHBOR", SHARPEN_NEIGHBOR),
            decode_timeout: Duration::from_secs(env_or(
                "CRISP_DECODE_TIMEOUT_SECS",
                DECODE_TIMEOUT_SECS,
            )),
            operation_timeout: Duration::from_secs(env_or(
                "CRISP_OPERATION_TIMEOUT_SECS",
                OPERATION_TIMEOUT_SECS,
            )),
            large_input_bytes: env_or("CRISP_LARGE_INPUT_BYTES", LARGE_INPUT_BYTES),
            pool_idle_window: Duration::from_millis(env_or(
                "CRISP_POOL_IDLE_WINDOW_MS",
                POOL_IDLE_WINDOW_MS,
            )),
            soft_cleanup_idle: Duration::from_millis(env_or(
                "CRISP_SOFT_CLEANUP_IDLE_MS",
                SOFT_CLEANUP_IDLE_MS,
            )),
            monitor_interval: Duration::from_secs(env_or(
                "CRISP_MONITOR_INTERVAL_SECS",
                MONITOR_INTERVAL_SECS,
            )),
            memory_pressure_percent: env_or(
                "CRISP_MEMORY_PRESSURE_PERCENT",
                MEMORY_PRESSURE_PERCENT,
            ),
            inter_image_pause: Duration::from_millis(env_or(
                "CRISP_INTER_IMAGE_PAUSE_MS",
                INTER_IMAGE_PAUSE_MS,
            )),
            focal_edge_threshold: env_or("CRISP_FOCAL_EDGE_THRESHOLD", FOCAL_EDGE_THRESHOLD),
            focal_deviation_threshold: env_or(
                "CRISP_FOCAL_DEVIATION_THRESHOLD",
                FOCAL_DEVIATION_THRESHOLD,
            ),
            subject_margin: env_or("CRISP_SUBJECT_MARGIN", SUBJECT_MARGIN),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_surface_edge == 0 || self.max_total_pixels == 0 {
            return Err(anyhow::anyhow!("Surface limits must be greater than zero"));
        }
        if self.tile_edge < 16 {
            return Err(anyhow::anyhow!(
                "CRISP_TILE_EDGE must be at least 16, got {}",
                self.tile_edge
            ));
        }
        if self.max_resize_dimension == 0 {
            return Err(anyhow::anyhow!("CRISP_MAX_RESIZE_DIMENSION must be positive"));
        }
        if !(0.0..=100.0).contains(&self.memory_pressure_percent) {
            return Err(anyhow::anyhow!(
                "CRISP_MEMORY_PRESSURE_PERCENT must be between 0 and 100"
            ));
        }
        if !(0.0..0.5).contains(&self.subject_margin) {
            return Err(anyhow::anyhow!("CRISP_SUBJECT_MARGIN must be in [0, 0.5)"));
        }
        if self.operation_timeout.is_zero() || self.decode_timeout.is_zero() {
            return Err(anyhow::anyhow!("Timeouts must be non-zero"));
        }
        Ok(())
    }

    /// Fails with `ResourceLimitExceeded` when a `width` x `height` output
    /// surface is over the edge or pixel budget
    pub fn check_output_surface(&self, width: u32, height: u32) -> Result<(), EngineError> {
        if width.max(height) > self.max_resize_dimension {
            return Err(EngineError::ResourceLimitExceeded {
                width,
                height,
                limit: format!("max edge {}", self.max_resize_dimension),
            });
        }
        if width as u64 * height as u64 > self.max_total_pixels {
            return Err(EngineError::ResourceLimitExceeded {
                width,
                height,
                limit: format!("{} pixels", self.max_total_pixels),
            });
        }
        Ok(())
    }

    /// `width` x `height` scaled down, keeping the aspect ratio, until it fits
    /// the output budget
    pub fn fit_output_surface(&self, width: u32, height: u32) -> (u32, u32) {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        let by_edge = self.max_resize_dimension as f64 / w.max(h);
        let by_pixels = (self.max_total_pixels as f64 / (w * h)).sqrt();
        let factor = by_edge.min(by_pixels).min(1.0);
        (
            ((w * factor).floor() as u32).max(1),
            ((h * factor).floor() as u32).max(1),
        )
    }

    /// Timeout applied to a step, given the size of the source it works on
    pub fn timeout_for(&self, source_bytes: u64) -> Duration {
        if source_bytes > self.large_input_bytes {
            self.decode_timeout
        } else {
            self.operation_timeout
        }
    }
}
