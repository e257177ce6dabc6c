use crisp_core::EngineConfig;

/// Integer scales served by pooled enlargers
pub const POOLED_SCALES: [u32; 3] = [2, 3, 4];

/// Tier reported for the direct CPU resampling path
pub const CPU_SCALE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscalePath {
    /// Enlarge through a pooled resource, then resize to the final size
    Pooled,
    /// Resample straight to the final size
    Cpu,
    /// Resample straight to the final size, one tile at a time
    CpuTiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleSelection {
    pub scale: u32,
    /// The preferred scale was reduced to stay within surface limits
    pub adjusted: bool,
    pub path: UpscalePath,
}

/// Largest per-axis ratio between `source` and `target`
pub fn required_ratio(source: (u32, u32), target: (u32, u32)) -> f32 {
    let rx = target.0 as f32 / source.0.max(1) as f32;
    let ry = target.1 as f32 / source.1.max(1) as f32;
    rx.max(ry)
}

fn is_safe(source: (u32, u32), scale: u32, config: &EngineConfig) -> bool {
    let w = source.0 as u64 * scale as u64;
    let h = source.1 as u64 * scale as u64;
    w <= config.max_surface_edge as u64
        && h <= config.max_surface_edge as u64
        && w * h <= config.max_total_pixels
}

/// Pick the enlargement strategy for growing `source` to cover `target`
pub fn select_scale(source: (u32, u32), target: (u32, u32), config: &EngineConfig) -> ScaleSelection {
    let ratio = required_ratio(source, target);
    let cpu_path = || {
        let pixels = target.0 as u64 * target.1 as u64;
        let path = if pixels > config.max_total_pixels {
            UpscalePath::CpuTiled
        } else {
            UpscalePath::Cpu
        };
        ScaleSelection {
            scale: CPU_SCALE,
            adjusted: false,
            path,
        }
    };

    let Some(preferred) = POOLED_SCALES.iter().copied().find(|s| *s as f32 >= ratio) else {
        return cpu_path();
    };

    if is_safe(source, preferred, config) {
        return ScaleSelection {
            scale: preferred,
            adjusted: false,
            path: UpscalePath::Pooled,
        };
    }

    match POOLED_SCALES
        .iter()
        .rev()
        .copied()
        .find(|s| *s < preferred && is_safe(source, *s, config))
    {
        Some(reduced) => {
            tracing::debug!(preferred, reduced, "Reducing upscale factor to fit surface limits");
            ScaleSelection {
                scale: reduced,
                adjusted: true,
                path: UpscalePath::Pooled,
            }
        }
        None => cpu_path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_scale() {
        let config = EngineConfig::default();
        let s = select_scale((300, 200), (600, 400), &config);
        assert_eq!(s, ScaleSelection { scale: 2, adjusted: false, path: UpscalePath::Pooled });
        let s = select_scale((300, 200), (1000, 400), &config);
        assert_eq!(s.scale, 4);
    }

    #[test]
    fn test_reduced_scale_is_flagged() {
        let config = EngineConfig::default();
        // x4 would give a 4800px edge; x3 gives 3600
        let s = select_scale((1200, 100), (4400, 300), &config);
        assert_eq!(s, ScaleSelection { scale: 3, adjusted: true, path: UpscalePath::Pooled });
    }

    #[test]
    fn test_cpu_paths() {
        let config = EngineConfig::default();
        let s = select_scale((100, 100), (900, 900), &config);
        assert_eq!(s, ScaleSelection { scale: CPU_SCALE, adjusted: false, path: UpscalePath::Cpu });

        let s = select_scale((1000, 1000), (5000, 5000), &config);
        assert_eq!(s.path, UpscalePath::CpuTiled);
    }

    #[test]
    fn test_nothing_safe_falls_to_cpu() {
        let config = EngineConfig::default();
        let s = select_scale((3000, 3000), (5000, 5000), &config);
        assert_eq!(s.scale, CPU_SCALE);
        assert_eq!(s.path, UpscalePath::CpuTiled);
    }
}
