use crisp_core::models::CropPosition;
use image::imageops::{self, FilterType};

use crate::raster::Raster;

/// Surfaces above this many pixels are analyzed on a downsampled copy
pub const ANALYSIS_PIXEL_LIMIT: u64 = 1_000_000;

/// A point of visual interest in raster coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocalPoint {
    pub x: f32,
    pub y: f32,
}

fn luminance(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// Edge-density focal point estimation
pub struct FocalPointEstimator {
    edge_threshold: f32,
}

impl FocalPointEstimator {
    pub fn new(edge_threshold: f32) -> Self {
        Self { edge_threshold }
    }

    /// Centroid of strong edges, or the geometric center when there are none
    pub fn estimate(&self, raster: &Raster) -> FocalPoint {
        let (width, height) = (raster.width(), raster.height());
        let center = FocalPoint {
            x: width as f32 / 2.0,
            y: height as f32 / 2.0,
        };

        if raster.pixel_count() > ANALYSIS_PIXEL_LIMIT {
            let factor = (raster.pixel_count() as f64 / ANALYSIS_PIXEL_LIMIT as f64).sqrt();
            let dw = ((width as f64 / factor).floor() as u32).max(1);
            let dh = ((height as f64 / factor).floor() as u32).max(1);
            let small = Raster::from_rgba(imageops::resize(
                raster.as_rgba(),
                dw,
                dh,
                FilterType::Triangle,
            ));
            tracing::debug!(width, height, dw, dh, "Estimating focal point on downsampled copy");
            return match self.edge_centroid(&small) {
                Some(p) => FocalPoint {
                    x: p.x * width as f32 / dw as f32,
                    y: p.y * height as f32 / dh as f32,
                },
                None => center,
            };
        }

        self.edge_centroid(raster).unwrap_or(center)
    }

    fn edge_centroid(&self, raster: &Raster) -> Option<FocalPoint> {
        let (width, height) = (raster.width() as usize, raster.height() as usize);
        if width < 3 || height < 3 {
            return None;
        }
        let data = raster.as_bytes();
        let stride = raster.stride();
        let lum = |x: usize, y: usize| {
            let i = y * stride + x * 4;
            luminance(&data[i..i + 4])
        };

        let (mut sum_x, mut sum_y, mut count) = (0f64, 0f64, 0u64);
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let here = lum(x, y);
                let strength = (here - lum(x + 1, y)).abs() + (here - lum(x, y + 1)).abs();
                if strength > self.edge_threshold {
                    sum_x += x as f64;
                    sum_y += y as f64;
                    count += 1;
                }
            }
        }

        (count > 0).then(|| FocalPoint {
            x: (sum_x / count as f64) as f32,
            y: (sum_y / count as f64) as f32,
        })
    }

    /// Move `baseline` toward the focal point's octant when it is far enough off center.
    ///
    /// Each axis is adjusted independently; deviation is relative to the surface size.
    pub fn adjust_anchor(
        baseline: CropPosition,
        point: FocalPoint,
        width: u32,
        height: u32,
        deviation_threshold: f32,
    ) -> CropPosition {
        let dx = (point.x - width as f32 / 2.0) / width.max(1) as f32;
        let dy = (point.y - height as f32 / 2.0) / height.max(1) as f32;

        let axis = |delta: f32, base: i8| {
            if delta > deviation_threshold {
                1
            } else if delta < -deviation_threshold {
                -1
            } else {
                base
            }
        };
        CropPosition::from_placement(
            axis(dx, baseline.horizontal()),
            axis(dy, baseline.vertical()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn with_square(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> Raster {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        Raster::from_rgba(img)
    }

    #[test]
    fn test_flat_image_returns_center() {
        let estimator = FocalPointEstimator::new(30.0);
        let point = estimator.estimate(&Raster::filled(200, 100, [80, 80, 80, 255]));
        assert_eq!(point, FocalPoint { x: 100.0, y: 50.0 });
    }

    #[test]
    fn test_edges_pull_point() {
        let estimator = FocalPointEstimator::new(30.0);
        let point = estimator.estimate(&with_square(200, 200, 150, 20, 20));
        assert!(point.x > 140.0 && point.x < 175.0, "x = {}", point.x);
        assert!(point.y > 10.0 && point.y < 45.0, "y = {}", point.y);
    }

    #[test]
    fn test_large_surface_scaled_back() {
        let estimator = FocalPointEstimator::new(30.0);
        let point = estimator.estimate(&with_square(2000, 1000, 1700, 100, 200));
        assert!(point.x > 1600.0 && point.x < 1950.0, "x = {}", point.x);
        assert!(point.y > 50.0 && point.y < 350.0, "y = {}", point.y);
    }

    #[test]
    fn test_adjust_anchor_threshold() {
        let near = FocalPoint { x: 110.0, y: 50.0 };
        assert_eq!(
            FocalPointEstimator::adjust_anchor(CropPosition::Center, near, 200, 100, 0.15),
            CropPosition::Center
        );
        let far = FocalPoint { x: 190.0, y: 5.0 };
        assert_eq!(
            FocalPointEstimator::adjust_anchor(CropPosition::Center, far, 200, 100, 0.15),
            CropPosition::TopRight
        );
        let left = FocalPoint { x: 10.0, y: 50.0 };
        assert_eq!(
            FocalPointEstimator::adjust_anchor(CropPosition::Center, left, 200, 100, 0.15),
            CropPosition::Left
        );
    }
}
