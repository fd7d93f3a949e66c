//! Save-to-file backend: rasterizes a [`Figure`] into a PNG.
//!
//! No text is drawn. Legends appear as a column of swatches and colorbars as
//! a gradient strip to the right of the plot area.

use super::figure::{Figure, Guide};
use super::style::RenderConfig;
use crate::error::{KeyfiError, Result, ResultExt as _};
use egui::Color32;
use image::{Rgba, RgbaImage};
use std::path::Path;

const MARGIN: f64 = 20.0;
const GUIDE_WIDTH: f64 = 60.0;
const SWATCH: i64 = 12;
const SWATCH_GAP: i64 = 6;
const FRAME_COLOR: Color32 = Color32::from_gray(64);

/// Maps data coordinates onto the pixel plot area.
struct Transform {
    min: [f64; 2],
    scale: [f64; 2],
    origin: [f64; 2],
}

impl Transform {
    fn new(figure: &Figure, area_min: [f64; 2], area_size: [f64; 2]) -> Self {
        let (min, max) = figure.data_bounds().unwrap_or(([0.0, 0.0], [1.0, 1.0]));
        let span = |lo: f64, hi: f64| if hi > lo { hi - lo } else { 1.0 };
        let dx = span(min[0], max[0]);
        let dy = span(min[1], max[1]);
        let mut sx = area_size[0] / dx;
        let mut sy = area_size[1] / dy;
        if figure.equal_aspect {
            let s = sx.min(sy);
            sx = s;
            sy = s;
        }
        let origin = [
            area_min[0] + (area_size[0] - dx * sx) / 2.0,
            area_min[1] + (area_size[1] - dy * sy) / 2.0,
        ];
        Self {
            min: [min[0], max[1]],
            scale: [sx, sy],
            origin,
        }
    }

    fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [
            self.origin[0] + (p[0] - self.min[0]) * self.scale[0],
            self.origin[1] + (self.min[1] - p[1]) * self.scale[1],
        ]
    }
}

fn blend(img: &mut RgbaImage, x: i64, y: i64, color: Color32, alpha: f32) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    let Some(px) = img.get_pixel_mut_checked(x, y) else {
        return;
    };
    let a = alpha.clamp(0.0, 1.0);
    let src = [color.r(), color.g(), color.b()];
    for (dst, s) in px.0.iter_mut().zip(src) {
        *dst = (f32::from(s) * a + f32::from(*dst) * (1.0 - a)).round() as u8;
    }
}

fn fill_rect(img: &mut RgbaImage, min: [f64; 2], max: [f64; 2], color: Color32) {
    let x0 = min[0].min(max[0]).round() as i64;
    let x1 = min[0].max(max[0]).round() as i64;
    let y0 = min[1].min(max[1]).round() as i64;
    let y1 = min[1].max(max[1]).round() as i64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            blend(img, x, y, color, 1.0);
        }
    }
}

fn fill_circle(img: &mut RgbaImage, center: [f64; 2], radius: f64, color: Color32, alpha: f32) {
    let r = radius.max(0.5);
    let x0 = (center[0] - r).floor() as i64;
    let x1 = (center[0] + r).ceil() as i64;
    let y0 = (center[1] - r).floor() as i64;
    let y1 = (center[1] + r).ceil() as i64;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - center[0];
            let dy = y as f64 - center[1];
            if dx * dx + dy * dy <= r * r {
                blend(img, x, y, color, alpha);
            }
        }
    }
}

fn frame(img: &mut RgbaImage, min: [f64; 2], max: [f64; 2]) {
    fill_rect(img, min, [max[0], min[1]], FRAME_COLOR);
    fill_rect(img, [min[0], max[1]], max, FRAME_COLOR);
    fill_rect(img, min, [min[0], max[1]], FRAME_COLOR);
    fill_rect(img, [max[0], min[1]], max, FRAME_COLOR);
}

fn draw_guide(img: &mut RgbaImage, guide: &Guide, left: f64, top: f64, height: f64) {
    match guide {
        Guide::None => {}
        Guide::Legend { entries, .. } => {
            let x = left.round() as i64;
            let mut y = top.round() as i64;
            for entry in entries {
                fill_rect(
                    img,
                    [x as f64, y as f64],
                    [(x + SWATCH) as f64, (y + SWATCH) as f64],
                    entry.color,
                );
                y += SWATCH + SWATCH_GAP;
            }
        }
        Guide::Colorbar { stops, .. } => {
            if stops.is_empty() {
                return;
            }
            let rows = height.max(1.0).round() as i64;
            for i in 0..=rows {
                // Top of the strip is the maximum.
                let t = 1.0 - i as f64 / rows as f64;
                let color = sample_stops(stops, t);
                let y = top + i as f64;
                fill_rect(img, [left, y], [left + 2.0 * SWATCH as f64, y], color);
            }
            frame(img, [left, top], [left + 2.0 * SWATCH as f64, top + rows as f64]);
        }
    }
}

/// Linear interpolation across evenly spaced color stops.
fn sample_stops(stops: &[Color32], t: f64) -> Color32 {
    if stops.len() == 1 {
        return stops.first().copied().unwrap_or(Color32::BLACK);
    }
    let scaled = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let lo = scaled.floor() as usize;
    let frac = (scaled - lo as f64) as f32;
    match (stops.get(lo), stops.get(lo + 1)) {
        (Some(&a), Some(&b)) => a.lerp_to_gamma(b, frac),
        (Some(&a), None) => a,
        _ => Color32::BLACK,
    }
}

/// Draws `figure` into a new image of `config.width` × `config.height`.
pub fn rasterize(figure: &Figure, config: &RenderConfig) -> RgbaImage {
    let [r, g, b] = config.background;
    let mut img = RgbaImage::from_pixel(config.width, config.height, Rgba([r, g, b, 255]));

    let guide_width = if matches!(figure.guide, Guide::None) {
        0.0
    } else {
        GUIDE_WIDTH
    };
    let area_min = [MARGIN, MARGIN];
    let area_size = [
        (f64::from(config.width) - 2.0 * MARGIN - guide_width).max(1.0),
        (f64::from(config.height) - 2.0 * MARGIN).max(1.0),
    ];
    let transform = Transform::new(figure, area_min, area_size);

    for rect in &figure.rects {
        fill_rect(&mut img, transform.apply(rect.min), transform.apply(rect.max), rect.color);
    }

    if let Some(scatter) = &figure.scatter {
        let radius = f64::from(config.radius_px(scatter.area));
        for (p, &color) in scatter.points.iter().zip(&scatter.colors) {
            if p[0].is_finite() && p[1].is_finite() {
                fill_circle(&mut img, transform.apply(*p), radius, color, scatter.alpha);
            }
        }
    }

    if figure.show_axes {
        frame(
            &mut img,
            area_min,
            [area_min[0] + area_size[0], area_min[1] + area_size[1]],
        );
    }

    draw_guide(
        &mut img,
        &figure.guide,
        area_min[0] + area_size[0] + MARGIN / 2.0,
        area_min[1],
        area_size[1],
    );
    img
}

/// Rasterizes `figure` and writes it as a PNG.
pub fn save_png(figure: &Figure, path: &Path, config: &RenderConfig) -> Result<()> {
    if config.width == 0 || config.height == 0 {
        return Err(KeyfiError::invalid_argument(format!(
            "figure size must be positive, got {}x{}",
            config.width, config.height
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    rasterize(figure, config).save(path)?;
    tracing::info!("Saved '{}' to {}", figure.title, path.display());
    Ok(())
}
