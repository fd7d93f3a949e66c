//! Palettes, colormaps and the cluster-membership colorizer.

use crate::dimred::ClusterResult;
use crate::error::{KeyfiError, Result};
use egui::Color32;
use egui::ecolor::Hsva;

/// Fixed color for noise samples (label `-1`).
pub const NOISE_COLOR: Color32 = Color32::from_gray(128);

/// Marker color when nothing else decides it.
pub const DEFAULT_COLOR: Color32 = Color32::from_rgb(31, 119, 180);

const HUE_OFFSET: f32 = 0.01;
const PALETTE_SATURATION: f32 = 0.65;
const PALETTE_VALUE: f32 = 0.9;

const INFERNO: [(u8, u8, u8); 10] = [
    (0, 0, 4),
    (27, 12, 65),
    (74, 12, 107),
    (120, 28, 109),
    (165, 44, 96),
    (207, 68, 70),
    (237, 105, 37),
    (251, 155, 6),
    (247, 209, 61),
    (252, 255, 164),
];

/// `n` evenly spaced hues of equal saturation and brightness.
pub fn palette(n: usize) -> Vec<Color32> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32 + HUE_OFFSET).fract();
            Color32::from(Hsva::new(hue, PALETTE_SATURATION, PALETTE_VALUE, 1.0))
        })
        .collect()
}

/// Samples the inferno colormap at `t`, clamped to `[0, 1]`.
pub fn inferno(t: f64) -> Color32 {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (INFERNO.len() - 1) as f64;
    let lo = scaled.floor() as usize;
    let hi = (lo + 1).min(INFERNO.len() - 1);
    let frac = scaled - lo as f64;
    let (Some(&a), Some(&b)) = (INFERNO.get(lo), INFERNO.get(hi)) else {
        return Color32::BLACK;
    };
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * frac).round() as u8;
    Color32::from_rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// How much to wash out a sample with the given confidence: `1 - confidence`,
/// clamped to `[0, 1]`.
pub fn desaturation(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 1.0;
    }
    (1.0 - confidence).clamp(0.0, 1.0)
}

/// Scales the saturation of `color` by `1 - factor`.
pub fn desaturate(color: Color32, factor: f64) -> Color32 {
    let factor = factor.clamp(0.0, 1.0) as f32;
    if factor == 0.0 {
        return color;
    }
    let mut hsva = Hsva::from(color);
    hsva.s *= 1.0 - factor;
    Color32::from(hsva)
}

/// Palette entry for a hard label; gray for noise.
pub fn label_color(label: i32, palette: &[Color32]) -> Color32 {
    usize::try_from(label)
        .ok()
        .and_then(|i| palette.get(i).copied())
        .unwrap_or(NOISE_COLOR)
}

/// Per-sample display colors derived from a clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberColors {
    pub colors: Vec<Color32>,
    /// One entry per non-noise cluster.
    pub palette: Vec<Color32>,
    /// Factor applied to each sample, always in `[0, 1]`.
    pub desaturation: Vec<f64>,
    pub has_noise: bool,
}

impl MemberColors {
    /// Swatches in label order, noise first when present.
    pub fn legend_colors(&self) -> Vec<Color32> {
        let mut out = Vec::with_capacity(self.palette.len() + 1);
        if self.has_noise {
            out.push(NOISE_COLOR);
        }
        out.extend(self.palette.iter().copied());
        out
    }
}

/// Colors every sample by its cluster, washed out by `1 - probability`.
///
/// With `soft` the base color is the cluster holding the largest share of the
/// sample's soft membership, independent of its hard label, which requires
/// the clustering to carry a membership matrix.
pub fn colorize(result: &ClusterResult, soft: bool) -> Result<MemberColors> {
    let palette = palette(result.n_clusters());
    let base: Vec<Color32> = if soft {
        let membership = result.soft_membership().ok_or_else(|| {
            KeyfiError::invalid_argument(
                "soft coloring needs a clustering with soft membership \
                 (HDBSCAN with prediction_data enabled)",
            )
        })?;
        membership
            .rows()
            .into_iter()
            .map(|row| {
                // An empty row means no cluster was selected at all.
                row.iter()
                    .enumerate()
                    .reduce(|best, cur| if cur.1 > best.1 { cur } else { best })
                    .and_then(|(i, _)| palette.get(i).copied())
                    .unwrap_or(NOISE_COLOR)
            })
            .collect()
    } else {
        result
            .labels()
            .iter()
            .map(|&l| label_color(l, &palette))
            .collect()
    };

    let desaturation: Vec<f64> = result
        .probabilities()
        .iter()
        .map(|&p| desaturation(p))
        .collect();
    let colors = base
        .into_iter()
        .zip(&desaturation)
        .map(|(c, &d)| desaturate(c, d))
        .collect();

    Ok(MemberColors {
        colors,
        palette,
        desaturation,
        has_noise: result.has_noise(),
    })
}
