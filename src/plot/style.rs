use serde::{Deserialize, Serialize};

/// Rendering settings passed explicitly into every view and backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Figure size in pixels.
    pub width: u32,
    pub height: u32,
    /// Pixels per typographic point; marker areas are given in points².
    pub dpi: f32,
    /// Marker area is `point_constant / sqrt(n)` when sizing by count.
    pub point_constant: f64,
    pub scale_points: bool,
    /// Marker area when `scale_points` is off.
    pub fixed_point_size: f64,
    /// Membership views draw markers this many times larger.
    pub membership_scale: f64,
    pub membership_alpha: f32,
    /// Above this many clusters a colorbar replaces the legend.
    pub legend_max_clusters: usize,
    /// Above this many clusters a warning is emitted.
    pub warn_clusters: usize,
    pub background: [u8; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 600,
            height: 500,
            dpi: 100.0,
            point_constant: 100.0,
            scale_points: true,
            fixed_point_size: 20.0,
            membership_scale: 5.0,
            membership_alpha: 0.5,
            legend_max_clusters: 12,
            warn_clusters: 30,
            background: [255, 255, 255],
        }
    }
}

impl RenderConfig {
    /// Marker area in points² for a scatter of `n` samples.
    pub fn point_area(&self, n: usize) -> f64 {
        if self.scale_points {
            self.point_constant / (n.max(1) as f64).sqrt()
        } else {
            self.fixed_point_size
        }
    }

    /// Marker area for the membership view.
    pub fn membership_area(&self, n: usize) -> f64 {
        if self.scale_points {
            self.membership_scale * self.point_area(n)
        } else {
            self.fixed_point_size
        }
    }

    /// Marker radius in pixels for an area in points².
    pub fn radius_px(&self, area: f64) -> f32 {
        (area.max(0.0).sqrt() / 2.0) as f32 * self.dpi / 72.0
    }
}
