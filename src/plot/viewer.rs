//! Interactive display backend.

use super::figure::{Figure, Guide};
use super::style::RenderConfig;
use crate::error::{KeyfiError, Result};
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Plot, PlotPoints, Points, Polygon};
use std::collections::BTreeMap;

struct FigureApp {
    figure: Figure,
    /// Scatter points bucketed by color, one plot item per bucket.
    buckets: Vec<(Color32, Vec<[f64; 2]>)>,
    radius: f32,
}

impl FigureApp {
    fn new(figure: Figure, config: &RenderConfig) -> Self {
        let mut by_color: BTreeMap<[u8; 4], Vec<[f64; 2]>> = BTreeMap::new();
        let mut radius = 1.0;
        if let Some(scatter) = &figure.scatter {
            radius = config.radius_px(scatter.area).max(1.0);
            let alpha = (scatter.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
            for (p, c) in scatter.points.iter().zip(&scatter.colors) {
                let color = Color32::from_rgba_unmultiplied(c.r(), c.g(), c.b(), alpha);
                by_color.entry(color.to_array()).or_default().push(*p);
            }
        }
        let buckets = by_color
            .into_iter()
            .map(|([r, g, b, a], points)| (Color32::from_rgba_premultiplied(r, g, b, a), points))
            .collect();
        Self {
            figure,
            buckets,
            radius,
        }
    }

    fn guide_panel(&self, ui: &mut egui::Ui) {
        match &self.figure.guide {
            Guide::None => {}
            Guide::Legend { title, entries } => {
                ui.strong(title);
                for entry in entries {
                    ui.horizontal(|ui| {
                        let (rect, _) =
                            ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                        ui.painter().rect_filled(rect, 2.0, entry.color);
                        ui.label(entry.label.as_str());
                    });
                }
            }
            Guide::Colorbar {
                label,
                min,
                max,
                stops,
            } => {
                ui.strong(label);
                ui.label(format!("{max:.3}"));
                let height = (ui.available_height() - 40.0).max(40.0);
                let (rect, _) =
                    ui.allocate_exact_size(egui::vec2(20.0, height), egui::Sense::hover());
                let n = stops.len().max(1);
                let step = rect.height() / n as f32;
                for (i, color) in stops.iter().rev().enumerate() {
                    let top = rect.top() + step * i as f32;
                    let band = egui::Rect::from_min_max(
                        egui::pos2(rect.left(), top),
                        egui::pos2(rect.right(), top + step),
                    );
                    ui.painter().rect_filled(band, 0.0, *color);
                }
                ui.label(format!("{min:.3}"));
            }
        }
    }
}

impl eframe::App for FigureApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !matches!(self.figure.guide, Guide::None) {
            egui::SidePanel::right("guide")
                .resizable(false)
                .default_width(110.0)
                .show(ctx, |ui| self.guide_panel(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            let mut plot = Plot::new(format!("figure_{}", self.figure.title))
                .show_axes(self.figure.show_axes)
                .show_grid(false)
                .show_x(false)
                .show_y(false)
                .legend(Legend::default());
            if self.figure.equal_aspect {
                plot = plot.data_aspect(1.0);
            }
            plot.show(ui, |plot_ui| {
                for rect in &self.figure.rects {
                    let corners = vec![
                        [rect.min[0], rect.min[1]],
                        [rect.max[0], rect.min[1]],
                        [rect.max[0], rect.max[1]],
                        [rect.min[0], rect.max[1]],
                    ];
                    plot_ui.polygon(
                        Polygon::new("", PlotPoints::from(corners))
                            .fill_color(rect.color)
                            .stroke(egui::Stroke::new(0.5, Color32::from_gray(40))),
                    );
                }
                for (color, points) in &self.buckets {
                    plot_ui.points(
                        Points::new("", PlotPoints::from(points.clone()))
                            .color(*color)
                            .radius(self.radius)
                            .filled(true),
                    );
                }
            });
        });
    }
}

/// Opens a window showing `figure` and blocks until it is closed.
pub fn show(figure: &Figure, config: &RenderConfig) -> Result<()> {
    let title = format!("keyfi: {}", figure.title);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([config.width as f32, config.height as f32]),
        ..Default::default()
    };
    let app = FigureApp::new(figure.clone(), config);
    tracing::info!("Showing '{}'", figure.title);
    eframe::run_native(&title, options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| KeyfiError::Render(e.to_string()))
}
