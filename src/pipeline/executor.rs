//! Run execution engine.
//!
//! Executes a run specification stage by stage (import, clean, embed,
//! cluster, export, plot), timing every stage and collecting non-fatal
//! advisories into a [`RunReport`].

use super::spec::{InputFormat, PipelineSpec, PlotRequest, PlotView};
use crate::algorithms::umap::UmapModel;
use crate::dimred::{ClusterResult, EmbedOptions, Embedding, clean, cluster, embed};
use crate::error::{KeyfiError, Result, ResultExt as _};
use crate::mesh::{Mesh, MeshIo, export_mesh, import_mesh};
use crate::plot::{
    self, DataShapeWarning, Figure, Output, RenderConfig, clustering_view, condensed_tree_view,
    embedding_view, membership_view, model_view,
};
use crate::table::FieldTable;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Wall-clock time spent in one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: &'static str,
    pub duration: Duration,
}

/// Report generated after a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Table size straight after import
    pub rows_before: usize,
    pub columns_before: usize,

    /// Table size after cleaning
    pub rows_after: usize,
    pub columns_after: usize,

    pub embedding_shape: (usize, usize),

    /// Whether the embedding came from an existing dump
    pub embedding_reused: bool,

    pub n_clusters: usize,
    pub has_noise: bool,

    pub stages: Vec<StageTiming>,

    /// Files written during the run
    pub outputs: Vec<PathBuf>,

    /// Warnings generated during execution
    pub warnings: Vec<String>,

    /// Time taken for the whole run
    pub duration: Duration,
}

impl RunReport {
    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Run completed: {} rows x {} columns cleaned to {} x {}, embedding {}x{}{}, {} clusters{}, {} files written, {:.2}s",
            self.rows_before,
            self.columns_before,
            self.rows_after,
            self.columns_after,
            self.embedding_shape.0,
            self.embedding_shape.1,
            if self.embedding_reused { " (reused)" } else { "" },
            self.n_clusters,
            if self.has_noise { " plus noise" } else { "" },
            self.outputs.len(),
            self.duration.as_secs_f64()
        )
    }

    pub fn stage_duration(&self, stage: &str) -> Option<Duration> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.duration)
    }
}

/// Caller-side settings that are not part of the run specification.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Open plots without a save path in a window
    pub show: bool,
    /// Used when the specification carries no render override
    pub render: RenderConfig,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: RunReport,
    pub table: FieldTable,
    pub embedding: Embedding,
    pub model: Option<UmapModel>,
    pub clusters: ClusterResult,
}

#[derive(Default)]
struct Stages(Vec<StageTiming>);

impl Stages {
    fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        tracing::info!("Stage '{stage}' started");
        let out = f()?;
        let duration = start.elapsed();
        tracing::info!("Stage '{stage}' finished in {} ms", duration.as_millis());
        self.0.push(StageTiming { stage, duration });
        Ok(out)
    }
}

/// Execute a run specification, returning only the report
pub fn run_pipeline(spec: &PipelineSpec, io: &dyn MeshIo, options: &RunOptions) -> Result<RunReport> {
    Ok(execute(spec, io, options)?.report)
}

/// Execute a run specification
#[expect(clippy::too_many_lines)]
pub fn execute(spec: &PipelineSpec, io: &dyn MeshIo, options: &RunOptions) -> Result<PipelineRun> {
    let start = Instant::now();
    let resolved = spec.validate()?;
    let render = spec.render.clone().unwrap_or_else(|| options.render.clone());
    let mut stages = Stages::default();
    let mut outputs = Vec::new();
    let mut warnings = Vec::new();

    let (raw, mesh) = stages.time("import", || import(spec, io))?;
    let cleaned = stages.time("clean", || clean(&raw, &spec.cleaning))?;
    check_plot_columns(&spec.plots, &raw, &cleaned)?;

    let (embedding, model, embedding_reused) = stages.time("embed", || {
        if let Some(dump) = &spec.embedding.dump
            && dump.reuse
        {
            let path = Embedding::dump_path(&dump.dir, &dump.name);
            if path.exists() {
                let embedding = Embedding::load(&path)?;
                if embedding.n_samples() != cleaned.n_rows() {
                    return Err(KeyfiError::DataProcessing(format!(
                        "embedding dump {} has {} rows, the cleaned table has {}",
                        path.display(),
                        embedding.n_samples(),
                        cleaned.n_rows()
                    )));
                }
                return Ok((embedding, None, true));
            }
            tracing::info!("No embedding dump at {}, computing", path.display());
        }

        let embed_options = EmbedOptions {
            scale: spec.embedding.scale,
            scaler: spec.embedding.scaler,
            feature: spec.embedding.feature.clone(),
        };
        let (embedding, model) = embed(&cleaned, &resolved.reducer, &embed_options)?;
        if let Some(dump) = &spec.embedding.dump {
            std::fs::create_dir_all(&dump.dir)
                .with_context(|| format!("Failed to create {}", dump.dir.display()))?;
            outputs.push(embedding.save_named(&dump.dir, &dump.name)?);
        }
        Ok((embedding, model, false))
    })?;

    let clusters = stages.time("cluster", || cluster(&embedding, &resolved.clusterer))?;

    if let Some(output) = &spec.output {
        stages.time("export", || {
            let mut mesh = mesh.ok_or_else(|| {
                KeyfiError::invalid_argument("cluster labels can only be written back to a mesh input")
            })?;
            let path = output.path();
            ensure_parent(&path)?;
            export_mesh(io, &mut mesh, &path, Some(clusters.labels()))?;
            outputs.push(path);
            Ok(())
        })?;
    }

    if !spec.plots.is_empty() {
        stages.time("plot", || {
            for (idx, request) in spec.plots.iter().enumerate() {
                let views = Views {
                    raw: &raw,
                    cleaned: &cleaned,
                    embedding: &embedding,
                    model: model.as_ref(),
                    clusters: &clusters,
                    config: &render,
                };
                let (figure, warning) = views.build(request)?;
                if let Some(w) = warning {
                    warnings.push(format!("Plot {}: {w}", idx + 1));
                }
                match (request.save_path(), options.show) {
                    (Some(path), _) => {
                        plot::render(&figure, &Output::Save(path.clone()), &render)?;
                        outputs.push(path);
                    }
                    (None, true) => plot::render(&figure, &Output::Show, &render)?,
                    (None, false) => warnings.push(format!(
                        "Plot {} ({}) skipped: no save path and display disabled",
                        idx + 1,
                        figure.title
                    )),
                }
            }
            Ok(())
        })?;
    }

    let report = RunReport {
        rows_before: raw.n_rows(),
        columns_before: raw.n_cols(),
        rows_after: cleaned.n_rows(),
        columns_after: cleaned.n_cols(),
        embedding_shape: embedding.coords().dim(),
        embedding_reused,
        n_clusters: clusters.n_clusters(),
        has_noise: clusters.has_noise(),
        stages: stages.0,
        outputs,
        warnings,
        duration: start.elapsed(),
    };
    tracing::info!("{}", report.summary());

    Ok(PipelineRun {
        report,
        table: cleaned,
        embedding,
        model,
        clusters,
    })
}

fn import(spec: &PipelineSpec, io: &dyn MeshIo) -> Result<(FieldTable, Option<Mesh>)> {
    match spec.input.format {
        InputFormat::Mesh => {
            let mesh = io.read(&spec.input.path)?;
            let (table, mesh) = import_mesh(&mesh, &spec.input.flatten)?;
            Ok((table, Some(mesh)))
        }
        InputFormat::Csv => Ok((FieldTable::read_csv(&spec.input.path)?, None)),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Picks the table a plot colors by: the cleaned table, or the imported one
/// when cleaning dropped the column but kept every row.
fn color_source<'a>(name: &str, raw: &'a FieldTable, cleaned: &'a FieldTable) -> Option<&'a FieldTable> {
    if cleaned.contains(name) {
        Some(cleaned)
    } else if raw.contains(name) && raw.n_rows() == cleaned.n_rows() {
        Some(raw)
    } else {
        None
    }
}

fn check_plot_columns(plots: &[PlotRequest], raw: &FieldTable, cleaned: &FieldTable) -> Result<()> {
    for request in plots {
        if let PlotView::Embedding {
            color_by: Some(name),
            ..
        } = &request.view
            && color_source(name, raw, cleaned).is_none()
        {
            return Err(KeyfiError::invalid_argument(format!(
                "invalid variable '{name}' for the color map, expected one of: {}",
                cleaned.column_names().join(", ")
            )));
        }
    }
    Ok(())
}

struct Views<'a> {
    raw: &'a FieldTable,
    cleaned: &'a FieldTable,
    embedding: &'a Embedding,
    model: Option<&'a UmapModel>,
    clusters: &'a ClusterResult,
    config: &'a RenderConfig,
}

impl Views<'_> {
    fn build(&self, request: &PlotRequest) -> Result<(Figure, Option<DataShapeWarning>)> {
        match &request.view {
            PlotView::Embedding { color_by, range } => {
                let data = color_by
                    .as_deref()
                    .and_then(|name| color_source(name, self.raw, self.cleaned));
                let figure = embedding_view(
                    self.embedding,
                    data,
                    color_by.as_deref(),
                    range.as_deref(),
                    self.config,
                )?;
                Ok((figure, None))
            }
            PlotView::Clustering => clustering_view(self.embedding, self.clusters.labels(), self.config),
            PlotView::Membership { soft, legend } => Ok((
                membership_view(self.embedding, self.clusters, *soft, *legend, self.config)?,
                None,
            )),
            PlotView::CondensedTree => {
                let tree = self.clusters.condensed_tree().ok_or_else(|| {
                    KeyfiError::invalid_argument("the condensed tree is only available for HDBSCAN")
                })?;
                Ok((condensed_tree_view(tree, self.config)?, None))
            }
            PlotView::Model { labels } => {
                let model = self.model.ok_or_else(|| {
                    KeyfiError::invalid_argument("the model view needs a fitted UMAP model")
                })?;
                model_view(model, labels.then(|| self.clusters.labels()), self.config)
            }
        }
    }
}
