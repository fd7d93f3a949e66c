use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use keyfi::config::AppConfig;
use keyfi::mesh::JsonMeshIo;
use keyfi::pipeline::{PipelineSpec, PlotRequest, PlotView, RunOptions, run_pipeline};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "keyfi",
    about = "Dimensionality reduction and clustering of flow field data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a run specification
    Run {
        /// Path to the JSON run specification
        spec: PathBuf,

        /// Override the input path named in the specification
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Open plots that have no save path in a window
        #[arg(long)]
        show: bool,
    },
    /// Check a run specification without touching any data
    Validate {
        /// Path to the JSON run specification
        spec: PathBuf,
    },
    /// Write a starter run specification
    Template {
        /// Where to write the specification
        output: PathBuf,

        /// Input mesh the specification points at
        #[arg(short, long, default_value = "data/input.json")]
        input: PathBuf,

        /// Run name
        #[arg(long, default_value = "keyfi run")]
        name: String,
    },
}

pub fn run_command(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Run { spec, input, show } => handle_run(spec, input, show, config),
        Commands::Validate { spec } => handle_validate(spec),
        Commands::Template {
            output,
            input,
            name,
        } => handle_template(output, input, name),
    }
}

fn handle_run(
    spec_path: PathBuf,
    input: Option<PathBuf>,
    show: bool,
    config: &AppConfig,
) -> Result<()> {
    let mut spec = PipelineSpec::from_file(&spec_path)
        .with_context(|| format!("Loading {}", spec_path.display()))?;
    if let Some(input) = input {
        spec.input.path = input;
    }
    println!("Running '{}' on {}...", spec.name, spec.input.path.display());

    let options = RunOptions {
        show,
        render: config.render.clone(),
    };
    let report = run_pipeline(&spec, &JsonMeshIo { pretty: false }, &options)?;

    for stage in &report.stages {
        println!("  {:<8} {:>8} ms", stage.stage, stage.duration.as_millis());
    }
    for warning in &report.warnings {
        println!("Warning: {warning}");
    }
    for output in &report.outputs {
        println!("Wrote {}", output.display());
    }
    println!("{}", report.summary());
    Ok(())
}

fn handle_validate(spec_path: PathBuf) -> Result<()> {
    let spec = PipelineSpec::from_file(&spec_path)?;
    let resolved = spec.validate()?;
    println!(
        "'{}' is valid: {} embedding, {} clustering, {} plots",
        spec.name,
        resolved.reducer.kind(),
        resolved.clusterer.kind(),
        spec.plots.len()
    );
    Ok(())
}

fn handle_template(output: PathBuf, input: PathBuf, name: String) -> Result<()> {
    let mut spec = PipelineSpec::new(name, input);
    spec.plots = vec![
        PlotRequest {
            view: PlotView::Embedding {
                color_by: None,
                range: None,
            },
            save: Some("plots/{date}/embedding.png".to_owned()),
        },
        PlotRequest {
            view: PlotView::Clustering,
            save: Some("plots/{date}/clustering.png".to_owned()),
        },
        PlotRequest {
            view: PlotView::CondensedTree,
            save: Some("plots/{date}/condensed_tree.png".to_owned()),
        },
    ];
    spec.validate()?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    spec.to_file(&output)?;
    println!("Template written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn template_is_a_valid_spec() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("run.json");
        handle_template(path.clone(), PathBuf::from("mesh.json"), "t".to_owned())?;

        let spec = PipelineSpec::from_file(&path)?;
        spec.validate()?;
        assert_eq!(spec.plots.len(), 3);
        assert_eq!(spec.input.path, PathBuf::from("mesh.json"));
        Ok(())
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from(["keyfi", "run", "spec.json", "--show", "-i", "m.json"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Run { show: true, input: Some(_), .. })
        ));
    }
}
