//! Integration tests for the full mesh-to-labels workflow
//!
//! These tests build a synthetic flow field with three well separated
//! regimes, push it through flattening, cleaning, embedding and clustering,
//! and check what comes back out on disk.

#![expect(clippy::indexing_slicing)]

use anyhow::Result;
use keyfi::algorithms::umap::UmapParams;
use keyfi::dimred::{
    CleanOptions, Clusterer, EmbedOptions, KMeansParams, Reducer, clean, cluster, embed,
};
use keyfi::mesh::{
    ArrayData, CLUSTERS_ARRAY, FlattenOptions, JsonMeshIo, Mesh, MeshArray, MeshIo as _,
    export_mesh, import_mesh,
};
use keyfi::pipeline::{PipelineSpec, RunOptions, execute, run_pipeline};
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::path::Path;

/// Pressure plus a 3-component velocity, drawn around three regime centres.
fn three_regime_mesh(n_samples: usize, seed: u64) -> Result<Mesh> {
    let centres = [
        (0.0, [1.0, 0.0, 0.0]),
        (10.0, [-4.0, 6.0, 0.0]),
        (-10.0, [5.0, 8.0, 0.0]),
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut pressure = Vec::with_capacity(n_samples);
    let mut velocity = Vec::with_capacity(n_samples * 3);
    for i in 0..n_samples {
        let (p, u) = centres[i % centres.len()];
        pressure.push(p + rng.gen_range(-0.5..0.5));
        for c in u {
            velocity.push(c + rng.gen_range(-0.5..0.5));
        }
    }
    Ok(Mesh::new(n_samples)
        .with_array(MeshArray::scalar("P", pressure))?
        .with_array(MeshArray::vector("U", 3, velocity)?)?)
}

fn seeded_umap() -> Reducer {
    Reducer::Umap(UmapParams {
        n_neighbors: 15,
        random_state: Some(42),
        ..UmapParams::default()
    })
}

fn seeded_kmeans() -> Clusterer {
    Clusterer::KMeans(KMeansParams {
        n_clusters: 3,
        random_state: Some(42),
        ..KMeansParams::default()
    })
}

#[test]
fn test_mesh_to_labels_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let io = JsonMeshIo::default();
    let mesh = three_regime_mesh(1000, 7)?;

    let (table, mut mesh) = import_mesh(&mesh, &FlattenOptions::default())?;
    assert_eq!(table.n_cols(), 4, "P plus three velocity components");

    let table = clean(&table, &CleanOptions::with_dim(2))?;
    assert_eq!(table.column_names(), vec!["P", "U:0", "U:1"]);

    let (embedding, model) = embed(&table, &seeded_umap(), &EmbedOptions::default())?;
    assert_eq!(embedding.coords().dim(), (1000, 2));
    assert!(model.is_some(), "UMAP returns its fitted model");

    let clusters = cluster(&embedding, &seeded_kmeans())?;
    let distinct: BTreeSet<i32> = clusters.labels().iter().copied().collect();
    assert_eq!(distinct, BTreeSet::from([0, 1, 2]));

    let path = dir.path().join("labelled.json");
    export_mesh(&io, &mut mesh, &path, Some(clusters.labels()))?;

    let back = io.read(&path)?;
    let labels = back
        .array(CLUSTERS_ARRAY)
        .map(|a| a.data.clone())
        .ok_or_else(|| anyhow::anyhow!("no clusters array in {}", path.display()))?;
    assert_eq!(labels, ArrayData::Int32(clusters.labels().to_vec()));
    assert!(back.array("P").is_some(), "existing arrays are kept");
    Ok(())
}

fn write_input(dir: &Path, n_samples: usize) -> Result<std::path::PathBuf> {
    let path = dir.join("flow.json");
    JsonMeshIo::default().write(&three_regime_mesh(n_samples, 11)?, &path)?;
    Ok(path)
}

#[test]
fn test_run_spec_writes_mesh_and_plots() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(dir.path(), 300)?;
    let out_mesh = dir.path().join("out").join("labelled.json");
    let clustering_png = dir.path().join("figs").join("clustering.png");
    let embedding_png = dir.path().join("figs").join("pressure.png");

    let json = serde_json::json!({
        "version": "0.1",
        "name": "three regimes",
        "input": { "path": input },
        "cleaning": { "dim": 2 },
        "embedding": {
            "algorithm": "UMAP",
            "params": { "n_neighbors": 10, "n_epochs": 100, "random_state": 3 }
        },
        "clustering": {
            "algorithm": "KMeans",
            "params": { "n_clusters": 3, "random_state": 3 }
        },
        "output": { "path_template": out_mesh },
        "plots": [
            { "view": "clustering", "save": clustering_png },
            { "view": "embedding", "color_by": "P", "save": embedding_png },
            { "view": "membership", "soft": false }
        ]
    });
    let spec = PipelineSpec::from_json(&json.to_string())?;
    let report = run_pipeline(&spec, &JsonMeshIo::default(), &RunOptions::default())?;

    assert_eq!(report.rows_before, 300);
    assert_eq!(report.columns_before, 4);
    assert_eq!(report.columns_after, 3);
    assert_eq!(report.embedding_shape, (300, 2));
    assert_eq!(report.n_clusters, 3);
    assert!(!report.has_noise);
    assert!(!report.embedding_reused);

    let stages: Vec<&str> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, ["import", "clean", "embed", "cluster", "export", "plot"]);

    assert!(out_mesh.exists());
    assert!(clustering_png.exists());
    assert!(embedding_png.exists());
    assert_eq!(report.outputs.len(), 3);

    // The unsaved membership plot is skipped without --show.
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("skipped"));
    Ok(())
}

#[test]
fn test_embedding_dump_is_reused() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(dir.path(), 120)?;
    let dump_dir = dir.path().join("dumps");

    let mut spec = PipelineSpec::new("dump", input);
    spec.embedding.reducer.params =
        serde_json::json!({ "n_neighbors": 8, "n_epochs": 50, "random_state": 1 });
    spec.embedding.dump = Some(keyfi::pipeline::DumpConfig {
        dir: dump_dir.clone(),
        name: "umap".to_owned(),
        reuse: true,
    });
    spec.clustering.clusterer.algorithm = "KMeans".to_owned();
    spec.clustering.clusterer.params = serde_json::json!({ "n_clusters": 3, "random_state": 1 });

    let io = JsonMeshIo::default();
    let first = execute(&spec, &io, &RunOptions::default())?;
    assert!(!first.report.embedding_reused);
    assert!(first.model.is_some());
    assert!(dump_dir.join("umap.txt").exists());

    let second = execute(&spec, &io, &RunOptions::default())?;
    assert!(second.report.embedding_reused);
    assert!(second.model.is_none(), "a loaded dump carries no model");
    assert_eq!(second.embedding.coords().dim(), (120, 2));

    let max_diff = first
        .embedding
        .coords()
        .iter()
        .zip(second.embedding.coords())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(max_diff < 1e-12, "dump differs by {max_diff}");
    Ok(())
}

#[test]
fn test_missing_color_column_fails_before_embedding() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = write_input(dir.path(), 60)?;
    let dump_dir = dir.path().join("dumps");

    let spec = PipelineSpec::from_json(
        &serde_json::json!({
            "version": "0.1",
            "name": "bad color",
            "input": { "path": input },
            "embedding": {
                "algorithm": "UMAP",
                "dump": { "dir": dump_dir, "name": "never" }
            },
            "plots": [{ "view": "embedding", "color_by": "T" }]
        })
        .to_string(),
    )?;

    let err = run_pipeline(&spec, &JsonMeshIo::default(), &RunOptions::default())
        .err()
        .ok_or_else(|| anyhow::anyhow!("run should fail"))?;
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("'T'"));
    assert!(!dump_dir.exists(), "no embedding work was done");
    Ok(())
}
