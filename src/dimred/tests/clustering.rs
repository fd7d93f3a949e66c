#![expect(clippy::unwrap_used, clippy::indexing_slicing)]
use super::blobs;
use crate::algorithms::hdbscan::HdbscanParams;
use crate::dimred::{
    ClusterResult, Clusterer, ClustererKind, Embedding, KMeansInitMethod, KMeansParams, cluster,
};
use anyhow::Result;
use std::collections::BTreeSet;

fn seeded_kmeans(n_clusters: usize) -> Clusterer {
    Clusterer::KMeans(KMeansParams {
        n_clusters,
        random_state: Some(11),
        ..KMeansParams::default()
    })
}

#[test]
fn test_kmeans_labels_are_exactly_k() -> Result<()> {
    let embedding = Embedding::new(blobs(20));
    let result = cluster(&embedding, &seeded_kmeans(3))?;
    let labels: BTreeSet<i32> = result.labels().iter().copied().collect();
    assert_eq!(labels, BTreeSet::from([0, 1, 2]));
    assert!(!result.has_noise());
    assert!(result.probabilities().iter().all(|&p| p == 1.0));
    assert!(result.soft_membership().is_none());
    assert!(result.condensed_tree().is_none());
    assert_eq!(result.centroids().unwrap().dim(), (3, 2));
    Ok(())
}

#[test]
fn test_kmeans_recovers_blobs() -> Result<()> {
    let embedding = Embedding::new(blobs(20));
    let result = cluster(&embedding, &seeded_kmeans(3))?;
    for chunk in result.labels().chunks(20) {
        let distinct: BTreeSet<_> = chunk.iter().collect();
        assert_eq!(distinct.len(), 1, "blob split across clusters: {chunk:?}");
    }
    Ok(())
}

#[test]
fn test_hdbscan_labels_subset_with_noise_sentinel() -> Result<()> {
    let mut coords = blobs(15);
    coords[[0, 0]] = 500.0;
    let embedding = Embedding::new(coords);
    let clusterer = Clusterer::Hdbscan(HdbscanParams {
        min_cluster_size: 5,
        prediction_data: true,
        ..HdbscanParams::default()
    });
    let result = cluster(&embedding, &clusterer)?;
    let k = result.n_clusters() as i32;
    assert!(k >= 2);
    assert!(result.labels().iter().all(|&l| l >= -1 && l < k));
    assert_eq!(result.labels()[0], -1);
    assert!(result.has_noise());
    assert!(result.condensed_tree().is_some());
    let membership = result.soft_membership().unwrap();
    assert_eq!(membership.dim(), (45, k as usize));
    Ok(())
}

#[test]
fn test_hdbscan_membership_requires_prediction_data() -> Result<()> {
    let embedding = Embedding::new(blobs(10));
    let result = cluster(&embedding, &Clusterer::default())?;
    assert_eq!(result.n_samples(), 30);
    assert!(result.soft_membership().is_none());
    Ok(())
}

#[test]
fn test_provider_errors_pass_through() -> Result<()> {
    let embedding = Embedding::new(blobs(10));
    let clusterer = Clusterer::Hdbscan(HdbscanParams {
        min_cluster_size: 1,
        ..HdbscanParams::default()
    });
    let err = cluster(&embedding, &clusterer).unwrap_err();
    assert!(err.is_upstream());
    assert_eq!(err.to_string(), "Min cluster size must be greater than one");
    Ok(())
}

#[test]
fn test_clusterer_from_parts() -> Result<()> {
    let clusterer = Clusterer::from_parts(
        "KMeans",
        serde_json::json!({ "n_clusters": 4, "init": "random" }),
    )?;
    assert_eq!(clusterer.kind(), ClustererKind::KMeans);
    let Clusterer::KMeans(params) = &clusterer else {
        unreachable!()
    };
    assert_eq!(params.n_clusters, 4);
    assert_eq!(params.init, KMeansInitMethod::Random);

    let err = Clusterer::from_parts("DBSCAN", serde_json::Value::Null).unwrap_err();
    assert!(err.is_invalid_argument());
    Ok(())
}

#[test]
fn test_tagged_json_form() -> Result<()> {
    let clusterer: Clusterer =
        serde_json::from_str(r#"{ "algorithm": "HDBSCAN", "min_cluster_size": 12 }"#)?;
    assert_eq!(
        clusterer,
        Clusterer::Hdbscan(HdbscanParams {
            min_cluster_size: 12,
            ..HdbscanParams::default()
        })
    );
    Ok(())
}

#[test]
fn test_result_from_parts_checks_lengths() -> Result<()> {
    assert!(ClusterResult::from_parts(vec![0, 1], vec![1.0], None).is_err());
    let result = ClusterResult::from_parts(vec![0, -1, 1, 1], vec![1.0, 0.0, 0.5, 0.9], None)?;
    assert_eq!(result.n_clusters(), 2);
    assert!(result.has_noise());
    Ok(())
}
