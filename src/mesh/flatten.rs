use super::{Mesh, MeshArray, MeshIo};
use crate::error::{KeyfiError, Result};
use crate::table::{ColumnSchema, FieldTable};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-sample validity flag written by the solver.
pub const GHOST_ARRAY: &str = "vtkGhostType";
/// Per-block timestamp carried by multi-block inputs.
pub const TIME_ARRAY: &str = "TimeValue";
/// Array written on export.
pub const CLUSTERS_ARRAY: &str = "clusters";

/// Ghost values in this closed range mark a valid sample.
const VALID_GHOST_RANGE: (f64, f64) = (0.0, 0.99);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlattenOptions {
    /// Drop samples whose ghost flag marks them invalid before flattening.
    pub remove_ghost_cells: bool,
    /// Arrays that never become columns.
    pub excluded: Vec<String>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            remove_ghost_cells: true,
            excluded: vec![GHOST_ARRAY.to_owned(), TIME_ARRAY.to_owned()],
        }
    }
}

/// Returns a copy of `mesh` without the samples flagged invalid by the ghost
/// array. A mesh without a per-sample ghost array is returned unchanged.
pub fn remove_ghost_samples(mesh: &Mesh) -> Result<Mesh> {
    let Some(ghost) = mesh.array(GHOST_ARRAY) else {
        return Ok(mesh.clone());
    };
    if !mesh.is_sample_array(ghost) || ghost.width() != 1 {
        tracing::debug!("Ghost array is not per-sample, skipping pre-filter");
        return Ok(mesh.clone());
    }
    let (lo, hi) = VALID_GHOST_RANGE;
    let keep: Vec<bool> = ghost
        .component(0)
        .into_iter()
        .map(|g| (lo..=hi).contains(&g))
        .collect();
    let filtered = mesh.retain_samples(&keep)?;
    tracing::debug!(
        "Ghost pre-filter kept {} of {} samples",
        filtered.n_samples(),
        mesh.n_samples()
    );
    Ok(filtered)
}

/// Builds a Field Table from every per-sample array not in the exclusion set.
///
/// Scalar arrays come first in mesh order, followed by the components of each
/// vector array. A `[n, 1]` array is a scalar. Arrays that are not per-sample
/// are skipped.
pub fn flatten(mesh: &Mesh, options: &FlattenOptions) -> Result<FieldTable> {
    let mut scalars = Vec::new();
    let mut components = Vec::new();

    for array in mesh.arrays() {
        if options.excluded.iter().any(|e| e == &array.name) {
            continue;
        }
        if !mesh.is_sample_array(array) {
            tracing::debug!(
                "Skipping array '{}' with {} rows on a {}-sample mesh",
                array.name,
                array.rows(),
                mesh.n_samples()
            );
            continue;
        }
        match array.width() {
            1 => scalars.push((ColumnSchema::scalar(array.name.clone()), array.component(0))),
            width => components.extend(expand(array, width)),
        }
    }

    scalars.extend(components);
    FieldTable::from_columns(scalars)
}

fn expand(array: &MeshArray, width: usize) -> Vec<(ColumnSchema, Vec<f64>)> {
    (0..width)
        .map(|i| {
            (
                ColumnSchema::component(&array.name, i, width),
                array.component(i),
            )
        })
        .collect()
}

/// Applies the ghost pre-filter (when enabled) and flattens the result.
///
/// Returns the table together with the mesh it was built from, which is the
/// mesh cluster labels must later be attached to.
pub fn import_mesh(mesh: &Mesh, options: &FlattenOptions) -> Result<(FieldTable, Mesh)> {
    let mesh = if options.remove_ghost_cells {
        remove_ghost_samples(mesh)?
    } else {
        mesh.clone()
    };
    let table = flatten(&mesh, options)?;
    tracing::info!(
        "Flattened mesh into {} rows x {} columns",
        table.n_rows(),
        table.n_cols()
    );
    Ok((table, mesh))
}

/// Attaches `labels` as the `clusters` array (when given) and writes the mesh.
pub fn export_mesh(
    io: &dyn MeshIo,
    mesh: &mut Mesh,
    path: &Path,
    labels: Option<&[i32]>,
) -> Result<()> {
    if let Some(labels) = labels {
        if labels.len() != mesh.n_samples() {
            return Err(KeyfiError::invalid_argument(format!(
                "{} cluster labels for a mesh of {} samples",
                labels.len(),
                mesh.n_samples()
            )));
        }
        mesh.add_array(MeshArray::labels(CLUSTERS_ARRAY, labels.to_vec()))?;
    }
    io.write(mesh, path)?;
    tracing::info!("Mesh written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ArrayData;

    fn mesh_with_ghosts() -> Result<Mesh> {
        Mesh::new(4)
            .with_array(MeshArray::scalar("p", vec![1.0, 2.0, 3.0, 4.0]))?
            .with_array(MeshArray::vector(
                "U",
                2,
                vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5],
            )?)?
            .with_array(MeshArray::scalar(GHOST_ARRAY, vec![0.0, 2.0, 0.0, 1.0]))?
            .with_array(MeshArray::scalar(TIME_ARRAY, vec![0.1]))
    }

    #[test]
    fn test_flatten_orders_scalars_first() -> Result<()> {
        let mesh = Mesh::new(2)
            .with_array(MeshArray::vector("U", 2, vec![1.0, 2.0, 3.0, 4.0])?)?
            .with_array(MeshArray::scalar("T", vec![5.0, 6.0]))?;
        let table = flatten(&mesh, &FlattenOptions::default())?;
        assert_eq!(table.column_names(), vec!["T", "U:0", "U:1"]);
        assert_eq!(table.values("U:1")?, vec![2.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_single_column_array_is_scalar() -> Result<()> {
        let mesh = Mesh::new(3).with_array(MeshArray::vector("k", 1, vec![1.0, 2.0, 3.0])?)?;
        let table = flatten(&mesh, &FlattenOptions::default())?;
        assert_eq!(table.column_names(), vec!["k"]);
        Ok(())
    }

    #[test]
    fn test_import_removes_ghost_rows_and_excluded_arrays() -> Result<()> {
        let (table, filtered) = import_mesh(&mesh_with_ghosts()?, &FlattenOptions::default())?;
        assert_eq!(filtered.n_samples(), 2);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column_names(), vec!["p", "U:0", "U:1"]);
        assert_eq!(table.values("p")?, vec![1.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_import_without_prefilter_keeps_rows() -> Result<()> {
        let options = FlattenOptions {
            remove_ghost_cells: false,
            excluded: vec![TIME_ARRAY.to_owned()],
        };
        let (table, _) = import_mesh(&mesh_with_ghosts()?, &options)?;
        assert_eq!(table.n_rows(), 4);
        assert!(table.contains(GHOST_ARRAY));
        Ok(())
    }

    /// Keeps written meshes in memory.
    #[derive(Default)]
    struct RecordingIo {
        written: std::cell::RefCell<Vec<Mesh>>,
    }

    impl MeshIo for RecordingIo {
        fn read(&self, path: &Path) -> Result<Mesh> {
            Err(KeyfiError::invalid_argument(format!(
                "nothing to read at {}",
                path.display()
            )))
        }

        fn write(&self, mesh: &Mesh, _path: &Path) -> Result<()> {
            self.written.borrow_mut().push(mesh.clone());
            Ok(())
        }
    }

    #[test]
    fn test_export_rejects_label_count_mismatch() -> Result<()> {
        let io = RecordingIo::default();
        let mut mesh = Mesh::new(3).with_array(MeshArray::scalar("p", vec![1.0, 2.0, 3.0]))?;

        let err = export_mesh(&io, &mut mesh, Path::new("out.json"), Some(&[0, 1][..]))
            .err()
            .ok_or_else(|| KeyfiError::Other("two labels for three samples".to_owned()))?;
        assert!(err.is_invalid_argument());
        assert!(mesh.array(CLUSTERS_ARRAY).is_none());
        assert!(io.written.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn test_export_replaces_existing_clusters() -> Result<()> {
        let io = RecordingIo::default();
        let mut mesh = Mesh::new(3)
            .with_array(MeshArray::scalar("p", vec![1.0, 2.0, 3.0]))?
            .with_array(MeshArray::labels(CLUSTERS_ARRAY, vec![9, 9, 9]))?;

        export_mesh(&io, &mut mesh, Path::new("out.json"), Some(&[0, -1, 1][..]))?;

        let count = mesh
            .arrays()
            .iter()
            .filter(|a| a.name == CLUSTERS_ARRAY)
            .count();
        assert_eq!(count, 1);
        assert_eq!(
            mesh.array(CLUSTERS_ARRAY).map(|a| a.data.clone()),
            Some(ArrayData::Int32(vec![0, -1, 1]))
        );
        assert_eq!(*io.written.borrow(), vec![mesh]);
        Ok(())
    }

    #[test]
    fn test_empty_mesh_yields_empty_table() -> Result<()> {
        let table = flatten(&Mesh::new(10), &FlattenOptions::default())?;
        assert!(table.is_empty());
        Ok(())
    }
}
