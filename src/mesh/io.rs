use super::{Mesh, TIME_ARRAY};
use crate::error::{KeyfiError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reads and writes whole meshes. All-or-nothing: a failed read returns no
/// partial mesh and a failed write leaves no guarantee about the target file.
pub trait MeshIo {
    fn read(&self, path: &Path) -> Result<Mesh>;
    fn write(&self, mesh: &Mesh, path: &Path) -> Result<()>;
}

/// On-disk layout accepted by [`JsonMeshIo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeshDocument {
    MultiBlock { blocks: Vec<Mesh> },
    Single(Mesh),
}

impl MeshDocument {
    /// The mesh a run operates on. Multi-block documents contribute their
    /// first block, without its `TimeValue` array.
    pub fn into_mesh(self) -> Result<Mesh> {
        match self {
            Self::Single(mesh) => Ok(mesh),
            Self::MultiBlock { blocks } => {
                let n_blocks = blocks.len();
                let mut mesh = blocks.into_iter().next().ok_or_else(|| {
                    KeyfiError::DataProcessing("multi-block mesh has no blocks".to_owned())
                })?;
                if n_blocks > 1 {
                    tracing::warn!("Multi-block mesh has {n_blocks} blocks, using the first");
                }
                mesh.remove_array(TIME_ARRAY);
                Ok(mesh)
            }
        }
    }
}

/// JSON mesh files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMeshIo {
    pub pretty: bool,
}

impl MeshIo for JsonMeshIo {
    fn read(&self, path: &Path) -> Result<Mesh> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mesh {}", path.display()))?;
        let doc: MeshDocument = serde_json::from_str(&content)?;
        let mesh = doc.into_mesh()?;
        mesh.validate()?;
        tracing::debug!(
            "Read mesh {} with {} samples and arrays {:?}",
            path.display(),
            mesh.n_samples(),
            mesh.array_names()
        );
        Ok(mesh)
    }

    fn write(&self, mesh: &Mesh, path: &Path) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(mesh)?
        } else {
            serde_json::to_string(mesh)?
        };
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write mesh {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshArray;

    #[test]
    fn test_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mesh.json");
        let mesh = Mesh::new(2)
            .with_array(MeshArray::scalar("p", vec![1.5, 2.5]))?
            .with_array(MeshArray::labels("clusters", vec![0, -1]))?;

        let io = JsonMeshIo::default();
        io.write(&mesh, &path)?;
        assert_eq!(io.read(&path)?, mesh);
        Ok(())
    }

    #[test]
    fn test_multiblock_uses_first_block() -> Result<()> {
        let json = r#"{
            "blocks": [
                {
                    "n_samples": 2,
                    "arrays": [
                        {"name": "p", "shape": [2], "data": {"type": "float64", "values": [1.0, 2.0]}},
                        {"name": "TimeValue", "shape": [1], "data": {"type": "float64", "values": [0.5]}}
                    ]
                },
                {"n_samples": 1, "arrays": []}
            ]
        }"#;
        let doc: MeshDocument = serde_json::from_str(json)?;
        let mesh = doc.into_mesh()?;
        assert_eq!(mesh.n_samples(), 2);
        assert_eq!(mesh.array_names(), vec!["p"]);
        Ok(())
    }

    #[test]
    fn test_read_rejects_inconsistent_shape() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"n_samples": 2, "arrays": [{"name": "U", "shape": [2, 3], "data": {"type": "float64", "values": [1.0]}}]}"#,
        )?;
        assert!(JsonMeshIo::default().read(&path).is_err());
        Ok(())
    }
}
