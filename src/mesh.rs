//! Mesh handles, mesh file I/O and flattening into a [`FieldTable`].
//!
//! A [`Mesh`] is an ordered collection of named arrays over a fixed number of
//! samples (points or cells). Arrays are either one value per sample (shape
//! `[n]`) or `k` components per sample (shape `[n, k]`). Arrays whose leading
//! dimension differs from the sample count are kept as mesh-level field data
//! and never become table columns.
//!
//! [`FieldTable`]: crate::table::FieldTable

pub mod flatten;
pub mod io;

pub use flatten::{
    CLUSTERS_ARRAY, FlattenOptions, GHOST_ARRAY, TIME_ARRAY, export_mesh, flatten, import_mesh,
    remove_ghost_samples,
};
pub use io::{JsonMeshIo, MeshDocument, MeshIo};

use crate::error::{KeyfiError, Result};
use serde::{Deserialize, Serialize};

/// Raw values of a mesh array, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ArrayData {
    Float64(Vec<f64>),
    Int32(Vec<i32>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        match self {
            Self::Float64(v) => v.get(idx).copied(),
            Self::Int32(v) => v.get(idx).map(|&x| f64::from(x)),
        }
    }

    fn gather(&self, indices: &[usize]) -> Self {
        match self {
            Self::Float64(v) => Self::Float64(indices.iter().filter_map(|&i| v.get(i).copied()).collect()),
            Self::Int32(v) => Self::Int32(indices.iter().filter_map(|&i| v.get(i).copied()).collect()),
        }
    }
}

/// A named array attached to a mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshArray {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl MeshArray {
    /// One value per sample.
    pub fn scalar(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            shape: vec![values.len()],
            data: ArrayData::Float64(values),
        }
    }

    /// `width` components per sample, given row-major.
    pub fn vector(name: impl Into<String>, width: usize, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if width == 0 || values.len() % width != 0 {
            return Err(KeyfiError::invalid_argument(format!(
                "array '{name}' has {} values, not a multiple of width {width}",
                values.len()
            )));
        }
        Ok(Self {
            shape: vec![values.len() / width, width],
            name,
            data: ArrayData::Float64(values),
        })
    }

    /// Integer labels, one per sample.
    pub fn labels(name: impl Into<String>, labels: Vec<i32>) -> Self {
        Self {
            name: name.into(),
            shape: vec![labels.len()],
            data: ArrayData::Int32(labels),
        }
    }

    /// Total element count across all components.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Leading dimension (number of rows).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Components per row; 1 for one-dimensional arrays.
    pub fn width(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(1)
    }

    /// Value at (`row`, `component`).
    pub fn value(&self, row: usize, component: usize) -> Option<f64> {
        self.data.get(row * self.width() + component)
    }

    /// All values of one component, in row order.
    pub fn component(&self, component: usize) -> Vec<f64> {
        (0..self.rows())
            .filter_map(|row| self.value(row, component))
            .collect()
    }

    fn check_shape(&self) -> Result<()> {
        let expected: usize = self.shape.iter().product();
        if self.shape.is_empty() || self.shape.len() > 2 || expected != self.size() {
            return Err(KeyfiError::DataProcessing(format!(
                "array '{}' declares shape {:?} but holds {} values",
                self.name,
                self.shape,
                self.size()
            )));
        }
        Ok(())
    }

    fn take_rows(&self, rows: &[usize]) -> Self {
        let width = self.width();
        let flat: Vec<usize> = rows
            .iter()
            .flat_map(|&r| (r * width)..((r + 1) * width))
            .collect();
        let mut shape = self.shape.clone();
        if let Some(first) = shape.first_mut() {
            *first = rows.len();
        }
        Self {
            name: self.name.clone(),
            shape,
            data: self.data.gather(&flat),
        }
    }
}

/// Named arrays over a fixed number of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    n_samples: usize,
    arrays: Vec<MeshArray>,
}

impl Mesh {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            arrays: Vec::new(),
        }
    }

    /// Builder-style [`Mesh::add_array`].
    pub fn with_array(mut self, array: MeshArray) -> Result<Self> {
        self.add_array(array)?;
        Ok(self)
    }

    /// Attaches an array, replacing any existing array of the same name.
    pub fn add_array(&mut self, array: MeshArray) -> Result<()> {
        array.check_shape()?;
        if let Some(existing) = self.arrays.iter_mut().find(|a| a.name == array.name) {
            *existing = array;
        } else {
            self.arrays.push(array);
        }
        Ok(())
    }

    pub fn remove_array(&mut self, name: &str) -> Option<MeshArray> {
        let idx = self.arrays.iter().position(|a| a.name == name)?;
        Some(self.arrays.remove(idx))
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn arrays(&self) -> &[MeshArray] {
        &self.arrays
    }

    pub fn array(&self, name: &str) -> Option<&MeshArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn array_names(&self) -> Vec<&str> {
        self.arrays.iter().map(|a| a.name.as_str()).collect()
    }

    /// Whether the array has one row per sample.
    pub fn is_sample_array(&self, array: &MeshArray) -> bool {
        array.rows() == self.n_samples
    }

    /// Checks every array against its declared shape.
    pub fn validate(&self) -> Result<()> {
        self.arrays.iter().try_for_each(MeshArray::check_shape)
    }

    /// New mesh holding only the samples where `keep` is true.
    ///
    /// Field-data arrays (leading dimension not equal to the sample count) are
    /// copied unchanged.
    pub fn retain_samples(&self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.n_samples {
            return Err(KeyfiError::invalid_argument(format!(
                "sample mask has {} entries, mesh has {} samples",
                keep.len(),
                self.n_samples
            )));
        }
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        let arrays = self
            .arrays
            .iter()
            .map(|a| {
                if self.is_sample_array(a) {
                    a.take_rows(&rows)
                } else {
                    a.clone()
                }
            })
            .collect();
        Ok(Self {
            n_samples: rows.len(),
            arrays,
        })
    }
}
