//! Field Table: a Polars frame with one row per mesh sample and one numeric
//! column per scalar field or vector component.
//!
//! Column names double as the link back to the mesh: scalars keep their array
//! name, vector components are named `"<field>:<index>"`. The [`ColumnSchema`]
//! list records which is which so downstream stages never have to parse
//! names that happen to contain a colon.

use crate::error::{KeyfiError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of component `index` of vector field `field`.
pub fn component_name(field: &str, index: usize) -> String {
    format!("{field}:{index}")
}

/// Where a column came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Scalar,
    Component {
        field: String,
        index: usize,
        width: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub role: ColumnRole,
}

impl ColumnSchema {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: ColumnRole::Scalar,
        }
    }

    pub fn component(field: &str, index: usize, width: usize) -> Self {
        Self {
            name: component_name(field, index),
            role: ColumnRole::Component {
                field: field.to_owned(),
                index,
                width,
            },
        }
    }

    /// Field this column belongs to: the vector name for components, the
    /// column name for scalars.
    pub fn field(&self) -> &str {
        match &self.role {
            ColumnRole::Scalar => &self.name,
            ColumnRole::Component { field, .. } => field,
        }
    }

    pub fn component_index(&self) -> Option<usize> {
        match &self.role {
            ColumnRole::Scalar => None,
            ColumnRole::Component { index, .. } => Some(*index),
        }
    }
}

/// Rectangular numeric table derived from a mesh.
#[derive(Debug, Clone)]
pub struct FieldTable {
    frame: DataFrame,
    schema: Vec<ColumnSchema>,
}

impl FieldTable {
    /// Builds a table from named value vectors, in order.
    pub fn from_columns(columns: Vec<(ColumnSchema, Vec<f64>)>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for (col, _) in &columns {
            if !seen.insert(col.name.clone()) {
                return Err(KeyfiError::DataProcessing(format!(
                    "duplicate column '{}'",
                    col.name
                )));
            }
        }
        if let Some((first, rest)) = columns.split_first() {
            let height = first.1.len();
            if let Some((col, values)) = rest.iter().find(|(_, v)| v.len() != height) {
                return Err(KeyfiError::DataProcessing(format!(
                    "column '{}' has {} rows, expected {height}",
                    col.name,
                    values.len()
                )));
            }
        }

        let mut schema = Vec::with_capacity(columns.len());
        let mut cols = Vec::with_capacity(columns.len());
        for (col, values) in columns {
            cols.push(Column::new(col.name.as_str().into(), values));
            schema.push(col);
        }
        let frame = if cols.is_empty() {
            DataFrame::empty()
        } else {
            DataFrame::new(cols)?
        };
        Ok(Self { frame, schema })
    }

    /// Wraps an existing frame, casting every column to `f64`.
    ///
    /// Column families named `F:0 .. F:k-1` with no gaps are recognized as
    /// components of a `k`-wide vector field `F`.
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let mut frame = frame;
        let names: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        for name in &names {
            let col = frame.column(name)?;
            let dtype = col.dtype().clone();
            if !(dtype.is_primitive_numeric() || dtype.is_bool()) {
                return Err(KeyfiError::DataProcessing(format!(
                    "column '{name}' has non-numeric type {dtype}"
                )));
            }
            if dtype != DataType::Float64 {
                let casted = col
                    .as_materialized_series()
                    .cast(&DataType::Float64)?;
                frame.replace(name, casted)?;
            }
        }

        let schema = infer_schema(&names);
        Ok(Self { frame, schema })
    }

    /// Reads a headered CSV of numeric columns.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let frame = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_has_header(true)
            .finish()?
            .collect()?;
        Self::from_frame(frame)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn n_cols(&self) -> usize {
        self.schema.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schema.iter().any(|c| c.name == name)
    }

    pub fn column_schema(&self, name: &str) -> Option<&ColumnSchema> {
        self.schema.iter().find(|c| c.name == name)
    }

    /// Component count of a vector field present in the table.
    pub fn field_width(&self, field: &str) -> Option<usize> {
        self.schema.iter().find_map(|c| match &c.role {
            ColumnRole::Component {
                field: f, width, ..
            } if f == field => Some(*width),
            _ => None,
        })
    }

    /// Column values in row order; nulls read as NaN.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        if !self.contains(name) {
            return Err(KeyfiError::invalid_argument(format!(
                "column '{name}' is not in the table"
            )));
        }
        let ca = self.frame.column(name)?.f64()?;
        Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    /// Fails with the first name that is not a column.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        match names.iter().find(|n| !self.contains(n.as_ref())) {
            Some(missing) => Err(KeyfiError::invalid_argument(format!(
                "column '{}' is not in the table (available: {})",
                missing.as_ref(),
                self.column_names().join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// Keeps only `names`, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        self.require_columns(names)?;
        let frame = self.frame.select(names.iter().map(|n| n.as_ref()))?;
        let schema = names
            .iter()
            .filter_map(|n| self.column_schema(n.as_ref()).cloned())
            .collect();
        Ok(Self { frame, schema })
    }

    /// Removes `names`, keeping the remaining order.
    pub fn drop_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        self.require_columns(names)?;
        let keep: Vec<&str> = self
            .column_names()
            .into_iter()
            .filter(|c| !names.iter().any(|n| n.as_ref() == *c))
            .collect();
        self.select(&keep)
    }

    /// Keeps the rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows() {
            return Err(KeyfiError::DataProcessing(format!(
                "row mask has {} entries, table has {} rows",
                mask.len(),
                self.n_rows()
            )));
        }
        let mask = BooleanChunked::from_slice("mask".into(), mask);
        Ok(Self {
            frame: self.frame.filter(&mask)?,
            schema: self.schema.clone(),
        })
    }

    /// Returns a copy with one column's values replaced.
    pub fn with_values(&self, name: &str, values: Vec<f64>) -> Result<Self> {
        if !self.contains(name) {
            return Err(KeyfiError::invalid_argument(format!(
                "column '{name}' is not in the table"
            )));
        }
        if values.len() != self.n_rows() {
            return Err(KeyfiError::DataProcessing(format!(
                "replacement for '{name}' has {} rows, table has {}",
                values.len(),
                self.n_rows()
            )));
        }
        let mut frame = self.frame.clone();
        frame.replace(name, Series::new(name.into(), values))?;
        Ok(Self {
            frame,
            schema: self.schema.clone(),
        })
    }

    /// Row-major `n_rows x n_cols` matrix in column order.
    pub fn to_matrix(&self) -> Result<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((self.n_rows(), self.n_cols()));
        for (j, col) in self.schema.iter().enumerate() {
            let values = Array1::from(self.values(&col.name)?);
            out.column_mut(j).assign(&values);
        }
        Ok(out)
    }
}

fn infer_schema(names: &[String]) -> Vec<ColumnSchema> {
    let mut families: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for name in names {
        if let Some((field, idx)) = split_component(name) {
            families.entry(field).or_default().push(idx);
        }
    }
    let widths: BTreeMap<&str, usize> = families
        .into_iter()
        .filter_map(|(field, mut idx)| {
            idx.sort_unstable();
            let contiguous = idx.iter().enumerate().all(|(i, &v)| i == v);
            contiguous.then_some((field, idx.len()))
        })
        .collect();

    names
        .iter()
        .map(|name| match split_component(name) {
            Some((field, index)) => match widths.get(field) {
                Some(&width) => ColumnSchema::component(field, index, width),
                None => ColumnSchema::scalar(name.clone()),
            },
            None => ColumnSchema::scalar(name.clone()),
        })
        .collect()
}

fn split_component(name: &str) -> Option<(&str, usize)> {
    let (field, idx) = name.rsplit_once(':')?;
    if field.is_empty() {
        return None;
    }
    idx.parse().ok().map(|i| (field, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Result<FieldTable> {
        FieldTable::from_columns(vec![
            (ColumnSchema::scalar("p"), vec![1.0, 2.0, 3.0]),
            (ColumnSchema::component("U", 0, 2), vec![0.1, 0.2, 0.3]),
            (ColumnSchema::component("U", 1, 2), vec![1.1, 1.2, 1.3]),
        ])
    }

    #[test]
    fn test_from_columns_shape() -> Result<()> {
        let table = sample()?;
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column_names(), vec!["p", "U:0", "U:1"]);
        assert_eq!(table.field_width("U"), Some(2));
        Ok(())
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let result = FieldTable::from_columns(vec![
            (ColumnSchema::scalar("a"), vec![1.0, 2.0]),
            (ColumnSchema::scalar("b"), vec![1.0]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_frame_infers_components() -> Result<()> {
        let df = DataFrame::new(vec![
            Column::new("T".into(), vec![1i64, 2]),
            Column::new("U:0".into(), vec![0.5, 0.6]),
            Column::new("U:1".into(), vec![0.7, 0.8]),
            Column::new("W:1".into(), vec![0.0, 0.0]),
        ])?;
        let table = FieldTable::from_frame(df)?;
        assert_eq!(table.column_schema("U:1").map(|c| c.field()), Some("U"));
        assert_eq!(
            table.column_schema("W:1").map(|c| c.role.clone()),
            Some(ColumnRole::Scalar)
        );
        assert_eq!(table.values("T")?, vec![1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_drop_and_select() -> Result<()> {
        let table = sample()?;
        let dropped = table.drop_columns(&["U:0"])?;
        assert_eq!(dropped.column_names(), vec!["p", "U:1"]);

        let selected = table.select(&["U:1", "p"])?;
        assert_eq!(selected.column_names(), vec!["U:1", "p"]);

        let err = table.drop_columns(&["nope"]).unwrap_err();
        assert!(err.is_invalid_argument());
        Ok(())
    }

    #[test]
    fn test_filter_rows_and_matrix() -> Result<()> {
        let table = sample()?.filter_rows(&[true, false, true])?;
        let m = table.to_matrix()?;
        assert_eq!(m.dim(), (2, 3));
        assert_eq!(m[[1, 0]], 3.0);
        assert_eq!(m[[1, 2]], 1.3);
        Ok(())
    }

    #[test]
    fn test_read_csv() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "p,U:0,U:1\n1.0,2.0,3.0\n4.0,5.0,6.0\n")?;
        let table = FieldTable::read_csv(&path)?;
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.field_width("U"), Some(2));
        Ok(())
    }
}
