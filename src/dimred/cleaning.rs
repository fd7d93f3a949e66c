use crate::error::{KeyfiError, Result};
use crate::mesh::GHOST_ARRAY;
use crate::table::{FieldTable, component_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ghost flag value marking a duplicated (invalid) sample.
const GHOST_INVALID: f64 = 2.0;

/// Column selection for [`clean`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanOptions {
    /// Spatial dimensionality of the case, 2 or 3.
    pub dim: usize,
    /// Extra columns removed after the built-in rules.
    pub vars_to_drop: Vec<String>,
    /// When set, exactly these columns in this order; every other option
    /// except the ghost row filter is ignored.
    pub vars_to_keep: Option<Vec<String>>,
    /// Vector field that loses its third component in 2-D cases.
    pub planar_field: String,
    /// Coordinate field whose columns are always removed.
    pub coordinate_field: String,
    /// Per-row validity flag column.
    pub ghost_column: String,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            dim: 2,
            vars_to_drop: Vec::new(),
            vars_to_keep: None,
            planar_field: "U".to_owned(),
            coordinate_field: "Points".to_owned(),
            ghost_column: GHOST_ARRAY.to_owned(),
        }
    }
}

impl CleanOptions {
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Argument checks that need no table.
    pub fn validate(&self) -> Result<()> {
        if self.dim != 2 && self.dim != 3 {
            return Err(KeyfiError::invalid_argument(format!(
                "dim can only be 2 or 3, got {}",
                self.dim
            )));
        }
        if self.vars_to_keep.as_ref().is_some_and(Vec::is_empty) {
            return Err(KeyfiError::invalid_argument(
                "vars_to_keep must name at least one column",
            ));
        }
        let lists = [
            ("vars_to_keep", self.vars_to_keep.as_deref().unwrap_or_default()),
            ("vars_to_drop", self.vars_to_drop.as_slice()),
        ];
        for (list, names) in lists {
            if let Some(name) = first_repeat(names) {
                return Err(KeyfiError::invalid_argument(format!(
                    "{list} names '{name}' more than once"
                )));
            }
        }
        Ok(())
    }
}

fn first_repeat(names: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    names
        .iter()
        .find(|n| !seen.insert(n.as_str()))
        .map(String::as_str)
}

/// Produces a cleaned copy of `table`. The input is never modified.
///
/// With a keep-list the result holds exactly those columns in the given order.
/// Otherwise the rules run in order: coordinate columns are dropped, rows
/// flagged invalid by the ghost column are removed together with the column,
/// the planar field loses component 2 when `dim == 2`, and finally
/// `vars_to_drop` is removed. All names are checked before anything is copied.
pub fn clean(table: &FieldTable, options: &CleanOptions) -> Result<FieldTable> {
    options.validate()?;

    if let Some(keep) = &options.vars_to_keep {
        table.require_columns(keep)?;
        let cleaned = remove_invalid_rows(table, &options.ghost_column)?.select(keep)?;
        tracing::info!(
            "Kept {} of {} columns, {} rows",
            cleaned.n_cols(),
            table.n_cols(),
            cleaned.n_rows()
        );
        return Ok(cleaned);
    }

    table.require_columns(&options.vars_to_drop)?;

    let mut drop: Vec<String> = table
        .schema()
        .iter()
        .filter(|c| c.field() == options.coordinate_field)
        .map(|c| c.name.clone())
        .collect();

    let cleaned = remove_invalid_rows(table, &options.ghost_column)?;
    if cleaned.contains(&options.ghost_column) {
        drop.push(options.ghost_column.clone());
    }

    let planar = component_name(&options.planar_field, 2);
    if options.dim == 2 && cleaned.field_width(&options.planar_field) == Some(3) {
        drop.push(planar);
    }

    for name in &options.vars_to_drop {
        if !drop.contains(name) {
            drop.push(name.clone());
        }
    }
    drop.retain(|name| cleaned.contains(name));

    let cleaned = cleaned.drop_columns(&drop)?;
    tracing::info!(
        "Dropped {:?}, {} rows x {} columns remain",
        drop,
        cleaned.n_rows(),
        cleaned.n_cols()
    );
    Ok(cleaned)
}

fn remove_invalid_rows(table: &FieldTable, ghost_column: &str) -> Result<FieldTable> {
    if !table.contains(ghost_column) {
        return Ok(table.clone());
    }
    let keep: Vec<bool> = table
        .values(ghost_column)?
        .into_iter()
        .map(|g| g != GHOST_INVALID)
        .collect();
    let removed = keep.iter().filter(|k| !**k).count();
    if removed > 0 {
        tracing::debug!("Removing {removed} rows flagged invalid by '{ghost_column}'");
    }
    table.filter_rows(&keep)
}
