use crate::table::{ColumnSchema, FieldTable};

mod cleaning;
mod clustering;

/// Table with a scalar `P`, a 3-wide `U`, 3-wide coordinates and a ghost flag
/// column where row 1 is invalid.
fn flow_table() -> crate::error::Result<FieldTable> {
    FieldTable::from_columns(vec![
        (ColumnSchema::scalar("P"), vec![1.0, 2.0, 3.0, 4.0]),
        (ColumnSchema::component("U", 0, 3), vec![0.1, 0.2, 0.3, 0.4]),
        (ColumnSchema::component("U", 1, 3), vec![1.1, 1.2, 1.3, 1.4]),
        (ColumnSchema::component("U", 2, 3), vec![2.1, 2.2, 2.3, 2.4]),
        (ColumnSchema::component("Points", 0, 3), vec![0.0; 4]),
        (ColumnSchema::component("Points", 1, 3), vec![0.0; 4]),
        (ColumnSchema::component("Points", 2, 3), vec![0.0; 4]),
        (ColumnSchema::scalar("vtkGhostType"), vec![0.0, 2.0, 0.0, 0.0]),
    ])
}

/// Three well separated 2-D blobs of `per_blob` points each.
fn blobs(per_blob: usize) -> ndarray::Array2<f64> {
    let centers = [(0.0, 0.0), (10.0, 10.0), (-10.0, 10.0)];
    let mut values = Vec::with_capacity(per_blob * centers.len() * 2);
    for (cx, cy) in centers {
        for i in 0..per_blob {
            let t = i as f64 / per_blob as f64 * std::f64::consts::TAU;
            let r = 0.2 + 0.3 * ((i * 7) % 5) as f64 / 5.0;
            values.push(cx + r * t.cos());
            values.push(cy + r * t.sin());
        }
    }
    ndarray::Array2::from_shape_vec((per_blob * centers.len(), 2), values)
        .unwrap_or_else(|_| ndarray::Array2::zeros((0, 2)))
}
