#![expect(clippy::unwrap_used)]
use super::flow_table;
use crate::dimred::{CleanOptions, clean};
use crate::table::{ColumnSchema, FieldTable};
use anyhow::Result;

#[test]
fn test_keep_list_wins_over_drop_list() -> Result<()> {
    let table = FieldTable::from_columns(vec![
        (ColumnSchema::scalar("A"), vec![1.0, 2.0]),
        (ColumnSchema::scalar("B"), vec![3.0, 4.0]),
    ])?;
    let options = CleanOptions {
        vars_to_drop: vec!["A".to_owned()],
        vars_to_keep: Some(vec!["A".to_owned()]),
        ..CleanOptions::default()
    };
    let cleaned = clean(&table, &options)?;
    assert_eq!(cleaned.column_names(), vec!["A"]);
    assert_eq!(cleaned.values("A")?, vec![1.0, 2.0]);
    Ok(())
}

#[test]
fn test_keep_list_preserves_given_order() -> Result<()> {
    let table = flow_table()?;
    let options = CleanOptions {
        vars_to_keep: Some(vec!["U:1".to_owned(), "P".to_owned()]),
        ..CleanOptions::default()
    };
    let cleaned = clean(&table, &options)?;
    assert_eq!(cleaned.column_names(), vec!["U:1", "P"]);
    // Ghost row 1 is still removed on the keep path.
    assert_eq!(cleaned.values("P")?, vec![1.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_planar_rule_drops_third_component_only() -> Result<()> {
    let table = flow_table()?;
    let cleaned = clean(&table, &CleanOptions::with_dim(2))?;
    assert_eq!(cleaned.column_names(), vec!["P", "U:0", "U:1"]);
    Ok(())
}

#[test]
fn test_three_dimensional_case_keeps_all_components() -> Result<()> {
    let table = flow_table()?;
    let cleaned = clean(&table, &CleanOptions::with_dim(3))?;
    assert_eq!(cleaned.column_names(), vec!["P", "U:0", "U:1", "U:2"]);
    Ok(())
}

#[test]
fn test_ghost_rows_removed_and_reindexed() -> Result<()> {
    let table = flow_table()?;
    let cleaned = clean(&table, &CleanOptions::with_dim(2))?;
    assert_eq!(cleaned.n_rows(), 3);
    assert!(!cleaned.contains("vtkGhostType"));
    assert_eq!(cleaned.values("U:0")?, vec![0.1, 0.3, 0.4]);
    Ok(())
}

#[test]
fn test_planar_field_is_configurable() -> Result<()> {
    let table = FieldTable::from_columns(vec![
        (ColumnSchema::component("V", 0, 3), vec![1.0]),
        (ColumnSchema::component("V", 1, 3), vec![2.0]),
        (ColumnSchema::component("V", 2, 3), vec![3.0]),
    ])?;
    let options = CleanOptions {
        planar_field: "V".to_owned(),
        ..CleanOptions::default()
    };
    let cleaned = clean(&table, &options)?;
    assert_eq!(cleaned.column_names(), vec!["V:0", "V:1"]);
    Ok(())
}

#[test]
fn test_extra_drops_applied_last() -> Result<()> {
    let table = flow_table()?;
    let options = CleanOptions {
        vars_to_drop: vec!["P".to_owned(), "U:2".to_owned()],
        ..CleanOptions::default()
    };
    let cleaned = clean(&table, &options)?;
    assert_eq!(cleaned.column_names(), vec!["U:0", "U:1"]);
    Ok(())
}

#[test]
fn test_invalid_dim_rejected_without_mutation() -> Result<()> {
    let table = flow_table()?;
    let before = table.frame().clone();
    let err = clean(&table, &CleanOptions::with_dim(4)).unwrap_err();
    assert!(err.is_invalid_argument(), "got {err}");
    assert!(table.frame().equals_missing(&before));
    assert_eq!(table.n_cols(), 8);
    Ok(())
}

#[test]
fn test_unknown_names_rejected() -> Result<()> {
    let table = flow_table()?;
    let keep = CleanOptions {
        vars_to_keep: Some(vec!["missing".to_owned()]),
        ..CleanOptions::default()
    };
    assert!(clean(&table, &keep).unwrap_err().is_invalid_argument());

    let drop = CleanOptions {
        vars_to_drop: vec!["missing".to_owned()],
        ..CleanOptions::default()
    };
    assert!(clean(&table, &drop).unwrap_err().is_invalid_argument());
    Ok(())
}

#[test]
fn test_repeated_names_rejected() -> Result<()> {
    let table = flow_table()?;
    let keep_twice = CleanOptions {
        vars_to_keep: Some(vec!["P".to_owned(), "P".to_owned()]),
        ..CleanOptions::default()
    };
    let err = clean(&table, &keep_twice).unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(err.to_string().contains("'P'"));

    let drop_twice = CleanOptions {
        vars_to_drop: vec!["P".to_owned(), "P".to_owned()],
        ..CleanOptions::default()
    };
    assert!(drop_twice.validate().unwrap_err().is_invalid_argument());
    Ok(())
}
