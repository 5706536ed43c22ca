//! YAML round trip for the solver database.

use nt_core::{DbValue, SolverDb};

#[test]
fn load_recognized_options_from_yaml() {
    let text = r#"
pc_type: jacobi
pc_side: right
cmfd_coarse_mesh_level: 3
outer_tolerance: 1.0e-7
max_outer_iterations: 200
monitor_level: 2
monitor_diverge: true
"#;
    let db = SolverDb::from_yaml_str(text).unwrap();

    assert_eq!(db.len(), 7);
    assert_eq!(db.get_str("pc_type").unwrap(), Some("jacobi"));
    assert_eq!(db.get_str("pc_side").unwrap(), Some("right"));
    assert_eq!(db.positive_or("cmfd_coarse_mesh_level", 2).unwrap(), 3);
    assert_eq!(db.get_real("outer_tolerance").unwrap(), Some(1.0e-7));
    assert_eq!(db.get_int("max_outer_iterations").unwrap(), Some(200));
    assert_eq!(db.get("monitor_level"), Some(&DbValue::Int(2)));
    assert_eq!(db.get_bool("monitor_diverge").unwrap(), Some(true));
}

#[test]
fn yaml_round_trip_preserves_entries() {
    let db = SolverDb::new()
        .with("pc_type", "ilu0")
        .with("outer_tolerance", 1e-6)
        .with("adjoint", true);
    let text = db.to_yaml_string().unwrap();
    let back = SolverDb::from_yaml_str(&text).unwrap();
    assert_eq!(db, back);
}

#[test]
fn malformed_yaml_fails() {
    assert!(SolverDb::from_yaml_str("pc_type: [unclosed").is_err());
}
