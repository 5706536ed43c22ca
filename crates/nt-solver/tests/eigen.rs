//! Dense eigen solver on standard and generalized problems.

use nt_core::SolverDb;
use nt_linalg::{DenseMatrix, Matrix, Vector};
use nt_solver::{DenseEigenSolver, EigenConfig};

fn dense(rows: usize, values: &[f64]) -> Matrix {
    Matrix::from(DenseMatrix::from_row_slice(rows, rows, values).unwrap())
}

fn aligned(v: &Vector, expected: &[f64]) -> bool {
    let e = Vector::from_column_slice(expected);
    let e = &e / e.norm();
    (v - &e).amax() < 1e-9 || (v + &e).amax() < 1e-9
}

#[test]
fn symmetric_matrix_dominant_pair() {
    let mut solver = DenseEigenSolver::new(EigenConfig::default());
    solver
        .set_operators(&dense(2, &[2.0, 1.0, 1.0, 2.0]), None)
        .unwrap();
    let pair = solver.solve().unwrap();
    assert!((pair.value - 3.0).abs() < 1e-12);
    assert!(aligned(&pair.vector, &[1.0, 1.0]));
    assert!((pair.vector.norm() - 1.0).abs() < 1e-9);
}

#[test]
fn upper_triangular_dominant_pair() {
    let mut solver = DenseEigenSolver::default();
    let a = dense(3, &[2.0, 1.0, 0.0, 0.0, 5.0, 3.0, 0.0, 0.0, -1.0]);
    solver.set_operators(&a, None).unwrap();
    let pair = solver.solve().unwrap();
    assert!((pair.value - 5.0).abs() < 1e-12);
    assert!(aligned(&pair.vector, &[1.0, 3.0, 0.0]));
}

#[test]
fn complete_spectrum_contains_complex_pair() {
    let solver = {
        let mut s = DenseEigenSolver::default();
        // block diag of a rotation-like block (eigenvalues 1 +- 2i) and 4
        let a = dense(3, &[1.0, -2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 4.0]);
        s.set_operators(&a, None).unwrap();
        s
    };
    let spectrum = solver.solve_complete().unwrap();
    assert_eq!(spectrum.len(), 3);
    let mut ims: Vec<f64> = spectrum.values_im.clone();
    ims.sort_by(f64::total_cmp);
    assert!((ims[0] + 2.0).abs() < 1e-10);
    assert!(ims[1].abs() < 1e-10);
    assert!((ims[2] - 2.0).abs() < 1e-10);

    let k = spectrum.dominant_index().unwrap();
    assert!((spectrum.values_re[k] - 4.0).abs() < 1e-10);
}

#[test]
fn generalized_problem_applies_denominator() {
    let mut solver = DenseEigenSolver::default();
    let a = dense(2, &[2.0, 1.0, 1.0, 2.0]);
    let b = dense(2, &[2.0, 0.0, 0.0, 1.0]);
    solver.set_operators(&a, Some(&b)).unwrap();
    let pair = solver.solve().unwrap();

    // roots of 2 l^2 - 6 l + 3
    let expected = 1.5 + 3.0_f64.sqrt() / 2.0;
    assert!((pair.value - expected).abs() < 1e-10);

    let a = a.as_dense().unwrap().as_dmatrix();
    let b = b.as_dense().unwrap().as_dmatrix();
    let r = a * &pair.vector - (b * &pair.vector) * pair.value;
    assert!(r.norm() < 1e-10);
}

#[test]
fn config_from_database() {
    let db = SolverDb::new()
        .with("eigen_tolerance", 1e-8)
        .with("eigen_max_iterations", 40);
    let config = EigenConfig::from_db(&db).unwrap();
    assert_eq!(config.max_iterations, 40);
    assert!(EigenConfig::from_db(&SolverDb::new().with("eigen_tolerance", -1.0)).is_err());
}
