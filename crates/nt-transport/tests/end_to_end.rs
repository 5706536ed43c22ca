//! Outer solves on small diffusion problems, with and without CMFD.

use std::sync::Arc;

use nt_core::{SolverDb, Tolerances, nearly_equal};
use nt_linalg::Vector;
use nt_transport::{
    Boundaries, BoundaryCondition, CartesianMesh, DiffusionGroupSolver, GroupFluxField, Material,
    MaterialProvider, MultigroupSolver, OuterReport, OuterStatus, SweepSource, TransportError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Within-group options shared by every test.
fn group_db() -> SolverDb {
    SolverDb::new()
        .with("pc_type", "ilu0")
        .with("linear_solver_atol", 1e-14)
        .with("linear_solver_rtol", 1e-13)
}

fn outer_db(acceleration: &str, level: usize) -> SolverDb {
    SolverDb::new()
        .with("outer_acceleration", acceleration)
        .with("cmfd_coarse_mesh_level", level)
        .with("outer_tolerance", 1e-9)
        .with("max_outer_iterations", 500)
        .with("monitor_level", 2)
        .with("outer_print_interval", 5)
}

fn coarse_db() -> SolverDb {
    SolverDb::new()
        .with("linear_solver_atol", 1e-14)
        .with("linear_solver_rtol", 1e-13)
}

struct Problem {
    mesh: Arc<CartesianMesh>,
    material: Arc<dyn MaterialProvider>,
    boundaries: Boundaries,
    external: Vec<Vector>,
    multiply: bool,
    adjoint: bool,
}

impl Problem {
    fn solver(&self, outer: &SolverDb) -> MultigroupSolver<DiffusionGroupSolver> {
        self.solver_with(outer, coarse_db())
    }

    fn solver_with(
        &self,
        outer: &SolverDb,
        coarse: SolverDb,
    ) -> MultigroupSolver<DiffusionGroupSolver> {
        let source = SweepSource::new(
            Arc::clone(&self.mesh),
            Arc::clone(&self.material),
            self.external.clone(),
            self.multiply,
            self.adjoint,
        )
        .unwrap();
        let wg = DiffusionGroupSolver::new(
            Arc::clone(&self.mesh),
            Arc::clone(&self.material),
            self.boundaries,
            source,
            &group_db(),
        )
        .unwrap();
        MultigroupSolver::new(
            outer,
            coarse,
            Arc::clone(&self.mesh),
            Arc::clone(&self.material),
            self.boundaries,
            wg,
        )
        .unwrap()
    }

    fn run(&self, outer: &SolverDb) -> (GroupFluxField, OuterReport) {
        self.run_with(outer, coarse_db())
    }

    fn run_with(&self, outer: &SolverDb, coarse: SolverDb) -> (GroupFluxField, OuterReport) {
        let mut solver = self.solver_with(outer, coarse);
        let groups = self.material.number_groups();
        let mut phi = GroupFluxField::uniform(groups, self.mesh.number_cells(), 1.0);
        let report = solver.solve(&mut phi, 1.0).unwrap();
        (phi, report)
    }
}

fn one_group_scatterer() -> Arc<dyn MaterialProvider> {
    let mut mat = Material::new(1, 1).unwrap();
    mat.set_sigma_t(0, 0, 1.0).unwrap();
    mat.set_sigma_s(0, 0, 0, 0.5).unwrap();
    mat.finalize().unwrap();
    Arc::new(mat)
}

/// Two groups with strong upscatter, so Gauss-Seidel over groups is slow.
fn upscatter_material() -> Arc<dyn MaterialProvider> {
    let mut mat = Material::new(1, 2).unwrap();
    mat.set_sigma_t(0, 0, 1.0).unwrap();
    mat.set_sigma_t(0, 1, 1.0).unwrap();
    mat.set_sigma_s(0, 0, 0, 0.4).unwrap();
    mat.set_sigma_s(0, 1, 0, 0.5).unwrap();
    mat.set_sigma_s(0, 0, 1, 0.45).unwrap();
    mat.set_sigma_s(0, 1, 1, 0.5).unwrap();
    mat.finalize().unwrap();
    Arc::new(mat)
}

fn reflected_two_cell() -> Problem {
    Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(2, 2.0, 0).unwrap()),
        material: one_group_scatterer(),
        boundaries: Boundaries::uniform(BoundaryCondition::Reflective),
        external: vec![Vector::from_element(2, 1.0)],
        multiply: false,
        adjoint: false,
    }
}

#[test]
fn reflected_slab_converges_to_analytic_flux() {
    init_tracing();
    let problem = reflected_two_cell();
    // removal 0.5, unit source
    let (with_cmfd, report) = problem.run(&outer_db("cmfd", 1));
    assert_eq!(report.status, OuterStatus::Converged);
    assert!(report.iterations < 20);
    assert_eq!(report.skipped_updates, 0);
    for v in with_cmfd.phi(0).iter() {
        assert!(((v - 2.0) / 2.0).abs() < 1e-6);
    }

    let (plain, report) = problem.run(&outer_db("none", 1));
    assert!(report.converged());
    assert_eq!(report.cmfd_updates, 0);
    let tol = Tolerances {
        abs: 1e-9,
        rel: 1e-9,
    };
    for (&a, &b) in with_cmfd.phi(0).iter().zip(plain.phi(0).iter()) {
        assert!(nearly_equal(a, b, tol));
    }
}

#[test]
fn second_solve_on_converged_flux_does_nothing() {
    init_tracing();
    let problem = reflected_two_cell();
    let mut solver = problem.solver(&outer_db("cmfd", 1));
    let mut phi = GroupFluxField::uniform(1, 2, 1.0);
    let first = solver.solve(&mut phi, 1.0).unwrap();
    assert!(first.converged());

    let second = solver.solve(&mut phi, 1.0).unwrap();
    assert_eq!(second.status, OuterStatus::Converged);
    assert_eq!(second.iterations, 0);
    assert_eq!(second.sweeps, 1);
    assert_eq!(second.cmfd_updates, 0);
}

#[test]
fn cmfd_accelerates_upscatter_problem() {
    init_tracing();
    let n = 8;
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(n, 8.0, 0).unwrap()),
        material: upscatter_material(),
        boundaries: Boundaries::uniform(BoundaryCondition::Vacuum),
        external: vec![Vector::from_element(n, 1.0), Vector::zeros(n)],
        multiply: false,
        adjoint: false,
    };

    let (plain, gs) = problem.run(&outer_db("none", 2));
    let (accel, cmfd) = problem.run(&outer_db("cmfd", 2));
    assert!(gs.converged());
    assert!(cmfd.converged());
    assert!(
        cmfd.iterations < gs.iterations,
        "cmfd took {} iterations, gauss-seidel {}",
        cmfd.iterations,
        gs.iterations
    );
    assert!(cmfd.cmfd_updates > 0);
    let tol = Tolerances {
        abs: 0.0,
        rel: 1e-6,
    };
    for g in 0..2 {
        for (&a, &b) in accel.phi(g).iter().zip(plain.phi(g).iter()) {
            assert!(nearly_equal(a, b, tol), "group {g}: {a} vs {b}");
        }
    }
    // vacuum boundaries: the flux peaks in the middle
    assert!(accel.phi(0)[n / 2] > accel.phi(0)[0]);
}

#[test]
fn diverged_coarse_solve_leaves_flux_uncorrected() {
    init_tracing();
    let n = 8;
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(n, 8.0, 0).unwrap()),
        material: upscatter_material(),
        boundaries: Boundaries::uniform(BoundaryCondition::Vacuum),
        external: vec![Vector::from_element(n, 1.0), Vector::zeros(n)],
        multiply: false,
        adjoint: false,
    };
    // omega far past 2 / lambda_max: every Richardson step amplifies the residual
    let unstable = coarse_db()
        .with("linear_solver_type", "richardson")
        .with("richardson_omega", 1e6)
        .with("pc_type", "none")
        .with("monitor_diverge", true);

    let (phi, report) = problem.run_with(&outer_db("cmfd", 2), unstable);
    let (plain, _) = problem.run(&outer_db("none", 2));
    assert!(report.converged());
    assert!(report.skipped_updates > 0);
    assert!(phi.is_finite());
    let tol = Tolerances {
        abs: 0.0,
        rel: 1e-6,
    };
    for g in 0..2 {
        for (&a, &b) in phi.phi(g).iter().zip(plain.phi(g).iter()) {
            assert!(nearly_equal(a, b, tol), "group {g}: {a} vs {b}");
        }
    }
}

#[test]
fn multiplying_subcritical_medium() {
    init_tracing();
    let mut mat = Material::new(1, 1).unwrap();
    mat.set_sigma_t(0, 0, 1.0).unwrap();
    mat.set_sigma_s(0, 0, 0, 0.5).unwrap();
    mat.set_fission(0, 0, 0.1, 2.5).unwrap();
    mat.set_chi(0, 0, 1.0).unwrap();
    mat.finalize().unwrap();
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(4, 4.0, 0).unwrap()),
        material: Arc::new(mat),
        boundaries: Boundaries::uniform(BoundaryCondition::Reflective),
        external: vec![Vector::from_element(4, 1.0)],
        multiply: true,
        adjoint: false,
    };
    // (removal - nu sigma_f) phi = q, 0.25 phi = 1
    let (phi, report) = problem.run(&outer_db("cmfd", 2));
    assert!(report.converged());
    for v in phi.phi(0).iter() {
        assert!((v - 4.0).abs() < 1e-6);
    }
    let (_, plain) = problem.run(&outer_db("none", 2));
    assert!(report.iterations < plain.iterations);
}

#[test]
fn adjoint_upscatter_in_infinite_medium() {
    init_tracing();
    let n = 4;
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(n, 4.0, 0).unwrap()),
        material: upscatter_material(),
        boundaries: Boundaries::uniform(BoundaryCondition::Reflective),
        external: vec![Vector::zeros(n), Vector::from_element(n, 1.0)],
        multiply: false,
        adjoint: true,
    };
    let outer = outer_db("cmfd", 2).with("adjoint", true);
    let (phi, report) = problem.run(&outer);
    assert!(report.converged());
    // 0.6 a0 - 0.5 a1 = 0 and 0.5 a1 - 0.45 a0 = 1
    for i in 0..n {
        assert!((phi.phi(0)[i] - 20.0 / 3.0).abs() < 1e-6);
        assert!((phi.phi(1)[i] - 8.0).abs() < 1e-6);
    }
}

#[test]
fn adjoint_flag_must_match_within_group_source() {
    let problem = reflected_two_cell();
    let source = SweepSource::new(
        Arc::clone(&problem.mesh),
        Arc::clone(&problem.material),
        problem.external.clone(),
        false,
        false,
    )
    .unwrap();
    let wg = DiffusionGroupSolver::new(
        Arc::clone(&problem.mesh),
        Arc::clone(&problem.material),
        problem.boundaries,
        source,
        &group_db(),
    )
    .unwrap();
    let outer = outer_db("cmfd", 1).with("adjoint", true);
    let result = MultigroupSolver::new(
        &outer,
        coarse_db(),
        Arc::clone(&problem.mesh),
        Arc::clone(&problem.material),
        problem.boundaries,
        wg,
    );
    assert!(matches!(result, Err(TransportError::InvalidArgument { .. })));
}

#[test]
fn zero_flux_group_skips_correction() {
    init_tracing();
    // two decoupled groups, the second without a source
    let mut mat = Material::new(1, 2).unwrap();
    for g in 0..2 {
        mat.set_sigma_t(0, g, 1.0).unwrap();
        mat.set_sigma_s(0, g, g, 0.5).unwrap();
    }
    mat.finalize().unwrap();
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(2, 2.0, 0).unwrap()),
        material: Arc::new(mat),
        boundaries: Boundaries::uniform(BoundaryCondition::Reflective),
        external: vec![Vector::from_element(2, 1.0), Vector::zeros(2)],
        multiply: false,
        adjoint: false,
    };
    let mut solver = problem.solver(&outer_db("cmfd", 1));
    let mut phi =
        GroupFluxField::from_groups(vec![Vector::from_element(2, 1.0), Vector::zeros(2)]).unwrap();
    let report = solver.solve(&mut phi, 1.0).unwrap();
    assert!(report.converged());
    assert_eq!(report.skipped_updates, 1);
    assert_eq!(report.cmfd_updates, 0);
    assert!(phi.phi(1).iter().all(|&v| v == 0.0));
    assert!(phi.phi(0).iter().all(|v| (v - 2.0).abs() < 1e-9));
}

#[test]
fn iteration_budget_exhaustion_is_reported() {
    init_tracing();
    let n = 8;
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(n, 8.0, 0).unwrap()),
        material: upscatter_material(),
        boundaries: Boundaries::uniform(BoundaryCondition::Vacuum),
        external: vec![Vector::from_element(n, 1.0), Vector::zeros(n)],
        multiply: false,
        adjoint: false,
    };
    let outer = outer_db("none", 1).with("max_outer_iterations", 3);
    let (phi, report) = problem.run(&outer);
    assert_eq!(report.status, OuterStatus::MaxIterationsReached);
    assert_eq!(report.iterations, 3);
    assert_eq!(report.residuals.len(), 4);
    assert!(phi.is_finite());
}

#[test]
fn coarse_criticality_of_reflected_medium() {
    init_tracing();
    let mut mat = Material::new(1, 1).unwrap();
    mat.set_sigma_t(0, 0, 1.0).unwrap();
    mat.set_sigma_s(0, 0, 0, 0.5).unwrap();
    mat.set_fission(0, 0, 0.25, 2.4).unwrap();
    mat.set_chi(0, 0, 1.0).unwrap();
    mat.finalize().unwrap();
    let problem = Problem {
        mesh: Arc::new(CartesianMesh::uniform_1d(4, 4.0, 0).unwrap()),
        material: Arc::new(mat),
        boundaries: Boundaries::uniform(BoundaryCondition::Reflective),
        external: vec![],
        multiply: false,
        adjoint: false,
    };
    let mut solver = problem.solver(&outer_db("cmfd", 2));
    let mut phi = GroupFluxField::uniform(1, 4, 1.0);
    solver.solve(&mut phi, 1.2).unwrap();
    let pair = solver.coarse_criticality(&phi).unwrap().unwrap();
    // nu sigma_f / sigma_a = 0.6 / 0.5
    assert!((pair.value - 1.2).abs() < 1e-8);
    assert_eq!(pair.vector.len(), 2);
}
