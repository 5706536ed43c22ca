//! Iterative linear solvers: restarted GMRES and preconditioned Richardson.

use std::sync::Arc;

use nalgebra::DMatrix;
use nt_core::{DbValue, SolverDb, Tolerances, ensure_non_negative};
use nt_linalg::{
    LinalgError, Matrix, PcSide, PcType, Preconditioner, Vector, build_preconditioner,
};
use tracing::debug;

use crate::error::{SolverError, SolverResult};
use crate::monitor::{ConvergenceMonitor, LinearSolveReport, LinearStatus, MAX_MONITOR_LEVEL};

/// Iterative scheme.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LinearSolverKind {
    /// GMRES restarted every `restart` inner iterations.
    Gmres { restart: usize },
    /// `x <- x + omega * M^{-1} (b - A x)`.
    Richardson { omega: f64 },
}

impl Default for LinearSolverKind {
    fn default() -> Self {
        LinearSolverKind::Gmres { restart: 30 }
    }
}

/// Linear solver configuration.
#[derive(Clone, Debug)]
pub struct LinearSolverConfig {
    pub kind: LinearSolverKind,
    /// Absolute tolerance on the residual norm
    pub atol: f64,
    /// Relative tolerance, scaled by the initial residual norm
    pub rtol: f64,
    /// Maximum iterations (inner iterations for GMRES)
    pub max_iterations: usize,
    /// Default preconditioner, may be overridden at `set_operators`
    pub pc_type: PcType,
    pub pc_side: PcSide,
    /// 0 silent, 1 summary, 2 per iteration
    pub monitor_level: u8,
    /// Stop when the residual grows between iterations
    pub monitor_diverge: bool,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        let tol = Tolerances::default();
        Self {
            kind: LinearSolverKind::default(),
            atol: tol.abs,
            rtol: tol.rel,
            max_iterations: 1000,
            pc_type: PcType::None,
            pc_side: PcSide::Left,
            monitor_level: 0,
            monitor_diverge: true,
        }
    }
}

impl LinearSolverConfig {
    /// Read the `linear_solver_*`, `gmres_restart`, `richardson_omega`,
    /// `pc_*` and `monitor_*` keys, falling back to defaults.
    pub fn from_db(db: &SolverDb) -> SolverResult<Self> {
        let defaults = Self::default();
        let kind = match db
            .get_str("linear_solver_type")?
            .unwrap_or("gmres")
            .to_ascii_lowercase()
            .as_str()
        {
            "gmres" => LinearSolverKind::Gmres {
                restart: db.positive_or("gmres_restart", 30)?,
            },
            "richardson" => LinearSolverKind::Richardson {
                omega: db.real_or("richardson_omega", 1.0)?,
            },
            other => {
                return Err(SolverError::InvalidArgument {
                    what: format!(
                        "unknown linear_solver_type '{other}' (expected gmres or richardson)"
                    ),
                });
            }
        };
        let config = Self {
            kind,
            atol: db.real_or("linear_solver_atol", defaults.atol)?,
            rtol: db.real_or("linear_solver_rtol", defaults.rtol)?,
            max_iterations: db.positive_or("linear_solver_maxit", defaults.max_iterations)?,
            pc_type: pc_type_from(db)?.unwrap_or(defaults.pc_type),
            pc_side: pc_side_from(db)?.unwrap_or(defaults.pc_side),
            monitor_level: db.bounded_or("monitor_level", 0, MAX_MONITOR_LEVEL.into())? as u8,
            monitor_diverge: db.bool_or("monitor_diverge", defaults.monitor_diverge)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SolverResult<()> {
        check_tolerances(self.atol, self.rtol, self.max_iterations)?;
        if self.monitor_level > MAX_MONITOR_LEVEL {
            return Err(SolverError::InvalidArgument {
                what: format!("monitor_level must be at most {MAX_MONITOR_LEVEL}"),
            });
        }
        match self.kind {
            LinearSolverKind::Gmres { restart } if restart == 0 => {
                Err(SolverError::InvalidArgument {
                    what: "gmres_restart must be positive".into(),
                })
            }
            LinearSolverKind::Richardson { omega } if !(omega.is_finite() && omega > 0.0) => {
                Err(SolverError::InvalidArgument {
                    what: format!("richardson_omega must be positive, got {omega}"),
                })
            }
            _ => Ok(()),
        }
    }
}

fn check_tolerances(atol: f64, rtol: f64, max_iterations: usize) -> SolverResult<()> {
    ensure_non_negative(atol, "absolute tolerance")?;
    ensure_non_negative(rtol, "relative tolerance")?;
    if max_iterations == 0 {
        return Err(SolverError::InvalidArgument {
            what: "maximum iterations must be positive".into(),
        });
    }
    Ok(())
}

fn pc_type_from(db: &SolverDb) -> SolverResult<Option<PcType>> {
    Ok(db.get_str("pc_type")?.map(str::parse).transpose()?)
}

fn pc_side_from(db: &SolverDb) -> SolverResult<Option<PcSide>> {
    // integer 0/1 is accepted as well as "left"/"right"
    if let Some(DbValue::Int(i)) = db.get("pc_side") {
        return Ok(Some(i.to_string().parse()?));
    }
    Ok(db.get_str("pc_side")?.map(str::parse).transpose()?)
}

/// Iterative solver for `A x = b`.
///
/// The operator is shared (`Arc`) so the same matrix can back several
/// solvers, e.g. a shell operator built around a sweep.
#[derive(Debug)]
pub struct LinearSolver {
    config: LinearSolverConfig,
    a: Option<Arc<Matrix>>,
    pc: Option<Box<dyn Preconditioner>>,
    pc_side: PcSide,
}

impl LinearSolver {
    pub fn new(config: LinearSolverConfig) -> SolverResult<Self> {
        config.validate()?;
        let pc_side = config.pc_side;
        Ok(Self {
            config,
            a: None,
            pc: None,
            pc_side,
        })
    }

    pub fn from_db(db: &SolverDb) -> SolverResult<Self> {
        Self::new(LinearSolverConfig::from_db(db)?)
    }

    pub fn config(&self) -> &LinearSolverConfig {
        &self.config
    }

    /// Set the system matrix and build its preconditioner.
    ///
    /// `pc_type`/`pc_side` in `pc_db`, when present, override the configured
    /// defaults. A non-square operator is rejected here, before any solve.
    pub fn set_operators(
        &mut self,
        a: Arc<Matrix>,
        pc_db: Option<&SolverDb>,
    ) -> SolverResult<()> {
        if !a.is_square() {
            return Err(SolverError::InvalidArgument {
                what: format!(
                    "linear solver needs a square operator, got {}x{}",
                    a.rows(),
                    a.cols()
                ),
            });
        }
        let mut pc_type = self.config.pc_type;
        let mut pc_side = self.config.pc_side;
        if let Some(db) = pc_db {
            pc_type = pc_type_from(db)?.unwrap_or(pc_type);
            pc_side = pc_side_from(db)?.unwrap_or(pc_side);
        }
        self.pc = build_preconditioner(pc_type, &a)?;
        self.pc_side = pc_side;
        self.a = Some(a);
        Ok(())
    }

    /// Install a caller-built preconditioner for the current operator.
    pub fn set_preconditioner(
        &mut self,
        pc: Box<dyn Preconditioner>,
        side: PcSide,
    ) -> SolverResult<()> {
        let a = self.operator()?;
        if pc.size() != a.rows() {
            return Err(LinalgError::DimensionMismatch {
                what: "preconditioner",
                expected: a.rows(),
                found: pc.size(),
            }
            .into());
        }
        self.pc = Some(pc);
        self.pc_side = side;
        Ok(())
    }

    pub fn set_tolerances(
        &mut self,
        atol: f64,
        rtol: f64,
        max_iterations: usize,
    ) -> SolverResult<()> {
        check_tolerances(atol, rtol, max_iterations)?;
        self.config.atol = atol;
        self.config.rtol = rtol;
        self.config.max_iterations = max_iterations;
        Ok(())
    }

    pub fn preconditioner(&self) -> Option<&dyn Preconditioner> {
        self.pc.as_deref()
    }

    pub fn operator(&self) -> SolverResult<&Arc<Matrix>> {
        self.a.as_ref().ok_or_else(|| SolverError::InvalidState {
            what: "solve called before set_operators".into(),
        })
    }

    /// Solve `A x = b` starting from the contents of `x`; the solution is
    /// written back into `x`.
    pub fn solve(&self, b: &Vector, x: &mut Vector) -> SolverResult<LinearSolveReport> {
        let a = Arc::clone(self.operator()?);
        let n = a.rows();
        if b.len() != n {
            return Err(LinalgError::DimensionMismatch {
                what: "right-hand side",
                expected: n,
                found: b.len(),
            }
            .into());
        }
        if x.len() != n {
            return Err(LinalgError::DimensionMismatch {
                what: "solution vector",
                expected: n,
                found: x.len(),
            }
            .into());
        }

        let name = match self.config.kind {
            LinearSolverKind::Gmres { .. } => "gmres",
            LinearSolverKind::Richardson { .. } => "richardson",
        };
        let mut monitor = ConvergenceMonitor::new(
            name,
            self.config.atol,
            self.config.rtol,
            self.config.max_iterations,
            self.config.monitor_level,
            self.config.monitor_diverge,
        );
        debug!(
            solver = name,
            size = n,
            operator = a.variant_name(),
            pc = self.pc.as_ref().map_or("none", |p| p.name()),
            "linear solve"
        );

        match self.config.kind {
            LinearSolverKind::Gmres { restart } => self.gmres(&a, b, x, restart, &mut monitor)?,
            LinearSolverKind::Richardson { omega } => {
                self.richardson(&a, b, x, omega, &mut monitor)?
            }
        }
        Ok(monitor.into_report())
    }

    fn pc_apply(&self, v: &Vector) -> SolverResult<Vector> {
        match &self.pc {
            Some(pc) => Ok(pc.apply(v)?),
            None => Ok(v.clone()),
        }
    }

    /// Preconditioned operator seen by the Krylov iteration.
    fn op_apply(&self, a: &Matrix, v: &Vector) -> SolverResult<Vector> {
        match (&self.pc, self.pc_side) {
            (Some(pc), PcSide::Left) => Ok(pc.apply(&a.apply(v)?)?),
            (Some(pc), PcSide::Right) => Ok(a.apply(&pc.apply(v)?)?),
            (None, _) => Ok(a.apply(v)?),
        }
    }

    /// Residual monitored by GMRES: `M^{-1}(b - Ax)` with left
    /// preconditioning, `b - Ax` otherwise.
    fn krylov_residual(&self, a: &Matrix, b: &Vector, x: &Vector) -> SolverResult<Vector> {
        let r = b - a.apply(x)?;
        match (&self.pc, self.pc_side) {
            (Some(pc), PcSide::Left) => Ok(pc.apply(&r)?),
            _ => Ok(r),
        }
    }

    fn gmres(
        &self,
        a: &Matrix,
        b: &Vector,
        x: &mut Vector,
        restart: usize,
        monitor: &mut ConvergenceMonitor,
    ) -> SolverResult<()> {
        let n = b.len();
        let m = restart.min(n).max(1);

        let mut r = self.krylov_residual(a, b, x)?;
        let mut beta = r.norm();
        if monitor.initial(beta) {
            return Ok(());
        }

        let mut it = 0;
        loop {
            if beta == 0.0 {
                monitor.force(LinearStatus::Success);
                return Ok(());
            }

            let mut v: Vec<Vector> = Vec::with_capacity(m + 1);
            v.push(&r / beta);
            let mut h = DMatrix::<f64>::zeros(m + 1, m);
            let mut cs = vec![0.0; m];
            let mut sn = vec![0.0; m];
            let mut g = Vector::zeros(m + 1);
            g[0] = beta;

            let mut k = 0;
            let mut stop = false;
            for j in 0..m {
                let mut w = self.op_apply(a, &v[j])?;
                // modified Gram-Schmidt
                for (i, vi) in v.iter().enumerate() {
                    let hij = w.dot(vi);
                    h[(i, j)] = hij;
                    w.axpy(-hij, vi, 1.0);
                }
                let hnext = w.norm();
                h[(j + 1, j)] = hnext;

                for i in 0..j {
                    let t = cs[i] * h[(i, j)] + sn[i] * h[(i + 1, j)];
                    h[(i + 1, j)] = -sn[i] * h[(i, j)] + cs[i] * h[(i + 1, j)];
                    h[(i, j)] = t;
                }
                let (c, s) = givens(h[(j, j)], h[(j + 1, j)]);
                cs[j] = c;
                sn[j] = s;
                h[(j, j)] = c * h[(j, j)] + s * h[(j + 1, j)];
                h[(j + 1, j)] = 0.0;
                g[j + 1] = -s * g[j];
                g[j] *= c;

                k = j + 1;
                it += 1;
                if monitor.check(it, g[j + 1].abs()) {
                    stop = true;
                    break;
                }
                // happy breakdown: the Krylov space is invariant
                if hnext <= f64::EPSILON * beta {
                    break;
                }
                v.push(w / hnext);
            }

            let y = upper_triangular_solve(&h, &g, k);
            let mut dx = Vector::zeros(n);
            for (i, vi) in v.iter().take(k).enumerate() {
                dx.axpy(y[i], vi, 1.0);
            }
            if let (Some(pc), PcSide::Right) = (&self.pc, self.pc_side) {
                dx = pc.apply(&dx)?;
            }
            *x += dx;

            if stop {
                return Ok(());
            }
            r = self.krylov_residual(a, b, x)?;
            beta = r.norm();
        }
    }

    fn richardson(
        &self,
        a: &Matrix,
        b: &Vector,
        x: &mut Vector,
        omega: f64,
        monitor: &mut ConvergenceMonitor,
    ) -> SolverResult<()> {
        let mut r = b - a.apply(x)?;
        if monitor.initial(r.norm()) {
            return Ok(());
        }
        let mut it = 0;
        loop {
            it += 1;
            let z = self.pc_apply(&r)?;
            x.axpy(omega, &z, 1.0);
            r = b - a.apply(x)?;
            if monitor.check(it, r.norm()) {
                return Ok(());
            }
        }
    }
}

/// Real Givens rotation `(c, s)` with `-s a + c b = 0`.
fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = 1.0 / (1.0 + t * t).sqrt();
        (s * t, s)
    } else {
        let t = b / a;
        let c = 1.0 / (1.0 + t * t).sqrt();
        (c, c * t)
    }
}

/// Back substitution on the leading `k x k` block of `h`. Zero pivots
/// contribute nothing.
fn upper_triangular_solve(h: &DMatrix<f64>, g: &Vector, k: usize) -> Vec<f64> {
    let mut y = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[(i, j)] * y[j];
        }
        let d = h[(i, i)];
        y[i] = if d != 0.0 { sum / d } else { 0.0 };
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_linalg::DenseMatrix;

    fn spd3() -> Arc<Matrix> {
        let a = DenseMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0])
            .unwrap();
        Arc::new(Matrix::from(a))
    }

    #[test]
    fn givens_zeroes_second_component() {
        for (a, b) in [(3.0, 4.0), (-1.0, 2.0), (0.0, 5.0), (2.0, 0.0)] {
            let (c, s) = givens(a, b);
            assert!((c * c + s * s - 1.0).abs() < 1e-14);
            assert!((-s * a + c * b).abs() < 1e-14);
        }
    }

    #[test]
    fn solve_before_operators_is_invalid_state() {
        let solver = LinearSolver::new(LinearSolverConfig::default()).unwrap();
        let b = Vector::from_element(3, 1.0);
        let mut x = Vector::zeros(3);
        assert!(matches!(
            solver.solve(&b, &mut x),
            Err(SolverError::InvalidState { .. })
        ));
    }

    #[test]
    fn non_square_operator_rejected() {
        let mut solver = LinearSolver::new(LinearSolverConfig::default()).unwrap();
        let a = Arc::new(Matrix::from(DenseMatrix::zeros(2, 3)));
        assert!(matches!(
            solver.set_operators(a, None),
            Err(SolverError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn gmres_solves_small_spd_system() {
        let mut solver = LinearSolver::new(LinearSolverConfig::default()).unwrap();
        solver.set_operators(spd3(), None).unwrap();
        let x_star = Vector::from_vec(vec![1.0, -2.0, 3.0]);
        let b = solver.operator().unwrap().apply(&x_star).unwrap();
        let mut x = Vector::zeros(3);
        let report = solver.solve(&b, &mut x).unwrap();
        assert_eq!(report.status, LinearStatus::Success);
        assert!(report.iterations <= 3);
        assert!((&x - &x_star).amax() < 1e-8);
    }

    #[test]
    fn richardson_with_jacobi_matches_jacobi_iteration() {
        let config = LinearSolverConfig {
            kind: LinearSolverKind::Richardson { omega: 1.0 },
            pc_type: PcType::Jacobi,
            rtol: 1e-12,
            max_iterations: 500,
            monitor_diverge: false,
            ..Default::default()
        };
        let mut solver = LinearSolver::new(config).unwrap();
        solver.set_operators(spd3(), None).unwrap();
        let b = Vector::from_vec(vec![5.0, 5.0, 3.0]);
        let mut x = Vector::zeros(3);
        let report = solver.solve(&b, &mut x).unwrap();
        assert!(report.converged());
        assert!((&x - Vector::from_element(3, 1.0)).amax() < 1e-8);
    }

    #[test]
    fn exact_initial_guess_takes_no_iterations() {
        let mut solver = LinearSolver::new(LinearSolverConfig::default()).unwrap();
        solver.set_operators(spd3(), None).unwrap();
        let mut x = Vector::from_element(3, 1.0);
        let b = solver.operator().unwrap().apply(&x).unwrap();
        let report = solver.solve(&b, &mut x).unwrap();
        assert_eq!(report.status, LinearStatus::Success);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn invalid_tolerances_rejected() {
        let mut solver = LinearSolver::new(LinearSolverConfig::default()).unwrap();
        assert!(solver.set_tolerances(-1.0, 1e-6, 10).is_err());
        assert!(solver.set_tolerances(1e-6, 1e-6, 0).is_err());
        assert!(solver.set_tolerances(1e-10, 1e-8, 50).is_ok());
        assert_eq!(solver.config().max_iterations, 50);
    }

    #[test]
    fn monitor_level_past_two_rejected() {
        let db = SolverDb::new().with("monitor_level", 2_i64);
        assert_eq!(LinearSolverConfig::from_db(&db).unwrap().monitor_level, 2);
        let db = SolverDb::new().with("monitor_level", 300_i64);
        assert!(matches!(
            LinearSolverConfig::from_db(&db),
            Err(SolverError::Core(nt_core::CoreError::InvalidArg { .. }))
        ));
        let config = LinearSolverConfig {
            monitor_level: 3,
            ..Default::default()
        };
        assert!(LinearSolver::new(config).is_err());
    }
}
