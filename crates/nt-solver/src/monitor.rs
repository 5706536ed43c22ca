//! Residual monitoring for iterative solves.

use tracing::{debug, info};

/// Highest `monitor_level`: 0 silent, 1 summary, 2 per iteration.
pub const MAX_MONITOR_LEVEL: u8 = 2;

/// Terminal state of an iterative linear solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinearStatus {
    /// Residual fell below `max(rtol * r0, atol)`.
    Success,
    /// Residual grew between consecutive iterations.
    Diverge,
    /// Iteration budget exhausted without a decision.
    MaxIteration,
}

/// Outcome of one solve: status plus the full residual history.
#[derive(Clone, Debug)]
pub struct LinearSolveReport {
    pub status: LinearStatus,
    /// Number of iterations performed (0 when the initial guess already satisfied the tolerance).
    pub iterations: usize,
    /// Last recorded residual norm
    pub residual_norm: f64,
    /// Residual norms, index 0 is the initial residual
    pub residuals: Vec<f64>,
}

impl LinearSolveReport {
    pub fn converged(&self) -> bool {
        self.status == LinearStatus::Success
    }
}

/// Tracks residual norms of a single solve and decides when to stop.
///
/// Created fresh for every solve; nothing is shared between solves.
#[derive(Clone, Debug)]
pub struct ConvergenceMonitor {
    name: String,
    atol: f64,
    rtol: f64,
    max_iterations: usize,
    diverge: bool,
    level: u8,
    residuals: Vec<f64>,
    status: Option<LinearStatus>,
}

impl ConvergenceMonitor {
    pub fn new(
        name: &str,
        atol: f64,
        rtol: f64,
        max_iterations: usize,
        level: u8,
        diverge: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            atol,
            rtol,
            max_iterations,
            diverge,
            level,
            residuals: Vec::with_capacity(max_iterations.min(1024) + 1),
            status: None,
        }
    }

    /// Record the initial residual. Only the absolute tolerance applies here.
    pub fn initial(&mut self, r: f64) -> bool {
        self.residuals.clear();
        self.residuals.push(r);
        if self.level > 1 {
            debug!(solver = %self.name, iteration = 0, residual = r, "linear iteration");
        }
        if r < self.atol {
            self.finish_with(LinearStatus::Success, 0, r);
            return true;
        }
        false
    }

    /// Record the residual of iteration `it` (1-based) and return whether the solve should stop.
    pub fn check(&mut self, it: usize, r: f64) -> bool {
        let previous = self.residuals.last().copied();
        self.residuals.push(r);
        if self.level > 1 {
            debug!(solver = %self.name, iteration = it, residual = r, "linear iteration");
        }

        let r0 = self.residuals[0];
        if r < (self.rtol * r0).max(self.atol) {
            self.finish_with(LinearStatus::Success, it, r);
            return true;
        }
        let grew = previous.is_some_and(|p| r > p);
        if !r.is_finite() || (self.diverge && it > 1 && grew) {
            self.finish_with(LinearStatus::Diverge, it, r);
            return true;
        }
        if it >= self.max_iterations {
            self.finish_with(LinearStatus::MaxIteration, it, r);
            return true;
        }
        false
    }

    /// Force a terminal status (used when the solver detects an exact solution).
    pub fn force(&mut self, status: LinearStatus) {
        let it = self.iterations();
        let r = self.residuals.last().copied().unwrap_or(0.0);
        self.finish_with(status, it, r);
    }

    pub fn status(&self) -> Option<LinearStatus> {
        self.status
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn iterations(&self) -> usize {
        self.residuals.len().saturating_sub(1)
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Consume the monitor. A solve that never decided is reported as `MaxIteration`.
    pub fn into_report(self) -> LinearSolveReport {
        let iterations = self.iterations();
        LinearSolveReport {
            status: self.status.unwrap_or(LinearStatus::MaxIteration),
            iterations,
            residual_norm: self.residuals.last().copied().unwrap_or(0.0),
            residuals: self.residuals,
        }
    }

    fn finish_with(&mut self, status: LinearStatus, it: usize, r: f64) {
        self.status = Some(status);
        if self.level > 0 {
            match status {
                LinearStatus::Success => {
                    info!(solver = %self.name, iterations = it, residual = r, "converged")
                }
                LinearStatus::Diverge => {
                    info!(solver = %self.name, iterations = it, residual = r, "diverged")
                }
                LinearStatus::MaxIteration => info!(
                    solver = %self.name,
                    iterations = it,
                    residual = r,
                    "maximum iterations reached"
                ),
            }
        }
    }
}
