use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use serde::Deserialize;
use tracing::debug;

use crate::errors::PricingError;

/// Nelder-Mead restarts from the last best point; a collapsed simplex is rebuilt
/// until a run stops improving the objective
const MAX_RESTARTS: usize = 3;

/// Budget and stopping rule of one minimizer run
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_iterations: u64,
    /// Stop once the standard deviation of the objective over the simplex falls below this
    pub sd_tolerance: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            sd_tolerance: 1e-10,
        }
    }
}

/// Terminal point of a converged minimization
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOutcome {
    pub best_param: Vec<f64>,
    pub best_cost: f64,
    pub iterations: u64,
    pub restarts: usize,
}

/// Rejects non-finite objective values before they reach the simplex ordering
struct FiniteObjective<'a, O> {
    stage: &'static str,
    inner: &'a O,
}

impl<O> CostFunction for FiniteObjective<'_, O>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        if param.iter().any(|x| !x.is_finite()) {
            return Err(PricingError::NumericalDomain {
                stage: self.stage,
                reason: format!("non-finite search point {:?}", param),
            }
            .into());
        }
        let value = self.inner.cost(param)?;
        if !value.is_finite() {
            return Err(PricingError::NumericalDomain {
                stage: self.stage,
                reason: format!("objective is {} at {:?}", value, param),
            }
            .into());
        }
        Ok(value)
    }
}

/// Start point plus one vertex per coordinate, moved by `relative_step` of the
/// coordinate, or by `zero_step` when the coordinate is zero
pub fn initial_simplex(start: &[f64], relative_step: f64, zero_step: f64) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(start.len() + 1);
    simplex.push(start.to_vec());
    for i in 0..start.len() {
        let mut vertex = start.to_vec();
        if vertex[i] != 0.0 {
            vertex[i] *= 1.0 + relative_step;
        } else {
            vertex[i] = zero_step;
        }
        simplex.push(vertex);
    }
    simplex
}

fn from_argmin(stage: &'static str, err: ArgminError) -> PricingError {
    match err.downcast::<PricingError>() {
        Ok(pricing_error) => pricing_error,
        Err(other) => PricingError::Optimizer {
            stage,
            message: other.to_string(),
        },
    }
}

/// One Nelder-Mead run from an explicit simplex
fn run_once<O>(stage: &'static str, problem: &O, simplex: Vec<Vec<f64>>, options: &SearchOptions) -> Result<MinimizeOutcome, PricingError>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(options.sd_tolerance)
        .map_err(|e| from_argmin(stage, e))?;
    let guarded = FiniteObjective { stage, inner: problem };
    let result = Executor::new(guarded, solver)
        .configure(|state| state.max_iters(options.max_iterations))
        .run()
        .map_err(|e| from_argmin(stage, e))?;

    let state = result.state();
    let iterations = state.get_iter();
    match state.get_termination_reason() {
        Some(TerminationReason::SolverConverged) => {}
        other => {
            return Err(PricingError::NonConvergence {
                stage,
                iterations,
                reason: match other {
                    Some(reason) => format!("{:?}", reason),
                    None => "not terminated".to_string(),
                },
            })
        }
    }

    let best_param = state.get_best_param().cloned().ok_or_else(|| PricingError::Optimizer {
        stage,
        message: "solver finished without a best parameter".to_string(),
    })?;
    Ok(MinimizeOutcome {
        best_param,
        best_cost: state.get_best_cost(),
        iterations,
        restarts: 0,
    })
}

/// Minimize `problem` with Nelder-Mead starting from `start`.
///
/// Only a converged run is returned: an exhausted iteration budget is
/// `NonConvergence` and a non-finite objective is `NumericalDomain`.
pub fn minimize<O>(
    stage: &'static str,
    problem: &O,
    start: &[f64],
    relative_step: f64,
    zero_step: f64,
    options: &SearchOptions,
) -> Result<MinimizeOutcome, PricingError>
where
    O: CostFunction<Param = Vec<f64>, Output = f64>,
{
    let mut outcome = run_once(stage, problem, initial_simplex(start, relative_step, zero_step), options)?;

    for restart in 1..=MAX_RESTARTS {
        let simplex = initial_simplex(&outcome.best_param, relative_step, zero_step);
        let next = run_once(stage, problem, simplex, options)?;
        let improvement = outcome.best_cost - next.best_cost;
        let iterations = outcome.iterations + next.iterations;
        if next.best_cost < outcome.best_cost {
            outcome = MinimizeOutcome {
                iterations,
                restarts: restart,
                ..next
            };
        } else {
            outcome.iterations = iterations;
            outcome.restarts = restart;
        }
        if improvement <= options.sd_tolerance.max(f64::EPSILON * outcome.best_cost.abs()) {
            break;
        }
    }

    debug!(
        stage,
        cost = outcome.best_cost,
        iterations = outcome.iterations,
        restarts = outcome.restarts,
        "minimizer converged"
    );
    Ok(outcome)
}
