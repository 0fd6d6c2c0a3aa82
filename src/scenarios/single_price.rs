/// One price for every buyer.
///
/// Fits the price-only win model on all bids, finds the single price that
/// maximizes expected margin per unit, and compares the expected contribution
/// over every unit offered with the contribution actually realized.
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::pipeline::{Checks, ScenarioInput, evaluate_segment};
use crate::sigmoid::ModelKind;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "single_price",
    description: "price-only model on all bids, one optimal price",
    run,
});

pub fn run(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: single price for all bids ===");
    input.dataset.printout(logger);
    let mut checks = Checks::new(scenario_name);

    let outcome = checks.record(logger, "all bids", evaluate_segment(input, &input.dataset, ModelKind::PriceOnly, false));
    if let Some(outcome) = outcome {
        outcome.printout(logger);
        if let Some(break_even) = outcome.fit.parameters.price_for_probability(0.5, input.config.reference_price) {
            logln!(logger, LogEvent::Scenario, "Price with an even chance of winning: {:.2}", break_even);
        }

        let cost = outcome.context.cost;
        let reference = input.config.reference_price;
        checks.check(
            logger,
            outcome.optimum.price > cost && outcome.optimum.price < reference,
            format!("Optimal price lies strictly between cost and reference price: {:.2} < {:.2} < {:.2}", cost, outcome.optimum.price, reference),
        );
        let b = outcome.fit.parameters.price_coefficient().unwrap_or(f64::NAN);
        checks.check(logger, b < 0.0, format!("Win probability falls with price: b = {:.3} < 0", b));
        checks.check(
            logger,
            outcome.optimum.expected_margin > 0.0,
            format!("Expected margin per unit at the optimum is positive: {:.2}", outcome.optimum.expected_margin),
        );
    }

    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::small_input;

    #[test]
    fn test_single_price_passes_on_synthetic_bids() {
        let input = small_input(500);
        let mut logger = Logger::new();
        run("single_price", &input, &mut logger).unwrap();
    }
}
