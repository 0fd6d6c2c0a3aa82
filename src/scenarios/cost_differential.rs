/// The first segment buys a variant that costs more to build.
///
/// Prices the first segment with the price and order size model at each
/// configured order size, once with the base unit cost and once with the
/// differential one. A higher cost must never lower the optimal price.
use crate::fitter::fit_dataset;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::margin::expected_contribution;
use crate::pipeline::{Checks, ScenarioInput};
use crate::sigmoid::ModelKind;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "cost_differential",
    description: "first segment priced under the base and the differential unit cost",
    run,
});

const PRICE_TOLERANCE: f64 = 0.01;

pub fn run(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: differential unit cost ===");
    let mut checks = Checks::new(scenario_name);

    let Some(segment) = checks.record(logger, "segments", input.segments()).and_then(|s| s.into_iter().next()) else {
        checks.check(logger, false, "At least one segment is configured".to_string());
        return checks.finish();
    };
    segment.printout(logger);

    let fit = match checks.record(
        logger,
        &segment.name,
        fit_dataset(&segment, ModelKind::PriceAndOrderSize, input.config.reference_price, &input.fit_options()),
    ) {
        Some(fit) => fit,
        None => return checks.finish(),
    };
    fit.printout(logger, &segment.name);

    let units = segment.total_units() as f64;
    for &order_size in &input.config.order_sizes {
        let mut prices = Vec::with_capacity(2);
        for different_cost in [false, true] {
            let context = input.context_for(&segment, ModelKind::PriceAndOrderSize, different_cost).with_order_size(order_size);
            let label = format!("{} at {} units, unit cost {:.0}", segment.name, order_size, context.cost);
            let Some(optimum) = checks.record(logger, &label, input.price(&fit.parameters, &context)) else {
                continue;
            };
            optimum.printout(logger, &label);
            if let Some(contribution) = checks.record(logger, &label, expected_contribution(&fit.parameters, &context, optimum.price, units)) {
                logln!(logger, LogEvent::Scenario, "{}: expected contribution over {} units {:.0}", label, units, contribution);
            }
            prices.push((context.cost, optimum.price));
        }

        if let [(base_cost, base_price), (high_cost, high_price)] = prices[..] {
            checks.check(
                logger,
                high_price >= base_price - PRICE_TOLERANCE,
                format!(
                    "{} units: cost {:.0} -> {:.0} does not lower the price: {:.2} >= {:.2}",
                    order_size, base_cost, high_cost, high_price, base_price
                ),
            );
        }
    }

    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::tests::MemoryReceiver;
    use crate::pipeline::tests::small_input;

    #[test]
    fn test_cost_differential_passes_on_synthetic_bids() {
        let input = small_input(600);
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Scenario]);
        logger.add_receiver(receiver);
        run("cost_differential", &input, &mut logger).unwrap();
        assert!(buffer.borrow().contains("cost 15000 -> 16000 does not lower the price"));
    }

    #[test]
    fn test_equal_costs_give_equal_prices() {
        let mut input = small_input(300);
        input.config.costs.differential_unit_cost = input.config.costs.unit_cost;
        let mut logger = Logger::new();
        run("cost_differential", &input, &mut logger).unwrap();
    }
}
