/// Separate prices per buyer class.
///
/// Fits the price-only model per segment and prices each segment on its own.
/// Validates that:
/// - segment units add up to the units of the whole dataset
/// - under each segment's own model, its segment price earns at least as much
///   per unit as the pooled single price
/// - splitting the data never lowers the total log-likelihood
use crate::logger::{LogEvent, Logger};
use crate::margin::expected_margin;
use crate::pipeline::{Checks, ScenarioInput, evaluate_segment};
use crate::sigmoid::ModelKind;
use crate::{errln, logln, warnln};

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "segmented",
    description: "price-only model per segment against the pooled price",
    run,
});

const MARGIN_TOLERANCE: f64 = 1e-6;
const LIKELIHOOD_TOLERANCE: f64 = 1e-4;

pub fn run(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: segment pricing ===");
    let mut checks = Checks::new(scenario_name);

    let segments = match checks.record(logger, "segments", input.segments()) {
        Some(segments) => segments,
        None => return checks.finish(),
    };
    for segment in &segments {
        segment.printout(logger);
    }

    let covered_rows: usize = segments.iter().map(|s| s.len()).sum();
    let segment_units: u64 = segments.iter().map(|s| s.total_units()).sum();
    if covered_rows == input.dataset.len() {
        checks.check(
            logger,
            segment_units == input.dataset.total_units(),
            format!("Segment units add up to all units: {} = {}", segment_units, input.dataset.total_units()),
        );
    } else {
        warnln!(
            logger,
            LogEvent::Scenario,
            "Segments cover {} of {} bids; skipping the unit total check",
            covered_rows,
            input.dataset.len()
        );
    }

    let pooled = checks.record(logger, "pooled", evaluate_segment(input, &input.dataset, ModelKind::PriceOnly, false));
    if let Some(pooled) = &pooled {
        pooled.printout(logger);
    }

    let mut outcomes = Vec::with_capacity(segments.len());
    for segment in &segments {
        if let Some(outcome) = checks.record(logger, &segment.name, evaluate_segment(input, segment, ModelKind::PriceOnly, false)) {
            outcome.printout(logger);
            outcomes.push(outcome);
        }
    }
    if outcomes.len() != segments.len() {
        errln!(logger, LogEvent::Scenario, "Not every segment could be priced");
        return checks.finish();
    }

    let expected: f64 = outcomes.iter().map(|o| o.expected_contribution).sum();
    let realized: f64 = outcomes.iter().map(|o| o.realized_contribution).sum();
    logln!(
        logger,
        LogEvent::Scenario,
        "Segmented expected contribution {:.0} vs realized {:.0} (ratio {:.3})",
        expected,
        realized,
        if realized == 0.0 { f64::INFINITY } else { expected / realized }
    );

    let Some(pooled) = pooled else {
        return checks.finish();
    };
    logln!(
        logger,
        LogEvent::Scenario,
        "Pooled expected contribution {:.0}, segmented {:.0}",
        pooled.expected_contribution,
        expected
    );

    for outcome in &outcomes {
        let at_pooled = checks.record(
            logger,
            &outcome.segment,
            expected_margin(&outcome.fit.parameters, &outcome.context, pooled.optimum.price),
        );
        if let Some(at_pooled) = at_pooled {
            checks.check(
                logger,
                outcome.optimum.expected_margin >= at_pooled - MARGIN_TOLERANCE,
                format!(
                    "{}: own price {:.2} earns at least the pooled price {:.2} per unit: {:.2} >= {:.2}",
                    outcome.segment, outcome.optimum.price, pooled.optimum.price, outcome.optimum.expected_margin, at_pooled
                ),
            );
        }
    }

    if covered_rows == input.dataset.len() {
        let segmented_ll: f64 = outcomes.iter().map(|o| o.fit.log_likelihood).sum();
        checks.check(
            logger,
            segmented_ll >= pooled.fit.log_likelihood - LIKELIHOOD_TOLERANCE,
            format!(
                "Segment fits do not lower the log-likelihood: {:.3} >= {:.3} (improvement {:.3})",
                segmented_ll,
                pooled.fit.log_likelihood,
                segmented_ll - pooled.fit.log_likelihood
            ),
        );
    }

    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::tests::MemoryReceiver;
    use crate::pipeline::tests::small_input;

    #[test]
    fn test_segmented_passes_on_synthetic_bids() {
        let input = small_input(600);
        let mut logger = Logger::new();
        let (receiver, buffer) = MemoryReceiver::new(vec![LogEvent::Scenario]);
        logger.add_receiver(receiver);
        run("segmented", &input, &mut logger).unwrap();
        assert!(buffer.borrow().contains("police: own price"));
        assert!(buffer.borrow().contains("corporate: own price"));
    }

    #[test]
    fn test_bad_segment_fails_the_scenario() {
        let mut input = small_input(100);
        input.config.segments[1].end = 10_000;
        let mut logger = Logger::new();
        let err = run("segmented", &input, &mut logger).unwrap_err();
        assert!(err.to_string().contains("range 100..10000"));
    }
}
