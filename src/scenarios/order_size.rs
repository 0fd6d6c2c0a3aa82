/// Order size as a second explanatory variable.
///
/// Compares the log-likelihood gained by adding order size to the model with the
/// gain from splitting the bids into segments. Each segment is then priced at the
/// mean order size, with the segment contributions summed against the realized
/// margin, and at each configured order size.
use crate::fitter::fit_dataset;
use crate::likelihood::likelihood_ratio;
use crate::logger::{LogEvent, Logger};
use crate::logln;
use crate::pipeline::{Checks, ScenarioInput, evaluate_segment};
use crate::sigmoid::ModelKind;

inventory::submit!(crate::scenarios::ScenarioEntry {
    short_name: "order_size",
    description: "price and order size model, prices per order size",
    run,
});

const LIKELIHOOD_TOLERANCE: f64 = 1e-4;
/// Dollars; prices closer than this count as equal
const PRICE_TOLERANCE: f64 = 0.01;

pub fn run(scenario_name: &str, input: &ScenarioInput, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    logln!(logger, LogEvent::Scenario, "=== Scenario: order size in the win model ===");
    let mut checks = Checks::new(scenario_name);
    let options = input.fit_options();
    let reference = input.config.reference_price;

    let basic = checks.record(logger, "all bids (price)", fit_dataset(&input.dataset, ModelKind::PriceOnly, reference, &options));
    let extended = checks.record(
        logger,
        "all bids (price+order size)",
        evaluate_segment(input, &input.dataset, ModelKind::PriceAndOrderSize, false),
    );
    if let Some(extended) = &extended {
        extended.printout(logger);
    }

    let segments = checks.record(logger, "segments", input.segments()).unwrap_or_default();
    let mut segment_basic_ll = Some(0.0);
    for segment in &segments {
        match checks.record(logger, &segment.name, fit_dataset(segment, ModelKind::PriceOnly, reference, &options)) {
            Some(fit) => segment_basic_ll = segment_basic_ll.map(|total| total + fit.log_likelihood),
            None => segment_basic_ll = None,
        }
    }

    if let (Some(basic), Some(extended)) = (&basic, &extended) {
        basic.printout(logger, "all bids (price)");
        let lr = checks.record(
            logger,
            "likelihood ratio",
            likelihood_ratio(
                basic.log_likelihood,
                ModelKind::PriceOnly.dimension(),
                extended.fit.log_likelihood,
                ModelKind::PriceAndOrderSize.dimension(),
            ),
        );
        if let Some(lr) = lr {
            logln!(
                logger,
                LogEvent::Scenario,
                "Adding order size improves the log-likelihood by {:.3} (LR statistic {:.3}, {} df, p = {:.4})",
                lr.improvement,
                lr.statistic,
                lr.degrees_of_freedom,
                lr.p_value
            );
            checks.check(
                logger,
                lr.improvement >= -LIKELIHOOD_TOLERANCE,
                format!("Order size never lowers the log-likelihood: improvement {:.3} >= 0", lr.improvement),
            );
            let covered_rows: usize = segments.iter().map(|s| s.len()).sum();
            if let (Some(segmented), true) = (segment_basic_ll, covered_rows == input.dataset.len()) {
                let segmentation_gain = segmented - basic.log_likelihood;
                logln!(
                    logger,
                    LogEvent::Scenario,
                    "Segmenting improves the log-likelihood by {:.3}; {} explains more of the outcomes",
                    segmentation_gain,
                    if segmentation_gain > lr.improvement { "segmentation" } else { "order size" }
                );
            }
        }
    }

    let mut segmented_expected = 0.0;
    let mut segmented_realized = 0.0;
    let mut priced_segments = 0;
    for segment in &segments {
        let Some(outcome) = checks.record(
            logger,
            &format!("{} (price+order size)", segment.name),
            evaluate_segment(input, segment, ModelKind::PriceAndOrderSize, false),
        ) else {
            continue;
        };
        outcome.printout(logger);
        segmented_expected += outcome.expected_contribution;
        segmented_realized += outcome.realized_contribution;
        priced_segments += 1;

        let mut priced = Vec::with_capacity(input.config.order_sizes.len());
        for &order_size in &input.config.order_sizes {
            let context = outcome.context.with_order_size(order_size);
            let label = format!("{} at {} units", segment.name, order_size);
            if let Some(optimum) = checks.record(logger, &label, input.price(&outcome.fit.parameters, &context)) {
                optimum.printout(logger, &label);
                priced.push((order_size, optimum.price));
            }
        }

        // with b < 0 the optimal price rises with the intercept, so it moves
        // with order size in the direction of c
        let b = outcome.fit.parameters.price_coefficient().unwrap_or(0.0);
        let c = outcome.fit.parameters.order_size_coefficient().unwrap_or(0.0);
        if b < 0.0 {
            for pair in priced.windows(2) {
                let ((q1, p1), (q2, p2)) = (pair[0], pair[1]);
                let consistent = if (q2 > q1) == (c > 0.0) {
                    p2 >= p1 - PRICE_TOLERANCE
                } else {
                    p2 <= p1 + PRICE_TOLERANCE
                };
                checks.check(
                    logger,
                    consistent,
                    format!(
                        "{}: price moves with order size as c = {:.4} implies: {:.2} at {} units, {:.2} at {} units",
                        segment.name, c, p1, q1, p2, q2
                    ),
                );
            }
        }
    }

    if priced_segments > 0 && priced_segments == segments.len() {
        logln!(
            logger,
            LogEvent::Scenario,
            "Segmented price+order size expected contribution {:.0} vs realized {:.0} (ratio {:.3})",
            segmented_expected,
            segmented_realized,
            if segmented_realized == 0.0 { f64::INFINITY } else { segmented_expected / segmented_realized }
        );
    }

    checks.finish()
}
