use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use crate::bids::BidDataset;
use crate::errors::PricingError;
use crate::fitter::fit_dataset;
use crate::logger::sanitize_filename;
use crate::margin::{PriceOptimum, PricingContext, expected_margin, win_probability};
use crate::pipeline::ScenarioInput;
use crate::sigmoid::{ModelKind, ModelParameters};

const CURVE_POINTS: usize = 500;

/// Win probability and expected margin at one price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub price: f64,
    pub win_probability: f64,
    pub expected_margin: f64,
}

/// Evenly spaced curve over [min_price, max_price], both ends included
pub fn sample_curve(
    params: &ModelParameters,
    context: &PricingContext,
    min_price: f64,
    max_price: f64,
    points: usize,
) -> Result<Vec<CurvePoint>, PricingError> {
    if points < 2 || !(min_price < max_price) {
        return Err(PricingError::InvalidConfig(format!(
            "cannot sample {} points over {}..{}",
            points, min_price, max_price
        )));
    }
    (0..points)
        .map(|i| {
            let price = min_price + (max_price - min_price) * i as f64 / (points - 1) as f64;
            Ok(CurvePoint {
                price,
                win_probability: win_probability(params, context, price)?,
                expected_margin: expected_margin(params, context, price)?,
            })
        })
        .collect()
}

/// One chart per dataset: the fitted win curve and the expected margin per unit,
/// each with the optimal price marked
pub fn generate_pricing_charts(input: &ScenarioInput, output_dir: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    fs::create_dir_all(output_dir)?;

    let mut datasets = vec![input.dataset.clone()];
    datasets.extend(input.segments()?);

    let mut written = Vec::with_capacity(datasets.len());
    for dataset in &datasets {
        written.push(draw_dataset_chart(input, dataset, output_dir)?);
    }
    Ok(written)
}

fn draw_dataset_chart(input: &ScenarioInput, dataset: &BidDataset, output_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let fit = fit_dataset(dataset, ModelKind::PriceOnly, input.config.reference_price, &input.fit_options())?;
    let context = input.context_for(dataset, ModelKind::PriceOnly, false);
    let optimum = input.price(&fit.parameters, &context)?;

    // from a little below cost to the reference price
    let min_price = context.cost * 0.9;
    let max_price = input.config.reference_price;
    let curve = sample_curve(&fit.parameters, &context, min_price, max_price, CURVE_POINTS)?;

    let filepath = output_dir.join(format!("pricing_{}.png", sanitize_filename(&dataset.name)));
    {
        let root = BitMapBackend::new(&filepath, (1200, 600)).into_drawing_area();
        root.fill(&WHITE)?;
        let (left, right) = root.split_horizontally(600);

        {
            let mut chart = ChartBuilder::on(&left)
                .caption(format!("{} - win probability ({})", dataset.name, fit.parameters.describe()), ("sans-serif", 20))
                .margin(10)
                .x_label_area_size(40)
                .y_label_area_size(50)
                .build_cartesian_2d(min_price..max_price, 0.0..1.0)?;
            chart.configure_mesh().x_desc("unit price").y_desc("P(win)").draw()?;
            chart.draw_series(LineSeries::new(curve.iter().map(|p| (p.price, p.win_probability)), &BLUE))?;
            draw_optimum_marker(&mut chart, &optimum, 0.0, 1.0)?;
        }

        {
            let y_min = curve.iter().map(|p| p.expected_margin).fold(f64::INFINITY, f64::min);
            let y_max = curve.iter().map(|p| p.expected_margin).fold(f64::NEG_INFINITY, f64::max);
            let y_range = if y_max - y_min < 1.0 { y_min - 0.5..y_max + 0.5 } else { y_min..y_max * 1.05 };

            let mut chart = ChartBuilder::on(&right)
                .caption(format!("{} - expected margin per unit", dataset.name), ("sans-serif", 20))
                .margin(10)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(min_price..max_price, y_range.clone())?;
            chart.configure_mesh().x_desc("unit price").y_desc("margin").draw()?;
            chart.draw_series(LineSeries::new(curve.iter().map(|p| (p.price, p.expected_margin)), &RED))?;
            draw_optimum_marker(&mut chart, &optimum, y_range.start, y_range.end)?;
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }

        root.present()?;
    }
    Ok(filepath)
}

fn draw_optimum_marker<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    optimum: &PriceOptimum,
    y_from: f64,
    y_to: f64,
) -> Result<(), Box<dyn Error>> {
    chart
        .draw_series(LineSeries::new(vec![(optimum.price, y_from), (optimum.price, y_to)], BLACK.mix(0.4)))
        .map_err(|e| e.to_string())?
        .label(format!("optimal price {:.0}", optimum.price))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.mix(0.4)));
    Ok(())
}
