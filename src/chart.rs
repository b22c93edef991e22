//! Rendering of the fundamental diagram.

use crate::error::{Error, Result};
use itertools::{Itertools, MinMaxResult};
use plotters::prelude::*;
use std::path::Path;

const CHART_SIZE: (u32, u32) = (800, 600);
const MARKER_SIZE: i32 = 4;

/// Renders `flows` against `densities` as an SVG line-and-marker chart.
pub fn render_svg(densities: &[f64], flows: &[f64], path: &Path) -> Result<()> {
    if densities.len() != flows.len() {
        return Err(Error::invalid(format!(
            "{} densities but {} flows",
            densities.len(),
            flows.len()
        )));
    }

    let x_range = axis_range(densities);
    let y_range = axis_range(flows);
    let points = densities.iter().copied().zip(flows.iter().copied());

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Fundamental Diagram for Ring Road", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .x_desc("Density (vehicles per kilometer)")
        .y_desc("Flow (vehicles per hour)")
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(LineSeries::new(points.clone(), &BLUE))
        .map_err(chart_error)?;
    chart
        .draw_series(points.map(|point| Circle::new(point, MARKER_SIZE, BLUE.filled())))
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    log::info!("wrote chart to {}", path.display());
    Ok(())
}

/// A padded axis range covering all the values, or `0..1` if there are none.
fn axis_range(values: &[f64]) -> std::ops::Range<f64> {
    let (min, max) = match values.iter().copied().minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => return 0.0..1.0,
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let pad = if max > min { 0.05 * (max - min) } else { 1.0 };
    f64::min(min - pad, 0.0)..max + pad
}

fn chart_error(err: impl std::fmt::Display) -> Error {
    Error::Chart(err.to_string())
}
