//! Flat output tables
//!
//! One table per concern, written as CSV over any `io::Write`. These are the
//! engine's only outputs; report assembly and plotting live with external
//! consumers. Every cell is rendered through `Display`, so two runs with the
//! same configuration and seed produce byte-identical files.

use std::io::Write;

use crate::budget::BudgetImpactRow;
use crate::decision::{DecisionMetrics, IcerOutcome};
use crate::model::{ParameterRegistry, SimulationDraw};
use crate::voi::EvpiPoint;

fn icer_cell(icer: &IcerOutcome, is_reference: bool) -> String {
    if is_reference {
        return "reference".to_string();
    }
    match icer {
        IcerOutcome::Ratio { value } => format!("{value}"),
        IcerOutcome::Dominated => "dominated".to_string(),
        IcerOutcome::ExtendedlyDominated => "extendedly_dominated".to_string(),
        IcerOutcome::Undefined => "undefined".to_string(),
    }
}

/// Deterministic results: one row per strategy with cost, QALYs and ICER
pub fn write_deterministic<W: Write>(writer: W, metrics: &DecisionMetrics) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["strategy", "cost", "qalys", "icer"])?;
    for (det, inc) in metrics.deterministic.iter().zip(&metrics.incremental) {
        wtr.write_record([
            det.strategy.clone(),
            format!("{}", det.cost),
            format!("{}", det.qalys),
            icer_cell(&inc.icer, inc.is_reference),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Incremental results versus the reference strategy
pub fn write_incremental<W: Write>(writer: W, metrics: &DecisionMetrics) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "strategy",
        "delta_cost",
        "delta_qalys",
        "icer",
        "dominated",
        "on_frontier",
    ])?;
    for inc in &metrics.incremental {
        let dominated = matches!(
            inc.icer,
            IcerOutcome::Dominated | IcerOutcome::ExtendedlyDominated
        );
        wtr.write_record([
            inc.strategy.clone(),
            format!("{}", inc.delta_cost),
            format!("{}", inc.delta_qalys),
            icer_cell(&inc.icer, inc.is_reference),
            format!("{dominated}"),
            format!("{}", inc.on_frontier),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Acceptability curves: one row per WTP grid point, one probability column
/// per strategy
pub fn write_ceac<W: Write>(
    writer: W,
    metrics: &DecisionMetrics,
    strategy_names: &[String],
) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["wtp".to_string()];
    header.extend(strategy_names.iter().cloned());
    wtr.write_record(&header)?;
    for (wtp, probs) in metrics.wtp.iter().zip(&metrics.ceac) {
        let mut record = vec![format!("{wtp}")];
        record.extend(probs.iter().map(|p| format!("{p}")));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Acceptability frontier: the expected-NMB-optimal strategy per grid point
pub fn write_ceaf<W: Write>(writer: W, metrics: &DecisionMetrics) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["wtp", "strategy", "expected_nmb"])?;
    for point in &metrics.ceaf {
        wtr.write_record([
            format!("{}", point.wtp),
            point.strategy.clone(),
            format!("{}", point.expected_nmb),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// EVPI per grid point with the population scaling and precision flag
pub fn write_evpi<W: Write>(writer: W, points: &[EvpiPoint]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["wtp", "evpi", "population_evpi", "low_precision"])?;
    for point in points {
        wtr.write_record([
            format!("{}", point.wtp),
            format!("{}", point.evpi),
            format!("{}", point.population_evpi),
            format!("{}", point.low_precision),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Budget impact per projection year
pub fn write_budget_impact<W: Write>(
    writer: W,
    rows: &[BudgetImpactRow],
    strategy_columns: &[String],
) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["year".to_string()];
    header.extend(strategy_columns.iter().cloned());
    header.extend([
        "total_cost".to_string(),
        "baseline_cost".to_string(),
        "impact".to_string(),
        "cumulative_impact".to_string(),
    ]);
    wtr.write_record(&header)?;
    for row in rows {
        let mut record = vec![format!("{}", row.year)];
        record.extend(row.strategy_costs.iter().map(|c| format!("{c}")));
        record.extend([
            format!("{}", row.total_cost),
            format!("{}", row.baseline_cost),
            format!("{}", row.impact),
            format!("{}", row.cumulative_impact),
        ]);
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parameter snapshot: one row per (iteration, parameter) with the realized
/// value, the audit artifact for reproducibility checks
pub fn write_parameter_snapshot<W: Write>(
    writer: W,
    draws: &[SimulationDraw],
    registry: &ParameterRegistry,
) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["iteration", "parameter", "value"])?;
    for draw in draws {
        for (param, value) in registry.iter().zip(&draw.values) {
            wtr.write_record([
                format!("{}", draw.iteration),
                param.name.clone(),
                format!("{value}"),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}
