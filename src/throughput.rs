//! Summary statistics and recommendations derived from a result. Nothing here solves again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    problem::Minutes,
    result::{round_to, OptimizationResult, OptimizationStatus, TrainAdjustment},
    scenario::Scenario,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub throughput_per_hour: f64,
    pub average_headway: f64,
    pub min_headway: Minutes,
    pub max_headway: Minutes,
    pub headway_std_dev: f64,
    /// Throughput as a percentage of `60 / min_headway` trains per hour, at most 100.
    pub capacity_utilization: f64,
}

pub fn section_throughput(schedule: &[TrainAdjustment], min_headway: Minutes) -> ThroughputStats {
    let mut entries: Vec<Minutes> = schedule.iter().map(|a| a.optimized_entry).collect();
    if entries.len() < 2 {
        return ThroughputStats::default();
    }
    entries.sort_unstable();

    let n = entries.len() as f64;
    let span = entries[entries.len() - 1] - entries[0];
    let throughput = if span > 0 { n / span as f64 * 60.0 } else { n };

    let headways: Vec<Minutes> = entries.windows(2).map(|w| w[1] - w[0]).collect();
    let count = headways.len() as f64;
    let mean = headways.iter().sum::<Minutes>() as f64 / count;
    let variance = headways
        .iter()
        .map(|&h| (h as f64 - mean).powi(2))
        .sum::<f64>()
        / count;

    let capacity_utilization = if min_headway > 0 {
        let capacity_per_hour = 60.0 / min_headway as f64;
        (throughput / capacity_per_hour * 100.0).min(100.0)
    } else {
        0.0
    };

    ThroughputStats {
        throughput_per_hour: round_to(throughput, 2),
        average_headway: round_to(mean, 1),
        min_headway: headways.iter().copied().min().unwrap_or(0),
        max_headway: headways.iter().copied().max().unwrap_or(0),
        headway_std_dev: round_to(variance.sqrt(), 2),
        capacity_utilization: round_to(capacity_utilization, 1),
    }
}

/// Threshold-driven hints from a result and its throughput statistics.
pub fn recommendations(
    result: &OptimizationResult,
    stats: &ThroughputStats,
    min_headway: Minutes,
) -> Vec<String> {
    let mut out = Vec::new();
    match result.status {
        OptimizationStatus::Optimal | OptimizationStatus::Feasible => {
            if result.trains_adjusted == 0 {
                out.push("Current schedule is optimal, no adjustments needed".to_string());
            } else if result.total_deviation_minutes < 30 {
                out.push(format!(
                    "Minor adjustments to {} trains improve efficiency",
                    result.trains_adjusted
                ));
            } else {
                out.push(format!(
                    "Significant adjustments needed: {} trains, {} min total deviation",
                    result.trains_adjusted, result.total_deviation_minutes
                ));
            }

            if stats.throughput_per_hour > 6.0 {
                out.push("High throughput achieved, monitor for bottlenecks".to_string());
            } else if stats.throughput_per_hour < 2.0 {
                out.push(
                    "Low throughput, consider increasing frequency or reducing delays".to_string(),
                );
            }

            if stats.average_headway < min_headway as f64 {
                out.push(format!(
                    "Headway below {} minutes, ensure safety protocols",
                    min_headway
                ));
            } else if stats.average_headway > 20.0 {
                out.push("Large headway gaps, opportunity to add more services".to_string());
            }

            if result.heuristic {
                out.push("Schedule from the greedy fallback, not proven optimal".to_string());
            }
        }
        OptimizationStatus::Failed => {
            out.push("Optimization failed, review constraints and data quality".to_string());
            out.push("Consider relaxing constraints or updating train priorities".to_string());
        }
        OptimizationStatus::InsufficientData | OptimizationStatus::Error => {}
    }
    out
}

/// Side-by-side view of a what-if sweep.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub best_throughput: Option<Scenario>,
    /// The solved scenario with the least total deviation.
    pub least_disruption: Option<Scenario>,
    pub throughput_comparison: BTreeMap<String, f64>,
    pub deviation_comparison: BTreeMap<String, Minutes>,
    pub recommendations: Vec<String>,
}

pub fn compare_scenarios(
    results: &[OptimizationResult],
    min_headway: Minutes,
) -> ScenarioComparison {
    let mut comparison = ScenarioComparison::default();
    let mut best_throughput: Option<(Scenario, f64)> = None;
    let mut least_disruption: Option<(Scenario, Minutes)> = None;

    for result in results
        .iter()
        .filter(|r| r.status.is_solved() && !r.optimized_schedule.is_empty())
    {
        let headway = result.min_headway_minutes().unwrap_or(min_headway);
        let throughput =
            section_throughput(&result.optimized_schedule, headway).throughput_per_hour;
        let deviation = result.total_deviation_minutes;
        comparison
            .throughput_comparison
            .insert(result.scenario.to_string(), throughput);
        comparison
            .deviation_comparison
            .insert(result.scenario.to_string(), deviation);

        if best_throughput.map_or(true, |(_, best)| throughput > best) {
            best_throughput = Some((result.scenario, throughput));
        }
        if least_disruption.map_or(true, |(_, least)| deviation < least) {
            least_disruption = Some((result.scenario, deviation));
        }
    }
    comparison.best_throughput = best_throughput.map(|(s, _)| s);
    comparison.least_disruption = least_disruption.map(|(s, _)| s);

    let throughput_of = |s: Scenario| comparison.throughput_comparison.get(&s.to_string()).copied();
    if let Some(reduced) = throughput_of(Scenario::ReduceHeadway) {
        if reduced > throughput_of(Scenario::Default).unwrap_or(0.0) {
            comparison
                .recommendations
                .push("Reducing headway can improve throughput".to_string());
        }
    }
    if comparison
        .deviation_comparison
        .contains_key(&Scenario::WeatherDisruption.to_string())
    {
        comparison
            .recommendations
            .push("Weather scenarios show system resilience with manageable delays".to_string());
    }
    comparison
}
