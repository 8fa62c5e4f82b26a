use std::path::PathBuf;

use log::{error, info};
use sectionopt::{
    config::OptimizerConfig,
    parser::{format_clock, JsonFileSource, ScheduleSource},
    throughput::{compare_scenarios, recommendations, section_throughput},
    OptimizationResult, Scenario, SectionOptimizer,
};
use serde_json::json;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "sectionopt")]
struct Opt {
    /// Scenario to optimize for
    #[structopt(short, long, default_value = "default")]
    scenario: Scenario,

    /// Optimize every scenario and compare them
    #[structopt(long)]
    sweep: bool,

    /// Also report the best schedule strictly worse than the optimum
    #[structopt(long)]
    next_best: bool,

    /// Assign schedules greedily when the time budget runs out
    #[structopt(long)]
    fallback: bool,

    /// Optimizer configuration as JSON
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Minimum headway in minutes
    #[structopt(long)]
    headway: Option<i32>,

    /// Time budget in seconds
    #[structopt(long)]
    timeout: Option<f64>,

    #[structopt(short, long)]
    print_table: bool,

    /// Print hprof timings after each file. With --sweep only the total sweep time is shown,
    /// since the scenarios run on their own threads
    #[structopt(long)]
    profile: bool,

    /// Schedule files to process
    #[structopt(name = "FILE", parse(from_os_str))]
    files: Vec<PathBuf>,
}

fn load_config(opt: &Opt) -> Result<OptimizerConfig, String> {
    let mut config = match &opt.config {
        Some(path) => OptimizerConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => OptimizerConfig::default(),
    };
    if let Some(headway) = opt.headway {
        config.min_headway_minutes = headway;
    }
    if let Some(timeout) = opt.timeout {
        config.time_budget_seconds = timeout;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn report(result: &OptimizationResult, min_headway: i32) -> serde_json::Value {
    let headway = result.min_headway_minutes().unwrap_or(min_headway);
    let stats = section_throughput(&result.optimized_schedule, headway);
    json!({
        "result": result,
        "throughput": stats,
        "recommendations": recommendations(result, &stats, headway),
    })
}

fn print_table(file: &str, result: &OptimizationResult) {
    println!(
        "{}  {}  {:?}  adjusted {}/{}  deviation {}  {:.0}",
        file,
        result.scenario,
        result.status,
        result.trains_adjusted,
        result.total_trains,
        result.total_deviation_minutes,
        result.solve_time_seconds * 1000.0,
    );
    for a in result.optimized_schedule.iter().filter(|a| a.is_adjusted()) {
        println!(
            "    {:<10} {}-{} -> {}-{}",
            a.train_id,
            format_clock(a.original_entry),
            format_clock(a.original_exit),
            format_clock(a.optimized_entry),
            format_clock(a.optimized_exit),
        );
    }
}

pub fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let config = match load_config(&opt) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    if opt.files.is_empty() {
        error!("No input files specified");
        std::process::exit(2);
    }

    let min_headway = config.min_headway_minutes;
    let optimizer = SectionOptimizer::new(config);
    let mut failed = false;

    for file in &opt.files {
        hprof::start_frame();
        let name = file.to_string_lossy().to_string();
        info!("Solving {}", name);

        let schedules = match JsonFileSource::new(file).schedules() {
            Ok(schedules) => schedules,
            Err(e) => {
                error!("{}: {}", name, e);
                failed = true;
                continue;
            }
        };

        let results = if opt.sweep {
            optimizer.sweep(&schedules, &Scenario::ALL)
        } else {
            let first = if opt.fallback {
                optimizer.optimize_with_fallback(&schedules, opt.scenario)
            } else {
                optimizer.optimize(&schedules, opt.scenario)
            };
            let mut results = vec![first];
            if opt.next_best && results[0].status.is_solved() && !results[0].heuristic {
                let next = optimizer.next_best(&schedules, &results[0]);
                results.push(next);
            }
            results
        };

        if opt.print_table {
            for result in &results {
                print_table(&name, result);
            }
        } else {
            let mut output = json!({
                "file": name,
                "results": results.iter().map(|r| report(r, min_headway)).collect::<Vec<_>>(),
            });
            if opt.sweep {
                output["comparison"] = json!(compare_scenarios(&results, min_headway));
            }
            match serde_json::to_string_pretty(&output) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    error!("Could not serialize results: {}", e);
                    failed = true;
                }
            }
        }

        if opt.profile {
            hprof::profiler().print_timing();
        }
    }

    if failed {
        std::process::exit(1);
    }
}
