pub mod config;
pub mod model;
pub mod optimizer;
pub mod parser;
pub mod problem;
pub mod result;
pub mod scenario;
pub mod solvers;
pub mod throughput;

pub use config::OptimizerConfig;
pub use optimizer::SectionOptimizer;
pub use problem::TrainSchedule;
pub use result::{OptimizationResult, OptimizationStatus};
pub use scenario::Scenario;
