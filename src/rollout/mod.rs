mod experience;
mod history;
mod metrics;
mod trajectory;
mod worker;

pub use experience::{Batch, ExperienceRow};
pub use history::PassHistory;
pub use metrics::WorkerMetrics;
pub use trajectory::{Returns, TrajectoryBuffer};
pub use worker::RolloutWorker;
