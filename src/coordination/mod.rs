mod gate;
mod shared;
mod updater;

pub use gate::Gate;
pub use shared::{Admission, EpisodeSummary, Phase, SharedState, StopHandle};
pub use updater::{UpdateCoordinator, UpdateStats};
