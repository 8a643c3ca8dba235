mod linear;
mod picker;
mod policy;
mod trainer;

pub use linear::{LinearAgent, PpoParams};
pub use picker::pick_unapplied;
pub use policy::Policy;
pub use trainer::Trainer;
