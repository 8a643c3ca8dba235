mod resolver;
mod selector;
mod usage;

pub use resolver::resolve;
pub use selector::select;
pub use usage::{FeatureSet, SubUnit, UsageSnapshot};
