mod attributor;

pub use attributor::{ALPHA, BETA, RewardMap, attribute, sigma_ratio};
