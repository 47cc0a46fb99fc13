mod filter;
mod result;

pub use filter::{DetectionFilter, FilterSettings};
pub use result::{Detection, DetectionSummary};
