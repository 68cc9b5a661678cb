//! Graph analyzers: blocking paths, bottlenecks and overall impact.

mod blocking;
mod impact;

pub use blocking::{
    BlockingPath, BlockingPathAnalyzer, Bottleneck, BottleneckType, BOTTLENECK_PERCENT,
    DEFAULT_BLOCKING_THRESHOLD, DEFAULT_MAX_PATHS,
};
pub use impact::{ImpactCalculator, PerformanceImpact, MAX_OPTIMIZATION_POTENTIAL};

/// `part` as a percentage of `total`; 0 when `total` is not positive.
#[inline]
pub(crate) fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}
