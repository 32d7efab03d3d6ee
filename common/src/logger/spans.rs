use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Root span for one auction. `winner` and `status` are recorded once the
/// auction reaches its terminal state.
pub fn auction_span(request_id: &str, ad_unit_id: &str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "auction",
        request_id = %request_id,
        ad_unit_id = %ad_unit_id,
        trace_id = %trace_id.as_str(),
        status = field::Empty,
        winner = field::Empty
    )
}

/// Child span; inherits the auction fields from its parent.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name)
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
