//! Stats accumulation across model calls.

use obench_types::Stats;

/// Sums per-call [`Stats`] into running totals.
///
/// A field stays `None` until at least one call reports it, so "never reported" and
/// "reported as zero" remain distinguishable after accumulation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsAccumulator {
    totals: Stats,
    calls: usize,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one call's stats into the totals.
    pub fn add(&mut self, stats: &Stats) {
        let totals = &mut self.totals;
        totals.prompt_eval_count = add_optional(totals.prompt_eval_count, stats.prompt_eval_count);
        totals.eval_count = add_optional(totals.eval_count, stats.eval_count);
        totals.prompt_eval_duration =
            add_optional(totals.prompt_eval_duration, stats.prompt_eval_duration);
        totals.eval_duration = add_optional(totals.eval_duration, stats.eval_duration);
        totals.total_duration = add_optional(totals.total_duration, stats.total_duration);
        totals.load_duration = add_optional(totals.load_duration, stats.load_duration);
        self.calls += 1;
    }

    /// Number of calls folded in so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Accumulated totals.
    pub fn finalize(&self) -> Stats {
        self.totals
    }

    /// Ratio-of-sums prompt throughput over everything accumulated.
    pub fn prompt_tokens_per_second(&self) -> Option<f64> {
        self.totals.prompt_tokens_per_second()
    }

    /// Ratio-of-sums generation throughput over everything accumulated.
    pub fn eval_tokens_per_second(&self) -> Option<f64> {
        self.totals.eval_tokens_per_second()
    }
}

fn add_optional(total: Option<u64>, value: Option<u64>) -> Option<u64> {
    match (total, value) {
        (Some(total), Some(value)) => Some(total.saturating_add(value)),
        (None, value) => value,
        (total, None) => total,
    }
}

/// Arithmetic mean of the finite values, `None` when there are none.
pub fn average_finite<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
