use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use obench_types::{FailureKind, RunFailure};
use tracing::{debug, warn};

/// Receives failures as the runner meets them.
pub trait RunObserver: Send + Sync {
    fn notify(&self, failure: &RunFailure);
}

/// Logs each distinct failure once and keeps a tally of repeats.
///
/// Identical (kind, scope, message) events after the first are counted at debug level
/// only, so a model that fails every case does not flood the output.
#[derive(Debug, Default)]
pub struct LogNotifier {
    inner: Mutex<NotifierState>,
}

#[derive(Debug, Default)]
struct NotifierState {
    order: Vec<RunFailure>,
    counts: HashMap<RunFailure, usize>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NotifierState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Distinct failures in the order first seen, with how often each occurred.
    pub fn failures(&self) -> Vec<(RunFailure, usize)> {
        let state = self.state();
        state
            .order
            .iter()
            .map(|f| (f.clone(), state.counts.get(f).copied().unwrap_or(0)))
            .collect()
    }

    /// Total events received, duplicates included.
    pub fn total(&self) -> usize {
        self.state().counts.values().sum()
    }

    pub fn count_of(&self, kind: FailureKind) -> usize {
        let state = self.state();
        state
            .counts
            .iter()
            .filter(|(f, _)| f.kind == kind)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.state().order.is_empty()
    }
}

impl RunObserver for LogNotifier {
    fn notify(&self, failure: &RunFailure) {
        let mut state = self.state();
        let count = {
            let count = state.counts.entry(failure.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if count == 1 {
            state.order.push(failure.clone());
            warn!(
                kind = ?failure.kind,
                scope = %failure.scope,
                message = %failure.message,
                "Benchmark failure"
            );
        } else {
            debug!(
                kind = ?failure.kind,
                scope = %failure.scope,
                repeats = count,
                "Repeated benchmark failure"
            );
        }
    }
}
