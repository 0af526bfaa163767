//! Usage and cost accounting for a run.
//!
//! Cost is always recomputed from the token totals instead of being summed
//! per request, so repeated updates never accumulate floating-point drift.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::TokenUsage;

/// Dollar rates per 1000 tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub input_per_k: f64,
    pub output_per_k: f64,
}

impl CostRates {
    pub fn new(input_per_k: f64, output_per_k: f64) -> Self {
        Self {
            input_per_k,
            output_per_k,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        self.input_per_k * prompt_tokens as f64 / 1000.0
            + self.output_per_k * completion_tokens as f64 / 1000.0
    }
}

/// Point-in-time view of a run, as shown to an operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub remaining: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl Progress {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Remaining: {} | Cost: ${:.4} | Input Tokens: {} | Output Tokens: {}",
            self.remaining, self.cost, self.prompt_tokens, self.completion_tokens
        )
    }
}

/// Shared counters updated by every worker of a run.
pub struct RunAccumulator {
    rates: CostRates,
    state: Mutex<Progress>,
    tx: watch::Sender<Progress>,
}

impl RunAccumulator {
    pub fn new(rates: CostRates) -> Self {
        let (tx, _rx) = watch::channel(Progress::default());
        Self {
            rates,
            state: Mutex::new(Progress::default()),
            tx,
        }
    }

    pub fn rates(&self) -> CostRates {
        self.rates
    }

    /// Resets the counters for a run of `total` rows.
    pub fn start(&self, total: usize) {
        self.update(|progress| {
            *progress = Progress {
                remaining: total,
                ..Progress::default()
            };
        });
    }

    /// Records a successful request.
    pub fn record(&self, usage: TokenUsage) -> Progress {
        let rates = self.rates;
        self.update(|progress| {
            progress.prompt_tokens += usage.prompt_tokens;
            progress.completion_tokens += usage.completion_tokens;
            progress.remaining = progress.remaining.saturating_sub(1);
            progress.cost = rates.cost(progress.prompt_tokens, progress.completion_tokens);
        })
    }

    /// Records a row that finished without a usable response.
    pub fn record_failure(&self) -> Progress {
        self.update(|progress| {
            progress.remaining = progress.remaining.saturating_sub(1);
        })
    }

    pub fn snapshot(&self) -> Progress {
        *self.lock()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut Progress)) -> Progress {
        let mut progress = self.lock();
        apply(&mut progress);
        // Snapshots are published in update order.
        self.tx.send_replace(*progress);
        *progress
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for RunAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunAccumulator")
            .field("rates", &self.rates)
            .field("progress", &self.snapshot())
            .finish()
    }
}
