//! Weighted, rate-limit-aware provider selection.
//!
//! The selector is a pure decision over a snapshot of provider cooldowns
//! plus the current time; it performs no I/O and never stamps a timestamp
//! itself (that is [`Provider::reserve`](super::Provider::reserve)'s job).
//! Randomness is the only nondeterministic element and is isolated behind a
//! seedable RNG so selection replays exactly under a fixed seed.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use super::registry::Provider;

/// The selector's verdict: the provider to try next, and how long the
/// caller must pause before it may legally be used (zero = eligible now).
#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: Arc<Provider>,
    pub wait: Duration,
}

/// Picks one provider per dispatch attempt.
pub struct ProviderSelector {
    rng: Mutex<StdRng>,
}

impl ProviderSelector {
    /// Selector with entropy-seeded randomness (production).
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Selector with a fixed seed, for replayable tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Select exactly one provider to try next.
    ///
    /// 1. If every provider is cooling down, return the one that becomes
    ///    eligible soonest, with its remaining wait (ties: first in
    ///    registry order — deterministic).
    /// 2. Otherwise pick uniformly at random from a pool where each
    ///    eligible provider contributes `weight` tickets.
    /// 3. If the pool is empty by the time it is built (providers became
    ///    ineligible between the two passes), fall back to the provider
    ///    with the earliest next-eligible instant.
    pub fn select(&self, providers: &[Arc<Provider>], now: Instant) -> Selection {
        debug_assert!(!providers.is_empty(), "selector needs at least one provider");

        let waits: Vec<Duration> = providers.iter().map(|p| p.wait_at(now)).collect();

        if waits.iter().all(|w| *w > Duration::ZERO) {
            // Everyone is cooling down: soonest-eligible wins, first index
            // wins ties.
            let mut best = 0;
            for (i, wait) in waits.iter().enumerate().skip(1) {
                if *wait < waits[best] {
                    best = i;
                }
            }
            return Selection {
                provider: Arc::clone(&providers[best]),
                wait: waits[best],
            };
        }

        let mut pool = Vec::new();
        for (i, wait) in waits.iter().enumerate() {
            if wait.is_zero() {
                for _ in 0..providers[i].weight() {
                    pool.push(i);
                }
            }
        }

        if pool.is_empty() {
            // Race guard: eligibility evaporated between the two passes.
            // Earliest next slot wins, first index wins ties.
            let mut best = 0;
            for (i, provider) in providers.iter().enumerate().skip(1) {
                if provider.next_slot(now) < providers[best].next_slot(now) {
                    best = i;
                }
            }
            return Selection {
                provider: Arc::clone(&providers[best]),
                wait: providers[best].wait_at(now),
            };
        }

        let idx = {
            let mut rng = self.rng.lock().expect("selector rng lock poisoned");
            pool[rng.gen_range(0..pool.len())]
        };
        Selection {
            provider: Arc::clone(&providers[idx]),
            wait: Duration::ZERO,
        }
    }
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::new()
    }
}
