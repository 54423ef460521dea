use crate::models::{Direction, Vote};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a decision was suppressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CooldownBlock {
    /// Symbol recently stopped out, both directions blocked
    PostStop { until: DateTime<Utc> },
    /// Same direction traded recently on this symbol
    Signal {
        direction: Direction,
        until: DateTime<Utc>,
    },
    /// Identical vote vector already dispatched for this direction
    Duplicate { direction: Direction },
}

#[derive(Debug, Clone)]
struct DispatchRecord {
    votes: [Vote; 3],
    at: DateTime<Utc>,
}

/// Time-window gates for repeated or flapping decisions
///
/// Expired entries are dropped lazily when queried.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    signal_window: Duration,
    post_stop_window: Duration,
    signal: HashMap<(String, Direction), DateTime<Utc>>,
    post_stop: HashMap<String, DateTime<Utc>>,
    dispatched: HashMap<(String, Direction), DispatchRecord>,
}

impl CooldownTracker {
    pub fn new(signal_window: Duration, post_stop_window: Duration) -> Self {
        Self {
            signal_window,
            post_stop_window,
            signal: HashMap::new(),
            post_stop: HashMap::new(),
            dispatched: HashMap::new(),
        }
    }

    /// Check whether a decision may be dispatched
    ///
    /// # Arguments
    /// * `votes` - Vote vector behind the decision, for duplicate detection
    /// * `now` - Wall time (live) or bar time (simulation)
    pub fn check(
        &mut self,
        symbol: &str,
        direction: Direction,
        votes: &[Vote; 3],
        now: DateTime<Utc>,
    ) -> Result<(), CooldownBlock> {
        if let Some(&until) = self.post_stop.get(symbol) {
            if now < until {
                return Err(CooldownBlock::PostStop { until });
            }
            self.post_stop.remove(symbol);
        }

        let key = (symbol.to_string(), direction);

        if let Some(&until) = self.signal.get(&key) {
            if now < until {
                return Err(CooldownBlock::Signal { direction, until });
            }
            self.signal.remove(&key);
        }

        if let Some(record) = self.dispatched.get(&key) {
            if now < record.at + self.signal_window {
                if record.votes == *votes {
                    return Err(CooldownBlock::Duplicate { direction });
                }
            } else {
                self.dispatched.remove(&key);
            }
        }

        Ok(())
    }

    /// Remember the vote vector of a dispatched decision
    pub fn record_dispatch(
        &mut self,
        symbol: &str,
        direction: Direction,
        votes: [Vote; 3],
        now: DateTime<Utc>,
    ) {
        self.dispatched
            .insert((symbol.to_string(), direction), DispatchRecord { votes, at: now });
    }

    /// Block the (symbol, direction) pair for the signal window
    pub fn start_signal_cooldown(&mut self, symbol: &str, direction: Direction, now: DateTime<Utc>) {
        let until = now + self.signal_window;
        tracing::debug!("{} {} signal cooldown until {}", symbol, direction, until);
        self.signal.insert((symbol.to_string(), direction), until);
    }

    /// Block every decision for the symbol for the post-stop window
    pub fn start_post_stop_cooldown(&mut self, symbol: &str, now: DateTime<Utc>) {
        let until = now + self.post_stop_window;
        tracing::info!("{} stopped out, cooling down until {}", symbol, until);
        self.post_stop.insert(symbol.to_string(), until);
    }

    /// Number of stored entries, including ones not yet lazily expired
    pub fn stored_entries(&self) -> usize {
        self.signal.len() + self.post_stop.len() + self.dispatched.len()
    }
}
