use crate::models::{Decision, Direction, SignalSnapshot, Vote};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Leverage when all three timeframes agree
pub const FULL_AGREEMENT_LEVERAGE: u32 = 10;
/// Leverage for a two-of-three majority
pub const MAJORITY_LEVERAGE: u32 = 5;

/// Combines per-timeframe votes into trade decisions
///
/// Holds one previous snapshot per symbol. A decision is only produced
/// when at least one vote changed since that snapshot; the first snapshot
/// seen for a symbol is a warm-up baseline and never trades.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    previous: HashMap<String, SignalSnapshot>,
    retrace_pct: Decimal,
}

impl SignalAggregator {
    /// # Arguments
    /// * `retrace_pct` - Pullback a deferred entry waits for (e.g. 0.01 = 1%)
    pub fn new(retrace_pct: Decimal) -> Self {
        Self {
            previous: HashMap::new(),
            retrace_pct,
        }
    }

    /// Evaluate the current snapshot for a symbol
    ///
    /// # Arguments
    /// * `price` - Price at decision time, recorded as the deferred reference price
    pub fn evaluate(&mut self, symbol: &str, current: SignalSnapshot, price: Decimal) -> Decision {
        let Some(previous) = self.previous.get(symbol) else {
            tracing::debug!("{} warm-up snapshot stored: {}", symbol, current);
            self.previous.insert(symbol.to_string(), current);
            return Decision::None;
        };

        if previous.same_votes(&current) {
            return Decision::None;
        }

        tracing::debug!("{} votes changed: {} -> {}", symbol, previous, current);

        let decision = Self::classify(&current, price, self.retrace_pct);
        self.previous.insert(symbol.to_string(), current);
        decision
    }

    /// Decision for a vote vector, independent of any previous snapshot
    pub fn classify(snapshot: &SignalSnapshot, price: Decimal, retrace_pct: Decimal) -> Decision {
        let (short, mid, long) = (snapshot.short(), snapshot.mid(), snapshot.long());

        if short == mid && mid == long {
            return match short.direction() {
                Some(direction) => Decision::Immediate {
                    direction,
                    leverage: FULL_AGREEMENT_LEVERAGE,
                },
                None => Decision::None,
            };
        }

        // Short timeframe opposes an otherwise agreeing mid/long pair
        if mid == long {
            if let (Some(trend), Some(counter)) = (mid.direction(), short.direction()) {
                if trend != counter {
                    return Decision::Deferred {
                        direction: trend,
                        leverage: MAJORITY_LEVERAGE,
                        reference_price: price,
                        strategy_note: Self::deferral_note(snapshot, trend, retrace_pct),
                    };
                }
            }
        }

        let votes = snapshot.vote_vector();
        let buys = votes.iter().filter(|v| **v == Vote::Buy).count();
        let sells = votes.iter().filter(|v| **v == Vote::Sell).count();

        if buys >= 2 {
            Decision::Immediate {
                direction: Direction::Long,
                leverage: MAJORITY_LEVERAGE,
            }
        } else if sells >= 2 {
            Decision::Immediate {
                direction: Direction::Short,
                leverage: MAJORITY_LEVERAGE,
            }
        } else {
            Decision::None
        }
    }

    fn deferral_note(snapshot: &SignalSnapshot, direction: Direction, retrace_pct: Decimal) -> String {
        let pct = (retrace_pct * Decimal::ONE_HUNDRED).normalize();
        let move_word = match direction {
            Direction::Long => "drop",
            Direction::Short => "rise",
        };
        format!(
            "{} {}: wait for a {}% {} or a {} flip to {}",
            snapshot.votes[0].timeframe,
            snapshot.short(),
            pct,
            move_word,
            snapshot.votes[0].timeframe,
            direction.vote()
        )
    }

    pub fn previous(&self, symbol: &str) -> Option<&SignalSnapshot> {
        self.previous.get(symbol)
    }

    /// Number of symbols with a stored baseline
    pub fn tracked_symbols(&self) -> usize {
        self.previous.len()
    }
}
