use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV candlestick data
///
/// `timestamp` is the bar's open time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(f64::NAN)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(f64::NAN)
    }

    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(f64::NAN)
    }
}

/// Bar interval understood by the exchange (`15m`, `1h`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H8 => 480,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1440,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "6h" => Ok(Timeframe::H6),
            "8h" => Ok(Timeframe::H8),
            "12h" => Ok(Timeframe::H12),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{}'", other)),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// The three timeframes a snapshot is built from, shortest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframes {
    pub short: Timeframe,
    pub mid: Timeframe,
    pub long: Timeframe,
}

impl Timeframes {
    pub fn all(&self) -> [Timeframe; 3] {
        [self.short, self.mid, self.long]
    }
}

impl Default for Timeframes {
    fn default() -> Self {
        Self {
            short: Timeframe::M15,
            mid: Timeframe::H1,
            long: Timeframe::H4,
        }
    }
}

/// Directional opinion of one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vote {
    Buy,
    Sell,
    Neutral,
}

impl Vote {
    /// Trade direction this vote asks for (None for neutral)
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Vote::Buy => Some(Direction::Long),
            Vote::Sell => Some(Direction::Short),
            Vote::Neutral => None,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Buy => f.write_str("BUY"),
            Vote::Sell => f.write_str("SELL"),
            Vote::Neutral => f.write_str("NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The vote that confirms this direction
    pub fn vote(&self) -> Vote {
        match self {
            Direction::Long => Vote::Buy,
            Direction::Short => Vote::Sell,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeVote {
    pub timeframe: Timeframe,
    pub vote: Vote,
}

/// All timeframe votes for one symbol at one instant, shortest timeframe first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub votes: [TimeframeVote; 3],
}

impl SignalSnapshot {
    pub fn new(timeframes: &Timeframes, short: Vote, mid: Vote, long: Vote) -> Self {
        Self {
            votes: [
                TimeframeVote {
                    timeframe: timeframes.short,
                    vote: short,
                },
                TimeframeVote {
                    timeframe: timeframes.mid,
                    vote: mid,
                },
                TimeframeVote {
                    timeframe: timeframes.long,
                    vote: long,
                },
            ],
        }
    }

    pub fn short(&self) -> Vote {
        self.votes[0].vote
    }

    pub fn mid(&self) -> Vote {
        self.votes[1].vote
    }

    pub fn long(&self) -> Vote {
        self.votes[2].vote
    }

    pub fn vote_vector(&self) -> [Vote; 3] {
        [self.short(), self.mid(), self.long()]
    }

    /// True when every timeframe voted the same way as in `other`
    pub fn same_votes(&self, other: &SignalSnapshot) -> bool {
        self.vote_vector() == other.vote_vector()
    }
}

impl fmt::Display for SignalSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .votes
            .iter()
            .map(|tv| format!("{}={}", tv.timeframe, tv.vote))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Aggregator verdict for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    None,
    Immediate {
        direction: Direction,
        leverage: u32,
    },
    Deferred {
        direction: Direction,
        leverage: u32,
        reference_price: Decimal,
        strategy_note: String,
    },
}

impl Decision {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Decision::None => None,
            Decision::Immediate { direction, .. } | Decision::Deferred { direction, .. } => {
                Some(*direction)
            }
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::None)
    }
}

/// Latest price information for a symbol
///
/// The historical simulator feeds whole bars, the live monitor only
/// knows the last traded price.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceTick {
    Bar(Candle),
    Last(Decimal),
}

impl PriceTick {
    /// Reference price for entries and equity marks
    pub fn price(&self) -> Decimal {
        match self {
            PriceTick::Bar(candle) => candle.close,
            PriceTick::Last(price) => *price,
        }
    }
}
