use crate::execution::position_manager::{ClosedTrade, ExitReason};
use crate::format::format_pct;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading days per year used to annualize the Sharpe ratio
const ANNUALIZATION_PERIODS: f64 = 252.0;

/// One point of the equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub equity: Decimal,
    pub open_positions: usize,
}

/// Equity curve, running drawdown and closed trades of one run
#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    initial_balance: Decimal,
    equity_curve: Vec<EquitySample>,
    trades: Vec<ClosedTrade>,
    peak_equity: Decimal,
    max_drawdown_pct: f64,
}

impl StatisticsEngine {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            equity_curve: Vec::new(),
            trades: Vec::new(),
            peak_equity: initial_balance,
            max_drawdown_pct: 0.0,
        }
    }

    /// Append an equity sample
    ///
    /// Samples older than the last one are rejected, so the curve stays
    /// in time order. Returns whether the sample was recorded.
    pub fn record_equity(&mut self, sample: EquitySample) -> bool {
        if let Some(last) = self.equity_curve.last() {
            if sample.timestamp < last.timestamp {
                tracing::warn!(
                    "Dropping out-of-order equity sample at {} (last {})",
                    sample.timestamp,
                    last.timestamp
                );
                return false;
            }
        }

        // Peak tracks the recorded curve only
        if self.equity_curve.is_empty() || sample.equity > self.peak_equity {
            self.peak_equity = sample.equity;
        }

        let drawdown = Self::drawdown_pct(self.peak_equity, sample.equity);
        if drawdown > self.max_drawdown_pct {
            self.max_drawdown_pct = drawdown;
        }

        self.equity_curve.push(sample);
        true
    }

    pub fn record_trade(&mut self, trade: ClosedTrade) {
        self.trades.push(trade);
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    /// Current drawdown from the running peak, in percent
    pub fn current_drawdown_pct(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|s| Self::drawdown_pct(self.peak_equity, s.equity))
            .unwrap_or(0.0)
    }

    fn drawdown_pct(peak: Decimal, equity: Decimal) -> f64 {
        if peak <= Decimal::ZERO {
            return 0.0;
        }
        ((peak - equity) / peak * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// Maximum peak-to-trough decline of an equity series, in percent
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        let mut peak = f64::MIN;
        let mut max_dd = 0.0;

        for &value in equity {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                let dd = (peak - value) / peak * 100.0;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd
    }

    /// Annualized Sharpe ratio of step returns (risk-free rate 0)
    ///
    /// Zero with fewer than two samples or zero variance.
    pub fn sharpe_ratio(equity: &[f64]) -> f64 {
        if equity.len() < 2 {
            return 0.0;
        }

        let returns: Vec<f64> = equity
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();

        if returns.is_empty() {
            return 0.0;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns
            .iter()
            .map(|r| {
                let diff = r - mean;
                diff * diff
            })
            .sum::<f64>()
            / returns.len() as f64;

        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            mean / std_dev * ANNUALIZATION_PERIODS.sqrt()
        } else {
            0.0
        }
    }

    /// Summary of the run so far
    ///
    /// # Arguments
    /// * `final_balance` - Cash balance to report as the end result
    pub fn summary(&self, final_balance: Decimal) -> PerformanceSummary {
        let winners: Vec<&ClosedTrade> = self.trades.iter().filter(|t| t.is_win()).collect();
        let losers: Vec<&ClosedTrade> = self.trades.iter().filter(|t| !t.is_win()).collect();

        let gross_profit: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.pnl).sum();

        let avg_win = if winners.is_empty() {
            Decimal::ZERO
        } else {
            gross_profit / Decimal::from(winners.len())
        };
        let avg_loss = if losers.is_empty() {
            Decimal::ZERO
        } else {
            gross_loss / Decimal::from(losers.len())
        };

        let profit_factor = if gross_loss < Decimal::ZERO {
            (gross_profit / gross_loss.abs()).to_f64().unwrap_or(0.0)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let total_trades = self.trades.len();
        let win_rate = if total_trades > 0 {
            winners.len() as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let total_return_pct = if self.initial_balance > Decimal::ZERO {
            ((final_balance - self.initial_balance) / self.initial_balance * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let avg_holding_minutes = if total_trades > 0 {
            self.trades
                .iter()
                .map(|t| t.duration().num_minutes())
                .sum::<i64>() as f64
                / total_trades as f64
        } else {
            0.0
        };

        let equity: Vec<f64> = self
            .equity_curve
            .iter()
            .filter_map(|s| s.equity.to_f64())
            .collect();

        let count_reason = |reason: ExitReason| {
            self.trades
                .iter()
                .filter(|t| t.exit_reason == reason)
                .count()
        };

        PerformanceSummary {
            initial_balance: self.initial_balance,
            final_balance,
            total_return_pct,
            total_trades,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate,
            gross_profit,
            gross_loss,
            profit_factor,
            avg_win,
            avg_loss,
            max_drawdown_pct: self.max_drawdown_pct,
            sharpe_ratio: Self::sharpe_ratio(&equity),
            total_commission: self.trades.iter().map(|t| t.commission).sum(),
            target_exits: count_reason(ExitReason::Target),
            stop_exits: count_reason(ExitReason::Stop),
            forced_exits: count_reason(ExitReason::Forced),
            avg_holding_minutes,
        }
    }
}

/// Performance statistics of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    // P&L
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_return_pct: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L distribution
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64, // +inf with wins and no losses
    pub avg_win: Decimal,
    pub avg_loss: Decimal,

    // Risk
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    pub total_commission: Decimal,
    pub target_exits: usize,
    pub stop_exits: usize,
    pub forced_exits: usize,
    pub avg_holding_minutes: f64,
}

impl PerformanceSummary {
    /// Print a formatted report to stdout
    pub fn print_report(&self, title: &str) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║ {:^53} ║", title);
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Balance:       ${:.2}", self.initial_balance);
        println!("  Final Balance:         ${:.2}", self.final_balance);
        println!("  Total Return:          {}", format_pct(self.total_return_pct, 2));
        println!("  Commissions:           ${:.2}", self.total_commission);

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);
        println!(
            "  Exits:                 {} target / {} stop / {} forced",
            self.target_exits, self.stop_exits, self.forced_exits
        );

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Gross Profit:          ${:.2}", self.gross_profit);
            println!("  Gross Loss:            ${:.2}", self.gross_loss);
            println!("  Average Win:           ${:.2}", self.avg_win);
            println!("  Average Loss:          ${:.2}", self.avg_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!(
                "  Avg Holding:           {:.1} minutes ({:.1} hours)",
                self.avg_holding_minutes,
                self.avg_holding_minutes / 60.0
            );
        }

        println!("\n⚠️  RISK METRICS");
        println!("  Max Drawdown:          {}", format_pct(self.max_drawdown_pct, 2));
        println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

        println!("\n═════════════════════════════════════════════════════════\n");
    }
}
