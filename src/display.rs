//! Plain-text rendering of a cycle report.

use std::fmt;

use rust_decimal::Decimal;

use crate::aggregator::{CycleReport, Freshness};
use crate::orderbook::{BookSide, ExecutionOutcome, ExecutionResult};
use crate::utils::round_to_increment;
use crate::venue::VenueId;

/// Side-by-side venue levels, execution prices and venue freshness.
pub struct ReportView<'a> {
    report: &'a CycleReport,
    depth: usize,
    increment: Decimal,
}

impl<'a> ReportView<'a> {
    /// Show `depth` levels per venue side; prices rounded to `increment`.
    pub fn new(report: &'a CycleReport, depth: usize, increment: Decimal) -> Self {
        Self {
            report,
            depth,
            increment,
        }
    }

    fn write_side(&self, f: &mut fmt::Formatter<'_>, side: BookSide) -> fmt::Result {
        let book = &self.report.book;
        let coinbase: Vec<_> = book.venue_levels(VenueId::Coinbase, side).collect();
        let gemini: Vec<_> = book.venue_levels(VenueId::Gemini, side).collect();

        for i in 0..self.depth {
            write!(f, "Level {} - ", i + 1)?;
            write_level(f, VenueId::Coinbase, coinbase.get(i).map(|l| (l.price(), l.quantity())))?;
            write!(f, " | ")?;
            write_level(f, VenueId::Gemini, gemini.get(i).map(|l| (l.price(), l.quantity())))?;
            writeln!(f)?;
        }
        Ok(())
    }

    fn write_execution(
        &self,
        f: &mut fmt::Formatter<'_>,
        verb: &str,
        result: &ExecutionResult,
    ) -> fmt::Result {
        let quantity = result.requested_quantity.normalize();
        match (result.outcome(), result.average_price) {
            (ExecutionOutcome::NoLiquidity, _) | (_, None) => {
                writeln!(f, "To {verb} {quantity} BTC = no liquidity")
            }
            (ExecutionOutcome::Filled, Some(avg)) => writeln!(
                f,
                "To {verb} {quantity} BTC = ${} (avg ${})",
                format_usd(result.notional),
                format_usd(round_to_increment(avg, self.increment)),
            ),
            (ExecutionOutcome::Partial, Some(avg)) => writeln!(
                f,
                "To {verb} {quantity} BTC = ${} for {} BTC only (avg ${}, book exhausted)",
                format_usd(result.notional),
                result.filled_quantity.normalize(),
                format_usd(round_to_increment(avg, self.increment)),
            ),
        }
    }
}

impl fmt::Display for ReportView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;

        writeln!(f, "Cycle #{} ({})", report.sequence, report.produced_at)?;
        writeln!(f, "Bids:")?;
        self.write_side(f, BookSide::Bid)?;
        writeln!(f, "\nAsks:")?;
        self.write_side(f, BookSide::Ask)?;

        writeln!(f, "\n--- Execution prices (unified book: Coinbase + Gemini) ---")?;
        self.write_execution(f, "Buy", &report.buy)?;
        self.write_execution(f, "Sell", &report.sell)?;

        write!(f, "Venues:")?;
        for status in &report.venues {
            write!(f, " {}={}", status.venue, status.freshness)?;
            match (status.freshness, status.age_ms) {
                (Freshness::Missing, _) | (_, None) => {}
                (_, Some(age)) if status.consecutive_failures > 0 => write!(
                    f,
                    " (age {age}ms, {} failed fetches)",
                    status.consecutive_failures
                )?,
                (_, Some(age)) => write!(f, " (age {age}ms)")?,
            }
        }
        writeln!(f)?;
        writeln!(f, "---")
    }
}

fn write_level(
    f: &mut fmt::Formatter<'_>,
    venue: VenueId,
    level: Option<(Decimal, Decimal)>,
) -> fmt::Result {
    match level {
        Some((price, size)) => write!(
            f,
            "{}: price={}, size={}",
            venue.label(),
            price.normalize(),
            size.normalize()
        ),
        None => write!(f, "{}: None", venue.label()),
    }
}

/// Render `report` with `depth` levels per venue side.
pub fn render_report(report: &CycleReport, depth: usize, increment: Decimal) -> String {
    ReportView::new(report, depth, increment).to_string()
}

/// Dollar amount with two decimals and thousands separators.
pub fn format_usd(value: Decimal) -> String {
    let fixed = format!("{:.2}", round_to_increment(value, Decimal::new(1, 2)));
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}
