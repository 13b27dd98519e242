//! Text rendering of the inside levels

use rust_decimal::Decimal;

use super::{BookSnapshot, Level};

const QUANTITY_PRECISION: u32 = 5;
const PRICE_PRECISION: u32 = 2;

/// Render a snapshot as a ladder: asks worst-first above a rule, bids
/// best-first below it, columns right-aligned across both sides.
pub fn format_inside_levels(snapshot: &BookSnapshot) -> String {
    let asks: Vec<(String, String)> = snapshot.asks.iter().map(render).collect();
    let bids: Vec<(String, String)> = snapshot.bids.iter().map(render).collect();

    let quantity_width = asks.iter().chain(&bids).map(|(q, _)| q.len()).max().unwrap_or(0);
    let price_width = asks.iter().chain(&bids).map(|(_, p)| p.len()).max().unwrap_or(0);

    let line = |(quantity, price): &(String, String)| {
        format!(" {quantity:>quantity_width$} @ {price:>price_width$}")
    };

    let mut lines = Vec::with_capacity(asks.len() + bids.len() + 1);
    lines.extend(asks.iter().rev().map(&line));
    lines.push("-".repeat(quantity_width + price_width + 5));
    lines.extend(bids.iter().map(&line));
    lines.join("\n")
}

fn render(level: &Level) -> (String, String) {
    (
        fixed(level.quantity, QUANTITY_PRECISION),
        fixed(level.price, PRICE_PRECISION),
    )
}

fn fixed(value: Decimal, dp: u32) -> String {
    format!("{:.*}", dp as usize, value.round_dp(dp))
}
