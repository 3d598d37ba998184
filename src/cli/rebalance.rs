use super::{show, ui};
use crate::core::portfolio::Portfolio;
use crate::core::price::PriceLookup;
use crate::core::rebalance::{Correction, rebalance};
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::path::Path;
use tracing::info;

fn trades_table(portfolio: &Portfolio, correction: Correction) -> String {
    let mut table = ui::new_styled_table();

    table.set_header(vec![
        ui::header_cell("Position"),
        ui::header_cell("Price"),
        ui::header_cell("Shares"),
        ui::header_cell("Trade"),
        ui::header_cell("Rebalanced Value"),
        ui::header_cell("Rebalanced (%)"),
        ui::header_cell("Goal (%)"),
    ]);

    for position in &portfolio.positions {
        table.add_row(vec![
            Cell::new(position.label()),
            ui::number_cell(format!("{:.2}", position.price)),
            ui::number_cell(position.shares.to_string()),
            ui::trade_cell(position.new_shares),
            ui::number_cell(format!("{:.2}", position.rebalance_sum)),
            ui::number_cell(format!("{:.2}%", position.rebalance_ratio * 100.0)),
            ui::format_percentage_cell(position.goal_ratio * 100.0, |r| format!("{r:.2}%")),
        ]);
    }

    let uninvested = portfolio.sum_existing + portfolio.reinvest - portfolio.sum_with_reinvest;
    let correction_note = match correction {
        Correction::None => String::new(),
        Correction::RoundedDown(n) => format!(" (rounding corrected by -{n} shares)"),
        Correction::RoundedUp(n) => format!(" (rounding corrected by +{n} shares)"),
    };

    let mut output = format!(
        "Portfolio: {}\n\n",
        ui::style_text(&portfolio.name, ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{}: {:.2}  {}: {:.2}",
        ui::style_text("Current Value", ui::StyleType::TotalLabel),
        portfolio.sum_existing,
        ui::style_text("Reinvest", ui::StyleType::TotalLabel),
        portfolio.reinvest,
    ));
    output.push_str(&format!(
        "\n{}: {}{}",
        ui::style_text("Rebalanced Value", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("{:.2}", portfolio.sum_with_reinvest),
            ui::StyleType::TotalValue
        ),
        ui::style_text(&correction_note, ui::StyleType::Subtle),
    ));
    output.push_str(&format!(
        "\n{}: {:.2}",
        ui::style_text("Uninvested Cash", ui::StyleType::TotalLabel),
        uninvested
    ));

    output
}

/// Rebalances every portfolio in place. `reinvest` overrides each
/// portfolio's configured amount.
pub fn rebalance_all(
    portfolios: &mut [Portfolio],
    reinvest: Option<f64>,
) -> Result<Vec<Correction>> {
    portfolios
        .iter_mut()
        .map(|portfolio| {
            let amount = reinvest.unwrap_or(portfolio.reinvest);
            rebalance(portfolio, amount)
                .with_context(|| format!("Failed to rebalance portfolio '{}'", portfolio.name))
        })
        .collect()
}

/// Writes the rebalanced portfolios as pretty-printed JSON.
pub fn write_output(portfolios: &[Portfolio], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(portfolios)
        .context("Failed to serialize rebalanced portfolios")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    info!("Wrote rebalanced portfolios to {}", path.display());
    Ok(())
}

pub async fn run(
    mut portfolios: Vec<Portfolio>,
    prices: &dyn PriceLookup,
    reinvest: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    show::price_portfolios(&mut portfolios, prices).await?;
    let corrections = rebalance_all(&mut portfolios, reinvest)?;

    let count = portfolios.len();
    for (i, (portfolio, correction)) in portfolios.iter().zip(corrections).enumerate() {
        println!("{}", trades_table(portfolio, correction));
        if i + 1 < count {
            ui::print_separator();
        }
    }

    if let Some(path) = output {
        write_output(&portfolios, path)?;
    }
    Ok(())
}
