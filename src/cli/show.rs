use super::ui;
use crate::core::portfolio::{Portfolio, update_portfolio_values};
use crate::core::price::PriceLookup;
use anyhow::Result;
use comfy_table::Cell;

impl Portfolio {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();

        table.set_header(vec![
            ui::header_cell("Position"),
            ui::header_cell("Shares"),
            ui::header_cell("Price"),
            ui::header_cell("Value"),
            ui::header_cell("Current (%)"),
            ui::header_cell("Goal (%)"),
        ]);

        for position in &self.positions {
            let name_display = if position.label() == position.symbol {
                position.symbol.clone()
            } else {
                format!("{} ({})", position.symbol, position.label())
            };

            table.add_row(vec![
                Cell::new(name_display),
                ui::number_cell(position.shares.to_string()),
                ui::number_cell(format!("{:.2}", position.price)),
                ui::number_cell(format!("{:.2}", position.value())),
                ui::number_cell(format!("{:.2}%", position.current_ratio * 100.0)),
                ui::format_percentage_cell(position.goal_ratio * 100.0, |r| format!("{r:.2}%")),
            ]);
        }

        let mut output = format!(
            "Portfolio: {}\n\n",
            ui::style_text(&self.name, ui::StyleType::Title)
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\n{}: {}",
            ui::style_text("Total Value", ui::StyleType::TotalLabel),
            ui::style_text(&format!("{:.2}", self.sum_existing), ui::StyleType::TotalValue)
        ));

        output
    }
}

/// Prices each portfolio through `prices`, showing progress while quotes
/// are fetched.
pub async fn price_portfolios(portfolios: &mut [Portfolio], prices: &dyn PriceLookup) -> Result<()> {
    let total: usize = portfolios.iter().map(|p| p.positions.len()).sum();
    let pb = ui::new_progress_bar(total as u64, true);
    pb.set_message("Fetching prices...");

    for portfolio in portfolios.iter_mut() {
        let on_priced = || pb.inc(1);
        if let Err(e) = update_portfolio_values(portfolio, prices, &on_priced).await {
            pb.finish_and_clear();
            let message = format!(
                "Failed to price {} in portfolio '{}'",
                e.symbol(),
                portfolio.name
            );
            return Err(anyhow::Error::new(e).context(message));
        }
    }

    pb.finish_and_clear();
    Ok(())
}

pub async fn run(mut portfolios: Vec<Portfolio>, prices: &dyn PriceLookup) -> Result<()> {
    price_portfolios(&mut portfolios, prices).await?;

    let count = portfolios.len();
    for (i, portfolio) in portfolios.iter().enumerate() {
        println!("{}", portfolio.display_as_table());
        if i + 1 < count {
            ui::print_separator();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::FetchError;
    use crate::core::portfolio::Position;
    use async_trait::async_trait;

    struct Flat(f64);

    #[async_trait]
    impl PriceLookup for Flat {
        async fn price(&self, _symbol: &str) -> Result<f64, FetchError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn test_price_portfolios_fills_values() {
        let mut portfolios = vec![Portfolio::new(
            "Core",
            vec![Position::new("IBM", 3, 0.5), Position::new("MSFT", 1, 0.5)],
        )];

        price_portfolios(&mut portfolios, &Flat(10.0)).await.unwrap();

        assert_eq!(portfolios[0].sum_existing, 40.0);
        assert_eq!(portfolios[0].positions[0].current_ratio, 0.75);
        let table = portfolios[0].display_as_table();
        assert!(table.contains("IBM"));
        assert!(table.contains("75.00%"));
        assert!(table.contains("40.00"));
    }

    struct Missing;

    #[async_trait]
    impl PriceLookup for Missing {
        async fn price(&self, symbol: &str) -> Result<f64, FetchError> {
            Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: 404,
            })
        }
    }

    #[tokio::test]
    async fn test_price_portfolios_names_failed_symbol() {
        let mut portfolios = vec![Portfolio::new("Core", vec![Position::new("IBM", 3, 1.0)])];

        let err = price_portfolios(&mut portfolios, &Missing).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to price IBM in portfolio 'Core'");
        assert!(format!("{err:#}").contains("HTTP error: 404"));
        assert_eq!(portfolios[0].positions[0].price, 0.0);
    }
}
