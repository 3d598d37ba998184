pub mod prices;
pub mod rebalance;
pub mod setup;
pub mod show;
pub mod ui;
pub mod watch;

use crate::core::portfolio::Portfolio;
use anyhow::{Result, bail};

/// Portfolios a command operates on: the named one, or all of them.
pub fn select_portfolios(portfolios: &[Portfolio], name: Option<&str>) -> Result<Vec<Portfolio>> {
    let selected: Vec<Portfolio> = match name {
        Some(name) => portfolios
            .iter()
            .filter(|p| p.name == name)
            .cloned()
            .collect(),
        None => portfolios.to_vec(),
    };

    if selected.is_empty() {
        match name {
            Some(name) => bail!("No portfolio named '{}' in configuration", name),
            None => bail!("No portfolios configured"),
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::portfolio::Position;

    #[test]
    fn test_select_portfolios() {
        let portfolios = vec![
            Portfolio::new("A", vec![Position::new("X", 1, 1.0)]),
            Portfolio::new("B", vec![Position::new("Y", 1, 1.0)]),
        ];

        assert_eq!(select_portfolios(&portfolios, None).unwrap().len(), 2);
        let selected = select_portfolios(&portfolios, Some("B")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "B");

        let err = select_portfolios(&portfolios, Some("C")).unwrap_err();
        assert!(err.to_string().contains("No portfolio named 'C'"));
        assert!(select_portfolios(&[], None).is_err());
    }
}
