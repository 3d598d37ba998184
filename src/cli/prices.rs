use super::ui;
use crate::cache::PriceCache;
use crate::store::PriceEntry;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use comfy_table::Cell;

fn format_age(age: Duration) -> String {
    let minutes = age.num_minutes().max(0);
    match minutes {
        0..=59 => format!("{minutes}m"),
        60..=1439 => format!("{}h {}m", minutes / 60, minutes % 60),
        _ => format!("{}d {}h", minutes / 1440, (minutes % 1440) / 60),
    }
}

fn prices_table<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a PriceEntry)>,
    staleness: Duration,
    now: DateTime<Utc>,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Price"),
        ui::header_cell("Trading Day"),
        ui::header_cell("Age"),
        ui::header_cell("Stale"),
    ]);

    for (symbol, entry) in entries {
        let trading_day = entry
            .quote
            .as_ref()
            .map(|q| q.latest_trading_day.clone())
            .filter(|day| !day.is_empty());
        table.add_row(vec![
            Cell::new(symbol),
            ui::number_cell(format!("{:.2}", entry.price)),
            ui::format_optional_cell(trading_day, |d| d),
            ui::number_cell(format_age(entry.age(now))),
            ui::flag_cell(!entry.is_fresh(staleness, now)),
        ]);
    }
    table.to_string()
}

/// Lists every cached price with its age.
pub async fn run(cache: &PriceCache) -> Result<()> {
    let snapshot = cache.store().snapshot().await;
    if snapshot.is_empty() {
        println!(
            "{}",
            ui::style_text("No cached prices yet", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    println!("{}", prices_table(&snapshot, cache.staleness(), Utc::now()));
    Ok(())
}
