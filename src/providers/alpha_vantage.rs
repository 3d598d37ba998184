use crate::core::error::FetchError;
use crate::core::price::{Quote, QuoteDetails, QuoteSource};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

/// Quote fetcher for the AlphaVantage `GLOBAL_QUOTE` endpoint.
pub struct AlphaVantageProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AlphaVantageProvider {
    /// `timeout` bounds each request independently of any rate limiting.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("balancer/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn quote_url(&self, symbol: &str) -> Result<Url, FetchError> {
        Url::parse_with_params(
            &format!("{}/query", self.base_url),
            [
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| FetchError::Request {
            symbol: symbol.to_string(),
            reason: format!("invalid URL: {e}"),
        })
    }
}

#[derive(Deserialize, Debug)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open", default)]
    open: String,
    #[serde(rename = "03. high", default)]
    high: String,
    #[serde(rename = "04. low", default)]
    low: String,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: String,
    #[serde(rename = "07. latest trading day", default)]
    latest_trading_day: String,
    #[serde(rename = "08. previous close", default)]
    previous_close: String,
    #[serde(rename = "09. change", default)]
    change: String,
    #[serde(rename = "10. change percent", default)]
    change_percent: String,
}

fn parse_quote(symbol: &str, body: &str) -> Result<Quote, FetchError> {
    let response: GlobalQuoteResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;

    let provider_message = response
        .error_message
        .or(response.note)
        .or(response.information);

    // Unknown symbols come back as an empty "Global Quote" object
    let quote = match response.global_quote {
        Some(quote) if quote.price.is_some() => quote,
        _ => {
            return Err(FetchError::Provider {
                symbol: symbol.to_string(),
                message: provider_message.unwrap_or_else(|| "empty quote".to_string()),
            });
        }
    };

    let price_text = quote.price.as_deref().unwrap_or_default().trim();
    let price: f64 = price_text.parse().map_err(|e| FetchError::Parse {
        symbol: symbol.to_string(),
        reason: format!("price {price_text:?}: {e}"),
    })?;
    if !(price.is_finite() && price > 0.0) {
        return Err(FetchError::InvalidPrice {
            symbol: symbol.to_string(),
            price,
        });
    }

    Ok(Quote {
        price,
        details: Some(QuoteDetails {
            symbol: quote.symbol.unwrap_or_else(|| symbol.to_string()),
            open: quote.open,
            high: quote.high,
            low: quote.low,
            volume: quote.volume,
            latest_trading_day: quote.latest_trading_day,
            previous_close: quote.previous_close,
            change: quote.change,
            change_percent: quote.change_percent,
        }),
    })
}

#[async_trait]
impl QuoteSource for AlphaVantageProvider {
    #[instrument(
        name = "AlphaVantageQuoteFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let url = self.quote_url(symbol)?;
        debug!("Requesting quote for {}", symbol);

        let request_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    symbol: symbol.to_string(),
                }
            } else {
                FetchError::Request {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(request_error)?;

        debug!(status = %response.status(), "Received AlphaVantage response");
        if !response.status().is_success() {
            return Err(FetchError::Status {
                symbol: symbol.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await.map_err(request_error)?;
        parse_quote(symbol, &body)
    }
}
