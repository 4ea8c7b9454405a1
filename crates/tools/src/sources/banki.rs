use std::time::Duration;

use async_trait::async_trait;
use proto::ServiceError;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::http::{fetch_page, parse_decimal};
use super::{BestRate, FetchSettings, Operation, RateSource};

const BASE_URL: &str = "https://www.banki.ru/products/currency/cash/";

const CITY_SLUGS: &[(&str, &str)] = &[
    ("абакан", "abakan/"),
    ("екатеринбург", "ekaterinburg/"),
    ("краснодар", "krasnodar/"),
    ("москва", "moskva/"),
    ("новосибирск", "novosibirsk/"),
    ("санкт-петербург", "sankt-peterburg/"),
    ("хабаровск", "habarovsk/"),
];

const CURRENCY_IDS: &[(&str, u16)] = &[("usd", 840), ("eur", 978), ("cny", 156)];

const ROW_SELECTOR: &str = r#"div[data-test="flexbox-grid"]"#;
const NAME_SELECTOR: &str = r#"div[data-test="currenct--result-item--name"]"#;
const BUY_SELECTOR: &str = r#"div[data-test="currency--result-item---rate-buy"]"#;
const SELL_SELECTOR: &str = r#"div[data-test="currency--result-item---rate-sell"]"#;
const TEXT_SELECTOR: &str = r#"div[data-test="text"]"#;

/// One bank's row in the cash-rates table.
#[derive(Debug, Clone, PartialEq)]
struct BankQuote {
    bank: String,
    buy: Option<f64>,
    sell: Option<f64>,
}

/// Scrapes the banki.ru cash exchange table for a city.
pub struct BankiRuRateSource {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BankiRuRateSource {
    pub fn new(settings: &FetchSettings) -> Result<Self, ServiceError> {
        Ok(Self {
            client: settings.build_client()?,
            base_url: BASE_URL.to_string(),
            timeout: settings.timeout,
        })
    }

    /// Overrides the page root, mainly for tests against a local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn page_url(&self, city: &str, currency: &str) -> Result<String, ServiceError> {
        let city_key = city.trim().to_lowercase();
        let slug = CITY_SLUGS
            .iter()
            .find(|(name, _)| *name == city_key)
            .map(|(_, slug)| *slug)
            .ok_or_else(|| ServiceError::UnknownCity(city.trim().to_string()))?;

        let currency_key = currency.trim().to_lowercase();
        let currency_id = CURRENCY_IDS
            .iter()
            .find(|(code, _)| *code == currency_key)
            .map(|(_, id)| *id)
            .ok_or_else(|| ServiceError::UnknownCurrency(currency.trim().to_string()))?;

        Ok(format!(
            "{}{slug}?currencyId={currency_id}&buttonId=1",
            self.base_url
        ))
    }
}

#[async_trait]
impl RateSource for BankiRuRateSource {
    async fn best_rate(
        &self,
        operation: Operation,
        currency: &str,
        city: &str,
    ) -> Result<BestRate, ServiceError> {
        let url = self.page_url(city, currency)?;
        let page = fetch_page(&self.client, &url, self.timeout).await?;
        let quotes = parse_quotes(&page)?;
        debug!(count = quotes.len(), %operation, "Parsed bank quotes");
        pick_best(&quotes, operation)
    }
}

fn selector(css: &str) -> Result<Selector, ServiceError> {
    Selector::parse(css).map_err(|e| ServiceError::Parse(format!("bad selector {css}: {e:?}")))
}

fn rate_in(row: ElementRef<'_>, side: &Selector, text: &Selector) -> Option<f64> {
    let cell = row.select(side).next()?;
    let value = cell.select(text).next()?;
    let raw = value.text().collect::<String>();
    let parsed = parse_decimal(&raw);
    if parsed.is_none() {
        warn!(raw = raw.trim(), "Unparseable rate cell");
    }
    parsed
}

fn parse_quotes(page: &str) -> Result<Vec<BankQuote>, ServiceError> {
    let row_sel = selector(ROW_SELECTOR)?;
    let name_sel = selector(NAME_SELECTOR)?;
    let buy_sel = selector(BUY_SELECTOR)?;
    let sell_sel = selector(SELL_SELECTOR)?;
    let text_sel = selector(TEXT_SELECTOR)?;

    let document = Html::parse_document(page);
    let mut quotes = Vec::new();

    for row in document.select(&row_sel) {
        let Some(name) = row.select(&name_sel).next() else {
            continue;
        };
        let bank = name.text().collect::<String>().trim().to_string();
        if bank.is_empty() {
            continue;
        }
        quotes.push(BankQuote {
            bank,
            buy: rate_in(row, &buy_sel, &text_sel),
            sell: rate_in(row, &sell_sel, &text_sel),
        });
    }

    Ok(quotes)
}

/// Selling to a bank wants the highest buy rate; buying wants the lowest
/// sell rate. The first bank wins a tie.
fn pick_best(quotes: &[BankQuote], operation: Operation) -> Result<BestRate, ServiceError> {
    let mut best: Option<(&str, f64)> = None;

    for quote in quotes {
        let candidate = match operation {
            Operation::Sell => quote.buy,
            Operation::Buy => quote.sell,
        };
        let Some(rate) = candidate else {
            continue;
        };
        let better = match (best, operation) {
            (None, _) => true,
            (Some((_, current)), Operation::Sell) => rate > current,
            (Some((_, current)), Operation::Buy) => rate < current,
        };
        if better {
            best = Some((quote.bank.as_str(), rate));
        }
    }

    best.map(|(bank, rate)| BestRate {
        bank: bank.to_string(),
        rate,
        operation,
    })
    .ok_or_else(|| {
        ServiceError::NoQuotes(match operation {
            Operation::Sell => "buy".to_string(),
            Operation::Buy => "sell".to_string(),
        })
    })
}
