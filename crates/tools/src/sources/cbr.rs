use std::time::Duration;

use async_trait::async_trait;
use proto::ServiceError;
use scraper::{Html, Selector};
use tracing::debug;

use super::http::{fetch_page, parse_decimal};
use super::{FetchSettings, InflationSource};

const INFLATION_URL: &str = "https://www.cbr.ru/hd_base/infl/";

/// Columns: date, key rate, inflation, inflation target.
const INFLATION_COLUMN: usize = 2;

/// Reads the latest annual inflation from the Bank of Russia table.
pub struct CbrInflationSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl CbrInflationSource {
    pub fn new(settings: &FetchSettings) -> Result<Self, ServiceError> {
        Ok(Self {
            client: settings.build_client()?,
            url: INFLATION_URL.to_string(),
            timeout: settings.timeout,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl InflationSource for CbrInflationSource {
    async fn inflation_rate(&self) -> Result<f64, ServiceError> {
        let page = fetch_page(&self.client, &self.url, self.timeout).await?;
        let rate = parse_latest_inflation(&page)?;
        debug!(rate, "Fetched inflation rate");
        Ok(rate)
    }
}

fn parse_latest_inflation(page: &str) -> Result<f64, ServiceError> {
    let row_sel = Selector::parse("table tr")
        .map_err(|e| ServiceError::Parse(format!("bad selector: {e:?}")))?;
    let cell_sel =
        Selector::parse("td").map_err(|e| ServiceError::Parse(format!("bad selector: {e:?}")))?;

    let document = Html::parse_document(page);
    let cell = document
        .select(&row_sel)
        .find_map(|row| row.select(&cell_sel).nth(INFLATION_COLUMN))
        .ok_or_else(|| ServiceError::Parse("inflation table not found".to_string()))?;

    let raw = cell.text().collect::<String>();
    let percent = parse_decimal(&raw)
        .ok_or_else(|| ServiceError::Parse(format!("inflation cell '{}'", raw.trim())))?;

    let rate = percent / 100.0;
    if !(0.0..1.0).contains(&rate) {
        return Err(ServiceError::Parse(format!(
            "inflation {percent}% out of range"
        )));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <table class="data">
          <tr><th>Дата</th><th>Ключевая ставка, % годовых</th><th>Инфляция, % г/г</th><th>Цель по инфляции</th></tr>
          <tr><td>08.2025</td><td>18,00</td><td>8,14</td><td>4,00</td></tr>
          <tr><td>07.2025</td><td>18,00</td><td>8,79</td><td>4,00</td></tr>
        </table>"#;

    #[test]
    fn takes_inflation_from_first_data_row() {
        let rate = parse_latest_inflation(PAGE).expect("rate");
        assert!((rate - 0.0814).abs() < 1e-12);
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let err = parse_latest_inflation("<html><body>maintenance</body></html>")
            .expect_err("no table");
        assert!(matches!(err, ServiceError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let page = "<table><tr><td>01.2025</td><td>21</td><td>120,5</td></tr></table>";
        assert!(matches!(
            parse_latest_inflation(page),
            Err(ServiceError::Parse(_))
        ));
    }
}
