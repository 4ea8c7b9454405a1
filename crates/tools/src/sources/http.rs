use std::time::Duration;

use proto::ServiceError;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// HTTP settings shared by the scraping sources.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchSettings {
    pub fn build_client(&self) -> Result<reqwest::Client, ServiceError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("HTTP client setup failed: {e}")))
    }
}

/// GETs `url` and returns the body text.
pub(crate) async fn fetch_page(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, ServiceError> {
    debug!(url, "Fetching page");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ServiceError::Unavailable(format!("HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout))
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout(timeout.as_secs())
    } else {
        ServiceError::Unavailable(e.to_string())
    }
}

/// Parses a quoted figure such as `"93,50 ₽"` or `"8,59"`.
pub(crate) fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '₽' && *c != '%')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}
