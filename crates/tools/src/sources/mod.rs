//! External data collaborators: exchange-rate tables and inflation figures.

mod banki;
mod cbr;
mod http;

pub use banki::BankiRuRateSource;
pub use cbr::CbrInflationSource;
pub use http::FetchSettings;

use async_trait::async_trait;
use proto::ServiceError;

/// Side of a cash exchange, from the customer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Customer buys currency from a bank (bank sell rate applies).
    Buy,
    /// Customer sells currency to a bank (bank buy rate applies).
    Sell,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            _ => Err(s.to_string()),
        }
    }
}

/// Best quote found for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BestRate {
    pub bank: String,
    pub rate: f64,
    pub operation: Operation,
}

impl std::fmt::Display for BestRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rate = crate::format::format_number(self.rate, 4);
        match self.operation {
            Operation::Sell => write!(f, "Лучший курс продажи валюты банку: {} - {rate}", self.bank),
            Operation::Buy => write!(f, "Лучший курс покупки валюты у банка: {} - {rate}", self.bank),
        }
    }
}

/// Source of cash exchange quotes.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn best_rate(
        &self,
        operation: Operation,
        currency: &str,
        city: &str,
    ) -> Result<BestRate, ServiceError>;
}

/// Source of the current annual inflation rate.
#[async_trait]
pub trait InflationSource: Send + Sync {
    /// Annual inflation as a fraction in `[0, 1)`.
    async fn inflation_rate(&self) -> Result<f64, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!(" SELL ".parse::<Operation>(), Ok(Operation::Sell));
        assert_eq!("buy".parse::<Operation>(), Ok(Operation::Buy));
        assert_eq!("exchange".parse::<Operation>(), Err("exchange".to_string()));
    }

    #[test]
    fn best_rate_display_depends_on_operation() {
        let sell = BestRate {
            bank: "Альфа-Банк".into(),
            rate: 92.5,
            operation: Operation::Sell,
        };
        assert_eq!(
            sell.to_string(),
            "Лучший курс продажи валюты банку: Альфа-Банк - 92.5"
        );

        let buy = BestRate {
            operation: Operation::Buy,
            ..sell
        };
        assert_eq!(
            buy.to_string(),
            "Лучший курс покупки валюты у банка: Альфа-Банк - 92.5"
        );
    }
}
