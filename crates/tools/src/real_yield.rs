//! Deposit return measured against inflation.

use std::sync::Arc;

use async_trait::async_trait;
use proto::{ParamType, ToolArguments, ToolDescriptor};
use tracing::{debug, warn};

use crate::Tool;
use crate::deposit::{DepositInput, DepositInputError, is_rub};
use crate::format::{format_amount, format_number, format_percent};
use crate::sources::InflationSource;

/// Below this magnitude the real rate counts as zero.
const ZERO_EPSILON: f64 = 1e-9;

/// Validated inputs of a real-yield calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRequest {
    pub bank_name: String,
    pub amount: f64,
    /// Nominal annual rate, in percent.
    pub rate_percent: f64,
}

impl YieldRequest {
    pub fn validate(
        bank_name: Option<&str>,
        amount: Option<f64>,
        rate_percent: Option<f64>,
    ) -> Result<Self, DepositInputError> {
        let deposit = DepositInput::validate(bank_name, amount)?;
        let rate_percent = rate_percent
            .filter(|r| r.is_finite())
            .ok_or(DepositInputError::MissingRate)?;
        if rate_percent < 0.0 {
            return Err(DepositInputError::InvalidRate);
        }
        Ok(Self {
            bank_name: deposit.bank_name.to_string(),
            amount: deposit.amount,
            rate_percent,
        })
    }
}

/// Real annual rate and which side of inflation it falls on.
#[derive(Debug, Clone, PartialEq)]
pub enum RealYield {
    BelowInflation { real_rate: f64 },
    MatchesInflation,
    AboveInflation { real_rate: f64, annual_gain: f64 },
}

/// `real_rate = rate/100 - inflation`.
pub fn compute_real_yield(rate_percent: f64, inflation: f64, amount: f64) -> RealYield {
    let real_rate = rate_percent / 100.0 - inflation;
    if real_rate.abs() < ZERO_EPSILON {
        RealYield::MatchesInflation
    } else if real_rate < 0.0 {
        RealYield::BelowInflation { real_rate }
    } else {
        RealYield::AboveInflation {
            real_rate,
            annual_gain: real_rate * amount,
        }
    }
}

fn render(request: &YieldRequest, inflation: f64, outcome: &RealYield) -> String {
    let bank = &request.bank_name;
    let rate = format_number(request.rate_percent, 2);
    let inflation = format_percent(inflation);
    match outcome {
        RealYield::BelowInflation { real_rate } => format!(
            "Вклад в банке {bank} под {rate}% не обгоняет инфляцию ({inflation}%). \
             Реальная доходность отрицательная: {}% годовых.",
            format_percent(*real_rate)
        ),
        RealYield::MatchesInflation => format!(
            "Доходность вклада в банке {bank} под {rate}% равна инфляции ({inflation}%). \
             Реальная доходность: 0%."
        ),
        RealYield::AboveInflation {
            real_rate,
            annual_gain,
        } => format!(
            "Вклад в банке {bank} под {rate}% обгоняет инфляцию ({inflation}%). \
             Реальная доходность: {}% годовых, это примерно {} рублей в год сверх инфляции.",
            format_percent(*real_rate),
            format_amount(*annual_gain)
        ),
    }
}

/// Tool `calc_real_yield`.
pub struct RealYieldTool {
    descriptor: ToolDescriptor,
    inflation: Arc<dyn InflationSource>,
}

impl RealYieldTool {
    pub fn new(inflation: Arc<dyn InflationSource>) -> Self {
        let descriptor = ToolDescriptor::new(
            "calc_real_yield",
            "Сравнивает доходность вклада с текущей инфляцией и оценивает реальный доход",
        )
        .required("bank_name", ParamType::String, "название банка")
        .required("amount", ParamType::Number, "сумма вклада в рублях")
        .required(
            "rate",
            ParamType::Number,
            "процентная ставка по вкладу, % годовых (например, 16.5)",
        )
        .optional(
            "currency",
            ParamType::String,
            "валюта вклада (по умолчанию RUB)",
        );
        Self {
            descriptor,
            inflation,
        }
    }
}

#[async_trait]
impl Tool for RealYieldTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &ToolArguments) -> String {
        let request = match YieldRequest::validate(
            args.str("bank_name"),
            args.number("amount"),
            args.number("rate"),
        ) {
            Ok(request) => request,
            Err(e) => return e.to_string(),
        };

        if !is_rub(args.str("currency")) {
            return "Расчет реальной доходности доступен только для рублевых вкладов.".to_string();
        }

        let inflation = match self.inflation.inflation_rate().await {
            Ok(rate) => rate,
            Err(e) => {
                warn!(error = %e, "Inflation rate unavailable");
                return format!(
                    "ОШИБКА! Не могу рассчитать реальную доходность: \
                     не удалось получить уровень инфляции ({e})."
                );
            }
        };

        let outcome = compute_real_yield(request.rate_percent, inflation, request.amount);
        debug!(?outcome, inflation, "Real yield computed");
        render(&request, inflation, &outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto::ServiceError;

    struct FixedInflation(f64);

    #[async_trait]
    impl InflationSource for FixedInflation {
        async fn inflation_rate(&self) -> Result<f64, ServiceError> {
            Ok(self.0)
        }
    }

    struct DownInflation;

    #[async_trait]
    impl InflationSource for DownInflation {
        async fn inflation_rate(&self) -> Result<f64, ServiceError> {
            Err(ServiceError::Unavailable("HTTP 503 Service Unavailable".into()))
        }
    }

    fn args(raw: &str) -> ToolArguments {
        ToolArguments::parse(raw).expect("test args")
    }

    #[test]
    fn three_branches_around_five_percent_inflation() {
        match compute_real_yield(10.0, 0.05, 200_000.0) {
            RealYield::AboveInflation {
                real_rate,
                annual_gain,
            } => {
                assert!((real_rate - 0.05).abs() < 1e-12);
                assert!((annual_gain - 200_000.0 * 0.05).abs() < 1e-6);
            }
            other => panic!("expected AboveInflation, got {other:?}"),
        }

        assert_eq!(
            compute_real_yield(5.0, 0.05, 200_000.0),
            RealYield::MatchesInflation
        );

        assert!(matches!(
            compute_real_yield(3.0, 0.05, 200_000.0),
            RealYield::BelowInflation { real_rate } if real_rate < 0.0
        ));
    }

    #[test]
    fn rate_is_validated_after_bank_and_amount() {
        assert_eq!(
            YieldRequest::validate(None, None, None),
            Err(DepositInputError::MissingBank)
        );
        assert_eq!(
            YieldRequest::validate(Some("Сбер"), Some(1000.0), None),
            Err(DepositInputError::MissingRate)
        );
        assert_eq!(
            YieldRequest::validate(Some("Сбер"), Some(1000.0), Some(-1.0)),
            Err(DepositInputError::InvalidRate)
        );
    }

    #[tokio::test]
    async fn tool_reports_gain_for_positive_real_rate() {
        let tool = RealYieldTool::new(Arc::new(FixedInflation(0.05)));
        let out = tool
            .execute(&args(r#"{"bank_name":"ВТБ","amount":100000,"rate":10}"#))
            .await;
        assert!(out.contains("обгоняет инфляцию (5%)"), "{out}");
        assert!(out.contains("примерно 5000 рублей"), "{out}");
    }

    #[tokio::test]
    async fn tool_rejects_foreign_currency_before_fetching() {
        let tool = RealYieldTool::new(Arc::new(DownInflation));
        let out = tool
            .execute(&args(
                r#"{"bank_name":"ВТБ","amount":100000,"rate":3,"currency":"usd"}"#,
            ))
            .await;
        assert_eq!(
            out,
            "Расчет реальной доходности доступен только для рублевых вкладов."
        );
    }

    #[tokio::test]
    async fn service_failure_becomes_diagnostic_text() {
        let tool = RealYieldTool::new(Arc::new(DownInflation));
        let out = tool
            .execute(&args(r#"{"bank_name":"ВТБ","amount":100000,"rate":12}"#))
            .await;
        assert!(out.starts_with("ОШИБКА! Не могу рассчитать реальную доходность"));
        assert!(out.contains("HTTP 503"));
    }
}
