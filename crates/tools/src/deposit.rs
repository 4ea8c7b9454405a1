//! Deposit insurance (АСВ) limit check.

use async_trait::async_trait;
use proto::{ParamType, ToolArguments, ToolDescriptor};
use thiserror::Error;
use tracing::debug;

use crate::Tool;
use crate::format::format_amount;

/// Maximum insured balance per bank, in roubles.
pub const INSURANCE_LIMIT_RUB: f64 = 1_400_000.0;

/// Currency assumed when the model omits it.
pub const DEFAULT_CURRENCY: &str = "RUB";

/// Rejected deposit inputs, checked in declaration order.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DepositInputError {
    #[error("ОШИБКА: Не указано название банка. Пожалуйста, укажите банк.")]
    MissingBank,
    #[error("ОШИБКА: Не указана сумма вклада. Пожалуйста, укажите сумму.")]
    MissingAmount,
    #[error("ОШИБКА: Сумма должна быть положительным числом.")]
    InvalidAmount,
    #[error("ОШИБКА: Не указана процентная ставка по вкладу. Пожалуйста, укажите ставку.")]
    MissingRate,
    #[error("ОШИБКА: Процентная ставка не может быть отрицательной.")]
    InvalidRate,
}

/// A bank name and a strictly positive amount.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositInput<'a> {
    pub bank_name: &'a str,
    pub amount: f64,
}

impl<'a> DepositInput<'a> {
    /// Applies the bank/amount checks shared by the deposit tools.
    pub fn validate(
        bank_name: Option<&'a str>,
        amount: Option<f64>,
    ) -> Result<Self, DepositInputError> {
        let bank_name = bank_name
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(DepositInputError::MissingBank)?;
        let amount = amount
            .filter(|a| a.is_finite())
            .ok_or(DepositInputError::MissingAmount)?;
        if amount <= 0.0 {
            return Err(DepositInputError::InvalidAmount);
        }
        Ok(Self { bank_name, amount })
    }
}

/// Returns `true` for the rouble currency code, ignoring case and padding.
pub fn is_rub(currency: Option<&str>) -> bool {
    currency
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .eq_ignore_ascii_case(DEFAULT_CURRENCY)
}

/// Outcome of an insurance check.
#[derive(Debug, Clone, PartialEq)]
pub enum InsuranceVerdict {
    /// Foreign-currency deposits are not covered at all.
    NotInsuredCurrency,
    /// The whole balance is covered.
    WithinLimit,
    /// Only `INSURANCE_LIMIT_RUB` of the balance is covered.
    LimitExceeded {
        bank_name: String,
        amount: f64,
        excess: f64,
    },
}

impl std::fmt::Display for InsuranceVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInsuredCurrency => {
                write!(f, "АСВ не страхует валютные вклады!")
            }
            Self::WithinLimit => write!(f, "Все хорошо, лимит не превышен."),
            Self::LimitExceeded {
                bank_name,
                amount,
                excess,
            } => write!(
                f,
                "Превышен лимит АСВ! Лимит: {} рублей, ваш вклад в банке {bank_name}: {} рублей, \
                 превышение: {} рублей.",
                format_amount(INSURANCE_LIMIT_RUB),
                format_amount(*amount),
                format_amount(*excess),
            ),
        }
    }
}

/// Checks a deposit against the insurance limit.
pub fn assess_deposit(
    bank_name: Option<&str>,
    amount: Option<f64>,
    currency: Option<&str>,
) -> Result<InsuranceVerdict, DepositInputError> {
    let input = DepositInput::validate(bank_name, amount)?;

    if !is_rub(currency) {
        return Ok(InsuranceVerdict::NotInsuredCurrency);
    }

    if input.amount > INSURANCE_LIMIT_RUB {
        return Ok(InsuranceVerdict::LimitExceeded {
            bank_name: input.bank_name.to_string(),
            amount: input.amount,
            excess: input.amount - INSURANCE_LIMIT_RUB,
        });
    }

    Ok(InsuranceVerdict::WithinLimit)
}

/// Tool `check_asv`.
pub struct DepositInsuranceTool {
    descriptor: ToolDescriptor,
}

impl DepositInsuranceTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "check_asv",
            "Проверяет лимит АСВ (страхование вкладов) для вклада пользователя",
        )
        .required(
            "bank_name",
            ParamType::String,
            "название банка (Сбер, Тинькофф, ВТБ, Райффайзен и т.д.)",
        )
        .required(
            "amount",
            ParamType::Number,
            "сумма вклада (например, 5000, 2500000, 500000)",
        )
        .optional(
            "currency",
            ParamType::String,
            "валюта: RUB, USD, EUR (по умолчанию RUB)",
        );
        Self { descriptor }
    }
}

impl Default for DepositInsuranceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DepositInsuranceTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &ToolArguments) -> String {
        let verdict = assess_deposit(
            args.str("bank_name"),
            args.number("amount"),
            args.str("currency"),
        );
        debug!(?verdict, "Deposit insurance assessed");
        match verdict {
            Ok(verdict) => verdict.to_string(),
            Err(e) => e.to_string(),
        }
    }
}
