//! Best cash exchange rate in a city.

use std::sync::Arc;

use async_trait::async_trait;
use proto::{ParamType, ToolArguments, ToolDescriptor};
use tracing::warn;

use crate::Tool;
use crate::sources::{Operation, RateSource};

/// Tool `get_curr_rate`.
pub struct CurrencyRateTool {
    descriptor: ToolDescriptor,
    source: Arc<dyn RateSource>,
}

impl CurrencyRateTool {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        let descriptor = ToolDescriptor::new(
            "get_curr_rate",
            "Находит лучший курс для обмена валюты в заданном городе. Для вызова требует \
             город, название валюты и тип операции (покупка или продажа).",
        )
        .required(
            "operation_type",
            ParamType::String,
            "осуществляемая операция (sell или buy)",
        )
        .required(
            "exchange_value",
            ParamType::String,
            "валюта, которую нужно получить после обмена: USD, EUR, CNY",
        )
        .required(
            "city",
            ParamType::String,
            "город в России, где осуществляется обмен валюты (Москва, Санкт-Петербург, \
             Новосибирск, Екатеринбург, Краснодар, Абакан, Хабаровск)",
        );
        Self { descriptor, source }
    }
}

#[async_trait]
impl Tool for CurrencyRateTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &ToolArguments) -> String {
        let raw_operation = args.str("operation_type").unwrap_or_default();
        let Ok(operation) = raw_operation.parse::<Operation>() else {
            return format!(
                "ОШИБКА! Не могу найти курсы валют для твоей операции {raw_operation}"
            );
        };

        let currency = args.str("exchange_value").unwrap_or_default();
        let city = args.str("city").unwrap_or_default();

        match self.source.best_rate(operation, currency, city).await {
            Ok(best) => best.to_string(),
            Err(e) => {
                warn!(error = %e, %operation, currency, city, "Rate lookup failed");
                format!("ОШИБКА! Не могу получить курсы валют: {e}")
            }
        }
    }
}
