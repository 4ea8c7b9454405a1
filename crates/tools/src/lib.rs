//! Tool trait and the deposit-advice tools.
//!
//! Every tool renders its outcome, including its own failures, as text for
//! the model. Nothing here returns an error to the caller.

pub mod currency;
pub mod deposit;
pub mod format;
pub mod real_yield;
pub mod sources;

pub use currency::CurrencyRateTool;
pub use deposit::DepositInsuranceTool;
pub use real_yield::RealYieldTool;
pub use sources::{
    BankiRuRateSource, BestRate, CbrInflationSource, FetchSettings, InflationSource, Operation,
    RateSource,
};

use async_trait::async_trait;
use proto::{ToolArguments, ToolDescriptor};

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Schema exposed to the model and used for argument validation.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Runs the tool on validated arguments and returns the text the model
    /// will read. Failures are reported in the returned text.
    async fn execute(&self, args: &ToolArguments) -> String;
}
