use folio_optimization::{PortfolioService, TickerValidation};
use serde::Serialize;
use serde_json::Value;

use crate::cli::ValidateArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ValidateResponseData {
    results: Vec<TickerValidation>,
}

pub async fn run(args: &ValidateArgs, service: &PortfolioService) -> Result<Value, CliError> {
    let mut results = Vec::with_capacity(args.tickers.len());
    for raw in &args.tickers {
        results.push(service.validate_ticker(raw).await);
    }
    Ok(serde_json::to_value(ValidateResponseData { results })?)
}
