use folio_optimization::PortfolioService;
use serde_json::Value;

use crate::cli::FrontierArgs;
use crate::error::CliError;

use super::portfolio_request;

pub async fn run(args: &FrontierArgs, service: &PortfolioService) -> Result<Value, CliError> {
    let request = portfolio_request(&args.basket)?;
    let response = service.frontier(&request).await?;
    Ok(serde_json::to_value(response)?)
}
