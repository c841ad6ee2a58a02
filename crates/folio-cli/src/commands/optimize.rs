use folio_optimization::PortfolioService;
use serde_json::Value;

use crate::cli::OptimizeArgs;
use crate::error::CliError;

use super::portfolio_request;

pub async fn run(args: &OptimizeArgs, service: &PortfolioService) -> Result<Value, CliError> {
    let request = portfolio_request(&args.basket)?;
    let result = service.optimize(&request).await?;
    Ok(serde_json::to_value(result)?)
}
