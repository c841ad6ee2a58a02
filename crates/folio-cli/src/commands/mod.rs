mod frontier;
mod optimize;
mod validate;

use std::sync::Arc;
use std::time::Duration;

use folio_core::{
    CacheConfig, ConfigError, Lookback, PriceCache, PriceSource, ReqwestHttpClient,
    ValidationError, YahooAdapter,
};
use folio_optimization::{EngineSettings, PortfolioRequest, PortfolioService, WeightBounds};
use serde_json::Value;
use tracing::debug;

use crate::cli::{BasketArgs, Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Optimize(args) => {
            let settings = engine_settings(&args.basket)?;
            optimize::run(args, &service(cli, settings)?).await
        }
        Command::Frontier(args) => {
            let mut settings = engine_settings(&args.basket)?;
            if let Some(steps) = args.steps {
                if steps == 0 {
                    return Err(ConfigError::NonPositive { name: "steps" }.into());
                }
                settings.frontier_steps = steps;
            }
            settings.frontier_branch = args.branch.into();
            frontier::run(args, &service(cli, settings)?).await
        }
        Command::Validate(args) => {
            validate::run(args, &service(cli, EngineSettings::from_env()?)?).await
        }
        Command::Health => {
            let service = service(cli, EngineSettings::from_env()?)?;
            Ok(serde_json::to_value(service.health())?)
        }
    }
}

fn service(cli: &Cli, settings: EngineSettings) -> Result<PortfolioService, CliError> {
    let mut config = CacheConfig::from_env()?;
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            return Err(ConfigError::NonPositive { name: "timeout-ms" }.into());
        }
        config = config.with_request_timeout(Duration::from_millis(timeout_ms));
    }

    let mut adapter = if cli.mock {
        YahooAdapter::offline()
    } else {
        YahooAdapter::with_http_client(Arc::new(ReqwestHttpClient::new()))
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        adapter = adapter.with_timeout_ms(timeout_ms);
    }
    let source: Arc<dyn PriceSource> = Arc::new(adapter);
    debug!(source = source.name(), mock = cli.mock, "price source selected");

    Ok(PortfolioService::new(
        Arc::new(PriceCache::new(source, config)),
        settings,
    ))
}

/// Environment settings with the per-invocation flags applied on top.
fn engine_settings(basket: &BasketArgs) -> Result<EngineSettings, CliError> {
    let mut settings = EngineSettings::from_env()?;
    if let Some(rate) = basket.risk_free_rate {
        if !rate.is_finite() {
            return Err(ValidationError::InvalidArgument {
                name: "risk-free rate",
                reason: format!("must be finite, got {rate}"),
            }
            .into());
        }
        settings.risk_free_rate = rate;
    }
    if let Some(limit) = basket.allow_short {
        settings.bounds = WeightBounds::with_shorts(limit)?;
    }
    settings.fallback = basket.fallback.into();
    Ok(settings)
}

fn portfolio_request(basket: &BasketArgs) -> Result<PortfolioRequest, CliError> {
    let lookback = match (&basket.start, &basket.end) {
        (Some(start), Some(end)) => {
            Lookback::between(Lookback::parse_date(start)?, Lookback::parse_date(end)?)?
        }
        _ => Lookback::trailing_days(basket.lookback_days)?,
    };

    Ok(PortfolioRequest::new(basket.tickers.iter().cloned(), basket.method.into())
        .with_lookback(lookback))
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use folio_optimization::{FallbackPolicy, Method};

    use super::*;

    fn basket(args: &[&str]) -> BasketArgs {
        let mut argv = vec!["folio", "optimize"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).expect("valid arguments").command {
            Command::Optimize(args) => args.basket,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_dates_take_precedence_over_trailing_window() {
        let request = portfolio_request(&basket(&[
            "AAPL",
            "MSFT",
            "--lookback-days",
            "90",
            "--start",
            "2024-01-02",
            "--end",
            "2024-06-28",
        ]))
        .expect("valid window");

        assert_eq!(request.lookback.to_string(), "2024-01-02..2024-06-28");
        assert_eq!(request.method, Method::MinVariance);
    }

    #[test]
    fn inverted_window_is_a_validation_error() {
        let error = portfolio_request(&basket(&[
            "AAPL", "MSFT", "--start", "2024-06-28", "--end", "2024-01-02",
        ]))
        .expect_err("start after end");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn flags_override_engine_settings() {
        let settings = engine_settings(&basket(&[
            "AAPL",
            "MSFT",
            "--risk-free-rate",
            "0.03",
            "--allow-short",
            "0.25",
            "--fallback",
            "equal-weight",
        ]))
        .expect("valid overrides");

        assert_eq!(settings.risk_free_rate, 0.03);
        assert_eq!(settings.bounds.lower, -0.25);
        assert_eq!(settings.fallback, FallbackPolicy::EqualWeight);
    }
}
