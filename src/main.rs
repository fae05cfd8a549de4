use anyhow::{Context, Result};
use std::sync::Arc;
use storefront_loadtest::config::Config;
use storefront_loadtest::report;
use storefront_loadtest::runtime::LoadTest;
use storefront_loadtest::telemetry::{self, init_tracing};
use storefront_loadtest::workload::StorefrontScenario;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(report::EXIT_INVALID_CONFIG);
        }
    };

    init_tracing(cfg.output.log_format);

    let scenario = Arc::new(StorefrontScenario::new(cfg.workload.clone()));
    let test = LoadTest::new(cfg.clone(), scenario);

    let summary = match test.run_until(telemetry::shutdown_signal()).await {
        Ok(summary) => summary,
        Err(e) if e.is_configuration() => {
            error!(error = %e, "configuration rejected before traffic started");
            std::process::exit(report::EXIT_INVALID_CONFIG);
        }
        Err(e) => return Err(e).context("load test failed"),
    };

    println!("{}", summary.render_text());

    if let Some(path) = &cfg.output.summary_export {
        summary
            .export(path)
            .await
            .with_context(|| format!("writing summary to {}", path.display()))?;
        info!(path = %path.display(), "summary exported");
    }

    let code = summary.exit_code();
    if code != report::EXIT_OK {
        std::process::exit(code);
    }
    Ok(())
}
