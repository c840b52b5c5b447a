use crate::commands::context::{classify_engine_error, engine_context, parse_entity};
use crate::commands::CommandResult;
use priceye_core::config::{AppConfig, LoadOptions};
use priceye_core::TenantId;
use priceye_db::{connect, migrations};
use priceye_engine::PricingService;

pub fn run(tenant: &str, entity: &str, force: bool) -> CommandResult {
    let entity = match parse_entity(entity) {
        Some(entity) => entity,
        None => {
            return CommandResult::failure(
                "apply",
                "input_invalid",
                format!("unrecognized entity `{entity}`; expected property:<id> or group:<id>"),
                6,
            );
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "apply",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "apply",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let tenant = TenantId(tenant.to_string());
    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let service = PricingService::new(engine_context(&config, &pool));
        let summary =
            service.apply_pricing_strategy(&tenant, &entity, force).await.map_err(|error| {
                let (class, code) = classify_engine_error(&error);
                (class, error.to_string(), code)
            })?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => {
            let details = serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null);
            CommandResult::success_with(
                "apply",
                format!(
                    "generated {} days ({} locked skipped), {} llm calls, {} failed pushes",
                    summary.days_generated,
                    summary.days_skipped_locked,
                    summary.llm_calls_used,
                    summary.failed_dates.len()
                ),
                details,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("apply", error_class, message, exit_code)
        }
    }
}
