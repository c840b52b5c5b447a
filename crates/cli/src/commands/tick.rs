use crate::commands::context::{classify_engine_error, engine_context};
use crate::commands::CommandResult;
use priceye_core::config::{AppConfig, LoadOptions};
use priceye_core::TenantId;
use priceye_db::{connect, migrations};
use priceye_engine::{Scheduler, TickReport};

pub fn run(tenant: Option<&str>, force: bool) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "tick",
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
                "tick",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let scheduler = Scheduler::new(engine_context(&config, &pool));
        let reports = match tenant {
            Some(tenant) => {
                let tenant = TenantId(tenant.to_string());
                vec![scheduler.tick_tenant(&tenant, force).await.map_err(|error| {
                    let (class, code) = classify_engine_error(&error);
                    (class, error.to_string(), code)
                })?]
            }
            None => scheduler.tick_all(force).await.map_err(|error| {
                let (class, code) = classify_engine_error(&error);
                (class, error.to_string(), code)
            })?,
        };
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(reports)
    });

    match result {
        Ok(reports) => {
            let entities: usize = reports.iter().map(|report| report.entities.len()).sum();
            CommandResult::success_with(
                "tick",
                format!("ticked {} tenants covering {entities} entities", reports.len()),
                serde_json::Value::Array(reports.iter().map(report_json).collect()),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("tick", error_class, message, exit_code)
        }
    }
}

fn report_json(report: &TickReport) -> serde_json::Value {
    serde_json::json!({
        "tenant_id": report.tenant_id.0,
        "entities": report
            .entities
            .iter()
            .map(|entity| {
                serde_json::json!({
                    "entity_type": entity.entity.entity_type().as_str(),
                    "entity_id": entity.entity.entity_id(),
                    "state": entity.state.as_str(),
                    "reason": entity.reason,
                    "days_generated": entity.summary.as_ref().map(|s| s.days_generated),
                    "days_skipped_locked": entity.summary.as_ref().map(|s| s.days_skipped_locked),
                    "llm_calls_used": entity.summary.as_ref().map(|s| s.llm_calls_used),
                })
            })
            .collect::<Vec<_>>(),
    })
}
