use crate::commands::CommandResult;
use chrono::Utc;
use priceye_core::config::{AppConfig, LoadOptions};
use priceye_db::{connect, migrations, SeedDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
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
                "seed",
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

        let seeded = SeedDataset::demo(Utc::now().date_naive())
            .apply(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 4u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => {
            let details = serde_json::to_value(&seeded).unwrap_or(serde_json::Value::Null);
            CommandResult::success_with(
                "seed",
                format!(
                    "seeded demo tenant {} with {} properties and {} forecast days",
                    seeded.tenant_id, seeded.properties, seeded.forecast_days
                ),
                details,
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
