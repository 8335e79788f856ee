use dealdesk_db::{connect_with_settings, migrations, DemoDataset, SeedResult};

use crate::commands::{
    prepare, CommandResult, EXIT_DATABASE, EXIT_MIGRATION, EXIT_SEED_VERIFICATION,
};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        let run_result = if verification.all_present {
            Ok(seeded)
        } else {
            let failed = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed), EXIT_SEED_VERIFICATION))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset ready: {} users, {} customers, {} deals",
        seeded.users_seeded, seeded.customers_seeded, seeded.deals_seeded
    )
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo rows failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
