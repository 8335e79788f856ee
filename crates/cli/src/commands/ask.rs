use std::sync::Arc;

use dealdesk_agent::{AgentQuery, AgentRuntime, RunOutcome};
use dealdesk_core::domain::user::UserId;
use dealdesk_db::repositories::{SqlCustomerRepository, SqlDealRepository, SqlUserRepository};
use dealdesk_db::{connect_with_settings, migrations, DemoDataset};
use serde_json::json;

use crate::commands::{
    prepare, CommandResult, EXIT_AGENT, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION,
};

/// Runs one agent query against the configured database and prints the
/// answer together with every event of the run.
pub fn run(user_id: &str, query: &str, seed_demo: bool) -> CommandResult {
    if user_id.trim().is_empty() || query.trim().is_empty() {
        return CommandResult::failure(
            "ask",
            "invalid_input",
            "user id and query must not be empty",
            EXIT_CONFIG,
        );
    }

    let (config, runtime) = match prepare("ask") {
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
        if seed_demo {
            DemoDataset::load(&pool)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
        }

        let agent = AgentRuntime::from_config(
            &config,
            Arc::new(SqlUserRepository::new(pool.clone())),
            Arc::new(SqlCustomerRepository::new(pool.clone())),
            Arc::new(SqlDealRepository::new(pool.clone())),
        )
        .map_err(|error| ("agent_init", error.to_string(), EXIT_AGENT))?;

        let outcome = agent
            .orchestrator
            .run(AgentQuery::new(UserId(user_id.trim().to_string()), query))
            .collect()
            .await;
        pool.close().await;
        Ok::<RunOutcome, (&'static str, String, u8)>(outcome)
    });

    match result {
        Ok(outcome) => render_outcome(outcome),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

fn render_outcome(outcome: RunOutcome) -> CommandResult {
    if let Some(answer) = outcome.final_response() {
        let details = json!({
            "search_history": outcome.search_history,
            "events": outcome.events,
        });
        return CommandResult::success_with_details("ask", answer, Some(details));
    }

    let message = outcome.error_message().unwrap_or("run ended without a final response");
    CommandResult::failure("ask", "agent_run", message, EXIT_AGENT)
}
