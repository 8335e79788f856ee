use dealdesk_core::config::{AgentMode, AppConfig, LoadOptions};
use dealdesk_db::{connect_with_settings, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_model_readiness(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_readiness", "database_schema"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Reports which model the agent will talk to.
fn check_model_readiness(config: &AppConfig) -> DoctorCheck {
    let details = match config.agent.mode {
        AgentMode::Live => format!(
            "live mode using `{}` (news: `{}`) at {}",
            config.llm.model, config.llm.news_model, config.llm.base_url
        ),
        AgentMode::Offline => "offline mode; scripted model, no credentials needed".to_string(),
    };
    let status = if config.agent.mode == AgentMode::Offline || config.llm.has_api_key() {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };

    DoctorCheck { name: "model_readiness", status, details }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied_count(&pool).await;
        pool.close().await;

        let applied =
            applied.map_err(|error| format!("failed to read migration ledger: {error}"))?;
        let expected = migrations::embedded_count() as i64;
        if applied >= expected {
            Ok::<i64, String>(applied)
        } else {
            Err(format!("{applied} of {expected} migrations applied; run `dealdesk migrate`"))
        }
    });

    match result {
        Ok(applied) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}`; {applied} migrations applied",
                config.database.url
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
