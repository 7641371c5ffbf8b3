use serde::Serialize;
use staffdesk_core::config::{AppConfig, LoadOptions};
use staffdesk_core::directory::OrgDirectory;
use staffdesk_core::domain::org::GlobalRole;
use staffdesk_db::{connect, migrations, DbPool, SqlOrgDirectory};

use crate::commands::config::redact_database_url;

const REQUIRED_TABLES: &[&str] = &["users", "teams", "team_memberships", "leave_requests"];

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

impl DoctorCheck {
    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
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
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            let reason = "configuration did not load";
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("schema_readiness", reason));
            checks.push(DoctorCheck::skipped("superadmin_presence", reason));
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

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: format!("failed to initialize async runtime: {error}"),
                },
                DoctorCheck::skipped("schema_readiness", "the async runtime did not start"),
                DoctorCheck::skipped("superadmin_presence", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck::skipped("schema_readiness", "the database is unreachable"),
                    DoctorCheck::skipped("superadmin_presence", "the database is unreachable"),
                ];
            }
        };

        let mut checks = vec![DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", redact_database_url(&config.database.url)),
        }];

        let schema = check_schema(&pool).await;
        let schema_ready = schema.status == CheckStatus::Pass;
        checks.push(schema);
        if schema_ready {
            checks.push(check_superadmins(&pool).await);
        } else {
            checks.push(DoctorCheck::skipped("superadmin_presence", "the schema is not migrated"));
        }

        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        match migrations::table_exists(pool, table).await {
            Ok(true) => {}
            Ok(false) => missing.push(*table),
            Err(error) => {
                return DoctorCheck {
                    name: "schema_readiness",
                    status: CheckStatus::Fail,
                    details: format!("could not inspect schema: {error}"),
                };
            }
        }
    }

    if missing.is_empty() {
        DoctorCheck {
            name: "schema_readiness",
            status: CheckStatus::Pass,
            details: "organization and leave tables are present".to_string(),
        }
    } else {
        DoctorCheck {
            name: "schema_readiness",
            status: CheckStatus::Fail,
            details: format!("missing tables: {} (run `staffdesk migrate`)", missing.join(", ")),
        }
    }
}

/// HR and superadmin requests can only be decided by a superadmin.
async fn check_superadmins(pool: &DbPool) -> DoctorCheck {
    let directory = SqlOrgDirectory::new(pool.clone());
    match directory.users_by_role(GlobalRole::Superadmin).await {
        Ok(superadmins) if !superadmins.is_empty() => DoctorCheck {
            name: "superadmin_presence",
            status: CheckStatus::Pass,
            details: format!("{} superadmin(s) available for HR/SUPERADMIN requests", superadmins.len()),
        },
        Ok(_) => DoctorCheck {
            name: "superadmin_presence",
            status: CheckStatus::Fail,
            details: "no superadmin exists; HR and superadmin requests have no approver".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "superadmin_presence",
            status: CheckStatus::Fail,
            details: format!("directory read failed: {error}"),
        },
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
