use crate::commands::{build_runtime, load_config, open_pool, CommandResult, Failure};
use staffdesk_db::{migrations, DemoOrgDataset, LeaveSeedInfo};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoOrgDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoOrgDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, Failure> = if !verification.all_present {
            let failed_checks = failed_check_labels(&verification.checks);
            Err(("seed_verification", verification_failure_message(&failed_checks), 6u8))
        } else {
            Ok(SeedOutput {
                users: seed_result.users_seeded,
                teams: seed_result.teams_seeded,
                leave_requests: seed_result.leave_requests_seeded,
            })
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let request_descriptions: Vec<String> = output
                .leave_requests
                .iter()
                .map(|request| {
                    format!(
                        "  - {} by {} ({})",
                        request.leave_request_id, request.requester_id, request.description
                    )
                })
                .collect();
            let message = format!(
                "demo organization loaded: {} users in {} teams, leave requests:\n{}",
                output.users,
                output.teams,
                request_descriptions.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    users: usize,
    teams: usize,
    leave_requests: Vec<LeaveSeedInfo>,
}

fn failed_check_labels(checks: &[(&'static str, bool)]) -> Vec<&'static str> {
    checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
