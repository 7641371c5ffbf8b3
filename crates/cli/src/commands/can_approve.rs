use serde_json::json;

use crate::commands::{build_runtime, load_config, open_pool, CommandResult};
use staffdesk_core::approvals::{AuthorizationGate, GateDecision};
use staffdesk_core::domain::org::UserId;
use staffdesk_db::SqlOrgDirectory;

pub fn run(approver_id: &str, requester_id: &str) -> CommandResult {
    let config = match load_config("can-approve") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("can-approve") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let approver_id = UserId::from(approver_id);
    let requester_id = UserId::from(requester_id);
    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let gate = AuthorizationGate::new(SqlOrgDirectory::new(pool.clone()))
            .with_read_timeout(config.approvals.read_timeout());

        let decision = gate.evaluate(&approver_id, &requester_id).await;
        pool.close().await;
        Ok::<GateDecision, (&'static str, String, u8)>(decision)
    });

    match result {
        Ok(decision) => {
            let data = json!({
                "approver_id": approver_id,
                "requester_id": requester_id,
                "allowed": decision.allowed,
                "denial": decision.denial,
            });
            if decision.allowed {
                CommandResult::success_with_data("can-approve", decision.reason, data)
            } else {
                CommandResult::failure_with_data(
                    "can-approve",
                    "not_authorized",
                    decision.reason,
                    10,
                    data,
                )
            }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("can-approve", error_class, message, exit_code)
        }
    }
}
