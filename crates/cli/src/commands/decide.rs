use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::commands::{build_runtime, load_config, open_pool, CommandResult};
use staffdesk_core::approvals::{AuthorizationGate, DecisionError, DecisionService};
use staffdesk_core::audit::TracingAuditSink;
use staffdesk_core::domain::leave::{DecisionAction, LeaveRequest, LeaveRequestId};
use staffdesk_core::domain::org::UserId;
use staffdesk_core::errors::ApplicationError;
use staffdesk_db::{SqlLeaveRequestRepository, SqlOrgDirectory};

pub fn run(request_id: &str, approver_id: &str, action: DecisionAction) -> CommandResult {
    let config = match load_config("decide") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("decide") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let request_id = LeaveRequestId(request_id.to_string());
    let approver_id = UserId::from(approver_id);
    let correlation_id = format!("cli-{}", Uuid::new_v4());

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let gate = AuthorizationGate::new(SqlOrgDirectory::new(pool.clone()))
            .with_read_timeout(config.approvals.read_timeout());
        let service = DecisionService::new(
            gate,
            SqlLeaveRequestRepository::new(pool.clone()),
            Arc::new(TracingAuditSink),
        );

        let outcome = service.decide(&request_id, &approver_id, action, &correlation_id).await;
        pool.close().await;
        Ok::<Result<LeaveRequest, DecisionError>, (&'static str, String, u8)>(outcome)
    });

    match result {
        Ok(Ok(request)) => CommandResult::success_with_data(
            "decide",
            format!("leave request {} is now {}", request.id, request.status),
            json!({ "correlation_id": correlation_id, "leave_request": request }),
        ),
        Ok(Err(error)) => decision_failure(error, &correlation_id),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("decide", error_class, message, exit_code)
        }
    }
}

fn decision_failure(error: DecisionError, correlation_id: &str) -> CommandResult {
    let (error_class, exit_code) = match &error {
        DecisionError::NotAuthorized { .. } => ("not_authorized", 10),
        DecisionError::NotFound(_) => ("not_found", 11),
        DecisionError::AlreadyDecided { .. } => ("already_decided", 12),
        DecisionError::Conflict(_) => ("conflict", 13),
        DecisionError::Store(_) => ("store_unavailable", 14),
    };
    let detail = error.to_string();
    let interface_error = ApplicationError::from(error).into_interface(correlation_id);

    CommandResult::failure_with_data(
        "decide",
        error_class,
        interface_error.user_message(),
        exit_code,
        json!({ "correlation_id": correlation_id, "detail": detail }),
    )
}
