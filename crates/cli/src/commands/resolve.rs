use serde_json::json;

use crate::commands::{build_runtime, load_config, open_pool, CommandResult};
use staffdesk_core::approvals::{ApproverResolver, Resolution};
use staffdesk_core::domain::org::UserId;
use staffdesk_db::{SqlAvailabilityOracle, SqlOrgDirectory};

/// Prints who is responsible for `requester_id`'s leave requests right now.
///
/// Directory trouble never fails the command: the resolver degrades to an empty
/// result and the request reads as awaiting assignment.
pub fn run(requester_id: &str) -> CommandResult {
    let config = match load_config("resolve") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime("resolve") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let requester_id = UserId::from(requester_id);
    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let resolver = ApproverResolver::new(
            SqlOrgDirectory::new(pool.clone()),
            SqlAvailabilityOracle::new(pool.clone()),
        )
        .with_read_timeout(config.approvals.read_timeout());

        let resolution = resolver.resolve(&requester_id).await;
        pool.close().await;
        Ok::<Resolution, (&'static str, String, u8)>(resolution)
    });

    match result {
        Ok(resolution) => {
            let data = json!({ "requester_id": requester_id, "resolution": resolution });
            CommandResult::success_with_data("resolve", summary(&resolution), data)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("resolve", error_class, message, exit_code)
        }
    }
}

fn summary(resolution: &Resolution) -> String {
    match (&resolution.primary, &resolution.coverage) {
        (None, _) => "awaiting assignment".to_string(),
        (Some(primary), None) => format!("primary approver: {} ({})", primary.user_id, primary.reason),
        (Some(primary), Some(coverage)) => format!(
            "primary approver: {} ({}), coverage: {}",
            primary.user_id, primary.reason, coverage.user_id
        ),
    }
}
