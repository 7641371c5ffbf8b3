use serde::Deserialize;
use std::collections::HashSet;

use staffdesk_core::approvals::ApprovalEngine;
use staffdesk_core::config::ApprovalsConfig;
use staffdesk_core::domain::org::UserId;
use staffdesk_db::{
    connect_with_settings, migrations, DemoOrgDataset, SqlAvailabilityOracle, SqlOrgDirectory,
};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct ContractUser {
    id: String,
    global_role: String,
    teams: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoutingExpectation {
    requester: String,
    primary: Option<String>,
    coverage: Option<String>,
    candidates: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GateExpectation {
    approver: String,
    requester: String,
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct DemoOrgContract {
    dataset: String,
    users: Vec<ContractUser>,
    absent_today: Vec<String>,
    routing: Vec<RoutingExpectation>,
    can_approve: Vec<GateExpectation>,
}

fn contract() -> SeedContractTestResult<DemoOrgContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_org_contract.json"))
        .map_err(|error| format!("demo org contract JSON must parse: {error}"))
}

#[test]
fn contract_matches_demo_sql_fixture() -> SeedContractTestResult {
    let fixture_sql = DemoOrgDataset::SQL;
    let contract = contract()?;
    let mut user_ids = HashSet::new();

    require_eq!(contract.dataset, "demo_org");

    for user in &contract.users {
        require!(user_ids.insert(user.id.clone()), "duplicate user: {}", user.id);
        require!(
            fixture_sql.contains(&format!("('{}', ", user.id)),
            "fixture should insert user {}",
            user.id
        );
        require!(
            fixture_sql.contains(&format!("'{}')", user.global_role))
                || fixture_sql.contains(&format!("'{}'),", user.global_role)),
            "fixture should use role {} for {}",
            user.global_role,
            user.id
        );
        for team in &user.teams {
            require!(
                fixture_sql.contains(&format!("('{}', '{}'", team, user.id)),
                "fixture should place {} in {}",
                user.id,
                team
            );
        }
    }

    for absent in &contract.absent_today {
        require!(user_ids.contains(absent), "absent user {} must be in the contract", absent);
    }

    for expectation in &contract.routing {
        require!(user_ids.contains(&expectation.requester), "unknown requester {}", expectation.requester);
        if let Some(primary) = &expectation.primary {
            require!(
                expectation.candidates.contains(primary),
                "primary {} must be one of the candidates for {}",
                primary,
                expectation.requester
            );
        } else {
            require!(expectation.coverage.is_none(), "coverage without primary for {}", expectation.requester);
        }
    }

    Ok(())
}

#[tokio::test]
async fn seeded_org_routes_and_gates_as_contracted() -> SeedContractTestResult {
    let contract = contract()?;
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    DemoOrgDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;

    let engine = ApprovalEngine::new(
        SqlOrgDirectory::new(pool.clone()),
        SqlAvailabilityOracle::new(pool.clone()),
        &ApprovalsConfig { read_timeout_ms: 2_000 },
    );

    for expectation in &contract.routing {
        let resolution = engine.resolve(&UserId(expectation.requester.clone())).await;
        let primary = resolution.primary.as_ref().map(|candidate| candidate.user_id.0.clone());
        let coverage = resolution.coverage.as_ref().map(|candidate| candidate.user_id.0.clone());
        let candidates: Vec<String> =
            resolution.all.iter().map(|candidate| candidate.user_id.0.clone()).collect();

        require_eq!(primary, expectation.primary, "primary for {}", expectation.requester);
        require_eq!(coverage, expectation.coverage, "coverage for {}", expectation.requester);
        require_eq!(candidates, expectation.candidates, "candidates for {}", expectation.requester);

        for candidate in &resolution.all {
            let expected_available = !contract.absent_today.contains(&candidate.user_id.0);
            require_eq!(
                candidate.available,
                expected_available,
                "availability of {} for {}",
                candidate.user_id,
                expectation.requester
            );
        }
    }

    for expectation in &contract.can_approve {
        let allowed = engine
            .can_approve(&UserId(expectation.approver.clone()), &UserId(expectation.requester.clone()))
            .await;
        require_eq!(
            allowed,
            expectation.allowed,
            "can_approve({}, {}) should be {}",
            expectation.approver,
            expectation.requester,
            expectation.allowed
        );
    }

    Ok(())
}
