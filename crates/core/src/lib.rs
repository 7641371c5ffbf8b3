pub mod approvals;
pub mod audit;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;

pub use approvals::{
    ApprovalEngine, ApproverCandidate, ApproverResolver, AuthorizationGate, DecisionError,
    DecisionService, Denial, GateDecision, LeaveRequestStore, Resolution, StoreError,
};
pub use directory::{AvailabilityOracle, DirectoryError, OrgDirectory};
pub use domain::leave::{DecisionAction, LeaveRequest, LeaveRequestId, LeaveStatus};
pub use domain::org::{GlobalRole, PriorityTag, TeamId, TeamRole, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
