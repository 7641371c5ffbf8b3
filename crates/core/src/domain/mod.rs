pub mod leave;
pub mod org;
