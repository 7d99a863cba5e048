pub mod membership;
pub mod permission;
pub mod perspective;
pub mod project;
pub mod user;
