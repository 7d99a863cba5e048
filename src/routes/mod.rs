pub mod auth;
pub mod health;
pub mod members;
pub mod permissions;
pub mod perspective;
pub mod projects;
pub mod users;
