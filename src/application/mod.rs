//! Application services: workflow, authentication, guards and administration.

pub mod attachments;
pub mod audit;
pub mod auth;
pub mod content;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod guards;
pub mod health;
pub mod pagination;
pub mod repos;
pub mod scheduler;
pub mod submissions;
pub mod taxonomy;
pub mod users;
