//! Domain models and their PostgreSQL queries.
//!
//! All query functions use the generic Executor pattern, allowing them to work
//! with both `&PgPool` and `&mut PgConnection` (transactions).

pub mod access;
pub mod billing;
pub mod handle_queue;
pub mod tokens;
pub mod tweets;
pub mod users;
pub mod walls;
