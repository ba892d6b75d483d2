//! Database Backend Abstractions
//!
//! The runner depends on [`DatabasePool`] only; [`PostgresPool`] is the
//! production implementation.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::{PostgresPool, PostgresTransaction};
