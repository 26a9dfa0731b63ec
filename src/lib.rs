//! Roster Mailer: upload an employee transport roster, email every employee.

pub mod config;
pub mod error;
pub mod notify;
pub mod roster;
pub mod store;
pub mod web;
