//! # JobClaw Store
//! SQLite persistence for the outreach engine.

mod db;

pub use db::{OutreachDb, OutreachThread};
