//! District Statistics Reconciliation Library
//!
//! Decides when a district's monthly statistics have stopped changing:
//! opens a monitoring window per (district, month), compares fresh snapshots
//! against cached ones, extends late-changing windows and finalizes stable ones.

pub mod config;
pub mod domain;
pub mod persistence;
pub mod task_runner;
