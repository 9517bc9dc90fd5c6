//! Parallel batch runner for a single-file console engine.
//!
//! Each input file gets its own engine process, driven by a generated script and a
//! configuration assembled from a shared template and a per-item override row. The
//! run ends with every item in exactly one of three lists: successful, failed
//! validation, or not processed.

pub mod assembler;
pub mod classify;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod overrides;
pub mod report;
pub mod runner;
pub mod script;
pub mod state_machine;
pub mod ui;
pub mod work;
