//! CLI command handlers

pub mod commands;
