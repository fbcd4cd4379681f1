//! Scenario-based tests for relpipe

mod build_dir_confirmation;
mod config_validation;
mod database_bootstrap;
mod failure_handling;
mod remote_deploy;
