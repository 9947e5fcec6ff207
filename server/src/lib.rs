// server/src/lib.rs

//! HTTP backend of the Protocol: Zero community server: membership payments,
//! Discord integration and the application review panel.

pub mod config;
pub mod db;
pub mod errors;
pub mod pipelines;
pub mod services;
pub mod session;
pub mod state;
pub mod web;
