//! Slopemate - anonymous group presence sharing for resort visitors
//!
//! This library provides the core functionality for the Slopemate service:
//! short-lived groups joined by a 6-digit code, a check-in ledger recording
//! where each device currently is, and opt-in accommodation sharing between
//! group members.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod places;
pub mod services;
