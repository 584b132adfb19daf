//! Zignal — chat-signal to futures-bracket trading bridge.
//!
//! Listens to a feed of chat messages, extracts trading signals and turns
//! each one into a bracket of three coordinated orders on USDT-margined
//! perpetual futures, then tracks the protective orders until the position
//! closes or times out.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod secrets;
pub mod web;
