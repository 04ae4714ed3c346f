//! Flight logger
//!
//! Polls a readsb/ultrafeeder `aircraft.json` feed, stores position
//! snapshots in SQLite, expires old history and serves the data over a
//! small HTTP API.

pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod feed;
pub mod models;
pub mod poller;
pub mod retention;
pub mod settings;
pub mod state;
