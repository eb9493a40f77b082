//! Reelsync Database Layer
//!
//! This crate provides the durable record store: one row per watched file,
//! tracking its upload lifecycle across process restarts.

pub mod db;

pub use db::{connect_pool, RecordRepository};
