//! Worker Hub — real-time worker state sync and command routing.

pub mod config;
pub mod context;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod tools;
pub mod ws;
