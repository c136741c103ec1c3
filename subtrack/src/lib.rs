//! SubTrack library
//!
//! Subscription tracking core: duration and renewal date arithmetic, a sync
//! layer over a remote document store with a local mirror fallback, and the
//! dashboard and renewal views built on top of them.

pub mod app;
pub mod commands;
pub mod config;
pub mod database;
pub mod dates;
pub mod error;
pub mod remote;
pub mod services;
pub mod storage;
