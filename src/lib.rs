//! Focus cycler for Dofus and Wakfu multi-boxing
//!
//! Detects running game clients, keeps an ordered selection of them and
//! brings the next one to the foreground whenever a global hotkey fires.
//! Selections and hotkeys are saved as named profiles.

#![cfg_attr(not(windows), forbid(unsafe_code))]

pub mod activation;
pub mod app;
pub mod config;
pub mod constants;
pub mod cycle_state;
pub mod error;
pub mod hotkey;
pub mod matcher;
pub mod persistence;
pub mod platform;
pub mod registry;
pub mod types;

pub use app::{CycleEvent, Cycler};
pub use error::{CyclerError, Result};
