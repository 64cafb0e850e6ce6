//! Installer pipeline for Vencord.
//!
//! Detects local Discord clients, closes them, snapshots the source tree,
//! syncs/builds/injects Vencord and reopens what was closed. The binary in
//! `main.rs` is a thin wrapper over [`cli`] and [`app::Installer`].

pub mod app;
pub mod backup;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod options;
pub mod orchestrator;
pub mod storage;
pub mod targets;
mod text_summary;

#[cfg(test)]
pub(crate) mod testing;
