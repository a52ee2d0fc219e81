//! Light-curve ingestion, signal transforms and exoplanet classification.
//!
//! [`app::App`] drives a session: it parses CSV uploads or catalog targets
//! into a [`data::model::ParsedDataset`], sends them to a
//! [`gateway::Classifier`] and records every step in the
//! [`state::AppState`] run log.

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod gateway;
pub mod runlog;
pub mod state;
