//! Domain types: waveform encoding, error taxonomy, connection model and settings.

pub mod error;
pub mod models;
pub mod settings;
pub mod waveform;
