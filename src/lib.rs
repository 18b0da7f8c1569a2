//! Per-guild Discord audio playback engine.
//!
//! [`audio`] holds the engine: queue, player state machine, voice retry and
//! playback metrics, plus the songbird/ffmpeg backend. [`sources`] turns user
//! queries into songs, [`history`] records what was played and [`bot`] wires
//! chat commands to the per-guild players.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod history;
pub mod sources;
