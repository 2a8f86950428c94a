#![forbid(unsafe_code)]

//! Core domain model and business logic for the fastr fasting tracker.
//!
//! This crate provides:
//! - Domain types (session record, profile, fields)
//! - Metabolic zone catalogue and calculator
//! - Session state machine with write-through persistence
//! - Gamification (streaks, totals, badges)
//! - Outbound effects and their dispatcher

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod persist;
pub mod zones;
pub mod plans;
pub mod badges;
pub mod profile;
pub mod session_store;
pub mod gamification;
pub mod effects;
pub mod journal;
pub mod lock;
pub mod collaborator;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, DataPaths};
pub use zones::{zone_for, zone_progress, Zone};
pub use plans::{custom_goal_seconds, find_plan, FastingPlan};
pub use badges::Badge;
pub use gamification::{FastOutcome, GamificationEngine};
pub use effects::{spawn_dispatcher, ChannelSink, Collaborator, Dispatcher, Effect, EffectSink};
pub use collaborator::{CompanionContext, LocalCollaborator};
pub use journal::{read_intervals, CompletedInterval};
pub use lock::DataLock;
pub use session::{CompletedFast, SessionEngine};
