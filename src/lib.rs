//! GoalCast forecasting core.
//!
//! Turns match-level inputs (fixtures, historical results, bookmaker odds,
//! expected-goals statistics, availability flags) into joint score
//! distributions per fixture, simulates full rounds of outcomes from them,
//! and searches pick-set space for the best strategy against projected rival
//! behavior. Data acquisition, persistence and any presentation or narrative
//! layer live outside this crate; the sole output is the structured
//! [`report::RoundForecast`] artifact.

pub mod blend;
pub mod calibration;
pub mod cancel;
pub mod config;
pub mod dixon_coles;
pub mod engine;
pub mod error;
pub mod in_play;
pub mod records;
pub mod report;
pub mod rivals;
pub mod score_dist;
pub mod scoring;
pub mod simulate;
pub mod strategy;
pub mod strength;

pub use cancel::CancelToken;
pub use config::{EngineConfig, ScoringTable};
pub use engine::{Engine, RoundInputs};
pub use error::{EngineError, Result};
pub use report::RoundForecast;
