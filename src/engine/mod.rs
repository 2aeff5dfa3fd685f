//! Lifecycle engine

pub mod controller;

pub use controller::{CycleReport, LifecycleSettings, PositionLifecycleController};
