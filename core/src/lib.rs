//! Lattice Core - task-graph engine for the Lattice system.
//!
//! This crate keeps an in-memory task graph live against a remote document
//! store via change subscriptions, filters it per viewer role, and derives
//! workload and timeline views from the filtered graph. It exposes a
//! library-style interface; presentation and delivery live elsewhere.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Guarded task and workspace mutations.
pub mod commands;
/// Error taxonomy.
pub mod error;
/// Task graph domain model.
pub mod graph;
/// Ambient infrastructure (config, telemetry).
pub mod infrastructure;
/// Invitation state machine.
pub mod invitation;
/// Workspace membership resolution.
pub mod membership;
/// Semantic notification events.
pub mod notify;
/// Document store adapter and in-memory implementation.
pub mod store;
/// Live subscription management.
pub mod sync;
/// Schedule-view windowing.
pub mod timeline;
/// Role-aware visibility filtering.
pub mod visibility;
/// Burden scoring.
pub mod workload;
