//! Unified incident.raw_event.v1 schema
//!
//! This module defines the device-facing input schema for incident events and
//! the adapter that normalizes them into `IncidentRecord`s.

mod adapter;
mod raw_event;

pub use adapter::*;
pub use raw_event::*;
