//! # RoadMark Common Library
//!
//! Shared code for the RoadMark geotagging services including:
//! - Coordinate type and spherical geometry
//! - Detection wire types and notification model
//! - Event types (GeotagEvent enum) and EventBus
//! - Observer-side reconciliation

pub mod detection;
pub mod events;
pub mod geo;
pub mod notification;
pub mod observer;

pub use geo::Coordinate;
