//! HTTP handlers

pub mod health;
pub mod identify;
pub mod events;
pub mod devices;
pub mod linked_ids;
