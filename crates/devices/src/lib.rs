//! Home device context for zaibridge.
//!
//! Reads a JSON snapshot of a home's entities and renders it into a compact
//! system preamble segment, grouped by area, so the model knows which devices
//! exist and what state they are in.

pub mod context;
pub mod inventory;

pub use context::{DeviceContext, DeviceFilter, render};
pub use inventory::{Area, DeviceInventory, Entity, InventoryError};
