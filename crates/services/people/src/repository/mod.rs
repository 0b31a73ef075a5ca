//! Repository layer for data access.

pub mod entities;
mod person_store;

pub use person_store::PersonStore;
