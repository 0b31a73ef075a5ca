//! Generic entity controller over SeaORM.
//!
//! This crate provides:
//! - [`EntityController`]: CRUD, paged and ordered listing, equality and
//!   query-by-example search for one entity type
//! - [`SessionFactory`] / [`Session`]: per-call units of work with
//!   guaranteed release and rollback-on-error transactions
//! - [`Reference`]: lazily resolved entity handles
//! - Query helpers for windows and case-insensitive pattern predicates

pub mod controller;
pub mod query;
pub mod reference;
pub mod session;

pub use controller::{EntityController, PrimaryKeyOf};
pub use query::{all_of, equals, like_pattern, upper_like, Window, MAX_BOUND};
pub use reference::Reference;
pub use session::{connect_options, Session, SessionFactory};
