//! People directory.
//!
//! A concrete entity controller: the `person` entity plus the hooks the
//! generic [`controller::EntityController`] needs to serve it.

pub mod repository;

pub use repository::entities::person;
pub use repository::PersonStore;
