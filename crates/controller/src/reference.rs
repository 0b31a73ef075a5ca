//! Lazily resolved entity handles.

use sea_orm::EntityTrait;

use common::{AppResult, OptionExt};

use crate::controller::PrimaryKeyOf;
use crate::session::SessionFactory;

/// Handle to the row with a given primary key.
///
/// Holding a reference performs no I/O and does not prove the row exists;
/// the row is read (in its own session) each time it is resolved.
pub struct Reference<E: EntityTrait> {
    id: PrimaryKeyOf<E>,
    sessions: SessionFactory,
}

impl<E> Reference<E>
where
    E: EntityTrait,
    E::Model: Sync,
    PrimaryKeyOf<E>: Clone + Sync,
{
    pub(crate) fn new(id: PrimaryKeyOf<E>, sessions: SessionFactory) -> Self {
        Self { id, sessions }
    }

    pub fn id(&self) -> &PrimaryKeyOf<E> {
        &self.id
    }

    /// Load the row, `None` if it does not exist.
    pub async fn try_resolve(&self) -> AppResult<Option<E::Model>> {
        let session = self.sessions.open();
        let row = E::find_by_id(self.id.clone())
            .one(session.connection())
            .await?;
        Ok(row)
    }

    /// Load the row; a missing row is [`AppError::NotFound`](common::AppError::NotFound).
    pub async fn resolve(&self) -> AppResult<E::Model> {
        self.try_resolve().await?.ok_or_not_found()
    }
}

impl<E: EntityTrait> Clone for Reference<E>
where
    PrimaryKeyOf<E>: Clone,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<E: EntityTrait> std::fmt::Debug for Reference<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("entity", &E::default().table_name())
            .field("id", &self.id)
            .finish()
    }
}
