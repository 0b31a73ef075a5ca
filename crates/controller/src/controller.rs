//! Generic entity controller.
//!
//! An entity-specific store implements the required hooks; every CRUD,
//! listing and search operation comes for free. Each operation opens its own
//! [`Session`](crate::Session), so nothing is shared between calls.
//!
//! Rows that tie on the ordering column come back in whatever order the
//! backend produces; the controller adds no tie-break.

use async_trait::async_trait;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, Condition, DatabaseTransaction,
    EntityTrait, IntoActiveModel, Iterable, PaginatorTrait, PrimaryKeyToColumn, PrimaryKeyTrait,
    QueryFilter, QueryOrder, QuerySelect, Value,
};
use tracing::debug;

use common::AppResult;

use crate::query::{all_of, equals, Window};
use crate::reference::Reference;
use crate::session::SessionFactory;

/// Primary key value type of an entity (scalar or tuple).
pub type PrimaryKeyOf<E> = <<E as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType;

#[async_trait]
pub trait EntityController<E>: Send + Sync
where
    E: EntityTrait,
    E::Model: Sync + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send + Sync,
    PrimaryKeyOf<E>: Clone + Sync,
{
    /// Backend the controller opens its sessions on
    fn sessions(&self) -> &SessionFactory;

    /// Primary key of a row
    fn primary_key(&self, entity: &E::Model) -> PrimaryKeyOf<E>;

    /// Convert an arbitrary identifier into the entity's key type
    fn convert_to_primary_key(&self, id: Value) -> AppResult<PrimaryKeyOf<E>>;

    /// Resolve a caller supplied column name, falling back to a default
    /// column when the name is absent or unknown
    fn valid_or_default_order_by(&self, order_by: Option<&str>) -> E::Column;

    /// Predicates derived from the populated fields of a probe entity
    fn search_conditions(&self, probe: &E::ActiveModel) -> Vec<SimpleExpr>;

    // ---------------------------------------------------------------------
    // Listing
    // ---------------------------------------------------------------------

    /// Every row, ascending by the default column
    async fn get_all(&self) -> AppResult<Vec<E::Model>> {
        self.select(Condition::all(), None, None, false).await
    }

    async fn get(&self, offset: u64, limit: u64) -> AppResult<Vec<E::Model>> {
        self.select(Condition::all(), Some(Window::new(offset, limit)), None, false)
            .await
    }

    async fn get_ordered(
        &self,
        offset: u64,
        limit: u64,
        order_by: Option<&str>,
        descending: bool,
    ) -> AppResult<Vec<E::Model>> {
        self.select(
            Condition::all(),
            Some(Window::new(offset, limit)),
            order_by,
            descending,
        )
        .await
    }

    async fn get_count(&self) -> AppResult<u64> {
        self.count(Condition::all()).await
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// Lazy handle; nothing is read until the reference is resolved.
    fn get_reference(&self, id: Value) -> AppResult<Reference<E>> {
        let id = self.convert_to_primary_key(id)?;
        Ok(Reference::new(id, self.sessions().clone()))
    }

    /// Look up the row carrying the same primary key as `entity`
    async fn find(&self, entity: &E::Model) -> AppResult<Option<E::Model>> {
        self.find_by_id(self.primary_key(entity)).await
    }

    async fn find_by_primary_key(&self, id: Value) -> AppResult<Option<E::Model>> {
        let id = self.convert_to_primary_key(id)?;
        self.find_by_id(id).await
    }

    /// Typed primary key lookup
    async fn find_by_id(&self, id: PrimaryKeyOf<E>) -> AppResult<Option<E::Model>> {
        let session = self.sessions().open();
        let row = E::find_by_id(id).one(session.connection()).await?;
        Ok(row)
    }

    // ---------------------------------------------------------------------
    // Single column equality
    // ---------------------------------------------------------------------

    async fn find_by(&self, column: E::Column, value: Value) -> AppResult<Vec<E::Model>> {
        self.select(equals(column, value), None, None, false).await
    }

    async fn find_by_paged(
        &self,
        column: E::Column,
        value: Value,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<E::Model>> {
        self.select(
            equals(column, value),
            Some(Window::new(offset, limit)),
            None,
            false,
        )
        .await
    }

    async fn find_by_ordered(
        &self,
        column: E::Column,
        value: Value,
        offset: u64,
        limit: u64,
        order_by: Option<&str>,
        descending: bool,
    ) -> AppResult<Vec<E::Model>> {
        self.select(
            equals(column, value),
            Some(Window::new(offset, limit)),
            order_by,
            descending,
        )
        .await
    }

    async fn find_by_count(&self, column: E::Column, value: Value) -> AppResult<u64> {
        self.count(equals(column, value)).await
    }

    // ---------------------------------------------------------------------
    // Query by example
    // ---------------------------------------------------------------------

    async fn find_by_example(&self, probe: &E::ActiveModel) -> AppResult<Vec<E::Model>> {
        let condition = all_of(self.search_conditions(probe));
        self.select(condition, None, None, false).await
    }

    async fn find_by_example_paged(
        &self,
        probe: &E::ActiveModel,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<E::Model>> {
        let condition = all_of(self.search_conditions(probe));
        self.select(condition, Some(Window::new(offset, limit)), None, false)
            .await
    }

    async fn find_by_example_ordered(
        &self,
        probe: &E::ActiveModel,
        offset: u64,
        limit: u64,
        order_by: Option<&str>,
        descending: bool,
    ) -> AppResult<Vec<E::Model>> {
        let condition = all_of(self.search_conditions(probe));
        self.select(
            condition,
            Some(Window::new(offset, limit)),
            order_by,
            descending,
        )
        .await
    }

    async fn find_by_example_count(&self, probe: &E::ActiveModel) -> AppResult<u64> {
        let condition = all_of(self.search_conditions(probe));
        self.count(condition).await
    }

    // ---------------------------------------------------------------------
    // Shared query paths
    // ---------------------------------------------------------------------

    /// Filter, order and optionally window the entity's rows.
    async fn select(
        &self,
        condition: Condition,
        window: Option<Window>,
        order_by: Option<&str>,
        descending: bool,
    ) -> AppResult<Vec<E::Model>> {
        let column = self.valid_or_default_order_by(order_by);

        let mut query = E::find().filter(condition);
        query = if descending {
            query.order_by_desc(column)
        } else {
            query.order_by_asc(column)
        };
        if let Some(window) = window {
            query = query.offset(window.offset).limit(window.limit);
        }

        let session = self.sessions().open();
        let rows = query.all(session.connection()).await?;
        Ok(rows)
    }

    async fn count(&self, condition: Condition) -> AppResult<u64> {
        let session = self.sessions().open();
        let total = E::find()
            .filter(condition)
            .count(session.connection())
            .await?;
        Ok(total)
    }

    // ---------------------------------------------------------------------
    // Mutations, one transaction each
    // ---------------------------------------------------------------------

    /// Insert a new row. Backend generated fields are populated in the result.
    ///
    /// For auto-increment keys a placeholder key carried by a plain `Model`
    /// is dropped so the backend always assigns the id. An explicitly `Set`
    /// key is inserted as given.
    async fn create<A>(&self, entity: A) -> AppResult<E::Model>
    where
        A: IntoActiveModel<E::ActiveModel> + Send,
    {
        let active = clear_generated_key(entity.into_active_model());

        let mut session = self.sessions().open();
        let txn = session.begin().await?;
        let outcome = active.insert(txn).await.map_err(Into::into);
        session.finish(outcome).await
    }

    /// Merge every populated field into the row with the same primary key.
    ///
    /// There is no upsert: when no row carries that key the call fails with
    /// `AppError::Database(DbErr::RecordNotUpdated)` and nothing is written.
    async fn update<A>(&self, entity: A) -> AppResult<E::Model>
    where
        A: IntoActiveModel<E::ActiveModel> + Send,
    {
        let active = mark_for_merge(entity.into_active_model());

        let mut session = self.sessions().open();
        let txn = session.begin().await?;
        let outcome = active.update(txn).await.map_err(Into::into);
        session.finish(outcome).await
    }

    /// Remove the row with `entity`'s primary key.
    ///
    /// The row is re-read inside the transaction; if it is already gone the
    /// transaction commits without touching anything. `entity` is handed back
    /// either way.
    async fn delete(&self, entity: E::Model) -> AppResult<E::Model> {
        let id = self.primary_key(&entity);

        let mut session = self.sessions().open();
        let txn = session.begin().await?;
        let outcome = remove_by_primary_key::<E>(txn, id).await;
        session.finish(outcome).await?;
        Ok(entity)
    }
}

/// Unset loaded primary key values when the backend generates the key.
fn clear_generated_key<A>(mut active: A) -> A
where
    A: ActiveModelTrait,
{
    if <<A::Entity as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::auto_increment() {
        for key in <A::Entity as EntityTrait>::PrimaryKey::iter() {
            let column = key.into_column();
            if let ActiveValue::Unchanged(_) = active.get(column) {
                active.not_set(column);
            }
        }
    }
    active
}

/// Promote loaded (`Unchanged`) values to `Set` so a full row is written back,
/// not only the fields the caller touched.
fn mark_for_merge<A>(mut active: A) -> A
where
    A: ActiveModelTrait,
{
    for column in <A::Entity as EntityTrait>::Column::iter() {
        if let ActiveValue::Unchanged(value) = active.get(column) {
            active.set(column, value);
        }
    }
    active
}

async fn remove_by_primary_key<E>(txn: &DatabaseTransaction, id: PrimaryKeyOf<E>) -> AppResult<()>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: ActiveModelTrait<Entity = E> + ActiveModelBehavior + Send,
{
    match E::find_by_id(id).one(txn).await? {
        Some(row) => {
            let active: E::ActiveModel = row.into_active_model();
            active.delete(txn).await?;
        }
        None => debug!("Row already absent, nothing to delete"),
    }
    Ok(())
}
