//! Person controller: the entity-specific hooks over the generic controller.

use std::str::FromStr;

use async_trait::async_trait;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::{ActiveValue, ColumnTrait, Value};

use common::{AppError, AppResult, DatabaseConfig};
use controller::{upper_like, EntityController, SessionFactory};

use super::entities::person::{self, Column, Entity as PersonEntity};

/// Column used when the caller asks for no (or an unknown) ordering
const DEFAULT_ORDER_COLUMN: Column = Column::Id;

/// Concrete controller for `person` rows
#[derive(Clone)]
pub struct PersonStore {
    sessions: SessionFactory,
}

impl PersonStore {
    /// Create new store over an existing session factory
    pub fn new(sessions: SessionFactory) -> Self {
        Self { sessions }
    }

    /// Connect a pool and build the store on top of it
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let sessions = SessionFactory::connect(config).await?;
        Ok(Self::new(sessions))
    }

    /// Person with exactly this email address
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<person::Model>> {
        let mut matches = self.find_by_paged(Column::Email, email.into(), 0, 1).await?;
        Ok(matches.pop())
    }
}

/// Populated (`Set` or loaded) value of a probe field
fn populated<V>(value: &ActiveValue<V>) -> Option<&V>
where
    V: Into<Value>,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v),
        ActiveValue::NotSet => None,
    }
}

fn invalid_id(id: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("'{}' is not a valid person id", id))
}

#[async_trait]
impl EntityController<PersonEntity> for PersonStore {
    fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    fn primary_key(&self, entity: &person::Model) -> i32 {
        entity.id
    }

    fn convert_to_primary_key(&self, id: Value) -> AppResult<i32> {
        match id {
            Value::Int(Some(v)) => Ok(v),
            Value::TinyInt(Some(v)) => Ok(v.into()),
            Value::SmallInt(Some(v)) => Ok(v.into()),
            Value::TinyUnsigned(Some(v)) => Ok(v.into()),
            Value::SmallUnsigned(Some(v)) => Ok(v.into()),
            Value::BigInt(Some(v)) => i32::try_from(v).map_err(|_| invalid_id(v)),
            Value::Unsigned(Some(v)) => i32::try_from(v).map_err(|_| invalid_id(v)),
            Value::BigUnsigned(Some(v)) => i32::try_from(v).map_err(|_| invalid_id(v)),
            Value::String(Some(s)) => s.trim().parse().map_err(|_| invalid_id(&s)),
            other => Err(AppError::validation(format!(
                "unsupported person id value: {:?}",
                other
            ))),
        }
    }

    fn valid_or_default_order_by(&self, order_by: Option<&str>) -> Column {
        order_by
            .and_then(|name| Column::from_str(name).ok())
            .unwrap_or(DEFAULT_ORDER_COLUMN)
    }

    fn search_conditions(&self, probe: &person::ActiveModel) -> Vec<SimpleExpr> {
        let mut conditions = Vec::new();

        if let Some(id) = populated(&probe.id) {
            conditions.push(Column::Id.eq(*id));
        }
        if let Some(name) = populated(&probe.name) {
            conditions.push(upper_like(Column::Name, name));
        }
        if let Some(email) = populated(&probe.email) {
            conditions.push(upper_like(Column::Email, email));
        }
        if let Some(age) = populated(&probe.age) {
            conditions.push(Column::Age.eq(*age));
        }
        if let Some(created_at) = populated(&probe.created_at) {
            conditions.push(Column::CreatedAt.eq(*created_at));
        }

        conditions
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseConnection, DbBackend, EntityTrait, QueryFilter, QueryTrait, Set};

    use controller::all_of;

    use super::*;

    fn store() -> PersonStore {
        PersonStore::new(SessionFactory::new(DatabaseConnection::Disconnected))
    }

    #[test]
    fn test_convert_accepts_integers_and_strings() {
        let store = store();
        assert_eq!(store.convert_to_primary_key(7i32.into()).unwrap(), 7);
        assert_eq!(store.convert_to_primary_key(7i64.into()).unwrap(), 7);
        assert_eq!(store.convert_to_primary_key(7u8.into()).unwrap(), 7);
        assert_eq!(store.convert_to_primary_key(" 42 ".into()).unwrap(), 42);
    }

    #[test]
    fn test_convert_rejects_out_of_range_and_garbage() {
        let store = store();
        assert!(store.convert_to_primary_key(i64::MAX.into()).is_err());
        assert!(store.convert_to_primary_key("forty-two".into()).is_err());
        assert!(store.convert_to_primary_key(true.into()).is_err());
        assert!(store.convert_to_primary_key(Value::Int(None)).is_err());

        let err = store.convert_to_primary_key("x".into()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_order_by_resolution() {
        let store = store();
        assert!(matches!(store.valid_or_default_order_by(Some("age")), Column::Age));
        assert!(matches!(
            store.valid_or_default_order_by(Some("created_at")),
            Column::CreatedAt
        ));
        assert!(matches!(store.valid_or_default_order_by(Some("salary")), Column::Id));
        assert!(matches!(store.valid_or_default_order_by(None), Column::Id));
    }

    #[test]
    fn test_search_conditions_only_cover_populated_fields() {
        let store = store();

        let empty: person::ActiveModel = Default::default();
        assert!(store.search_conditions(&empty).is_empty());

        let probe = person::ActiveModel {
            name: Set("ali".to_owned()),
            age: Set(30),
            ..Default::default()
        };
        let conditions = store.search_conditions(&probe);
        assert_eq!(conditions.len(), 2);

        let sql = PersonEntity::find()
            .filter(all_of(conditions))
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql.contains(r#"UPPER("people"."name") LIKE '%ALI%'"#), "{sql}");
        assert!(sql.contains(r#""people"."age" = 30"#), "{sql}");
    }
}
