//! Database connection and schema bootstrap.

use crate::entity::{oauth2_authorization, oauth2_client, oauth2_token, oauth2_user};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema};

/// Connect to the database at `url`.
#[tracing::instrument(skip(url))]
pub async fn connect(url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(url).await?;
    tracing::info!(backend = ?db.get_database_backend(), "Connected to database");
    Ok(db)
}

/// Create the provider's tables if they do not exist yet.
#[tracing::instrument(skip(db))]
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, oauth2_client::Entity).await?;
    create_table(db, oauth2_user::Entity).await?;
    create_table(db, oauth2_authorization::Entity).await?;
    create_table(db, oauth2_token::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    tracing::debug!(table = entity.table_name(), "Ensured table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let db = connect("sqlite::memory:").await.unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let clients = oauth2_client::Entity::find().all(&db).await.unwrap();
        assert!(clients.is_empty());
    }
}
