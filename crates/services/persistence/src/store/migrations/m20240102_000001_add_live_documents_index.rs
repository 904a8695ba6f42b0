//! Migration: Index live (non-tombstoned) documents for list scans.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

use crate::store::postgres::LIVE_PREDICATE;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Partial indexes are not expressible through the schema builder
        manager
            .get_connection()
            .execute_unprepared(&format!(
                "CREATE INDEX IF NOT EXISTS idx_documents_live \
                 ON documents (collection, id COLLATE \"C\") \
                 WHERE {LIVE_PREDICATE}"
            ))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_documents_live")
                    .table(Documents::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum Documents {
    Table,
}
