use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The daily recurring trigger filters on these two columns
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_recurring_due")
                    .table(Alias::new("transactions"))
                    .col(Alias::new("is_recurring"))
                    .col(Alias::new("next_recurring_date"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_transactions_recurring_due")
                    .table(Alias::new("transactions"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
