use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // Stamps last_updated on every row mutation, including updates that
        // don't originate from this crate, so the invariant holds regardless
        // of who writes the row.
        let statement = r#"
        CREATE OR REPLACE FUNCTION stamp_billing_transaction_last_updated_fn() RETURNS TRIGGER LANGUAGE PLPGSQL AS
              $BODY$
                  BEGIN
                      NEW.last_updated = now();
                      RETURN NEW;
                  END
              $BODY$;
        "#;

        db.execute_unprepared(statement).await?;

        let statement = r#"
        CREATE TRIGGER stamp_billing_transaction_last_updated
        BEFORE UPDATE ON billing_transactions
        FOR EACH ROW EXECUTE PROCEDURE stamp_billing_transaction_last_updated_fn();
        "#;

        db.execute_unprepared(statement).await?;

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        Err(DbErr::Custom(String::from("cannot be reverted")))
    }
}
