pub use sea_orm_migration::prelude::*;

mod m20260301_000001_add_users_table;
mod m20260301_000002_add_comms_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_add_users_table::Migration),
            Box::new(m20260301_000002_add_comms_tables::Migration),
        ]
    }
}
