// Migrations versionnées: appliquées au démarrage (db::establish_connection) et dans les tests
pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_core_tables;
mod m20250115_000002_create_webhook_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_core_tables::Migration),
            Box::new(m20250115_000002_create_webhook_tables::Migration),
        ]
    }
}
