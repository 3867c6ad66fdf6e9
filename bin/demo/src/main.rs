//! Poolkit demo: a small product catalog on top of a lazily opened SQLite pool.
//!
//! Pool tuning comes from the `DB_*` environment variables (or `.env`);
//! the database file defaults to `demo.db` and can be renamed with `DB_NAME`.

use std::sync::Arc;

use eyre::Result;
use poolkit_core::{AppError, Settings, telemetry};
use poolkit_sql::{Connection, DbOptions, PoolHandle, factories, paginate};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init(&settings)?;

    let options = DbOptions::try_from(&settings).map_err(AppError::from)?;
    let name = settings.database_name.as_deref().unwrap_or("demo");
    let connection = Arc::new(factories::sqlite(name, options).map_err(AppError::from)?);

    let products = ProductRepository::new(Arc::clone(&connection));
    products.migrate().await?;
    tracing::info!("Schema ready");

    match products.find_by_id(1).await {
        Ok(product) => tracing::info!(id = product.id, name = %product.name, "Product found"),
        Err(AppError::NotFound(what)) => {
            tracing::info!(%what, "Product missing, creating it");
            let id = products.create("Milk", 1.25).await?;
            tracing::info!(id, "New product created");
        }
        Err(e) => return Err(e.into()),
    }

    for product in products.find_page(1, 10).await? {
        println!("{}", serde_json::to_string(&product)?);
    }

    connection.get_connection().await.map_err(AppError::from)?.close().await;
    tracing::info!("Connection closed");
    Ok(())
}

#[derive(Debug, Clone, Serialize, FromRow)]
struct Product {
    id: i64,
    name: String,
    price: f64,
}

/// Product queries against the shared connection.
struct ProductRepository {
    connection: Arc<Connection>,
}

impl ProductRepository {
    fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    async fn pool(&self) -> Result<&SqlitePool, AppError> {
        let pool = self.connection.get_connection().await?;
        pool.as_sqlite()
            .ok_or_else(|| AppError::Config(format!("expected sqlite, got {}", pool.dialect())))
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                price REAL NOT NULL
            )
            "#,
        )
        .execute(self.pool().await?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Product, AppError> {
        sqlx::query_as::<_, Product>("SELECT id, name, price FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool().await?)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound(format!("product {id}")))
    }

    async fn find_page(&self, page: i64, page_size: i64) -> Result<Vec<Product>, AppError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, name, price FROM products ORDER BY id");
        paginate(page, page_size).push_to(&mut qb);

        qb.build_query_as::<Product>()
            .fetch_all(self.pool().await?)
            .await
            .map_err(db_err)
    }

    async fn create(&self, name: &str, price: f64) -> Result<i64, AppError> {
        let result = sqlx::query("INSERT INTO products (name, price) VALUES (?, ?)")
            .bind(name)
            .bind(price)
            .execute(self.pool().await?)
            .await
            .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("catalog").to_string_lossy().into_owned();
        let connection = Arc::new(factories::sqlite(&name, DbOptions::new()).unwrap());

        let products = ProductRepository::new(Arc::clone(&connection));
        products.migrate().await.unwrap();

        let err = products.find_by_id(1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(what) if what == "product 1"));

        let id = products.create("Milk", 1.25).await.unwrap();
        assert_eq!(products.find_by_id(id).await.unwrap().name, "Milk");

        connection.close().await;
    }
}
