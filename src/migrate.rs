use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::{Link, Lookup};

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run on an existing database.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Lookup dictionaries first, projects reference them
    for lookup in Lookup::ALL {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE
            )
            "#,
            table = lookup.table()
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY,
            project_id TEXT NOT NULL UNIQUE,
            project_name TEXT NOT NULL DEFAULT '',
            project_status TEXT,
            sponsor_id INTEGER REFERENCES sponsors(id),
            responsible_party_id INTEGER REFERENCES responsible_parties(id),
            route_of_admin_id INTEGER REFERENCES routes_of_admin(id),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for lookup in Lookup::MULTI {
        let Link::JoinTable(join) = lookup.link() else {
            continue;
        };
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {join} (
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                lookup_id INTEGER NOT NULL REFERENCES {table}(id),
                PRIMARY KEY (project_id, lookup_id)
            )
            "#,
            join = join,
            table = lookup.table()
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{join}_lookup ON {join}(lookup_id)",
            join = join
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_is_idempotent() {
        let pool = db::connect_memory().await.unwrap();
        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'project%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        // projects + five join tables
        assert_eq!(tables, 6);
    }
}
