//! Database statistics: how many projects and dictionary rows are stored.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::Lookup;

/// Row counts for projects and every lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counts {
    pub projects: i64,
    pub lookups: Vec<(Lookup, i64)>,
}

pub async fn counts(pool: &SqlitePool) -> Result<Counts> {
    let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(pool)
        .await?;

    let mut lookups = Vec::with_capacity(Lookup::ALL.len());
    for lookup in Lookup::ALL {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", lookup.table()))
            .fetch_one(pool)
            .await?;
        lookups.push((lookup, n));
    }

    Ok(Counts { projects, lookups })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let counts = counts(&pool).await;
    pool.close().await;
    let counts = counts?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Projects:    {}", counts.projects);
    println!();
    println!("  {:<24} {:>8}", "DICTIONARY", "ROWS");
    println!("  {}", "-".repeat(33));
    for (lookup, n) in &counts.lookups {
        println!("  {:<24} {:>8}", lookup.table(), n);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_database_counts_zero() {
        let pool = db::connect_memory().await.unwrap();
        migrate::apply(&pool).await.unwrap();
        let c = counts(&pool).await.unwrap();
        assert_eq!(c.projects, 0);
        assert_eq!(c.lookups.len(), 8);
        assert!(c.lookups.iter().all(|(_, n)| *n == 0));
    }

    #[tokio::test]
    async fn stats_before_init_creates_schema() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("fresh.sqlite");

        run_stats(&config).await.unwrap();

        let pool = db::connect(&config).await.unwrap();
        assert_eq!(counts(&pool).await.unwrap().projects, 0);
        pool.close().await;
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
