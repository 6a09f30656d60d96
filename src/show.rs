//! Project retrieval by business identifier.
//!
//! Loads a project and resolves every relation to its display names. Used by
//! the `pjx show` command and by tests to inspect the reconciled graph.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{Link, Lookup, Project};

pub async fn get_project(pool: &SqlitePool, project_id: &str) -> Result<Option<Project>> {
    let row = sqlx::query(
        r#"
        SELECT p.id, p.project_id, p.project_name, p.project_status,
               s.name AS sponsor, rp.name AS responsible_party, r.name AS route_of_admin,
               p.created_at, p.updated_at
        FROM projects p
        LEFT JOIN sponsors s ON s.id = p.sponsor_id
        LEFT JOIN responsible_parties rp ON rp.id = p.responsible_party_id
        LEFT JOIN routes_of_admin r ON r.id = p.route_of_admin_id
        WHERE p.project_id = ?
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let row_id: i64 = row.get("id");

    let mut project = Project {
        project_id: row.get("project_id"),
        project_name: row.get("project_name"),
        project_status: row.get("project_status"),
        sponsor: row.get("sponsor"),
        responsible_party: row.get("responsible_party"),
        route_of_admin: row.get("route_of_admin"),
        deliverables: Vec::new(),
        therapeutic_areas: Vec::new(),
        ingredient_categories: Vec::new(),
        ingredients: Vec::new(),
        demographics: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };

    for lookup in Lookup::MULTI {
        let names = linked_names(pool, row_id, lookup).await?;
        match lookup {
            Lookup::Deliverable => project.deliverables = names,
            Lookup::TherapeuticArea => project.therapeutic_areas = names,
            Lookup::IngredientCategory => project.ingredient_categories = names,
            Lookup::Ingredient => project.ingredients = names,
            Lookup::Demographics => project.demographics = names,
            _ => {}
        }
    }

    Ok(Some(project))
}

/// Names linked through a join table, in lookup-creation order.
async fn linked_names(pool: &SqlitePool, row_id: i64, lookup: Lookup) -> Result<Vec<String>> {
    let Link::JoinTable(join) = lookup.link() else {
        return Ok(Vec::new());
    };
    let names: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT l.name FROM {join} j JOIN {table} l ON l.id = j.lookup_id WHERE j.project_id = ? ORDER BY l.id",
        join = join,
        table = lookup.table()
    ))
    .bind(row_id)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// CLI entry point: prints a project as text or JSON.
pub async fn run_show(config: &Config, project_id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let project = get_project(&pool, project_id).await;
    pool.close().await;

    let Some(project) = project? else {
        bail!("project not found: {}", project_id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&project)?);
        return Ok(());
    }

    println!("--- Project ---");
    println!("project_id:   {}", project.project_id);
    println!("name:         {}", project.project_name);
    println!(
        "status:       {}",
        project.project_status.as_deref().unwrap_or("(none)")
    );
    for lookup in Lookup::SINGLE {
        println!(
            "{:<13} {}",
            format!("{}:", lookup.label()),
            project.single(lookup).unwrap_or("(none)")
        );
    }
    println!("created_at:   {}", format_ts_iso(project.created_at));
    println!("updated_at:   {}", format_ts_iso(project.updated_at));
    println!();

    for lookup in Lookup::MULTI {
        let names = project.many(lookup);
        println!("--- {} ({}) ---", lookup.label(), names.len());
        for name in names {
            println!("  {}", name);
        }
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_project_is_none() {
        let pool = db::connect_memory().await.unwrap();
        migrate::apply(&pool).await.unwrap();
        assert!(get_project(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn show_before_init_reports_missing_project() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.db.path = tmp.path().join("fresh.sqlite");

        let err = run_show(&config, "P-1", false).await.unwrap_err();
        assert_eq!(err.to_string(), "project not found: P-1");
    }

    #[test]
    fn iso_timestamps() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
