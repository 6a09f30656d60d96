//! Entity reconciliation: apply a [`NormalizedRecord`] to the project graph.
//!
//! One document is one transaction. The first statement is the project
//! insert-or-ignore, which both decides created vs existing and takes the
//! SQLite write lock, so concurrent documents serialize on the database
//! rather than on an in-process lock. Any error drops the transaction and
//! rolls back everything the document touched.
//!
//! Field policy:
//!
//! | Field | Supplied | Absent |
//! |-------|----------|--------|
//! | name, status | overwrite | keep existing |
//! | sponsor, responsible party, route | get-or-create, relink | keep existing |
//! | list relations | replace whole set | keep existing set |

use anyhow::{Context, Result};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{Link, Lookup, Reconciled, SkipReason, UpdatePolicy};
use crate::normalize::{name_key, NormalizedRecord};

pub async fn reconcile(
    pool: &SqlitePool,
    record: &NormalizedRecord,
    policy: UpdatePolicy,
) -> Result<Reconciled> {
    let Some(project_id) = record.project_id.as_deref() else {
        return Ok(Reconciled::Skipped(SkipReason::MissingIdentifier));
    };

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let created = sqlx::query(
        r#"
        INSERT INTO projects (project_id, project_name, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(project_id) DO NOTHING
        "#,
    )
    .bind(project_id)
    .bind(record.project_name.as_deref().unwrap_or(""))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("failed to upsert project {}", project_id))?
    .rows_affected()
        == 1;

    if !created && policy == UpdatePolicy::SkipExisting {
        tx.rollback().await?;
        return Ok(Reconciled::Skipped(SkipReason::Exists {
            project_id: project_id.to_string(),
        }));
    }

    let row_id: i64 = sqlx::query_scalar("SELECT id FROM projects WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&mut *tx)
        .await?;

    apply_fields(&mut tx, row_id, record, now).await?;

    for lookup in Lookup::MULTI {
        replace_relation(&mut tx, row_id, lookup, record.many(lookup))
            .await
            .with_context(|| format!("failed to link {} for {}", lookup.label(), project_id))?;
    }

    tx.commit().await?;

    let project_id = project_id.to_string();
    Ok(if created {
        Reconciled::Created { project_id }
    } else {
        Reconciled::Updated { project_id }
    })
}

/// Scalars and single-valued relations in one `UPDATE`; `NULL` binds keep
/// the stored value.
async fn apply_fields(
    conn: &mut SqliteConnection,
    row_id: i64,
    record: &NormalizedRecord,
    now: i64,
) -> Result<()> {
    let mut refs: Vec<(&'static str, Option<i64>)> = Vec::with_capacity(Lookup::SINGLE.len());
    for lookup in Lookup::SINGLE {
        let Link::Column(column) = lookup.link() else {
            anyhow::bail!("{} is not a single-valued relation", lookup.label());
        };
        let id = match record.single(lookup) {
            Some(name) => Some(
                get_or_create(conn, lookup, name)
                    .await
                    .with_context(|| format!("failed to resolve {} '{}'", lookup.label(), name))?,
            ),
            None => None,
        };
        refs.push((column, id));
    }

    let ref_columns: String = refs
        .iter()
        .map(|(column, _)| format!("{column} = COALESCE(?, {column}), "))
        .collect();
    let sql = format!(
        "UPDATE projects SET \
         project_name = COALESCE(?, project_name), \
         project_status = COALESCE(?, project_status), \
         {ref_columns}updated_at = ? \
         WHERE id = ?"
    );

    let mut query = sqlx::query(&sql)
        .bind(record.project_name.as_deref())
        .bind(record.project_status.as_deref());
    for (_, id) in &refs {
        query = query.bind(*id);
    }
    query
        .bind(now)
        .bind(row_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Replace a project's set for one many-to-many relation. An empty list
/// leaves the stored set untouched.
async fn replace_relation(
    conn: &mut SqliteConnection,
    row_id: i64,
    lookup: Lookup,
    names: &[String],
) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    let Link::JoinTable(join) = lookup.link() else {
        anyhow::bail!("{} is not a many-to-many relation", lookup.label());
    };

    sqlx::query(&format!("DELETE FROM {} WHERE project_id = ?", join))
        .bind(row_id)
        .execute(&mut *conn)
        .await?;

    for name in names {
        let lookup_id = get_or_create(conn, lookup, name).await?;
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (project_id, lookup_id) VALUES (?, ?)",
            join
        ))
        .bind(row_id)
        .bind(lookup_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Find a lookup row by normalized name, creating it if missing.
///
/// Safe under concurrent callers: the insert is a no-op when another writer
/// already holds the key, and the follow-up select reads whichever row won.
pub async fn get_or_create(conn: &mut SqliteConnection, lookup: Lookup, name: &str) -> Result<i64> {
    let key = name_key(name);
    let table = lookup.table();

    let inserted = sqlx::query(&format!(
        "INSERT INTO {} (name, name_key) VALUES (?, ?) ON CONFLICT(name_key) DO NOTHING",
        table
    ))
    .bind(name)
    .bind(&key)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if inserted == 1 {
        tracing::debug!(table, name, "created lookup entry");
    }

    let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE name_key = ?", table))
        .bind(&key)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}
