//! Versioned schema migrations
//!
//! Migration files live in `compass-server/migrations/` and are embedded at
//! compile time. sqlx records applied versions (with checksums) in
//! `_sqlx_migrations`, so running twice is a no-op and edited files are
//! detected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// One embedded migration and whether it has been applied
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
    pub installed_on: Option<DateTime<Utc>>,
}

/// Apply all pending migrations in version order.
pub async fn run(pool: &PgPool) -> Result<(), MigrateError> {
    tracing::info!(available = MIGRATOR.iter().count(), "running migrations");
    MIGRATOR.run(pool).await?;
    tracing::info!("migrations complete");
    Ok(())
}

/// List embedded migrations with their applied state.
pub async fn status(pool: &PgPool) -> Result<Vec<MigrationStatus>, sqlx::Error> {
    let table_exists: (bool,) =
        sqlx::query_as("SELECT to_regclass('public._sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await?;

    let applied: Vec<(i64, DateTime<Utc>)> = if table_exists.0 {
        sqlx::query_as("SELECT version, installed_on FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(merge_status(
        MIGRATOR
            .iter()
            .map(|m| (m.version, m.description.to_string())),
        &applied,
    ))
}

fn merge_status(
    embedded: impl Iterator<Item = (i64, String)>,
    applied: &[(i64, DateTime<Utc>)],
) -> Vec<MigrationStatus> {
    let mut statuses: Vec<MigrationStatus> = embedded
        .map(|(version, description)| {
            let installed_on = applied
                .iter()
                .find(|(v, _)| *v == version)
                .map(|(_, at)| *at);
            MigrationStatus {
                version,
                description,
                applied: installed_on.is_some(),
                installed_on,
            }
        })
        .collect();
    statuses.sort_by_key(|s| s.version);
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_are_ordered_and_unique() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn merge_marks_applied_versions() {
        let at = Utc::now();
        let statuses = merge_status(
            vec![(3, "c".to_string()), (1, "a".to_string()), (2, "b".to_string())].into_iter(),
            &[(1, at)],
        );
        assert_eq!(statuses.iter().map(|s| s.version).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(statuses[0].applied);
        assert_eq!(statuses[0].installed_on, Some(at));
        assert!(!statuses[1].applied);
        assert!(!statuses[2].applied);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn run_is_idempotent() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url).await.expect("pool");
        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");
        assert!(status(&pool).await.expect("status").iter().all(|s| s.applied));
    }
}
