use std::collections::HashSet;

use sqlx::PgPool;

async fn indexes_on(pool: &PgPool, table: &str) -> HashSet<String> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename = $1",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .expect("fetch indexes");
    rows.into_iter().collect()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn content_tables_index_slug_status_and_schedule(pool: PgPool) {
    for family in ["reports", "blogs", "press_releases"] {
        let indexes = indexes_on(&pool, family).await;
        for suffix in ["slug_key", "status_idx", "schedule_idx"] {
            let name = format!("{family}_{suffix}");
            assert!(indexes.contains(&name), "missing {name}");
        }
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn report_versions_are_unique_per_report(pool: PgPool) {
    let indexes = indexes_on(&pool, "report_versions").await;
    assert!(
        indexes.contains("report_versions_report_version_key"),
        "missing report_versions_report_version_key"
    );

    let audit = indexes_on(&pool, "audit_logs").await;
    assert!(audit.contains("audit_logs_created_idx"));
    assert!(audit.contains("audit_logs_entity_idx"));
}
