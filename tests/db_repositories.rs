use std::collections::BTreeSet;

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

use marketlens::application::pagination::PageRequest;
use marketlens::application::repos::{
    ContentFilter, ContentStore, RepoError, ScheduleRepo, VersionsRepo,
};
use marketlens::domain::entities::{
    ContentCore, NewContentVersion, ReportRecord, ReportSection, SeoMeta, VersionSnapshot,
};
use marketlens::domain::types::{ContentKind, ContentStatus};
use marketlens::infra::db::PostgresRepositories;

fn report(slug: &str, title: &str) -> ReportRecord {
    ReportRecord {
        core: ContentCore::new_draft(
            slug.to_string(),
            title.to_string(),
            "Market sizing and competitive landscape.".to_string(),
            None,
            OffsetDateTime::now_utc(),
        ),
        description: None,
        sections: Vec::new(),
        geography: Vec::new(),
        price: None,
        discount: None,
        currency: None,
        page_count: None,
        market_metrics: None,
        key_players: Vec::new(),
        faqs: Vec::new(),
        thumbnail_url: None,
        author_ids: Vec::new(),
    }
}

async fn insert(repos: &PostgresRepositories, record: ReportRecord) -> ReportRecord {
    ContentStore::<ReportRecord>::create(repos, &record)
        .await
        .expect("insert report")
}

async fn slugs(repos: &PostgresRepositories, filter: ContentFilter) -> BTreeSet<String> {
    ContentStore::<ReportRecord>::list(repos, &filter, PageRequest::new(None, Some(100)))
        .await
        .expect("list reports")
        .items
        .into_iter()
        .map(|record| record.core.slug)
        .collect()
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn report_lists_filter_geography_authors_and_literal_search(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let mut share = report("insulin-share", "Insulin 50% Share Outlook");
    share.geography = vec!["North America".into(), "Europe".into()];
    share.author_ids = vec![7];
    insert(&repos, share).await;

    let mut units = report("insulin-units", "Insulin 5000 Units Study");
    units.geography = vec!["Asia Pacific".into()];
    units.author_ids = vec![7, 9];
    insert(&repos, units).await;

    let mut cardiac = report("cardiac-review", "Cardiac Devices Review");
    cardiac.geography = vec!["Europe".into()];
    cardiac.description = Some("Stents hold 50 percent of revenue.".into());
    insert(&repos, cardiac).await;

    let geography = ContentFilter {
        geography: vec!["Europe".into(), "Latin America".into()],
        ..Default::default()
    };
    assert_eq!(
        slugs(&repos, geography).await,
        set(&["insulin-share", "cardiac-review"])
    );

    let by_author = |author_id| ContentFilter {
        author_id: Some(author_id),
        ..Default::default()
    };
    assert_eq!(slugs(&repos, by_author(9)).await, set(&["insulin-units"]));
    assert_eq!(
        slugs(&repos, by_author(7)).await,
        set(&["insulin-share", "insulin-units"])
    );
    assert!(slugs(&repos, by_author(42)).await.is_empty());

    let search = |term: &str| ContentFilter {
        search: Some(term.to_string()),
        ..Default::default()
    };
    assert_eq!(slugs(&repos, search("50%")).await, set(&["insulin-share"]));
    assert_eq!(
        slugs(&repos, search("INSULIN")).await,
        set(&["insulin-share", "insulin-units"])
    );
    assert_eq!(slugs(&repos, search("stents")).await, set(&["cardiac-review"]));
    assert!(slugs(&repos, search("insulin_")).await.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn slugs_are_unique_among_live_rows_only(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let first = insert(&repos, report("oncology-outlook", "Oncology Outlook")).await;
    let err = ContentStore::<ReportRecord>::create(
        &repos,
        &report("oncology-outlook", "Oncology Outlook Again"),
    )
    .await
    .expect_err("live slug is taken");
    assert!(err.is_duplicate(), "{err:?}");

    ContentStore::<ReportRecord>::soft_delete(
        &repos,
        first.core.id,
        OffsetDateTime::now_utc(),
        None,
    )
    .await
    .expect("soft delete");
    let second = insert(&repos, report("oncology-outlook", "Oncology Outlook 2025")).await;
    assert_ne!(first.core.id, second.core.id);

    let found = ContentStore::<ReportRecord>::find_by_slug(&repos, "oncology-outlook")
        .await
        .expect("find by slug")
        .expect("live row exists");
    assert_eq!(found.core.id, second.core.id);

    let visible = slugs(&repos, ContentFilter::default()).await;
    assert_eq!(visible, set(&["oncology-outlook"]));
    let with_deleted = ContentStore::<ReportRecord>::list(
        &repos,
        &ContentFilter {
            show_deleted: true,
            ..Default::default()
        },
        PageRequest::new(None, None),
    )
    .await
    .expect("list with tombstones");
    assert_eq!(with_deleted.total, 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn publish_due_promotes_only_due_live_scheduled_rows(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let now = OffsetDateTime::now_utc();

    let scheduled = |slug: &str, at: OffsetDateTime, enabled: bool| {
        let mut record = report(slug, slug);
        record.core.publish_date = Some(at);
        record.core.scheduled_publish_enabled = enabled;
        record
    };
    let due = insert(&repos, scheduled("due", now - Duration::minutes(5), true)).await;
    insert(&repos, scheduled("future", now + Duration::days(1), true)).await;
    insert(&repos, scheduled("unflagged", now - Duration::minutes(5), false)).await;
    let tombstone = insert(&repos, scheduled("tombstone", now - Duration::minutes(5), true)).await;
    ContentStore::<ReportRecord>::soft_delete(&repos, tombstone.core.id, now, None)
        .await
        .expect("soft delete");

    let promoted = repos
        .publish_due(ContentKind::Report, now)
        .await
        .expect("publish due");
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].id, due.core.id);
    assert_eq!(promoted[0].slug, "due");

    let reloaded = ContentStore::<ReportRecord>::find_by_id(&repos, due.core.id)
        .await
        .expect("find")
        .expect("row exists");
    assert_eq!(reloaded.core.status, ContentStatus::Published);
    assert!(!reloaded.core.scheduled_publish_enabled);

    let again = repos
        .publish_due(ContentKind::Report, now)
        .await
        .expect("publish due");
    assert!(again.is_empty());
    assert!(
        repos
            .publish_due(ContentKind::Blog, now)
            .await
            .expect("blogs")
            .is_empty()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a Postgres server"]
async fn version_numbers_are_unique_per_report(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let parent = insert(&repos, report("vaccines-market", "Vaccines Market")).await;
    let other = insert(&repos, report("biologics-market", "Biologics Market")).await;

    let version = |report_id: u32, version_number: u32| NewContentVersion {
        report_id,
        version_number,
        published_by: None,
        published_at: OffsetDateTime::now_utc(),
        snapshot: VersionSnapshot {
            sections: vec![ReportSection {
                title: "Overview".into(),
                body: format!("Edition {version_number}"),
            }],
            seo: SeoMeta::default(),
        },
    };

    assert_eq!(repos.max_version(parent.core.id).await.expect("max"), 0);
    repos
        .insert_version(&version(parent.core.id, 1))
        .await
        .expect("first version");

    let err = repos
        .insert_version(&version(parent.core.id, 1))
        .await
        .expect_err("duplicate version number");
    assert_eq!(
        err,
        RepoError::Duplicate {
            constraint: "report_versions_report_version_key".to_string()
        }
    );

    repos
        .insert_version(&version(other.core.id, 1))
        .await
        .expect("numbering is per report");
    repos
        .insert_version(&version(parent.core.id, 2))
        .await
        .expect("second version");

    assert_eq!(repos.max_version(parent.core.id).await.expect("max"), 2);
    let history = repos
        .list_versions(parent.core.id)
        .await
        .expect("list versions");
    let numbers: Vec<u32> = history.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(history[1].sections[0].body, "Edition 2");
}
