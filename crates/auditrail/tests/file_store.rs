use auditrail::{
    ActivityAnalytics, ActivityFilter, ActivityLogger, ActivityRetrieval, Actor, Category,
    ComplianceRequest, FileActivityStore, NewActivity,
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn file_backed_trail_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit").join("activity.jsonl");

    {
        let store = Arc::new(FileActivityStore::open(&path).unwrap());
        let logger = ActivityLogger::new(store);
        logger
            .log_user_action(
                3,
                NewActivity::new("user_updated", "user", "Changed email")
                    .resource_id(3)
                    .changes(json!({"email": "old@example.com"}), json!({"email": "new@example.com"}))
                    .meta("api_key", "sk_live_123"),
            )
            .await
            .unwrap();
        logger
            .log_security_event(NewActivity::event("ip_blocked", "Blocked scanner").ip_address("2001:db8::1"))
            .await
            .unwrap();
    }

    let store = Arc::new(FileActivityStore::open(&path).unwrap());
    store.register_actor(Actor::new(3, "Barbara")).unwrap();
    let logger = ActivityLogger::new(store.clone());
    let third = logger
        .log_system_event(NewActivity::event("backup_created", "Nightly backup"))
        .await
        .unwrap();
    assert_eq!(third.id, 3);

    let retrieval = ActivityRetrieval::new(store.clone());
    let page = retrieval
        .get_resource_activities("user", 3, &ActivityFilter::new().include_user(true))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 1);
    let entry = &page.data[0];
    assert_eq!(entry.user.as_ref().unwrap().name, "Barbara");
    assert_eq!(entry.old_values, Some(json!({"email": "old@example.com"})));
    assert_eq!(entry.metadata.as_ref().unwrap()["api_key"], "[REDACTED]");

    let report = ActivityAnalytics::new(store)
        .generate_compliance_report(&ComplianceRequest::new(
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        ))
        .await
        .unwrap();
    assert_eq!(report.total_activities, 3);
    assert_eq!(report.by_category[&Category::Security], 1);
    assert_eq!(report.unique_actors, 1);
}
