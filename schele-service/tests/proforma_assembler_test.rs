//! Proforma assembly against an in-memory unit of work.
//!
//! Runs without a database.

mod common;

use common::date;
use common::memory::{FailAt, MemoryStore};
use schele_service::billing::create_proforma;
use schele_service::models::{CreateProforma, WorkReportStatus};
use service_core::error::AppError;
use uuid::Uuid;

fn request(number: &str, client_id: Uuid, work_report_ids: Vec<Uuid>) -> CreateProforma {
    CreateProforma {
        number: number.to_string(),
        client_id,
        work_report_ids,
        issue_date: None,
        due_date: None,
        notes: None,
    }
}

#[tokio::test]
async fn creates_proforma_and_bills_every_report() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let a = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let b = store.add_report(client.client_id, "PV-2", WorkReportStatus::Draft);

    let details = create_proforma(store.begin(), request("PF-1", client.client_id, vec![a, b]))
        .await
        .expect("Proforma should be created");

    assert_eq!(details.proforma.number, "PF-1");
    assert_eq!(details.client.client_id, client.client_id);
    assert_eq!(details.items.len(), 2);
    assert_eq!(details.items[0].item.work_report_id, a);
    assert_eq!(details.items[0].item.sort_order, 0);
    assert_eq!(details.items[1].item.sort_order, 1);
    assert!(details
        .items
        .iter()
        .all(|i| i.work_report.report.status() == WorkReportStatus::Billed));

    assert_eq!(store.proforma_count(), 1);
    assert_eq!(store.proforma_item_count(), 2);
    assert_eq!(store.status(a), WorkReportStatus::Billed);
    assert_eq!(store.status(b), WorkReportStatus::Billed);
}

#[tokio::test]
async fn dates_are_stored_as_requested() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let a = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let b = store.add_report(client.client_id, "PV-2", WorkReportStatus::Draft);

    let dated = create_proforma(
        store.begin(),
        CreateProforma {
            issue_date: Some(date(2024, 3, 1)),
            due_date: Some(date(2024, 3, 31)),
            ..request("PF-1", client.client_id, vec![a])
        },
    )
    .await
    .unwrap();
    assert_eq!(dated.proforma.issue_date, Some(date(2024, 3, 1)));
    assert_eq!(dated.proforma.due_date, Some(date(2024, 3, 31)));

    let undated = create_proforma(store.begin(), request("PF-2", client.client_id, vec![b]))
        .await
        .unwrap();
    assert_eq!(undated.proforma.issue_date, None);
}

#[tokio::test]
async fn billed_report_rejects_whole_proforma() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let draft = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let billed = store.add_report(client.client_id, "PV-2", WorkReportStatus::Billed);

    let err = create_proforma(
        store.begin(),
        request("PF-1", client.client_id, vec![draft, billed]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailed(..)));
    assert_eq!(err.offending_ids(), &[billed]);
    assert_eq!(store.proforma_count(), 0);
    assert_eq!(store.status(draft), WorkReportStatus::Draft);
}

#[tokio::test]
async fn report_claimed_by_deleted_proforma_is_rejected() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let report = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    store.add_deleted_claim(report);

    let err = create_proforma(store.begin(), request("PF-2", client.client_id, vec![report]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailed(..)));
    assert_eq!(err.offending_ids(), &[report]);
    assert_eq!(store.status(report), WorkReportStatus::Draft);
}

#[tokio::test]
async fn reports_of_another_client_are_rejected() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let other = store.add_client("Alt Client SA");
    let own = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let foreign = store.add_report(other.client_id, "PV-9", WorkReportStatus::Draft);

    let err = create_proforma(
        store.begin(),
        request("PF-1", client.client_id, vec![own, foreign]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::ValidationFailed(..)));
    assert_eq!(store.proforma_count(), 0);
}

#[tokio::test]
async fn unknown_client_is_not_found() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let report = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let ghost = Uuid::new_v4();

    let err = create_proforma(store.begin(), request("PF-1", ghost, vec![report]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(..)));
    assert_eq!(err.offending_ids(), &[ghost]);
}

#[tokio::test]
async fn unknown_work_report_is_not_found() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let report = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let ghost = Uuid::new_v4();

    let err = create_proforma(
        store.begin(),
        request("PF-1", client.client_id, vec![report, ghost]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::NotFound(..)));
    assert_eq!(err.offending_ids(), &[ghost]);
}

#[tokio::test]
async fn empty_and_duplicate_lists_are_invalid_input() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let report = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);

    let empty = create_proforma(store.begin(), request("PF-1", client.client_id, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(empty, AppError::ValidationError(_)));

    let duplicated = create_proforma(
        store.begin(),
        request("PF-1", client.client_id, vec![report, report]),
    )
    .await
    .unwrap_err();
    assert!(matches!(duplicated, AppError::ValidationError(_)));
    assert_eq!(store.status(report), WorkReportStatus::Draft);
}

#[tokio::test]
async fn duplicate_number_is_conflict() {
    let store = MemoryStore::new();
    let client = store.add_client("Construct SRL");
    let a = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
    let b = store.add_report(client.client_id, "PV-2", WorkReportStatus::Draft);

    create_proforma(store.begin(), request("PF-1", client.client_id, vec![a]))
        .await
        .expect("First proforma should be created");
    let err = create_proforma(store.begin(), request("PF-1", client.client_id, vec![b]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(..)));
    assert_eq!(store.status(b), WorkReportStatus::Draft);
}

#[tokio::test]
async fn failure_mid_way_leaves_nothing_behind() {
    for fail_at in [
        FailAt::InsertProforma,
        FailAt::InsertItem(1),
        FailAt::SetStatus(0),
        FailAt::SetStatus(1),
        FailAt::Commit,
    ] {
        let store = MemoryStore::new();
        let client = store.add_client("Construct SRL");
        let a = store.add_report(client.client_id, "PV-1", WorkReportStatus::Draft);
        let b = store.add_report(client.client_id, "PV-2", WorkReportStatus::Draft);

        let err = create_proforma(
            store.begin_failing(fail_at),
            request("PF-1", client.client_id, vec![a, b]),
        )
        .await
        .unwrap_err();

        assert!(err.is_infrastructure(), "{:?} should surface as infrastructure", fail_at);
        assert_eq!(store.proforma_count(), 0, "{:?}", fail_at);
        assert_eq!(store.proforma_item_count(), 0, "{:?}", fail_at);
        assert_eq!(store.status(a), WorkReportStatus::Draft, "{:?}", fail_at);
        assert_eq!(store.status(b), WorkReportStatus::Draft, "{:?}", fail_at);

        // The same request goes through once the store recovers.
        create_proforma(store.begin(), request("PF-1", client.client_id, vec![a, b]))
            .await
            .expect("Retry should succeed");
        assert_eq!(store.status(a), WorkReportStatus::Billed);
    }
}
