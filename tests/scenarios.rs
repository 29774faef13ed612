//! End-to-end ledger scenarios against a file-backed store

use std::sync::Arc;

use plantkeeper::assignment::{ManualClock, PieceAssignments};
use plantkeeper::model::*;
use plantkeeper::query::{UNASSIGNED_COMPONENT, UNASSIGNED_TURBINE};
use plantkeeper::{ErrorKind, OnOccupied, QueryEngine, Repositories, SqliteStore};
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

struct Ledger {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    repos: Repositories,
}

async fn ledger() -> Ledger {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("plantkeeper.db")).unwrap());
    let repos = Repositories::new(Arc::clone(&store));

    repos.products.save(&Product::new("pr1", "PN-100")).await.unwrap();
    repos
        .components
        .save_all(&[
            Component::new("C1", "rotor", "Rotor 1"),
            Component::new("C2", "rotor", "Rotor 2"),
        ])
        .await
        .unwrap();
    repos
        .pieces
        .save_all(&[
            Piece::new("SN-1", "SN-1", "pr1").with_counters(100.0, 0, 0),
            Piece::new("P1", "SN-P1", "pr1"),
            Piece::new("P2", "SN-P2", "pr1"),
        ])
        .await
        .unwrap();

    Ledger { _dir: dir, store, repos }
}

#[tokio::test]
async fn install_then_remove_shows_unassigned_in_inventory() {
    let ledger = ledger().await;
    let pieces = PieceAssignments::new(Arc::clone(&ledger.store));
    let engine = QueryEngine::new(ledger.repos.clone());

    pieces.assign("C1", "SN-1", "A", OnOccupied::Fail).await.unwrap();
    let current = pieces.current("SN-1").await.unwrap().unwrap();
    assert_eq!(current.component_id, "C1");
    assert_eq!(current.position, "A");

    pieces.unassign("C1", "SN-1").await.unwrap();
    assert!(pieces.current("SN-1").await.unwrap().is_none());

    let items = engine.all_inventory_items().await.unwrap();
    let sn1 = items.iter().find(|i| i.sn == "SN-1").unwrap();
    assert_eq!(sn1.component, UNASSIGNED_COMPONENT);
    assert_eq!(sn1.turbine, UNASSIGNED_TURBINE);
    assert_eq!(sn1.hours, 100.0);
}

#[tokio::test]
async fn occupied_position_leaves_occupant_untouched() {
    let ledger = ledger().await;
    let pieces = PieceAssignments::new(Arc::clone(&ledger.store));

    let p1 = pieces.assign("C1", "P1", "A", OnOccupied::Fail).await.unwrap();
    let err = pieces.assign("C1", "P2", "A", OnOccupied::Fail).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PositionOccupied);

    assert_eq!(pieces.current("P1").await.unwrap(), Some(p1));
    assert!(pieces.current("P2").await.unwrap().is_none());
}

#[tokio::test]
async fn move_between_components_keeps_history() {
    let ledger = ledger().await;
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
    let pieces = PieceAssignments::with_clock(Arc::clone(&ledger.store), clock.clone());

    pieces.assign("C1", "P1", "1", OnOccupied::Fail).await.unwrap();
    clock.advance(Duration::days(30));
    pieces.assign("C2", "P1", "2", OnOccupied::Fail).await.unwrap();

    let current = pieces.current("P1").await.unwrap().unwrap();
    assert_eq!(current.component_id, "C2");
    assert_eq!(current.position, "2");

    let history = pieces.history("P1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].valid_to.unwrap() <= history[1].valid_from);
}

#[tokio::test]
async fn inventory_has_one_row_per_piece() {
    let ledger = ledger().await;
    let pieces = PieceAssignments::new(Arc::clone(&ledger.store));
    let engine = QueryEngine::new(ledger.repos.clone());

    pieces.assign("C1", "P1", "A", OnOccupied::Fail).await.unwrap();
    pieces.assign("C2", "P2", "A", OnOccupied::Fail).await.unwrap();

    let items = engine.all_inventory_items().await.unwrap();
    assert_eq!(items.len(), ledger.repos.pieces.count().await.unwrap());
}

#[tokio::test]
async fn concurrent_moves_never_leave_two_active_rows() {
    let ledger = ledger().await;
    let pieces = PieceAssignments::new(Arc::clone(&ledger.store));

    let mut handles = Vec::new();
    for i in 0..20 {
        let pieces = pieces.clone();
        handles.push(tokio::spawn(async move {
            let owner = if i % 2 == 0 { "C1" } else { "C2" };
            let position = format!("slot-{}", i % 3);
            pieces.assign(owner, "P1", &position, OnOccupied::Replace).await.unwrap();
            if i % 5 == 0 {
                pieces.unassign(owner, "P1").await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let active = pieces
        .history("P1")
        .await
        .unwrap()
        .into_iter()
        .filter(|row| row.valid_to.is_none())
        .count();
    assert!(active <= 1);
    assert!(pieces.audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn reopened_store_keeps_assignments() {
    let ledger = ledger().await;
    let path = ledger._dir.path().join("plantkeeper.db");
    PieceAssignments::new(Arc::clone(&ledger.store))
        .assign("C1", "P1", "A", OnOccupied::Fail)
        .await
        .unwrap();

    let reopened = Arc::new(SqliteStore::open(&path).unwrap());
    let pieces = PieceAssignments::new(reopened);
    assert_eq!(pieces.current("P1").await.unwrap().unwrap().component_id, "C1");
}
