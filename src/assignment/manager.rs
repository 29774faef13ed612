use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{Mutex, broadcast};
use ulid::Ulid;

use super::clock::{Clock, SystemClock};
use super::event::{AssignmentEvent, ConsistencyIssue, Problem};
use super::link::TemporalLink;
use crate::model::{ComponentAssignment, ComponentPiece};
use crate::repository::Repository;
use crate::storage::SqliteStore;
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// What `assign` does when the target position is already held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnOccupied {
    /// Refuse with `PositionOccupied`
    #[default]
    Fail,
    /// Close the occupant's row and take the position
    Replace,
}

/// Pieces installed in components
pub type PieceAssignments = AssignmentManager<ComponentPiece>;
/// Components mounted on turbines
pub type ComponentMounts = AssignmentManager<ComponentAssignment>;

/// Assign/unassign over one junction table
///
/// "Current" is always re-derived from stored rows, so every operation is
/// safe to re-run after an interruption. Clones share the write lock and
/// the event channel.
pub struct AssignmentManager<L: TemporalLink> {
    store: Arc<SqliteStore>,
    links: Repository<L>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<AssignmentEvent>,
    write_lock: Arc<Mutex<()>>,
}

impl<L: TemporalLink> Clone for AssignmentManager<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            links: self.links.clone(),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<L: TemporalLink> std::fmt::Debug for AssignmentManager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentManager").field("table", &L::TABLE).finish()
    }
}

impl<L: TemporalLink> AssignmentManager<L> {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<SqliteStore>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            links: Repository::new(Arc::clone(&store)),
            store,
            clock,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn table(&self) -> &'static str {
        L::TABLE
    }

    /// Receive every assign/unassign from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AssignmentEvent> {
        self.events.subscribe()
    }

    /// Make `subject` a member of `owner` at `position`
    ///
    /// Existence and occupancy are checked before anything is written. The
    /// subject's previous row (if any) is closed and the new row opened in
    /// the same store transaction, both stamped with the same instant.
    pub async fn assign(
        &self,
        owner_id: &str,
        subject_id: &str,
        position: &str,
        on_occupied: OnOccupied,
    ) -> Result<L> {
        let _guard = self.write_lock.lock().await;

        self.require(L::OWNER_TABLE, owner_id).await?;
        self.require(L::SUBJECT_TABLE, subject_id).await?;

        let active = self.active_rows(subject_id).await?;
        if let [only] = active.as_slice() {
            if only.owner_id() == owner_id && only.position() == position {
                tracing::debug!("{} already at {}/{}", subject_id, owner_id, position);
                return Ok(only.clone());
            }
        }

        let occupants: Vec<L> = self
            .links
            .by_compound_index(L::POSITION_INDEX, &[json!(owner_id), json!(position)])
            .await?
            .into_iter()
            .filter(|row| row.is_active() && row.subject_id() != subject_id)
            .collect();

        if on_occupied == OnOccupied::Fail {
            if let Some(occupant) = occupants.first() {
                return Err(Error::PositionOccupied {
                    owner_id: owner_id.to_string(),
                    position: position.to_string(),
                    occupant_id: occupant.subject_id().to_string(),
                });
            }
        }

        // One instant for every close and the open, never before a closed row began
        let at = active
            .iter()
            .chain(&occupants)
            .map(|row| row.valid_from())
            .fold(self.clock.now(), |at, from| at.max(from));
        let mut writes = Vec::with_capacity(active.len() + occupants.len() + 1);
        let mut events = Vec::with_capacity(writes.capacity());

        for mut row in active.into_iter().chain(occupants) {
            row.close(at);
            events.push(unassigned(&row, at));
            writes.push(row);
        }

        let opened = L::open(Ulid::new().to_string(), owner_id, subject_id, position, at);
        events.push(assigned(&opened));
        writes.push(opened.clone());

        self.links.save_all(&writes).await?;
        tracing::info!("Assigned {} to {}/{} ({})", subject_id, owner_id, position, L::TABLE);

        self.publish(events);
        Ok(opened)
    }

    /// Close the subject's active row under `owner`
    ///
    /// Returns the closed row, or `None` when there was nothing to close.
    pub async fn unassign(&self, owner_id: &str, subject_id: &str) -> Result<Option<L>> {
        let _guard = self.write_lock.lock().await;

        let (mine, others): (Vec<L>, Vec<L>) = self
            .active_rows(subject_id)
            .await?
            .into_iter()
            .partition(|row| row.owner_id() == owner_id);

        if mine.is_empty() {
            if let Some(other) = others.first() {
                tracing::warn!(
                    "{} is active under {}, not {}; nothing to unassign",
                    subject_id,
                    other.owner_id(),
                    owner_id
                );
            }
            return Ok(None);
        }

        let now = self.clock.now();
        let mut events = Vec::with_capacity(mine.len());
        let closed: Vec<L> = mine
            .into_iter()
            .map(|mut row| {
                let at = now.max(row.valid_from());
                row.close(at);
                events.push(unassigned(&row, at));
                row
            })
            .collect();

        self.links.save_all(&closed).await?;
        tracing::info!("Unassigned {} from {} ({})", subject_id, owner_id, L::TABLE);

        self.publish(events);
        Ok(most_recent(closed))
    }

    /// The subject's active row
    ///
    /// If several rows are active the most recent one wins and a
    /// consistency warning is logged.
    pub async fn current(&self, subject_id: &str) -> Result<Option<L>> {
        let active = self.active_rows(subject_id).await?;
        if active.len() > 1 {
            tracing::warn!(
                kind = "consistency_warning",
                "{} has {} active rows in {}; using the most recent",
                subject_id,
                active.len(),
                L::TABLE
            );
        }
        Ok(most_recent(active))
    }

    /// Every row for the subject, oldest first
    pub async fn history(&self, subject_id: &str) -> Result<Vec<L>> {
        let mut rows = self.links.by_index(L::SUBJECT_INDEX, subject_id).await?;
        sort_chronologically(&mut rows);
        Ok(rows)
    }

    /// Active rows under an owner, by position
    pub async fn active_for_owner(&self, owner_id: &str) -> Result<Vec<L>> {
        let mut rows: Vec<L> = self
            .links
            .by_index(L::OWNER_INDEX, owner_id)
            .await?
            .into_iter()
            .filter(|row| row.is_active())
            .collect();
        rows.sort_by(|a, b| {
            a.position()
                .cmp(b.position())
                .then_with(|| a.valid_from().cmp(&b.valid_from()))
        });
        Ok(rows)
    }

    /// Every row ever held under an owner, oldest first
    pub async fn history_for_owner(&self, owner_id: &str) -> Result<Vec<L>> {
        let mut rows = self.links.by_index(L::OWNER_INDEX, owner_id).await?;
        sort_chronologically(&mut rows);
        Ok(rows)
    }

    /// Scan the whole table for membership invariant violations
    pub async fn audit(&self) -> Result<Vec<ConsistencyIssue>> {
        let rows = self.links.get_all().await?;

        let mut by_subject: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut by_position: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
        for row in rows.iter().filter(|row| row.is_active()) {
            by_subject.entry(row.subject_id()).or_default().push(row.key().to_string());
            by_position
                .entry((row.owner_id(), row.position()))
                .or_default()
                .push(row.key().to_string());
        }

        let mut issues = Vec::new();
        for (subject_id, link_ids) in by_subject {
            if link_ids.len() > 1 {
                issues.push(ConsistencyIssue {
                    table: L::TABLE,
                    problem: Problem::MultipleActive { subject_id: subject_id.to_string() },
                    link_ids,
                });
            }
        }
        for ((owner_id, position), link_ids) in by_position {
            if link_ids.len() > 1 {
                issues.push(ConsistencyIssue {
                    table: L::TABLE,
                    problem: Problem::SharedPosition {
                        owner_id: owner_id.to_string(),
                        position: position.to_string(),
                    },
                    link_ids,
                });
            }
        }

        for issue in &issues {
            tracing::warn!(kind = "consistency_warning", "{}", issue);
        }
        Ok(issues)
    }

    async fn active_rows(&self, subject_id: &str) -> Result<Vec<L>> {
        Ok(self
            .links
            .by_index(L::SUBJECT_INDEX, subject_id)
            .await?
            .into_iter()
            .filter(|row| row.is_active())
            .collect())
    }

    async fn require(&self, table: &str, key: &str) -> Result<()> {
        match self.store.get(table, key).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound {
                table: table.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn publish(&self, events: Vec<AssignmentEvent>) {
        for event in events {
            // No receivers is not an error
            let _ = self.events.send(event);
        }
    }
}

fn sort_chronologically<L: TemporalLink>(rows: &mut [L]) {
    // Closed rows sort before the active row opened at the same instant
    rows.sort_by(|a, b| {
        a.valid_from()
            .cmp(&b.valid_from())
            .then_with(|| a.is_active().cmp(&b.is_active()))
            .then_with(|| a.key().cmp(b.key()))
    });
}

fn most_recent<L: TemporalLink>(mut rows: Vec<L>) -> Option<L> {
    sort_chronologically(&mut rows);
    rows.pop()
}

fn assigned<L: TemporalLink>(row: &L) -> AssignmentEvent {
    AssignmentEvent::Assigned {
        table: L::TABLE,
        link_id: row.key().to_string(),
        owner: L::owner_ref(row.owner_id()),
        subject_id: row.subject_id().to_string(),
        position: row.position().to_string(),
        at: row.valid_from(),
    }
}

fn unassigned<L: TemporalLink>(row: &L, at: chrono::DateTime<chrono::Utc>) -> AssignmentEvent {
    AssignmentEvent::Unassigned {
        table: L::TABLE,
        link_id: row.key().to_string(),
        owner: L::owner_ref(row.owner_id()),
        subject_id: row.subject_id().to_string(),
        position: row.position().to_string(),
        at,
    }
}
