//! Query engine implementation
//!
//! Provides the aggregation reads:
//! - Turbine / component / piece expansions
//! - Plant overview and spare components
//! - The total inventory projection
//! - Piece assignment history

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::view::*;
use crate::Result;
use crate::model::*;
use crate::repository::Repositories;

/// Inventory label for a piece with no active component
pub const UNASSIGNED_COMPONENT: &str = "Unassigned";
/// Inventory label for a piece with no active turbine
pub const UNASSIGNED_TURBINE: &str = "unassigned";

/// Read models over the repositories
#[derive(Debug, Clone)]
pub struct QueryEngine {
    repos: Repositories,
}

impl QueryEngine {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Turbine with metrics and its mounted components, each with installed pieces
    pub async fn turbine_with_components(&self, turbine_id: &str) -> Result<Option<TurbineWithComponents>> {
        let Some(turbine) = self.repos.turbines.get(turbine_id).await? else {
            return Ok(None);
        };
        let lookups = Lookups::load(&self.repos).await?;
        self.expand_turbine(turbine, &lookups).await.map(Some)
    }

    /// Component with its active mount and installed pieces
    pub async fn component_with_pieces(&self, component_id: &str) -> Result<Option<ComponentWithPieces>> {
        let Some(component) = self.repos.components.get(component_id).await? else {
            return Ok(None);
        };
        let lookups = Lookups::load(&self.repos).await?;
        self.expand_component(component, &lookups).await.map(Some)
    }

    /// Piece with its lookups and where it is installed right now
    pub async fn piece_with_component(&self, piece_id: &str) -> Result<Option<PieceWithComponent>> {
        let Some(piece) = self.repos.pieces.get(piece_id).await? else {
            return Ok(None);
        };
        let lookups = Lookups::load(&self.repos).await?;

        let link = latest_active(self.repos.component_pieces.for_piece(piece_id).await?, |l| {
            (l.valid_from, l.valid_to)
        });
        let component = match &link {
            Some(link) => self.parent(&self.repos.components, &link.component_id, &piece.id).await?,
            None => None,
        };
        let mount = match &component {
            Some(component) => latest_active(
                self.repos.component_assignments.for_component(&component.id).await?,
                |a| (a.valid_from, a.valid_to),
            ),
            None => None,
        };
        let turbine = match &mount {
            Some(mount) => self.parent(&self.repos.turbines, &mount.turbine_id, &mount.component_id).await?,
            None => None,
        };

        Ok(Some(PieceWithComponent {
            product: lookups.product(&piece),
            use_status: lookups.use_status(&piece),
            condition: lookups.condition(&piece),
            piece,
            link,
            component,
            mount,
            turbine,
        }))
    }

    /// One row per piece, assigned or not, sorted by serial number
    pub async fn all_inventory_items(&self) -> Result<Vec<InventoryItem>> {
        let lookups = Lookups::load(&self.repos).await?;
        let pieces = self.repos.pieces.get_all().await?;
        let components = index_by(self.repos.components.get_all().await?, |c| c.id.clone());
        let turbines = index_by(self.repos.turbines.get_all().await?, |t| t.id.clone());
        let plants = index_by(self.repos.plants.get_all().await?, |p| p.id.clone());

        let piece_links = active_by(self.repos.component_pieces.get_all().await?, |l| {
            (l.piece_id.clone(), l.valid_from, l.valid_to)
        });
        let mounts = active_by(self.repos.component_assignments.get_all().await?, |a| {
            (a.component_id.clone(), a.valid_from, a.valid_to)
        });

        let mut items: Vec<InventoryItem> = pieces
            .into_iter()
            .map(|piece| {
                let link = piece_links.get(&piece.id);
                let component = link.and_then(|l| {
                    let found = components.get(&l.component_id);
                    if found.is_none() {
                        tracing::warn!("Piece {} linked to missing component {}", piece.id, l.component_id);
                    }
                    found
                });
                let mount = component.and_then(|c| mounts.get(&c.id));
                let turbine = mount.and_then(|m| {
                    let found = turbines.get(&m.turbine_id);
                    if found.is_none() {
                        tracing::warn!("Component {} mounted on missing turbine {}", m.component_id, m.turbine_id);
                    }
                    found
                });
                let plant = turbine
                    .and_then(|t| t.plant_id.as_ref())
                    .and_then(|id| plants.get(id))
                    .map(|p| p.name.clone());
                let product = lookups.product(&piece);

                InventoryItem {
                    part_number: product.as_ref().map(|p| p.part_number.clone()),
                    description: product.and_then(|p| p.description),
                    use_status: lookups.use_status(&piece).map(|s| s.name),
                    condition: lookups.condition(&piece).map(|c| c.name),
                    component: component
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| UNASSIGNED_COMPONENT.to_string()),
                    position: component.and(link).map(|l| l.position.clone()),
                    turbine: turbine
                        .map(|t| t.name.clone())
                        .unwrap_or_else(|| UNASSIGNED_TURBINE.to_string()),
                    plant,
                    piece_id: piece.id,
                    sn: piece.sn,
                    hours: piece.hours,
                    trips: piece.trips,
                    starts: piece.starts,
                }
            })
            .collect();

        items.sort_by(|a, b| a.sn.cmp(&b.sn));
        Ok(items)
    }

    /// Plant with contacts and every turbine expanded
    pub async fn plant_overview(&self, plant_id: &str) -> Result<Option<PlantOverview>> {
        let Some(plant) = self.repos.plants.get(plant_id).await? else {
            return Ok(None);
        };
        let lookups = Lookups::load(&self.repos).await?;
        let mut contacts = self.repos.plant_contacts.for_plant(plant_id).await?;
        contacts.sort_by(|a, b| a.name.cmp(&b.name));

        let mut turbines = Vec::new();
        for turbine in self.repos.turbines.for_plant(plant_id).await? {
            turbines.push(self.expand_turbine(turbine, &lookups).await?);
        }

        Ok(Some(PlantOverview { plant, contacts, turbines }))
    }

    /// Components with no active turbine mount, sorted by name
    pub async fn spare_components(&self) -> Result<Vec<ComponentWithPieces>> {
        let lookups = Lookups::load(&self.repos).await?;
        let mounted = active_by(self.repos.component_assignments.get_all().await?, |a| {
            (a.component_id.clone(), a.valid_from, a.valid_to)
        });

        let mut spares = Vec::new();
        for component in self.repos.components.get_all().await? {
            if mounted.contains_key(&component.id) {
                continue;
            }
            spares.push(self.expand_component(component, &lookups).await?);
        }
        spares.sort_by(|a, b| a.component.name.cmp(&b.component.name));
        Ok(spares)
    }

    /// Every component the piece has been installed in, oldest first
    pub async fn piece_history(&self, piece_id: &str) -> Result<Vec<PieceHistoryEntry>> {
        let mut links = self.repos.component_pieces.for_piece(piece_id).await?;
        links.sort_by(|a, b| {
            a.valid_from
                .cmp(&b.valid_from)
                .then_with(|| a.valid_to.is_none().cmp(&b.valid_to.is_none()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            let component_name = self
                .repos
                .components
                .get(&link.component_id)
                .await?
                .map(|c| c.name);
            entries.push(PieceHistoryEntry { link, component_name });
        }
        Ok(entries)
    }

    async fn expand_turbine(&self, turbine: Turbine, lookups: &Lookups) -> Result<TurbineWithComponents> {
        let plant = match &turbine.plant_id {
            Some(plant_id) => self.parent(&self.repos.plants, plant_id, &turbine.id).await?,
            None => None,
        };

        let mut metrics = self.repos.metrics.for_turbine(&turbine.id).await?;
        metrics.sort_by(|a, b| a.metric_type_code.cmp(&b.metric_type_code));

        let mut mounts: Vec<ComponentAssignment> = self
            .repos
            .component_assignments
            .for_turbine(&turbine.id)
            .await?
            .into_iter()
            .filter(|a| a.is_active())
            .collect();
        mounts.sort_by(|a, b| a.position.cmp(&b.position));

        let mut components = Vec::with_capacity(mounts.len());
        for assignment in mounts {
            let Some(component) = self.parent(&self.repos.components, &assignment.component_id, &turbine.id).await?
            else {
                continue;
            };
            components.push(MountedComponent {
                component_type: lookups.component_type(&component),
                pieces: self.installed_pieces(&component.id, lookups).await?,
                component,
                assignment,
            });
        }

        Ok(TurbineWithComponents { turbine, plant, metrics, components })
    }

    async fn expand_component(&self, component: Component, lookups: &Lookups) -> Result<ComponentWithPieces> {
        let mount = latest_active(
            self.repos.component_assignments.for_component(&component.id).await?,
            |a| (a.valid_from, a.valid_to),
        );
        let turbine = match &mount {
            Some(mount) => self.parent(&self.repos.turbines, &mount.turbine_id, &component.id).await?,
            None => None,
        };

        Ok(ComponentWithPieces {
            component_type: lookups.component_type(&component),
            pieces: self.installed_pieces(&component.id, lookups).await?,
            component,
            mount,
            turbine,
        })
    }

    async fn installed_pieces(&self, component_id: &str, lookups: &Lookups) -> Result<Vec<InstalledPiece>> {
        let mut links: Vec<ComponentPiece> = self
            .repos
            .component_pieces
            .for_component(component_id)
            .await?
            .into_iter()
            .filter(|l| l.is_active())
            .collect();
        links.sort_by(|a, b| a.position.cmp(&b.position));

        let mut pieces = Vec::with_capacity(links.len());
        for link in links {
            let Some(piece) = self.parent(&self.repos.pieces, &link.piece_id, component_id).await? else {
                continue;
            };
            pieces.push(InstalledPiece {
                product: lookups.product(&piece),
                use_status: lookups.use_status(&piece),
                condition: lookups.condition(&piece),
                piece,
                link,
            });
        }
        Ok(pieces)
    }

    /// Fetch a referenced row, warning when the reference dangles
    async fn parent<T: Record>(
        &self,
        repo: &crate::repository::Repository<T>,
        key: &str,
        referrer: &str,
    ) -> Result<Option<T>> {
        let found = repo.get(key).await?;
        if found.is_none() {
            tracing::warn!("{} references missing {} record {}", referrer, T::TABLE, key);
        }
        Ok(found)
    }
}

/// Lookup tables loaded once per aggregation
struct Lookups {
    products: HashMap<String, Product>,
    use_statuses: HashMap<String, UseStatus>,
    conditions: HashMap<String, ConditionCode>,
    component_types: HashMap<String, ComponentType>,
}

impl Lookups {
    async fn load(repos: &Repositories) -> Result<Self> {
        Ok(Self {
            products: index_by(repos.products.get_all().await?, |p| p.id.clone()),
            use_statuses: index_by(repos.use_statuses.get_all().await?, |s| s.code.clone()),
            conditions: index_by(repos.condition_codes.get_all().await?, |c| c.code.clone()),
            component_types: index_by(repos.component_types.get_all().await?, |t| t.code.clone()),
        })
    }

    fn product(&self, piece: &Piece) -> Option<Product> {
        resolve(&self.products, Some(&piece.product_id), "product", &piece.id)
    }

    fn use_status(&self, piece: &Piece) -> Option<UseStatus> {
        resolve(&self.use_statuses, piece.use_status_code.as_ref(), "use status", &piece.id)
    }

    fn condition(&self, piece: &Piece) -> Option<ConditionCode> {
        resolve(&self.conditions, piece.condition_code.as_ref(), "condition", &piece.id)
    }

    fn component_type(&self, component: &Component) -> Option<ComponentType> {
        resolve(&self.component_types, Some(&component.type_code), "component type", &component.id)
    }
}

fn resolve<T: Clone>(map: &HashMap<String, T>, code: Option<&String>, what: &str, owner: &str) -> Option<T> {
    let code = code?;
    let found = map.get(code).cloned();
    if found.is_none() {
        tracing::warn!("{} has unknown {} {}", owner, what, code);
    }
    found
}

fn index_by<T>(rows: Vec<T>, key: impl Fn(&T) -> String) -> HashMap<String, T> {
    rows.into_iter().map(|row| (key(&row), row)).collect()
}

type Interval = (DateTime<Utc>, Option<DateTime<Utc>>);

/// Most recently opened active row
fn latest_active<T>(rows: Vec<T>, interval: impl Fn(&T) -> Interval) -> Option<T> {
    rows.into_iter()
        .filter(|row| interval(row).1.is_none())
        .max_by_key(|row| interval(row).0)
}

/// Most recently opened active row per subject
fn active_by<T>(rows: Vec<T>, subject: impl Fn(&T) -> (String, DateTime<Utc>, Option<DateTime<Utc>>)) -> HashMap<String, T> {
    let mut active: HashMap<String, (DateTime<Utc>, T)> = HashMap::new();
    for row in rows {
        let (key, valid_from, valid_to) = subject(&row);
        if valid_to.is_some() {
            continue;
        }
        let newer = match active.get(&key) {
            Some((existing, _)) => {
                tracing::warn!(kind = "consistency_warning", "{} has more than one active row", key);
                valid_from > *existing
            }
            None => true,
        };
        if newer {
            active.insert(key, (valid_from, row));
        }
    }
    active.into_iter().map(|(key, (_, row))| (key, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{ComponentMounts, OnOccupied, PieceAssignments};
    use crate::storage::SqliteStore;
    use std::sync::Arc;

    struct Fixture {
        engine: QueryEngine,
        pieces: PieceAssignments,
        mounts: ComponentMounts,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let repos = Repositories::new(Arc::clone(&store));

        repos.plants.save(&Plant::new("pl1", "North Station")).await.unwrap();
        repos.turbines.save(&Turbine::new("t1", "GT-1").at_plant("pl1")).await.unwrap();
        repos.component_types.save(&ComponentType::new("rotor", "Rotor")).await.unwrap();
        repos.use_statuses.save(&UseStatus::new("in_service", "In service")).await.unwrap();
        repos.condition_codes.save(&ConditionCode::new("good", "Good")).await.unwrap();
        repos.products.save(&Product::new("pr1", "PN-100").with_description("Bucket")).await.unwrap();
        repos
            .components
            .save_all(&[
                Component::new("c1", "rotor", "Rotor 1"),
                Component::new("c2", "rotor", "Rotor 2"),
            ])
            .await
            .unwrap();
        repos
            .pieces
            .save_all(&[
                Piece::new("p1", "SN-2", "pr1").with_status("in_service").with_condition("good"),
                Piece::new("p2", "SN-1", "pr1"),
            ])
            .await
            .unwrap();
        repos
            .metrics
            .upsert(TurbineOperationalMetric::new("m1", "t1", "hours").with_values(24000.0, 8000.0, 1000.0))
            .await
            .unwrap();

        Fixture {
            engine: QueryEngine::new(repos),
            pieces: PieceAssignments::new(Arc::clone(&store)),
            mounts: ComponentMounts::new(store),
        }
    }

    #[tokio::test]
    async fn test_turbine_with_components() {
        let f = fixture().await;
        f.mounts.assign("t1", "c1", "1", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c1", "p1", "A", OnOccupied::Fail).await.unwrap();

        let view = f.engine.turbine_with_components("t1").await.unwrap().unwrap();
        assert_eq!(view.plant.unwrap().name, "North Station");
        assert_eq!(view.metrics.len(), 1);
        assert_eq!(view.components.len(), 1);

        let mounted = &view.components[0];
        assert_eq!(mounted.component.id, "c1");
        assert_eq!(mounted.component_type.as_ref().unwrap().name, "Rotor");
        assert_eq!(mounted.pieces.len(), 1);
        assert_eq!(mounted.pieces[0].product.as_ref().unwrap().part_number, "PN-100");
        assert_eq!(mounted.pieces[0].use_status.as_ref().unwrap().name, "In service");
        assert_eq!(mounted.pieces[0].condition.as_ref().unwrap().name, "Good");
    }

    #[tokio::test]
    async fn test_component_with_pieces_mounted() {
        let f = fixture().await;
        f.mounts.assign("t1", "c1", "3", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c1", "p2", "B", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c1", "p1", "A", OnOccupied::Fail).await.unwrap();

        let view = f.engine.component_with_pieces("c1").await.unwrap().unwrap();
        assert_eq!(view.component_type.unwrap().name, "Rotor");
        assert_eq!(view.mount.unwrap().position, "3");
        assert_eq!(view.turbine.unwrap().id, "t1");

        let positions: Vec<_> = view.pieces.iter().map(|p| p.link.position.as_str()).collect();
        assert_eq!(positions, vec!["A", "B"]);
        assert_eq!(view.pieces[0].piece.sn, "SN-2");

        let spare = f.engine.component_with_pieces("c2").await.unwrap().unwrap();
        assert!(spare.mount.is_none());
        assert!(spare.turbine.is_none());
        assert!(spare.pieces.is_empty());
        assert!(f.engine.component_with_pieces("c404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_turbine_is_none() {
        let f = fixture().await;
        assert!(f.engine.turbine_with_components("t404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dangling_piece_link_is_skipped() {
        let f = fixture().await;
        f.mounts.assign("t1", "c1", "1", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c1", "p1", "A", OnOccupied::Fail).await.unwrap();
        f.engine.repositories().pieces.delete("p1").await.unwrap();

        let view = f.engine.turbine_with_components("t1").await.unwrap().unwrap();
        assert_eq!(view.components.len(), 1);
        assert!(view.components[0].pieces.is_empty());
    }

    #[tokio::test]
    async fn test_inventory_is_total_and_sorted() {
        let f = fixture().await;
        f.mounts.assign("t1", "c1", "1", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c1", "p1", "A", OnOccupied::Fail).await.unwrap();

        let items = f.engine.all_inventory_items().await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].sn, "SN-1");
        assert_eq!(items[0].component, UNASSIGNED_COMPONENT);
        assert_eq!(items[0].turbine, UNASSIGNED_TURBINE);
        assert!(!items[0].is_assigned());

        assert_eq!(items[1].sn, "SN-2");
        assert_eq!(items[1].component, "Rotor 1");
        assert_eq!(items[1].position.as_deref(), Some("A"));
        assert_eq!(items[1].turbine, "GT-1");
        assert_eq!(items[1].plant.as_deref(), Some("North Station"));
        assert_eq!(items[1].use_status.as_deref(), Some("In service"));
    }

    #[tokio::test]
    async fn test_piece_in_spare_component() {
        let f = fixture().await;
        f.pieces.assign("c2", "p2", "B", OnOccupied::Fail).await.unwrap();

        let view = f.engine.piece_with_component("p2").await.unwrap().unwrap();
        assert_eq!(view.component.unwrap().id, "c2");
        assert!(view.mount.is_none());
        assert!(view.turbine.is_none());

        let items = f.engine.all_inventory_items().await.unwrap();
        assert_eq!(items[0].component, "Rotor 2");
        assert_eq!(items[0].turbine, UNASSIGNED_TURBINE);
    }

    #[tokio::test]
    async fn test_spares_and_overview() {
        let f = fixture().await;
        f.mounts.assign("t1", "c1", "1", OnOccupied::Fail).await.unwrap();

        let spares = f.engine.spare_components().await.unwrap();
        assert_eq!(spares.len(), 1);
        assert_eq!(spares[0].component.id, "c2");

        let overview = f.engine.plant_overview("pl1").await.unwrap().unwrap();
        assert_eq!(overview.turbines.len(), 1);
        assert_eq!(overview.turbines[0].components[0].component.id, "c1");
    }

    #[tokio::test]
    async fn test_piece_history_names_components() {
        let f = fixture().await;
        f.pieces.assign("c1", "p1", "A", OnOccupied::Fail).await.unwrap();
        f.pieces.assign("c2", "p1", "A", OnOccupied::Fail).await.unwrap();

        let history = f.engine.piece_history("p1").await.unwrap();
        let names: Vec<_> = history.iter().map(|e| e.component_name.as_deref()).collect();
        assert_eq!(names, vec![Some("Rotor 1"), Some("Rotor 2")]);
    }
}
