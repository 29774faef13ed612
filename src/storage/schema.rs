//! Schema registry
//!
//! Every logical table is one physical SQLite table holding JSON documents:
//! `kv_<name>(key TEXT PRIMARY KEY, doc TEXT NOT NULL)`. Secondary and
//! compound indexes are expression indexes over `json_extract(doc, '$.<path>')`.
//!
//! The registry is an ordered list of migrations. Each migration carries
//! forward-only upgrade steps; the on-disk version lives in `PRAGMA user_version`.

use std::collections::HashMap;

/// Logical table names
pub mod tables {
    pub const COMPONENT_TYPES: &str = "component_types";
    pub const USE_STATUSES: &str = "use_statuses";
    pub const CONDITION_CODES: &str = "condition_codes";
    pub const TURBINE_METRIC_TYPES: &str = "turbine_metric_types";
    pub const PLANTS: &str = "plants";
    pub const PLANT_CONTACTS: &str = "plant_contacts";
    pub const TURBINES: &str = "turbines";
    pub const TURBINE_METRICS: &str = "turbine_metrics";
    pub const COMPONENTS: &str = "components";
    pub const PRODUCTS: &str = "products";
    pub const PIECES: &str = "pieces";
    pub const COMPONENT_PIECES: &str = "component_pieces";
    pub const COMPONENT_ASSIGNMENTS: &str = "component_assignments";
    pub const NOTES: &str = "notes";
    pub const NOTE_LINKS: &str = "note_links";
    pub const OUTAGE_EVENTS: &str = "outage_events";
    pub const OUTAGES: &str = "outages";
    pub const REPAIR_ORDERS: &str = "repair_orders";
    pub const REPAIR_LINE_ITEMS: &str = "repair_line_items";
    pub const STATUS_COLOR_SETTINGS: &str = "status_color_settings";

    // v1 flat tables
    pub const SITES: &str = "sites";
    pub const REPAIR_EVENTS: &str = "repair_events";
}

/// Index names shared between the registry and the repositories
pub mod indexes {
    pub const NAME: &str = "name";
    pub const PLANT_ID: &str = "plant_id";
    pub const TURBINE_ID: &str = "turbine_id";
    pub const METRIC_TYPE_CODE: &str = "metric_type_code";
    pub const TURBINE_METRIC: &str = "turbine_metric";
    pub const TYPE_CODE: &str = "type_code";
    pub const PART_NUMBER: &str = "part_number";
    pub const SN: &str = "sn";
    pub const PRODUCT_ID: &str = "product_id";
    pub const USE_STATUS_CODE: &str = "use_status_code";
    pub const CONDITION_CODE: &str = "condition_code";
    pub const COMPONENT_ID: &str = "component_id";
    pub const PIECE_ID: &str = "piece_id";
    pub const COMPONENT_POSITION: &str = "component_position";
    pub const TURBINE_POSITION: &str = "turbine_position";
    pub const NOTE_ID: &str = "note_id";
    pub const TARGET: &str = "target";
    pub const OUTAGE_EVENT_ID: &str = "outage_event_id";
    pub const ORDER_NUMBER: &str = "order_number";
    pub const REPAIR_ORDER_ID: &str = "repair_order_id";
    pub const SITE_ID: &str = "site_id";
}

/// Physical table name for a logical table
pub fn physical_table(name: &str) -> String {
    format!("kv_{}", name)
}

/// SQL expression extracting a (possibly dotted) key path from a document
pub fn key_expr(key_path: &str) -> String {
    format!("json_extract(doc, '$.{}')", key_path)
}

/// A secondary index over one or more key paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: &'static str,
    pub key_paths: Vec<&'static str>,
    pub unique: bool,
}

impl IndexDef {
    /// Non-unique index over a single key path
    pub fn single(name: &'static str, key_path: &'static str) -> Self {
        Self { name, key_paths: vec![key_path], unique: false }
    }

    /// Unique index over a single key path
    pub fn unique(name: &'static str, key_path: &'static str) -> Self {
        Self { name, key_paths: vec![key_path], unique: true }
    }

    /// Non-unique index over an ordered tuple of key paths
    pub fn compound(name: &'static str, key_paths: &[&'static str]) -> Self {
        Self { name, key_paths: key_paths.to_vec(), unique: false }
    }

    /// Unique index over an ordered tuple of key paths
    pub fn compound_unique(name: &'static str, key_paths: &[&'static str]) -> Self {
        Self { name, key_paths: key_paths.to_vec(), unique: true }
    }

    pub fn is_compound(&self) -> bool {
        self.key_paths.len() > 1
    }

    fn create_sql(&self, table: &str) -> String {
        let columns: Vec<String> = self.key_paths.iter().map(|p| key_expr(p)).collect();
        format!(
            "CREATE {}INDEX IF NOT EXISTS \"{}__{}\" ON \"{}\"({})",
            if self.unique { "UNIQUE " } else { "" },
            physical_table(table),
            self.name,
            physical_table(table),
            columns.join(", "),
        )
    }
}

/// Declaration of one logical table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    /// Document field holding the primary key
    pub key_path: &'static str,
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn new(name: &'static str, key_path: &'static str) -> Self {
        Self { name, key_path, indexes: Vec::new() }
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name == name)
    }

    fn create_sql(&self) -> Vec<String> {
        let mut stmts = vec![format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (key TEXT PRIMARY KEY, doc TEXT NOT NULL)",
            physical_table(self.name)
        )];
        stmts.extend(self.indexes.iter().map(|i| i.create_sql(self.name)));
        stmts
    }
}

/// A forward-only schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStep {
    CreateTable(TableDef),
    DropTable(&'static str),
    CreateIndex { table: &'static str, index: IndexDef },
}

impl UpgradeStep {
    /// SQL statements realising this step
    pub fn statements(&self) -> Vec<String> {
        match self {
            UpgradeStep::CreateTable(def) => def.create_sql(),
            UpgradeStep::DropTable(name) => {
                vec![format!("DROP TABLE IF EXISTS \"{}\"", physical_table(name))]
            }
            UpgradeStep::CreateIndex { table, index } => vec![index.create_sql(table)],
        }
    }
}

/// All steps that take a store to `version`
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub steps: Vec<UpgradeStep>,
}

/// Ordered, versioned table declarations
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    migrations: Vec<Migration>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::current()
    }
}

impl SchemaRegistry {
    /// Every migration this build knows about
    pub fn current() -> Self {
        Self { migrations: vec![v1_flat(), v2_normalized()] }
    }

    /// Registry truncated at `version`
    pub fn up_to(version: u32) -> Self {
        let mut registry = Self::current();
        registry.migrations.retain(|m| m.version <= version);
        registry
    }

    /// Highest version this registry can produce
    pub fn max_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// Migrations newer than `from`, oldest first
    pub fn pending(&self, from: u32) -> impl Iterator<Item = &Migration> {
        self.migrations.iter().filter(move |m| m.version > from)
    }

    /// Table catalogue at `max_version`, built by replaying every step
    pub fn tables(&self) -> HashMap<&'static str, TableDef> {
        let mut catalogue: HashMap<&'static str, TableDef> = HashMap::new();
        for migration in &self.migrations {
            for step in &migration.steps {
                match step {
                    UpgradeStep::CreateTable(def) => {
                        catalogue.insert(def.name, def.clone());
                    }
                    UpgradeStep::DropTable(name) => {
                        catalogue.remove(name);
                    }
                    UpgradeStep::CreateIndex { table, index } => {
                        if let Some(def) = catalogue.get_mut(table) {
                            def.indexes.retain(|i| i.name != index.name);
                            def.indexes.push(index.clone());
                        }
                    }
                }
            }
        }
        catalogue
    }
}

fn v1_flat() -> Migration {
    use indexes as ix;
    use tables as t;

    Migration {
        version: 1,
        description: "flat asset tables",
        steps: vec![
            UpgradeStep::CreateTable(TableDef::new(t::SITES, "id")),
            UpgradeStep::CreateTable(
                TableDef::new(t::TURBINES, "id").with_index(IndexDef::single(ix::SITE_ID, "site_id")),
            ),
            UpgradeStep::CreateTable(
                TableDef::new(t::COMPONENTS, "id")
                    .with_index(IndexDef::single(ix::TURBINE_ID, "turbine_id")),
            ),
            UpgradeStep::CreateTable(
                TableDef::new(t::PIECES, "id").with_index(IndexDef::single(ix::SN, "sn")),
            ),
            UpgradeStep::CreateTable(
                TableDef::new(t::REPAIR_EVENTS, "id")
                    .with_index(IndexDef::single(ix::PIECE_ID, "piece_id")),
            ),
        ],
    }
}

/// Normalized layout. Drops the v1 flat tables without carrying their rows over.
fn v2_normalized() -> Migration {
    use indexes as ix;
    use tables as t;

    let mut steps = vec![
        UpgradeStep::DropTable(t::PIECES),
        UpgradeStep::DropTable(t::COMPONENTS),
        UpgradeStep::DropTable(t::TURBINES),
        UpgradeStep::DropTable(t::SITES),
        UpgradeStep::DropTable(t::REPAIR_EVENTS),
    ];

    let created = vec![
        // Lookup tables
        TableDef::new(t::COMPONENT_TYPES, "code"),
        TableDef::new(t::USE_STATUSES, "code"),
        TableDef::new(t::CONDITION_CODES, "code"),
        TableDef::new(t::TURBINE_METRIC_TYPES, "code"),
        // Core entities
        TableDef::new(t::PLANTS, "id").with_index(IndexDef::unique(ix::NAME, "name")),
        TableDef::new(t::PLANT_CONTACTS, "id").with_index(IndexDef::single(ix::PLANT_ID, "plant_id")),
        TableDef::new(t::TURBINES, "id").with_index(IndexDef::single(ix::PLANT_ID, "plant_id")),
        TableDef::new(t::TURBINE_METRICS, "id")
            .with_index(IndexDef::single(ix::TURBINE_ID, "turbine_id"))
            .with_index(IndexDef::single(ix::METRIC_TYPE_CODE, "metric_type_code"))
            .with_index(IndexDef::compound_unique(
                ix::TURBINE_METRIC,
                &["turbine_id", "metric_type_code"],
            )),
        TableDef::new(t::COMPONENTS, "id").with_index(IndexDef::single(ix::TYPE_CODE, "type_code")),
        TableDef::new(t::PRODUCTS, "id").with_index(IndexDef::unique(ix::PART_NUMBER, "part_number")),
        TableDef::new(t::PIECES, "id")
            .with_index(IndexDef::unique(ix::SN, "sn"))
            .with_index(IndexDef::single(ix::PRODUCT_ID, "product_id"))
            .with_index(IndexDef::single(ix::USE_STATUS_CODE, "use_status_code"))
            .with_index(IndexDef::single(ix::CONDITION_CODE, "condition_code")),
        // Temporal junctions
        TableDef::new(t::COMPONENT_PIECES, "id")
            .with_index(IndexDef::single(ix::COMPONENT_ID, "component_id"))
            .with_index(IndexDef::single(ix::PIECE_ID, "piece_id"))
            .with_index(IndexDef::compound(ix::COMPONENT_POSITION, &["component_id", "position"])),
        TableDef::new(t::COMPONENT_ASSIGNMENTS, "id")
            .with_index(IndexDef::single(ix::TURBINE_ID, "turbine_id"))
            .with_index(IndexDef::single(ix::COMPONENT_ID, "component_id"))
            .with_index(IndexDef::compound(ix::TURBINE_POSITION, &["turbine_id", "position"])),
        // Peripheral
        TableDef::new(t::NOTES, "id"),
        TableDef::new(t::NOTE_LINKS, "id")
            .with_index(IndexDef::single(ix::NOTE_ID, "note_id"))
            .with_index(IndexDef::compound(
                ix::TARGET,
                &["target.entity_type", "target.entity_id"],
            )),
        TableDef::new(t::OUTAGE_EVENTS, "id"),
        TableDef::new(t::OUTAGES, "id")
            .with_index(IndexDef::single(ix::OUTAGE_EVENT_ID, "outage_event_id"))
            .with_index(IndexDef::single(ix::TURBINE_ID, "turbine_id")),
        TableDef::new(t::REPAIR_ORDERS, "id")
            .with_index(IndexDef::unique(ix::ORDER_NUMBER, "order_number"))
            .with_index(IndexDef::single(ix::PIECE_ID, "piece_id")),
        TableDef::new(t::REPAIR_LINE_ITEMS, "id")
            .with_index(IndexDef::single(ix::REPAIR_ORDER_ID, "repair_order_id")),
        TableDef::new(t::STATUS_COLOR_SETTINGS, "status_code"),
    ];
    steps.extend(created.into_iter().map(UpgradeStep::CreateTable));

    Migration {
        version: 2,
        description: "normalized assets with temporal junctions",
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions() {
        assert_eq!(SchemaRegistry::current().max_version(), 2);
        assert_eq!(SchemaRegistry::up_to(1).max_version(), 1);
        assert_eq!(SchemaRegistry::current().pending(1).count(), 1);
        assert_eq!(SchemaRegistry::current().pending(2).count(), 0);
    }

    #[test]
    fn test_replay_drops_flat_tables() {
        let catalogue = SchemaRegistry::current().tables();
        assert!(!catalogue.contains_key(tables::SITES));
        assert!(!catalogue.contains_key(tables::REPAIR_EVENTS));

        // `pieces` survives by name but with the v2 declaration
        let pieces = &catalogue[tables::PIECES];
        assert!(pieces.index(indexes::PRODUCT_ID).is_some());
        assert!(pieces.index(indexes::SN).map(|i| i.unique).unwrap_or(false));
    }

    #[test]
    fn test_v1_catalogue() {
        let catalogue = SchemaRegistry::up_to(1).tables();
        assert_eq!(catalogue.len(), 5);
        assert!(catalogue[tables::COMPONENTS].index(indexes::TURBINE_ID).is_some());
    }

    #[test]
    fn test_compound_index_sql() {
        let catalogue = SchemaRegistry::current().tables();
        let metrics = &catalogue[tables::TURBINE_METRICS];
        let index = metrics.index(indexes::TURBINE_METRIC).unwrap();
        assert!(index.is_compound());

        let sql = index.create_sql(metrics.name);
        assert!(sql.starts_with("CREATE UNIQUE INDEX"));
        assert!(sql.contains("json_extract(doc, '$.turbine_id'), json_extract(doc, '$.metric_type_code')"));
    }

    #[test]
    fn test_drop_statement() {
        let stmts = UpgradeStep::DropTable(tables::SITES).statements();
        assert_eq!(stmts, vec!["DROP TABLE IF EXISTS \"kv_sites\"".to_string()]);
    }
}
