//! System catalogs.
//!
//! Catalog rows live in ordinary transactional tables (pg_database,
//! pg_namespace, pg_class, pg_attribute, pg_index) and are read through
//! the typed handles in [`handles`]. Physical objects (user tables, index
//! containers) are registered in concurrent side maps keyed by oid; the
//! rows carry metadata and flags only. Handles never cache - every lookup
//! scans under the caller's transaction.

pub mod handles;

pub use handles::{
    AttributeEntry, AttributeHandle, ClassEntry, ClassHandle, DatabaseEntry, DatabaseHandle,
    IndexEntry, IndexHandle, NamespaceEntry, NamespaceHandle,
};

use crate::exec::processor::StorageProvider;
use crate::storage::index::Index;
use crate::storage::table::{ColumnDef, SqlTable, TableSchema};
use crate::txn::{Transaction, TransactionManager};
use crate::value::{SqlType, SqlValue};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

pub type Oid = u32;

/// Bootstrap constants.
pub const DEFAULT_DATABASE_OID: Oid = 828;
pub const DEFAULT_TABLESPACE_OID: Oid = 15721;
pub const CATALOG_NAMESPACE_OID: Oid = 14;
pub const PUBLIC_NAMESPACE_OID: Oid = 15;
pub const DEFAULT_DATABASE_NAME: &str = "basalt";

/// First oid handed out after the fixed bootstrap range.
const FIRST_FREE_OID: u32 = 16384;

// Column oids of the catalog tables. Position 0 is always the object's
// own oid.
pub mod cols {
    pub const DATOID: u32 = 5001;
    pub const DATTABLESPACE: u32 = 5002;
    pub const DATNAME: u32 = 5003;

    pub const NSPOID: u32 = 5101;
    pub const NSPNAME: u32 = 5102;
    pub const NSPDBOID: u32 = 5103;

    pub const RELOID: u32 = 5201;
    pub const RELNAME: u32 = 5202;
    pub const RELNAMESPACE: u32 = 5203;

    pub const ATTOID: u32 = 5301;
    pub const ATTNAME: u32 = 5302;
    pub const ATTRELID: u32 = 5303;
    pub const ATTNUM: u32 = 5304;
    pub const ATTTYPID: u32 = 5305;

    pub const INDOID: u32 = 5401;
    pub const INDNAME: u32 = 5402;
    pub const INDRELID: u32 = 5403;
    pub const INDISREADY: u32 = 5404;
    pub const INDISVALID: u32 = 5405;
    pub const INDISPRIMARY: u32 = 5406;
    pub const INDISLIVE: u32 = 5407;
    pub const INDISUNIQUE: u32 = 5408;
    pub const INDBUILDGEN: u32 = 5409;
}

/// Numeric encoding of column types stored in pg_attribute.
pub fn type_to_atttypid(ty: SqlType) -> i64 {
    match ty {
        SqlType::TinyInt => 1,
        SqlType::SmallInt => 2,
        SqlType::Integer => 3,
        SqlType::BigInt => 4,
        SqlType::Boolean => 5,
        SqlType::Decimal => 6,
        SqlType::Date => 7,
        SqlType::Varchar => 8,
    }
}

pub fn atttypid_to_type(id: i64) -> Option<SqlType> {
    let ty = match id {
        1 => SqlType::TinyInt,
        2 => SqlType::SmallInt,
        3 => SqlType::Integer,
        4 => SqlType::BigInt,
        5 => SqlType::Boolean,
        6 => SqlType::Decimal,
        7 => SqlType::Date,
        8 => SqlType::Varchar,
        _ => return None,
    };
    Some(ty)
}

pub struct Catalog {
    next_oid: AtomicU32,
    pub(crate) pg_database: Arc<SqlTable>,
    pub(crate) pg_namespace: Arc<SqlTable>,
    pub(crate) pg_class: Arc<SqlTable>,
    pub(crate) pg_attribute: Arc<SqlTable>,
    pub(crate) pg_index: Arc<SqlTable>,
    /// Physical storage keyed by class oid.
    tables: DashMap<Oid, Arc<SqlTable>>,
    table_names: DashMap<String, Oid>,
    /// Physical index containers keyed by index oid, with the covered
    /// table's oid.
    indexes: DashMap<Oid, (Arc<Index>, Oid)>,
    index_names: DashMap<String, Oid>,
    /// Online-build flags, one per index descriptor.
    build_flags: DashMap<Oid, Arc<AtomicBool>>,
}

impl Catalog {
    /// Create the catalog tables and insert the default database row.
    pub fn bootstrap(txn_mgr: &TransactionManager) -> Self {
        let pg_database = Arc::new(SqlTable::new(
            "pg_database",
            TableSchema::new(vec![
                ColumnDef::new(cols::DATOID, "datoid", SqlType::Integer),
                ColumnDef::new(cols::DATTABLESPACE, "dattablespace", SqlType::Integer),
                ColumnDef::new(cols::DATNAME, "datname", SqlType::Varchar),
            ]),
        ));
        let pg_namespace = Arc::new(SqlTable::new(
            "pg_namespace",
            TableSchema::new(vec![
                ColumnDef::new(cols::NSPOID, "nspoid", SqlType::Integer),
                ColumnDef::new(cols::NSPNAME, "nspname", SqlType::Varchar),
                ColumnDef::new(cols::NSPDBOID, "nspdboid", SqlType::Integer),
            ]),
        ));
        let pg_class = Arc::new(SqlTable::new(
            "pg_class",
            TableSchema::new(vec![
                ColumnDef::new(cols::RELOID, "reloid", SqlType::Integer),
                ColumnDef::new(cols::RELNAME, "relname", SqlType::Varchar),
                ColumnDef::new(cols::RELNAMESPACE, "relnamespace", SqlType::Integer),
            ]),
        ));
        let pg_attribute = Arc::new(SqlTable::new(
            "pg_attribute",
            TableSchema::new(vec![
                ColumnDef::new(cols::ATTOID, "attoid", SqlType::Integer),
                ColumnDef::new(cols::ATTNAME, "attname", SqlType::Varchar),
                ColumnDef::new(cols::ATTRELID, "attrelid", SqlType::Integer),
                ColumnDef::new(cols::ATTNUM, "attnum", SqlType::Integer),
                ColumnDef::new(cols::ATTTYPID, "atttypid", SqlType::Integer),
            ]),
        ));
        let pg_index = Arc::new(SqlTable::new(
            "pg_index",
            TableSchema::new(vec![
                ColumnDef::new(cols::INDOID, "indoid", SqlType::Integer),
                ColumnDef::new(cols::INDNAME, "indname", SqlType::Varchar),
                ColumnDef::new(cols::INDRELID, "indrelid", SqlType::Integer),
                ColumnDef::new(cols::INDISREADY, "indisready", SqlType::Boolean),
                ColumnDef::new(cols::INDISVALID, "indisvalid", SqlType::Boolean),
                ColumnDef::new(cols::INDISPRIMARY, "indisprimary", SqlType::Boolean),
                ColumnDef::new(cols::INDISLIVE, "indislive", SqlType::Boolean),
                ColumnDef::new(cols::INDISUNIQUE, "indisunique", SqlType::Boolean),
                ColumnDef::new(cols::INDBUILDGEN, "indbuildgen", SqlType::Integer),
            ]),
        ));

        let catalog = Catalog {
            next_oid: AtomicU32::new(FIRST_FREE_OID),
            pg_database,
            pg_namespace,
            pg_class,
            pg_attribute,
            pg_index,
            tables: DashMap::new(),
            table_names: DashMap::new(),
            indexes: DashMap::new(),
            index_names: DashMap::new(),
            build_flags: DashMap::new(),
        };

        let txn = txn_mgr.begin();
        catalog.pg_database.insert(
            &txn,
            vec![
                SqlValue::integer(i64::from(DEFAULT_DATABASE_OID)),
                SqlValue::integer(i64::from(DEFAULT_TABLESPACE_OID)),
                SqlValue::string(DEFAULT_DATABASE_NAME),
            ],
        );
        catalog.pg_namespace.insert(
            &txn,
            vec![
                SqlValue::integer(i64::from(CATALOG_NAMESPACE_OID)),
                SqlValue::string("pg_catalog"),
                SqlValue::integer(i64::from(DEFAULT_DATABASE_OID)),
            ],
        );
        catalog.pg_namespace.insert(
            &txn,
            vec![
                SqlValue::integer(i64::from(PUBLIC_NAMESPACE_OID)),
                SqlValue::string("public"),
                SqlValue::integer(i64::from(DEFAULT_DATABASE_OID)),
            ],
        );
        txn_mgr.commit(&txn);
        info!(database = DEFAULT_DATABASE_NAME, oid = DEFAULT_DATABASE_OID, "catalog bootstrapped");
        catalog
    }

    /// A fresh, globally unique oid.
    pub fn next_oid(&self) -> Oid {
        self.next_oid.fetch_add(1, Ordering::SeqCst)
    }

    /// Typed handle over pg_database for one database.
    pub fn get_database(&self, _db_oid: Oid) -> DatabaseHandle<'_> {
        DatabaseHandle::new(self)
    }

    /// Register a user table: a pg_class row, one pg_attribute row per
    /// column, and the physical storage mapping.
    pub fn create_table(
        &self,
        txn: &Transaction,
        ns_oid: Oid,
        name: &str,
        schema: TableSchema,
    ) -> (Oid, Arc<SqlTable>) {
        let rel_oid = self.next_oid();
        self.pg_class.insert(
            txn,
            vec![
                SqlValue::integer(i64::from(rel_oid)),
                SqlValue::string(name),
                SqlValue::integer(i64::from(ns_oid)),
            ],
        );
        for (num, col) in schema.columns().iter().enumerate() {
            self.pg_attribute.insert(
                txn,
                vec![
                    SqlValue::integer(i64::from(col.oid)),
                    SqlValue::string(col.name.clone()),
                    SqlValue::integer(i64::from(rel_oid)),
                    SqlValue::integer(num as i64),
                    SqlValue::integer(type_to_atttypid(col.ty)),
                ],
            );
        }
        let table = Arc::new(SqlTable::new(name, schema));
        self.tables.insert(rel_oid, Arc::clone(&table));
        self.table_names.insert(name.to_string(), rel_oid);
        (rel_oid, table)
    }

    pub fn table_by_oid(&self, oid: Oid) -> Option<Arc<SqlTable>> {
        self.tables.get(&oid).map(|t| Arc::clone(&t))
    }

    pub fn table_oid_by_name(&self, name: &str) -> Option<Oid> {
        self.table_names.get(name).map(|o| *o)
    }

    // ------------------------------------------------------------------
    // Index object registry (the rows live in pg_index)
    // ------------------------------------------------------------------

    pub fn register_index(&self, oid: Oid, name: &str, table_oid: Oid, index: Arc<Index>) {
        self.indexes.insert(oid, (index, table_oid));
        self.index_names.insert(name.to_string(), oid);
        self.build_flags.insert(oid, Arc::new(AtomicBool::new(false)));
    }

    pub fn index_by_oid(&self, oid: Oid) -> Option<Arc<Index>> {
        self.indexes.get(&oid).map(|i| Arc::clone(&i.0))
    }

    /// Drop the physical container. The pg_index row must already be
    /// deleted and quiesced past.
    pub fn destroy_index(&self, oid: Oid) {
        if let Some((_, (index, _))) = self.indexes.remove(&oid) {
            self.index_names.remove(index.metadata().name.as_str());
        }
        self.build_flags.remove(&oid);
    }

    /// The online-build flag of one index descriptor.
    pub fn building_flag(&self, oid: Oid) -> Arc<AtomicBool> {
        self.build_flags
            .entry(oid)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }
}

impl StorageProvider for Catalog {
    fn table(&self, name: &str) -> Option<Arc<SqlTable>> {
        let oid = self.table_oid_by_name(name)?;
        self.table_by_oid(oid)
    }

    fn index(&self, name: &str) -> Option<(Arc<Index>, Arc<SqlTable>)> {
        let oid = self.index_names.get(name).map(|o| *o)?;
        let (index, table_oid) = self
            .indexes
            .get(&oid)
            .map(|e| (Arc::clone(&e.0), e.1))?;
        let table = self.table_by_oid(table_oid)?;
        Some((index, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_default_database_row() {
        let mgr = TransactionManager::new();
        let catalog = Catalog::bootstrap(&mgr);
        let txn = mgr.begin();
        let entry = catalog
            .get_database(DEFAULT_DATABASE_OID)
            .get_database_entry(&txn, DEFAULT_DATABASE_OID)
            .expect("default database");
        assert_eq!(entry.get_integer(cols::DATOID), Some(828));
        assert_eq!(entry.get_integer(cols::DATTABLESPACE), Some(15721));
        mgr.commit(&txn);
    }

    #[test]
    fn test_oids_are_unique_and_above_bootstrap_range() {
        let mgr = TransactionManager::new();
        let catalog = Catalog::bootstrap(&mgr);
        let a = catalog.next_oid();
        let b = catalog.next_oid();
        assert!(a >= FIRST_FREE_OID);
        assert_ne!(a, b);
    }

    #[test]
    fn test_create_table_registers_rows_and_storage() {
        let mgr = TransactionManager::new();
        let catalog = Catalog::bootstrap(&mgr);
        let txn = mgr.begin();
        let schema = TableSchema::new(vec![
            ColumnDef::new(10001, "colA", SqlType::Integer),
            ColumnDef::new(10002, "colB", SqlType::Varchar),
        ]);
        let (oid, table) = catalog.create_table(&txn, PUBLIC_NAMESPACE_OID, "test_1", schema);
        mgr.commit(&txn);

        assert_eq!(catalog.table_oid_by_name("test_1"), Some(oid));
        assert_eq!(table.name(), "test_1");

        let txn = mgr.begin();
        let rows = catalog.pg_attribute.scan(&txn);
        assert_eq!(rows.len(), 2);
        mgr.commit(&txn);
    }

    #[test]
    fn test_type_id_roundtrip() {
        for ty in [
            SqlType::TinyInt,
            SqlType::SmallInt,
            SqlType::Integer,
            SqlType::BigInt,
            SqlType::Boolean,
            SqlType::Decimal,
            SqlType::Date,
            SqlType::Varchar,
        ] {
            assert_eq!(atttypid_to_type(type_to_atttypid(ty)), Some(ty));
        }
        assert_eq!(atttypid_to_type(99), None);
    }
}
