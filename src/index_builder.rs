//! Online index build coordinator.
//!
//! CREATE INDEX runs as two transactions separated by a quiescence
//! barrier. T1 makes the descriptor visible (`ready`, not `valid`) so
//! concurrent writers maintain the index; the barrier waits until every
//! transaction that predates T1's commit is gone; T2 flips `ready` off,
//! populates the index from a full table scan, and publishes `valid` with
//! the scan's outcome. DROP is the mirror image: delete the row, quiesce,
//! then destroy the container.

use crate::catalog::{cols, Catalog, IndexEntry, Oid};
use crate::storage::index::{Index, IndexMetadata};
use crate::storage::table::SqlTable;
use crate::txn::{Transaction, TransactionManager};
use crate::value::{SqlType, SqlValue};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexBuildError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("index {0} does not exist")]
    IndexNotFound(Oid),

    #[error("column '{column}' does not exist in table '{table}'")]
    ColumnNotFound { table: String, column: String },
}

/// Outcome of one online CREATE INDEX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateIndexResult {
    pub index_oid: Oid,
    /// False when population hit a uniqueness violation; the descriptor
    /// stays in the catalog as not usable.
    pub valid: bool,
}

/// Snapshot of one descriptor's flags, as a transaction sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFlags {
    pub ready: bool,
    pub valid: bool,
    pub primary: bool,
    pub live: bool,
    pub unique: bool,
    pub build_generation: i64,
}

impl IndexFlags {
    pub fn from_entry(entry: &IndexEntry<'_>) -> Self {
        IndexFlags {
            ready: entry.get_bool(cols::INDISREADY).unwrap_or(false),
            valid: entry.get_bool(cols::INDISVALID).unwrap_or(false),
            primary: entry.get_bool(cols::INDISPRIMARY).unwrap_or(false),
            live: entry.get_bool(cols::INDISLIVE).unwrap_or(false),
            unique: entry.get_bool(cols::INDISUNIQUE).unwrap_or(false),
            build_generation: entry.get_integer(cols::INDBUILDGEN).unwrap_or(0),
        }
    }
}

pub struct IndexBuilder<'a> {
    catalog: &'a Catalog,
    txn_mgr: &'a TransactionManager,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(catalog: &'a Catalog, txn_mgr: &'a TransactionManager) -> Self {
        IndexBuilder { catalog, txn_mgr }
    }

    /// Online CREATE INDEX over `table_name(key_columns)`.
    pub fn create_index(
        &self,
        db_oid: Oid,
        table_name: &str,
        index_name: &str,
        key_columns: &[&str],
        unique: bool,
    ) -> Result<CreateIndexResult, IndexBuildError> {
        // ---- T1: make the descriptor visible -------------------------
        let t1 = self.txn_mgr.begin();
        let db = self.catalog.get_database(db_oid);

        let Some(class_entry) = db.class_handle().get_table_entry_by_name(&t1, table_name) else {
            self.txn_mgr.abort(&t1);
            return Err(IndexBuildError::TableNotFound(table_name.to_string()));
        };
        let rel_oid = class_entry.get_integer(cols::RELOID).unwrap_or(0) as Oid;
        let Some(table) = self.catalog.table_by_oid(rel_oid) else {
            self.txn_mgr.abort(&t1);
            return Err(IndexBuildError::TableNotFound(table_name.to_string()));
        };

        // key schema from the attribute catalog entries
        let mut key_oids = Vec::with_capacity(key_columns.len());
        let mut key_types = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let Some(attr) = db.attribute_handle().get_attribute_by_name(&t1, rel_oid, column)
            else {
                self.txn_mgr.abort(&t1);
                return Err(IndexBuildError::ColumnNotFound {
                    table: table_name.to_string(),
                    column: (*column).to_string(),
                });
            };
            key_oids.push(attr.get_integer(cols::ATTOID).unwrap_or(0) as u32);
            let type_id = attr.get_integer(cols::ATTTYPID).unwrap_or(0);
            key_types.push(
                crate::catalog::atttypid_to_type(type_id).unwrap_or(SqlType::Integer),
            );
        }

        let index_oid = self.catalog.next_oid();
        let index = Arc::new(Index::new(IndexMetadata {
            name: index_name.to_string(),
            key_oids,
            key_types,
            unique,
        }));
        self.catalog.register_index(index_oid, index_name, rel_oid, Arc::clone(&index));
        self.catalog.pg_index.insert(
            &t1,
            vec![
                SqlValue::integer(i64::from(index_oid)),
                SqlValue::string(index_name),
                SqlValue::integer(i64::from(rel_oid)),
                SqlValue::boolean(true),  // indisready
                SqlValue::boolean(false), // indisvalid
                SqlValue::boolean(false), // indisprimary
                SqlValue::boolean(false), // indislive
                SqlValue::boolean(unique),
                SqlValue::integer(0), // indbuildgen
            ],
        );
        let building = self.catalog.building_flag(index_oid);
        building.store(false, Ordering::SeqCst);
        let commit_ts = self.txn_mgr.commit(&t1);
        info!(index = index_name, index_oid, commit_ts, "index descriptor published");

        // ---- Quiescence barrier --------------------------------------
        // After this returns, every transaction that could have read the
        // table without seeing the descriptor has ended.
        self.txn_mgr.wait_for_quiescence(commit_ts);

        // ---- T2: populate and publish validity -----------------------
        let b_begin = Arc::clone(&building);
        let t2 = self
            .txn_mgr
            .begin_with_action(move || b_begin.store(true, Ordering::SeqCst));
        let b_commit = Arc::clone(&building);
        t2.add_commit_action(move || b_commit.store(false, Ordering::SeqCst));

        let Some(entry) = db.index_handle().get_index_entry(&t2, index_oid) else {
            self.txn_mgr.abort(&t2);
            return Err(IndexBuildError::IndexNotFound(index_oid));
        };
        let slot = entry.slot();
        self.catalog
            .pg_index
            .update_in_place(slot, cols::INDISREADY, SqlValue::boolean(false));
        let generation = entry.get_integer(cols::INDBUILDGEN).unwrap_or(0) + 1;
        self.catalog
            .pg_index
            .update_in_place(slot, cols::INDBUILDGEN, SqlValue::integer(generation));

        let valid = populate_index(&t2, &table, &index, unique);
        self.catalog
            .pg_index
            .update_in_place(slot, cols::INDISVALID, SqlValue::boolean(valid));
        let commit_ts = self.txn_mgr.commit(&t2);
        info!(index = index_name, index_oid, commit_ts, valid, "index build finished");

        Ok(CreateIndexResult { index_oid, valid })
    }

    /// DROP INDEX: delete the descriptor, quiesce past the commit, then
    /// destroy the physical container.
    pub fn drop_index(&self, db_oid: Oid, index_oid: Oid) -> Result<(), IndexBuildError> {
        let t = self.txn_mgr.begin();
        let db = self.catalog.get_database(db_oid);
        let Some(entry) = db.index_handle().get_index_entry(&t, index_oid) else {
            self.txn_mgr.abort(&t);
            return Err(IndexBuildError::IndexNotFound(index_oid));
        };
        let slot = entry.slot();
        if !self.catalog.pg_index.delete(&t, slot) {
            self.txn_mgr.abort(&t);
            return Err(IndexBuildError::IndexNotFound(index_oid));
        }
        let commit_ts = self.txn_mgr.commit(&t);

        self.txn_mgr.wait_for_quiescence(commit_ts);
        self.catalog.destroy_index(index_oid);
        info!(index_oid, "index dropped");
        Ok(())
    }

    /// The flags a transaction observes for one descriptor, if it sees
    /// the descriptor at all.
    pub fn observe(
        &self,
        db_oid: Oid,
        txn: &Transaction,
        index_oid: Oid,
    ) -> Option<IndexFlags> {
        let db = self.catalog.get_database(db_oid);
        let entry = db.index_handle().get_index_entry(txn, index_oid)?;
        Some(IndexFlags::from_entry(&entry))
    }
}

/// Scan the base table under `txn`, inserting a key per visible row.
/// Fails fast on the first uniqueness violation.
fn populate_index(txn: &Transaction, table: &Arc<SqlTable>, index: &Arc<Index>, unique: bool) -> bool {
    let key_idx: Vec<usize> = index
        .metadata()
        .key_oids
        .iter()
        .filter_map(|oid| table.schema().index_of_oid(*oid))
        .collect();
    for (slot, row) in table.scan(txn) {
        let key: Vec<SqlValue> = key_idx.iter().map(|i| row[*i].clone()).collect();
        let inserted = if unique {
            index.insert_unique(&key, slot)
        } else {
            index.insert(&key, slot)
        };
        if !inserted {
            warn!(index = index.metadata().name.as_str(), "uniqueness violation during index build");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DEFAULT_DATABASE_OID, PUBLIC_NAMESPACE_OID};
    use crate::storage::table::{ColumnDef, TableSchema};

    fn setup_with_rows(rows: &[(i64, i64)]) -> (TransactionManager, Catalog) {
        let mgr = TransactionManager::new();
        let catalog = Catalog::bootstrap(&mgr);
        let txn = mgr.begin();
        let schema = TableSchema::new(vec![
            ColumnDef::new(10001, "colA", SqlType::Integer),
            ColumnDef::new(10002, "colB", SqlType::Integer),
        ]);
        let (_, table) = catalog.create_table(&txn, PUBLIC_NAMESPACE_OID, "test_1", schema);
        for (a, b) in rows {
            table.insert(&txn, vec![SqlValue::integer(*a), SqlValue::integer(*b)]);
        }
        mgr.commit(&txn);
        (mgr, catalog)
    }

    #[test]
    fn test_create_index_populates_every_row() {
        let rows: Vec<(i64, i64)> = (0..100).map(|i| (i, i * 2)).collect();
        let (mgr, catalog) = setup_with_rows(&rows);
        let builder = IndexBuilder::new(&catalog, &mgr);
        let result = builder
            .create_index(DEFAULT_DATABASE_OID, "test_1", "idx_test_1_a", &["colA"], true)
            .expect("create index");
        assert!(result.valid);

        let index = catalog.index_by_oid(result.index_oid).expect("container");
        assert_eq!(index.entry_count(), 100);

        let txn = mgr.begin();
        let flags = builder
            .observe(DEFAULT_DATABASE_OID, &txn, result.index_oid)
            .expect("flags");
        assert!(!flags.ready);
        assert!(flags.valid);
        assert!(flags.unique);
        assert_eq!(flags.build_generation, 1);
        mgr.commit(&txn);
    }

    #[test]
    fn test_unique_violation_leaves_invalid_descriptor() {
        let (mgr, catalog) = setup_with_rows(&[(1, 1), (1, 2)]);
        let builder = IndexBuilder::new(&catalog, &mgr);
        let result = builder
            .create_index(DEFAULT_DATABASE_OID, "test_1", "idx_dup", &["colA"], true)
            .expect("create index");
        assert!(!result.valid);

        let txn = mgr.begin();
        let flags = builder
            .observe(DEFAULT_DATABASE_OID, &txn, result.index_oid)
            .expect("flags");
        assert!(!flags.valid);
        mgr.commit(&txn);
    }

    #[test]
    fn test_missing_table_aborts_cleanly() {
        let (mgr, catalog) = setup_with_rows(&[]);
        let builder = IndexBuilder::new(&catalog, &mgr);
        let err = builder
            .create_index(DEFAULT_DATABASE_OID, "nope", "idx", &["colA"], false)
            .expect_err("missing table");
        assert!(matches!(err, IndexBuildError::TableNotFound(_)));
        // no descriptor leaked
        let txn = mgr.begin();
        assert!(catalog.pg_index.scan(&txn).is_empty());
        mgr.commit(&txn);
    }

    #[test]
    fn test_missing_column_aborts_cleanly() {
        let (mgr, catalog) = setup_with_rows(&[(1, 2)]);
        let builder = IndexBuilder::new(&catalog, &mgr);
        let err = builder
            .create_index(DEFAULT_DATABASE_OID, "test_1", "idx", &["ghost"], false)
            .expect_err("missing column");
        assert!(matches!(err, IndexBuildError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_drop_index_removes_descriptor_and_container() {
        let (mgr, catalog) = setup_with_rows(&[(1, 2)]);
        let builder = IndexBuilder::new(&catalog, &mgr);
        let result = builder
            .create_index(DEFAULT_DATABASE_OID, "test_1", "idx_drop", &["colA"], false)
            .expect("create index");

        builder
            .drop_index(DEFAULT_DATABASE_OID, result.index_oid)
            .expect("drop index");
        assert!(catalog.index_by_oid(result.index_oid).is_none());

        let txn = mgr.begin();
        assert!(builder.observe(DEFAULT_DATABASE_OID, &txn, result.index_oid).is_none());
        mgr.commit(&txn);

        assert!(matches!(
            builder.drop_index(DEFAULT_DATABASE_OID, result.index_oid),
            Err(IndexBuildError::IndexNotFound(_))
        ));
    }
}
