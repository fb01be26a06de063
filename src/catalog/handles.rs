//! Typed accessors over the catalog tables.
//!
//! Each handle exposes `get_*_entry` by oid (column position 0) or by name
//! (the table's varchar name column). Entries wrap a projected row over
//! every column of the backing table plus the row's slot; the lifetime
//! parameter pins an entry to the transaction it was read under.

use super::{cols, Catalog, Oid};
use crate::storage::projected::ProjectedRow;
use crate::storage::table::SqlTable;
use crate::storage::TupleSlot;
use crate::txn::Transaction;
use crate::value::SqlValue;
use std::marker::PhantomData;

/// Shared entry shape: the projected row plus its slot.
macro_rules! catalog_entry {
    ($name:ident) => {
        pub struct $name<'txn> {
            row: ProjectedRow,
            slot: TupleSlot,
            _txn: PhantomData<&'txn Transaction>,
        }

        impl $name<'_> {
            pub fn get(&self, col_oid: u32) -> SqlValue {
                self.row.get(col_oid)
            }

            pub fn get_integer(&self, col_oid: u32) -> Option<i64> {
                self.row.get_integer(col_oid)
            }

            pub fn get_bool(&self, col_oid: u32) -> Option<bool> {
                match self.row.get(col_oid) {
                    SqlValue::Bool(b) if !b.is_null => Some(b.val),
                    _ => None,
                }
            }

            pub fn get_varchar(&self, col_oid: u32) -> Option<String> {
                self.row.get(col_oid).as_str().map(str::to_string)
            }

            pub fn slot(&self) -> TupleSlot {
                self.slot
            }
        }
    };
}

catalog_entry!(DatabaseEntry);
catalog_entry!(NamespaceEntry);
catalog_entry!(ClassEntry);
catalog_entry!(AttributeEntry);
catalog_entry!(IndexEntry);

/// Scan `table` for the visible row whose column at position 0 equals
/// `oid`; project every column.
fn find_by_oid(table: &SqlTable, txn: &Transaction, oid: Oid) -> Option<(ProjectedRow, TupleSlot)> {
    find_matching(table, txn, |values| {
        values[0].as_integer() == Some(i64::from(oid))
    })
}

/// Scan for the visible row whose name column matches.
fn find_by_name(
    table: &SqlTable,
    txn: &Transaction,
    name_col: u32,
    name: &str,
) -> Option<(ProjectedRow, TupleSlot)> {
    let idx = table.schema().index_of_oid(name_col)?;
    find_matching(table, txn, |values| values[idx].as_str() == Some(name))
}

fn find_matching(
    table: &SqlTable,
    txn: &Transaction,
    pred: impl Fn(&[SqlValue]) -> bool,
) -> Option<(ProjectedRow, TupleSlot)> {
    let oids = table.schema().col_oids();
    let init = table.schema().projection_initializer(&oids);
    for (slot, values) in table.scan(txn) {
        if pred(&values) {
            let mut row = init.initialize_row();
            if table.select(txn, slot, &mut row) {
                return Some((row, slot));
            }
        }
    }
    None
}

macro_rules! entry_of {
    ($entry:ident, $pair:expr) => {
        $pair.map(|(row, slot)| $entry { row, slot, _txn: PhantomData })
    };
}

// ----------------------------------------------------------------------
// Database handle
// ----------------------------------------------------------------------

pub struct DatabaseHandle<'c> {
    catalog: &'c Catalog,
}

impl<'c> DatabaseHandle<'c> {
    pub(super) fn new(catalog: &'c Catalog) -> Self {
        DatabaseHandle { catalog }
    }

    pub fn get_database_entry<'txn>(
        &self,
        txn: &'txn Transaction,
        oid: Oid,
    ) -> Option<DatabaseEntry<'txn>> {
        entry_of!(DatabaseEntry, find_by_oid(&self.catalog.pg_database, txn, oid))
    }

    pub fn get_database_entry_by_name<'txn>(
        &self,
        txn: &'txn Transaction,
        name: &str,
    ) -> Option<DatabaseEntry<'txn>> {
        entry_of!(
            DatabaseEntry,
            find_by_name(&self.catalog.pg_database, txn, cols::DATNAME, name)
        )
    }

    /// Cross-handle navigation.
    pub fn namespace_handle(&self) -> NamespaceHandle<'c> {
        NamespaceHandle { catalog: self.catalog }
    }

    pub fn class_handle(&self) -> ClassHandle<'c> {
        ClassHandle { catalog: self.catalog }
    }

    pub fn attribute_handle(&self) -> AttributeHandle<'c> {
        AttributeHandle { catalog: self.catalog }
    }

    pub fn index_handle(&self) -> IndexHandle<'c> {
        IndexHandle { catalog: self.catalog }
    }
}

// ----------------------------------------------------------------------
// Namespace handle
// ----------------------------------------------------------------------

pub struct NamespaceHandle<'c> {
    catalog: &'c Catalog,
}

impl<'c> NamespaceHandle<'c> {
    pub fn get_namespace_entry<'txn>(
        &self,
        txn: &'txn Transaction,
        oid: Oid,
    ) -> Option<NamespaceEntry<'txn>> {
        entry_of!(NamespaceEntry, find_by_oid(&self.catalog.pg_namespace, txn, oid))
    }

    pub fn get_namespace_entry_by_name<'txn>(
        &self,
        txn: &'txn Transaction,
        name: &str,
    ) -> Option<NamespaceEntry<'txn>> {
        entry_of!(
            NamespaceEntry,
            find_by_name(&self.catalog.pg_namespace, txn, cols::NSPNAME, name)
        )
    }

    /// Tables of one namespace, through pg_class.
    pub fn class_handle(&self) -> ClassHandle<'c> {
        ClassHandle { catalog: self.catalog }
    }
}

// ----------------------------------------------------------------------
// Class (table) handle
// ----------------------------------------------------------------------

pub struct ClassHandle<'c> {
    catalog: &'c Catalog,
}

impl ClassHandle<'_> {
    pub fn get_table_entry<'txn>(
        &self,
        txn: &'txn Transaction,
        oid: Oid,
    ) -> Option<ClassEntry<'txn>> {
        entry_of!(ClassEntry, find_by_oid(&self.catalog.pg_class, txn, oid))
    }

    pub fn get_table_entry_by_name<'txn>(
        &self,
        txn: &'txn Transaction,
        name: &str,
    ) -> Option<ClassEntry<'txn>> {
        entry_of!(
            ClassEntry,
            find_by_name(&self.catalog.pg_class, txn, cols::RELNAME, name)
        )
    }
}

// ----------------------------------------------------------------------
// Attribute handle
// ----------------------------------------------------------------------

pub struct AttributeHandle<'c> {
    catalog: &'c Catalog,
}

impl AttributeHandle<'_> {
    pub fn get_attribute_entry<'txn>(
        &self,
        txn: &'txn Transaction,
        oid: Oid,
    ) -> Option<AttributeEntry<'txn>> {
        entry_of!(AttributeEntry, find_by_oid(&self.catalog.pg_attribute, txn, oid))
    }

    /// One relation's attributes, in attnum order.
    pub fn get_attributes_for<'txn>(
        &self,
        txn: &'txn Transaction,
        rel_oid: Oid,
    ) -> Vec<AttributeEntry<'txn>> {
        let table = &self.catalog.pg_attribute;
        let oids = table.schema().col_oids();
        let init = table.schema().projection_initializer(&oids);
        let mut entries: Vec<AttributeEntry<'txn>> = table
            .scan(txn)
            .into_iter()
            .filter(|(_, values)| values[2].as_integer() == Some(i64::from(rel_oid)))
            .filter_map(|(slot, _)| {
                let mut row = init.initialize_row();
                table.select(txn, slot, &mut row).then(|| AttributeEntry {
                    row,
                    slot,
                    _txn: PhantomData,
                })
            })
            .collect();
        entries.sort_by_key(|e| e.get_integer(cols::ATTNUM));
        entries
    }

    /// An attribute of one relation, by name.
    pub fn get_attribute_by_name<'txn>(
        &self,
        txn: &'txn Transaction,
        rel_oid: Oid,
        name: &str,
    ) -> Option<AttributeEntry<'txn>> {
        self.get_attributes_for(txn, rel_oid)
            .into_iter()
            .find(|e| e.get_varchar(cols::ATTNAME).as_deref() == Some(name))
    }
}

// ----------------------------------------------------------------------
// Index handle
// ----------------------------------------------------------------------

pub struct IndexHandle<'c> {
    catalog: &'c Catalog,
}

impl IndexHandle<'_> {
    pub fn get_index_entry<'txn>(
        &self,
        txn: &'txn Transaction,
        oid: Oid,
    ) -> Option<IndexEntry<'txn>> {
        entry_of!(IndexEntry, find_by_oid(&self.catalog.pg_index, txn, oid))
    }

    pub fn get_index_entry_by_name<'txn>(
        &self,
        txn: &'txn Transaction,
        name: &str,
    ) -> Option<IndexEntry<'txn>> {
        entry_of!(
            IndexEntry,
            find_by_name(&self.catalog.pg_index, txn, cols::INDNAME, name)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DEFAULT_DATABASE_OID, PUBLIC_NAMESPACE_OID};
    use crate::storage::table::{ColumnDef, TableSchema};
    use crate::txn::TransactionManager;
    use crate::value::SqlType;

    fn setup() -> (TransactionManager, Catalog) {
        let mgr = TransactionManager::new();
        let catalog = Catalog::bootstrap(&mgr);
        (mgr, catalog)
    }

    #[test]
    fn test_database_lookup_by_name_and_oid() {
        let (mgr, catalog) = setup();
        let txn = mgr.begin();
        let handle = catalog.get_database(DEFAULT_DATABASE_OID);
        let by_oid = handle.get_database_entry(&txn, DEFAULT_DATABASE_OID).expect("by oid");
        let by_name = handle
            .get_database_entry_by_name(&txn, "basalt")
            .expect("by name");
        assert_eq!(by_oid.slot(), by_name.slot());
        assert!(handle.get_database_entry(&txn, 999).is_none());
        mgr.commit(&txn);
    }

    #[test]
    fn test_namespace_navigation() {
        let (mgr, catalog) = setup();
        let txn = mgr.begin();
        let ns = catalog
            .get_database(DEFAULT_DATABASE_OID)
            .namespace_handle()
            .get_namespace_entry_by_name(&txn, "public")
            .expect("public namespace");
        assert_eq!(ns.get_integer(cols::NSPOID), Some(i64::from(PUBLIC_NAMESPACE_OID)));
        assert_eq!(
            ns.get_integer(cols::NSPDBOID),
            Some(i64::from(DEFAULT_DATABASE_OID))
        );
        mgr.commit(&txn);
    }

    #[test]
    fn test_class_and_attribute_entries() {
        let (mgr, catalog) = setup();
        let txn = mgr.begin();
        let schema = TableSchema::new(vec![
            ColumnDef::new(10001, "colA", SqlType::Integer),
            ColumnDef::new(10002, "colB", SqlType::Varchar),
        ]);
        let (rel_oid, _) = catalog.create_table(&txn, PUBLIC_NAMESPACE_OID, "test_1", schema);

        let db = catalog.get_database(DEFAULT_DATABASE_OID);
        let entry = db
            .class_handle()
            .get_table_entry_by_name(&txn, "test_1")
            .expect("table entry");
        assert_eq!(entry.get_integer(cols::RELOID), Some(i64::from(rel_oid)));

        let attrs = db.attribute_handle().get_attributes_for(&txn, rel_oid);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].get_varchar(cols::ATTNAME).as_deref(), Some("colA"));
        assert_eq!(attrs[1].get_integer(cols::ATTNUM), Some(1));

        let col_b = db
            .attribute_handle()
            .get_attribute_by_name(&txn, rel_oid, "colB")
            .expect("colB");
        assert_eq!(col_b.get_integer(cols::ATTOID), Some(10002));
        mgr.commit(&txn);
    }

    #[test]
    fn test_entries_reflect_snapshot() {
        let (mgr, catalog) = setup();
        let old = mgr.begin();

        let writer = mgr.begin();
        let schema = TableSchema::new(vec![ColumnDef::new(10001, "c", SqlType::Integer)]);
        catalog.create_table(&writer, PUBLIC_NAMESPACE_OID, "late_table", schema);
        mgr.commit(&writer);

        // old snapshot cannot see the new class row
        let db = catalog.get_database(DEFAULT_DATABASE_OID);
        assert!(db.class_handle().get_table_entry_by_name(&old, "late_table").is_none());
        mgr.commit(&old);

        let fresh = mgr.begin();
        assert!(db.class_handle().get_table_entry_by_name(&fresh, "late_table").is_some());
        mgr.commit(&fresh);
    }
}
