//! Table Registry (C4): the process-wide-for-one-script mutable store of
//! `TableDefinition`s.

use crate::error::LineageError;
use crate::model::{ColumnLineage, TableDefinition, TableType};
use crate::warning::WarningCollector;
use std::collections::BTreeMap;

/// Normalizes a table name the way every registry lookup does: trim,
/// lowercase. Case-insensitive lookup (`"Orders" == "orders" == " ORDERS "`)
/// falls out of always normalizing before keying the map.
pub fn normalize_table_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: BTreeMap<String, TableDefinition>,
    statement_counter: usize,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table definition. Fails if a source (External) table of
    /// the same name already exists; warns-and-overwrites for any other
    /// existing non-source table.
    pub fn register_table(
        &mut self,
        mut table_def: TableDefinition,
        warnings: &mut WarningCollector,
    ) -> Result<(), LineageError> {
        let key = normalize_table_name(&table_def.name);
        table_def.name = key.clone();

        if let Some(existing) = self.tables.get(&key) {
            if existing.is_source_table {
                return Err(LineageError::source_redefinition(key.clone()));
            }
            warnings.warn(format!(
                "table '{key}' is being redefined at statement {}; previous definition at statement {:?} will be overwritten",
                self.statement_counter, existing.created_at_statement
            ));
        }

        if table_def.created_at_statement.is_none() {
            table_def.created_at_statement = Some(self.statement_counter);
        }

        self.tables.insert(key, table_def);
        Ok(())
    }

    /// Registers a source (External) table. Idempotent: if a table of this
    /// name is already registered (of any kind), this is a no-op.
    pub fn register_source_table(&mut self, name: &str, columns: Vec<String>) {
        let key = normalize_table_name(name);
        if self.tables.contains_key(&key) {
            return;
        }
        let mut def = TableDefinition::new(key.clone(), TableType::External);
        for column in columns {
            def.add_column(ColumnLineage::new(
                column,
                crate::model::ExpressionKind::Direct,
            ));
        }
        self.tables.insert(key, def);
    }

    pub fn update_columns(
        &mut self,
        name: &str,
        new_columns: Vec<ColumnLineage>,
    ) -> Result<(), LineageError> {
        let key = normalize_table_name(name);
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| LineageError::target_missing(key.clone()))?;
        for lineage in new_columns {
            table.add_column(lineage);
        }
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(&normalize_table_name(name))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut TableDefinition> {
        self.tables.get_mut(&normalize_table_name(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&normalize_table_name(name))
    }

    /// Removes a table. Returns `false` without side effects if absent.
    pub fn remove_table(&mut self, name: &str) -> bool {
        self.tables.remove(&normalize_table_name(name)).is_some()
    }

    pub fn source_tables(&self) -> Vec<&TableDefinition> {
        self.tables.values().filter(|t| t.is_source_table).collect()
    }

    pub fn derived_tables(&self) -> Vec<&TableDefinition> {
        self.tables.values().filter(|t| !t.is_source_table).collect()
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    pub fn increment_statement_counter(&mut self) {
        self.statement_counter += 1;
    }

    pub fn statement_counter(&self) -> usize {
        self.statement_counter
    }

    pub fn reset(&mut self) {
        self.tables.clear();
        self.statement_counter = 0;
    }
}
