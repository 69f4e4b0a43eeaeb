//! Statement Classifier (C2): tags a parsed `Statement` with a
//! `StatementKind` and extracts the target table / query body an analyzer
//! needs without re-matching the AST itself.

use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, TableObject};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    WithCte,
    CreateTable,
    CreateView,
    CreateTableAs,
    CreateTempTable,
    InsertIntoSelect,
    Drop,
    Update,
    Delete,
    Unsupported,
    Unknown,
}

impl StatementKind {
    /// Kinds the analyzer pipeline actually runs (spec.md §4.2).
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            StatementKind::Select
                | StatementKind::CreateTableAs
                | StatementKind::CreateTempTable
                | StatementKind::CreateView
                | StatementKind::InsertIntoSelect
                | StatementKind::WithCte
        )
    }
}

#[derive(Debug, Clone)]
pub struct ClassifiedStatement {
    pub kind: StatementKind,
    pub raw_sql: String,
    pub index: usize,
    pub target_table: Option<String>,
    pub query_ast: Option<Query>,
    pub is_temporary: bool,
    /// Explicit `INSERT INTO t (a, b, ...)` column list, if the statement gave
    /// one. Empty for every other statement kind and for an implicit-column
    /// `INSERT INTO t SELECT ...`.
    pub insert_columns: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

fn insert_target_name(table: &TableObject) -> Option<String> {
    match table {
        TableObject::TableName(name) => Some(object_name_to_string(name)),
        _ => None,
    }
}

/// Classifies a single parsed statement (spec.md §4.2).
pub fn classify(statement: &Statement, raw_sql: &str, index: usize) -> ClassifiedStatement {
    let mut metadata = BTreeMap::new();

    match statement {
        Statement::Query(query) => {
            let kind = if query.with.is_some() {
                StatementKind::WithCte
            } else {
                StatementKind::Select
            };
            ClassifiedStatement {
                kind,
                raw_sql: raw_sql.to_string(),
                index,
                target_table: None,
                query_ast: Some((**query).clone()),
                is_temporary: false,
                insert_columns: Vec::new(),
                metadata,
            }
        }

        Statement::CreateView { name, query, .. } => ClassifiedStatement {
            kind: StatementKind::CreateView,
            raw_sql: raw_sql.to_string(),
            index,
            target_table: Some(object_name_to_string(name)),
            query_ast: Some((**query).clone()),
            is_temporary: false,
            insert_columns: Vec::new(),
            metadata,
        },

        Statement::CreateTable(create) => {
            let target_table = Some(object_name_to_string(&create.name));
            match &create.query {
                Some(query) => {
                    let kind = if create.temporary {
                        StatementKind::CreateTempTable
                    } else {
                        StatementKind::CreateTableAs
                    };
                    ClassifiedStatement {
                        kind,
                        raw_sql: raw_sql.to_string(),
                        index,
                        target_table,
                        query_ast: Some((**query).clone()),
                        is_temporary: create.temporary,
                        insert_columns: Vec::new(),
                        metadata,
                    }
                }
                None => ClassifiedStatement {
                    kind: StatementKind::CreateTable,
                    raw_sql: raw_sql.to_string(),
                    index,
                    target_table,
                    query_ast: None,
                    is_temporary: create.temporary,
                    insert_columns: Vec::new(),
                    metadata,
                },
            }
        }

        Statement::Insert(insert) => {
            let target_table = insert_target_name(&insert.table);
            let insert_columns: Vec<String> =
                insert.columns.iter().map(|ident| ident.value.clone()).collect();
            match &insert.source {
                Some(source) if matches!(&*source.body, SetExpr::Select(_) | SetExpr::SetOperation { .. } | SetExpr::Query(_)) => {
                    ClassifiedStatement {
                        kind: StatementKind::InsertIntoSelect,
                        raw_sql: raw_sql.to_string(),
                        index,
                        target_table,
                        query_ast: Some((**source).clone()),
                        is_temporary: false,
                        insert_columns,
                        metadata,
                    }
                }
                _ => {
                    metadata.insert("reason".to_string(), "values not supported".to_string());
                    ClassifiedStatement {
                        kind: StatementKind::Unsupported,
                        raw_sql: raw_sql.to_string(),
                        index,
                        target_table,
                        query_ast: None,
                        is_temporary: false,
                        insert_columns,
                        metadata,
                    }
                }
            }
        }

        Statement::Drop { .. } => ClassifiedStatement {
            kind: StatementKind::Drop,
            raw_sql: raw_sql.to_string(),
            index,
            target_table: None,
            query_ast: None,
            is_temporary: false,
            insert_columns: Vec::new(),
            metadata,
        },

        Statement::Update { .. } => ClassifiedStatement {
            kind: StatementKind::Update,
            raw_sql: raw_sql.to_string(),
            index,
            target_table: None,
            query_ast: None,
            is_temporary: false,
            insert_columns: Vec::new(),
            metadata,
        },

        Statement::Delete(_) => ClassifiedStatement {
            kind: StatementKind::Delete,
            raw_sql: raw_sql.to_string(),
            index,
            target_table: None,
            query_ast: None,
            is_temporary: false,
            insert_columns: Vec::new(),
            metadata,
        },

        _ => ClassifiedStatement {
            kind: StatementKind::Unknown,
            raw_sql: raw_sql.to_string(),
            index,
            target_table: None,
            query_ast: None,
            is_temporary: false,
            insert_columns: Vec::new(),
            metadata,
        },
    }
}

impl ClassifiedStatement {
    pub fn is_supported_kind(&self) -> bool {
        self.kind.is_supported()
    }
}
