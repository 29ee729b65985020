//! Column provenance from compiled SQL.
//!
//! Given one model's compiled SQL, work out which upstream model columns each
//! of its output columns reads. Only the outermost SELECT's projection is
//! inspected; relations referenced anywhere in the statement (CTE bodies,
//! derived tables, joins) take part in resolving column references.
//!
//! Inference is best-effort. Nothing in here returns an error or panics: an
//! unparseable statement is reported through [`Inference::parsed`] and the
//! caller falls back to name matching.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, Expr, Ident, ObjectName, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, Visit, Visitor,
};
use sqlparser::parser::Parser;
use tracing::debug;

use super::dialect::Dialect;
use super::relation::{normalize_relation, RelationLookup};

/// Column names declared for each model, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct KnownColumns {
    by_model: HashMap<String, HashMap<String, String>>,
}

impl KnownColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model's columns.
    pub fn insert_model<I, S>(&mut self, model_id: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.by_model.entry(model_id.to_string()).or_default();
        for column in columns {
            let column = column.as_ref();
            entry
                .entry(column.to_lowercase())
                .or_insert_with(|| column.to_string());
        }
    }

    /// The declared spelling of `column` on `model_id`, if it exists.
    pub fn resolve(&self, model_id: &str, column: &str) -> Option<&str> {
        self.by_model
            .get(model_id)
            .and_then(|columns| columns.get(&column.to_lowercase()))
            .map(String::as_str)
    }
}

/// One inferred flow from an upstream column into an output column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnFlow {
    pub source_model: String,
    pub source_column: String,
    pub target_column: String,
}

/// Result of inspecting one statement.
#[derive(Debug, Clone, Default)]
pub struct Inference {
    /// Sorted, de-duplicated flows.
    pub edges: Vec<ColumnFlow>,
    /// The statement parsed and contained a SELECT.
    pub parsed: bool,
}

impl Inference {
    fn unparsed() -> Self {
        Self::default()
    }
}

/// Infer column flows for one model.
///
/// `output_columns` are the model's own known columns; projections whose
/// output name matches none of them are ignored.
pub fn infer<'a, I>(
    compiled_sql: &str,
    output_columns: I,
    relations: &RelationLookup,
    known: &KnownColumns,
    dialect: Dialect,
) -> Inference
where
    I: IntoIterator<Item = &'a str>,
{
    let statements = match Parser::parse_sql(&*dialect.parser_dialect(), compiled_sql) {
        Ok(statements) => statements,
        Err(err) => {
            debug!(dialect = dialect.name(), error = %err, "compiled SQL did not parse");
            return Inference::unparsed();
        }
    };

    let Some((statement, select)) = statements
        .iter()
        .find_map(|s| statement_query(s).and_then(|q| outermost_select(&q.body)).map(|sel| (s, sel)))
    else {
        return Inference::unparsed();
    };

    let outputs: HashMap<String, &str> = output_columns
        .into_iter()
        .map(|name| (name.to_lowercase(), name))
        .collect();

    let mut tables = TableCollector::default();
    let _ = statement.visit(&mut tables);

    let referenced: HashSet<&str> = tables
        .tables
        .iter()
        .filter_map(|table| resolve_table(relations, table))
        .collect();
    let mut referenced: Vec<&str> = referenced.into_iter().collect();
    referenced.sort_unstable();

    let mut edges: BTreeSet<ColumnFlow> = BTreeSet::new();

    for item in &select.projection {
        let (expr, output_name) = match item {
            SelectItem::UnnamedExpr(expr) => (expr, expression_name(expr)),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
            _ => continue,
        };
        let Some(output_name) = output_name else {
            continue;
        };
        let Some(target_column) = outputs.get(&output_name.to_lowercase()) else {
            continue;
        };

        for reference in column_references(expr) {
            let source_model = match reference.qualifier.as_slice() {
                [] => {
                    let candidates: Vec<&str> = referenced
                        .iter()
                        .copied()
                        .filter(|model| known.resolve(model, &reference.name).is_some())
                        .collect();
                    match candidates.as_slice() {
                        [only] => Some(*only),
                        _ => None,
                    }
                }
                qualifier => resolve_qualifier(qualifier, &tables.aliases, relations),
            };
            let Some(source_model) = source_model else {
                continue;
            };
            let Some(source_column) = known.resolve(source_model, &reference.name) else {
                continue;
            };
            edges.insert(ColumnFlow {
                source_model: source_model.to_string(),
                source_column: source_column.to_string(),
                target_column: target_column.to_string(),
            });
        }
    }

    Inference {
        edges: edges.into_iter().collect(),
        parsed: true,
    }
}

// =============================================================================
// AST helpers
// =============================================================================

fn statement_query(statement: &Statement) -> Option<&Query> {
    match statement {
        Statement::Query(query) => Some(query.as_ref()),
        Statement::CreateTable(create) => create.query.as_deref(),
        Statement::CreateView { query, .. } => Some(query.as_ref()),
        Statement::Insert(insert) => insert.source.as_deref(),
        _ => None,
    }
}

/// The SELECT that defines the statement's output columns.
fn outermost_select(body: &SetExpr) -> Option<&Select> {
    match body {
        SetExpr::Select(select) => Some(select.as_ref()),
        SetExpr::Query(query) => outermost_select(&query.body),
        SetExpr::SetOperation { left, .. } => outermost_select(left),
        _ => None,
    }
}

/// Name a projection gets without an explicit alias.
fn expression_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|ident| ident.value.clone()),
        _ => None,
    }
}

/// Every relation named in the statement, with alias -> relation.
#[derive(Debug, Default)]
struct TableCollector {
    aliases: HashMap<String, String>,
    tables: Vec<String>,
}

impl Visitor for TableCollector {
    type Break = ();

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table { name, alias, .. } = factor {
            let table = name.to_string();
            let key = match alias {
                Some(alias) => alias.name.value.clone(),
                None => last_part(name),
            };
            self.aliases.insert(key.to_lowercase(), table.clone());
            self.tables.push(table);
        }
        ControlFlow::Continue(())
    }
}

fn last_part(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

/// Resolve a table reference by its full name, then by its last segment.
fn resolve_table<'a>(relations: &'a RelationLookup, table: &str) -> Option<&'a str> {
    relations.resolve(table).or_else(|| {
        let normalized = normalize_relation(table)?;
        let (_, last) = normalized.rsplit_once('.')?;
        relations.resolve(last)
    })
}

fn resolve_qualifier<'a>(
    qualifier: &[String],
    aliases: &HashMap<String, String>,
    relations: &'a RelationLookup,
) -> Option<&'a str> {
    let last = qualifier.last()?;
    if qualifier.len() > 1 {
        if let Some(model) = relations.resolve(&qualifier.join(".")) {
            return Some(model);
        }
    }
    let table = aliases
        .get(&last.to_lowercase())
        .map(String::as_str)
        .unwrap_or(last);
    resolve_table(relations, table)
}

#[derive(Debug)]
struct ColumnReference {
    qualifier: Vec<String>,
    name: String,
}

/// Column references anywhere in an expression tree.
fn column_references(expr: &Expr) -> Vec<ColumnReference> {
    let mut references = Vec::new();
    let _ = visit_expressions(expr, |e| {
        match e {
            Expr::Identifier(ident) => references.push(ColumnReference {
                qualifier: Vec::new(),
                name: ident.value.clone(),
            }),
            Expr::CompoundIdentifier(parts) => {
                if let Some((name, qualifier)) = parts.split_last() {
                    references.push(ColumnReference {
                        qualifier: qualifier.iter().map(ident_value).collect(),
                        name: name.value.clone(),
                    });
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });
    references
}

fn ident_value(ident: &Ident) -> String {
    ident.value.clone()
}
