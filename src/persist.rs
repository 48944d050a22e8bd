// used for persistence
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{DynaqueryError, Result};
use crate::fragment::{FragmentDraft, FragmentKind, FragmentStore, QueryFragment, RawQueryText};
use crate::rule::{ConditionOperator, IndicatorRule, RuleDraft, RuleStore};

const SEED: &str = include_str!("seed.sql");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

impl PersistenceMode {
    /// `":memory:"` selects an in-memory database, anything else is a file path.
    pub fn from_location(location: &str) -> Self {
        if location.trim() == ":memory:" {
            PersistenceMode::InMemory
        } else {
            PersistenceMode::File(location.to_owned())
        }
    }
}

// ------------- Persistence -------------

/// Owns the SQLite connection holding fragments, indicator rules and the domain
/// tables that fragments are written against. Cloning shares the connection.
#[derive(Debug, Clone)]
pub struct Persistor {
    db: Arc<Mutex<Connection>>,
}

impl Persistor {
    pub fn new(mode: PersistenceMode) -> Result<Self> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        info!(?mode, "opened database");
        Self::with_connection(connection)
    }

    pub fn with_connection(connection: Connection) -> Result<Self> {
        // tables stay non-STRICT so that external SQLite tools can open the file
        let mut schema = String::new();
        for kind in FragmentKind::ALL {
            schema.push_str(&format!(
                "
            create table if not exists {table} (
                Fragment_Identity text not null,
                NameUnique text not null,
                Context text not null,
                QueryText text not null,
                Description text null,
                Active integer not null default 1,
                CreatedAt text not null,
                UpdatedAt text not null,
                constraint referenceable_{table}_Identity primary key (
                    Fragment_Identity
                ),
                constraint unique_{table}_NameUnique unique (
                    NameUnique
                )
            );-- STRICT;
            ",
                table = kind.table()
            ));
        }
        schema.push_str(
            "
            create table if not exists IndicatorRule (
                Rule_Identity text not null,
                RuleKey text not null,
                Name text not null,
                Description text null,
                Icon text not null,
                Context text not null,
                ConditionField text not null,
                ConditionOperator text not null,
                ConditionValue text null,
                Active integer not null default 1,
                DisplayOrder integer not null default 0,
                CreatedAt text not null,
                UpdatedAt text not null,
                constraint referenceable_IndicatorRule_Identity primary key (
                    Rule_Identity
                ),
                constraint unique_IndicatorRule_RuleKey unique (
                    RuleKey
                )
            );-- STRICT;
            create table if not exists customer (
                id text not null primary key,
                name text not null,
                trade_name text null,
                cnpj text not null unique,
                active integer not null default 1,
                blocked integer not null default 0,
                created_at text not null,
                updated_at text null,
                deleted_at text null
            );-- STRICT;
            ",
        );
        connection.execute_batch(&schema)?;
        Ok(Self {
            db: Arc::new(Mutex::new(connection)),
        })
    }

    /// The shared connection, also used by the query executor.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.db)
    }

    /// Installs the example customer fragments and rules. Safe to run repeatedly.
    pub fn seed(&self) -> Result<()> {
        let db = self.db.lock()?;
        db.execute_batch(SEED)?;
        info!("seeded example fragments and indicator rules");
        Ok(())
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ------------- Fragments -------------

const FRAGMENT_COLUMNS: &str =
    "Fragment_Identity, NameUnique, Context, QueryText, Description, Active, CreatedAt, UpdatedAt";

fn fragment_from_row(kind: FragmentKind, row: &Row) -> rusqlite::Result<QueryFragment> {
    Ok(QueryFragment {
        id: uuid_column(row, 0)?,
        kind,
        name_unique: row.get(1)?,
        context: row.get(2)?,
        text: RawQueryText::new(row.get::<_, String>(3)?),
        description: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn fragment_by_id(db: &Connection, kind: FragmentKind, id: Uuid) -> Result<Option<QueryFragment>> {
    let mut statement = db.prepare_cached(&format!(
        "
        select {FRAGMENT_COLUMNS}
            from {}
            where Fragment_Identity = ?
        ",
        kind.table()
    ))?;
    Ok(statement
        .query_row(params![id.to_string()], |r| fragment_from_row(kind, r))
        .optional()?)
}

impl FragmentStore for Persistor {
    fn find_active_by_name(&self, kind: FragmentKind, name: &str) -> Result<Option<QueryFragment>> {
        let db = self.db.lock()?;
        let mut statement = db.prepare_cached(&format!(
            "
            select {FRAGMENT_COLUMNS}
                from {}
                where NameUnique = ?
                and Active = 1
            ",
            kind.table()
        ))?;
        let found = statement
            .query_row(params![name], |r| fragment_from_row(kind, r))
            .optional()?;
        debug!(%kind, name, found = found.is_some(), "fragment lookup");
        Ok(found)
    }

    fn find_active_by_context(&self, kind: FragmentKind, context: &str) -> Result<Vec<QueryFragment>> {
        let db = self.db.lock()?;
        let mut statement = db.prepare_cached(&format!(
            "
            select {FRAGMENT_COLUMNS}
                from {}
                where Context = ?
                and Active = 1
                order by NameUnique
            ",
            kind.table()
        ))?;
        let fragments = statement
            .query_map(params![context], |r| fragment_from_row(kind, r))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fragments)
    }

    fn find_by_id(&self, kind: FragmentKind, id: Uuid) -> Result<Option<QueryFragment>> {
        let db = self.db.lock()?;
        fragment_by_id(&db, kind, id)
    }

    fn list(&self, kind: FragmentKind) -> Result<Vec<QueryFragment>> {
        let db = self.db.lock()?;
        let mut statement = db.prepare_cached(&format!(
            "
            select {FRAGMENT_COLUMNS}
                from {}
                order by Context, NameUnique
            ",
            kind.table()
        ))?;
        let fragments = statement
            .query_map([], |r| fragment_from_row(kind, r))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fragments)
    }

    fn save(&self, kind: FragmentKind, id: Option<Uuid>, draft: &FragmentDraft) -> Result<QueryFragment> {
        let db = self.db.lock()?;
        let stamp = now();
        let id = match id {
            None => {
                let id = Uuid::new_v4();
                db.prepare_cached(&format!(
                    "
                    insert into {} (
                        {FRAGMENT_COLUMNS}
                    ) values (?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                    kind.table()
                ))?
                .execute(params![
                    id.to_string(),
                    &draft.name_unique,
                    &draft.context,
                    draft.text.as_str(),
                    &draft.description,
                    draft.active.unwrap_or(true),
                    stamp,
                    stamp
                ])?;
                id
            }
            Some(id) => {
                let changed = db
                    .prepare_cached(&format!(
                        "
                        update {}
                            set NameUnique = ?,
                                Context = ?,
                                QueryText = ?,
                                Description = ?,
                                Active = coalesce(?, Active),
                                UpdatedAt = ?
                            where Fragment_Identity = ?
                        ",
                        kind.table()
                    ))?
                    .execute(params![
                        &draft.name_unique,
                        &draft.context,
                        draft.text.as_str(),
                        &draft.description,
                        draft.active,
                        stamp,
                        id.to_string()
                    ])?;
                if changed == 0 {
                    return Err(DynaqueryError::NotFound {
                        what: "Query fragment",
                        id: id.to_string(),
                    });
                }
                id
            }
        };
        fragment_by_id(&db, kind, id)?.ok_or_else(|| {
            DynaqueryError::Persistence(format!("{} fragment {} vanished after save", kind, id))
        })
    }

    fn delete(&self, kind: FragmentKind, id: Uuid) -> Result<bool> {
        let db = self.db.lock()?;
        let deleted = db
            .prepare_cached(&format!(
                "delete from {} where Fragment_Identity = ?",
                kind.table()
            ))?
            .execute(params![id.to_string()])?;
        Ok(deleted > 0)
    }
}

// ------------- Indicator rules -------------

const RULE_COLUMNS: &str = "Rule_Identity, RuleKey, Name, Description, Icon, Context, \
    ConditionField, ConditionOperator, ConditionValue, Active, DisplayOrder, CreatedAt, UpdatedAt";

/// A rule row before its operator has been checked.
struct RuleRow {
    id: Uuid,
    rule_key: String,
    name: String,
    description: Option<String>,
    icon: String,
    context: String,
    condition_field: String,
    condition_operator: String,
    condition_value: Option<String>,
    active: bool,
    display_order: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl RuleRow {
    fn into_rule(self, condition_operator: ConditionOperator) -> IndicatorRule {
        IndicatorRule {
            id: self.id,
            rule_key: self.rule_key,
            name: self.name,
            description: self.description,
            icon: self.icon,
            context: self.context,
            condition_field: self.condition_field,
            condition_operator,
            condition_value: self.condition_value,
            active: self.active,
            display_order: self.display_order,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn rule_row(row: &Row) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: uuid_column(row, 0)?,
        rule_key: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        context: row.get(5)?,
        condition_field: row.get(6)?,
        condition_operator: row.get(7)?,
        condition_value: row.get(8)?,
        active: row.get(9)?,
        display_order: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Runs a rule query, leaving out rows whose operator is not recognized.
fn load_rules(db: &Connection, filter: &str, values: &[&dyn rusqlite::ToSql]) -> Result<Vec<IndicatorRule>> {
    let mut statement = db.prepare_cached(&format!(
        "
        select {RULE_COLUMNS}
            from IndicatorRule
            {filter}
            order by DisplayOrder, RuleKey
        "
    ))?;
    let rows = statement
        .query_map(values, rule_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut rules = Vec::with_capacity(rows.len());
    for row in rows {
        match row.condition_operator.parse::<ConditionOperator>() {
            Ok(op) => rules.push(row.into_rule(op)),
            Err(e) => {
                error!(rule = %row.rule_key, error = %e, "skipping stored indicator rule");
            }
        }
    }
    Ok(rules)
}

fn rule_by_id(db: &Connection, id: Uuid) -> Result<Option<IndicatorRule>> {
    let id = id.to_string();
    Ok(load_rules(db, "where Rule_Identity = ?", &[&id])?.into_iter().next())
}

impl RuleStore for Persistor {
    fn find_active_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>> {
        let db = self.db.lock()?;
        load_rules(&db, "where Context = ? and Active = 1", &[&context])
    }

    fn find_by_context(&self, context: &str) -> Result<Vec<IndicatorRule>> {
        let db = self.db.lock()?;
        load_rules(&db, "where Context = ?", &[&context])
    }

    fn find_active(&self) -> Result<Vec<IndicatorRule>> {
        let db = self.db.lock()?;
        load_rules(&db, "where Active = 1", &[])
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<IndicatorRule>> {
        let db = self.db.lock()?;
        rule_by_id(&db, id)
    }

    fn list(&self) -> Result<Vec<IndicatorRule>> {
        let db = self.db.lock()?;
        load_rules(&db, "", &[])
    }

    fn save(&self, id: Option<Uuid>, draft: &RuleDraft) -> Result<IndicatorRule> {
        let db = self.db.lock()?;
        let stamp = now();
        let id = match id {
            None => {
                let id = Uuid::new_v4();
                db.prepare_cached(&format!(
                    "
                    insert into IndicatorRule (
                        {RULE_COLUMNS}
                    ) values (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "
                ))?
                .execute(params![
                    id.to_string(),
                    &draft.rule_key,
                    &draft.name,
                    &draft.description,
                    &draft.icon,
                    &draft.context,
                    &draft.condition_field,
                    draft.condition_operator.as_str(),
                    &draft.condition_value,
                    draft.active.unwrap_or(true),
                    draft.display_order.unwrap_or(0),
                    stamp,
                    stamp
                ])?;
                id
            }
            Some(id) => {
                let changed = db
                    .prepare_cached(
                        "
                        update IndicatorRule
                            set RuleKey = ?,
                                Name = ?,
                                Description = ?,
                                Icon = ?,
                                Context = ?,
                                ConditionField = ?,
                                ConditionOperator = ?,
                                ConditionValue = ?,
                                Active = coalesce(?, Active),
                                DisplayOrder = coalesce(?, DisplayOrder),
                                UpdatedAt = ?
                            where Rule_Identity = ?
                        ",
                    )?
                    .execute(params![
                        &draft.rule_key,
                        &draft.name,
                        &draft.description,
                        &draft.icon,
                        &draft.context,
                        &draft.condition_field,
                        draft.condition_operator.as_str(),
                        &draft.condition_value,
                        draft.active,
                        draft.display_order,
                        stamp,
                        id.to_string()
                    ])?;
                if changed == 0 {
                    return Err(DynaqueryError::NotFound {
                        what: "Indicator rule",
                        id: id.to_string(),
                    });
                }
                id
            }
        };
        rule_by_id(&db, id)?.ok_or_else(|| {
            DynaqueryError::Persistence(format!("indicator rule {} vanished after save", id))
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let db = self.db.lock()?;
        let deleted = db
            .prepare_cached("delete from IndicatorRule where Rule_Identity = ?")?
            .execute(params![id.to_string()])?;
        Ok(deleted > 0)
    }
}
