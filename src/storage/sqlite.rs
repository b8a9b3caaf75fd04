//! SQLite storage backend

use super::traits::{
    EntityFilter, EntityStore, OpenStore, PredicateOp, StorageError, StorageResult,
};
use crate::entity::{Attributes, DataSourceId, EntityKind, LocalEntity, LocalId};
use chrono::Utc;
use rusqlite::types::Null;
use rusqlite::{params, Connection, ToSql};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

type SqlParams = Vec<Box<dyn ToSql>>;

/// SQLite-backed entity store
///
/// All entity kinds share one table; kind-specific fields live in a JSON
/// attributes column and are filtered with `json_extract`. Thread-safe via
/// internal mutex on the connection.
///
/// The (kind, data source, origin id) key is indexed but not unique; the
/// upsert engine reports duplicates as a data integrity error.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT NOT NULL,
                kind TEXT NOT NULL,
                data_source TEXT NOT NULL,
                origin_id TEXT,
                attributes_json TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE INDEX IF NOT EXISTS idx_entities_origin
                ON entities(kind, data_source, origin_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Build the WHERE clause and its parameters for a filter.
    fn where_clause(filter: &EntityFilter) -> (String, SqlParams) {
        let mut sql = String::from(" WHERE kind = ?");
        let mut params_vec: SqlParams = vec![Box::new(filter.kind.as_str().to_string())];

        if let Some(ref data_source) = filter.data_source {
            sql.push_str(" AND data_source = ?");
            params_vec.push(Box::new(data_source.as_str().to_string()));
        }

        if let Some(ref data_source) = filter.exclude_data_source {
            sql.push_str(" AND data_source != ?");
            params_vec.push(Box::new(data_source.as_str().to_string()));
        }

        if let Some(ref origin_id) = filter.origin_id {
            sql.push_str(" AND origin_id = ?");
            params_vec.push(Box::new(origin_id.clone()));
        }

        if let Some(ref ids) = filter.ids {
            if ids.is_empty() {
                sql.push_str(" AND 0");
            } else {
                let placeholders = vec!["?"; ids.len()].join(", ");
                sql.push_str(&format!(" AND id IN ({})", placeholders));
                for id in ids {
                    params_vec.push(Box::new(id.as_str().to_string()));
                }
            }
        }

        for predicate in &filter.predicates {
            let op = match predicate.op {
                PredicateOp::Eq => "IS",
                PredicateOp::Ne => "IS NOT",
                PredicateOp::Lt => "<",
            };
            sql.push_str(&format!(" AND json_extract(attributes_json, ?) {} ?", op));
            params_vec.push(Box::new(format!("$.\"{}\"", predicate.field)));
            params_vec.push(json_to_sql(&predicate.value));
        }

        (sql, params_vec)
    }

    fn query_locked(conn: &Connection, filter: &EntityFilter) -> StorageResult<Vec<LocalEntity>> {
        let (clause, params_vec) = Self::where_clause(filter);
        let sql = format!(
            "SELECT id, kind, data_source, origin_id, attributes_json, metadata_json FROM entities{} ORDER BY rowid",
            clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, kind, data_source, origin_id, attributes, metadata) = row?;
            entities.push(Self::row_to_entity(id, kind, data_source, origin_id, attributes, metadata)?);
        }
        Ok(entities)
    }

    /// Deserialize an entity from database columns
    fn row_to_entity(
        id: String,
        kind: String,
        data_source: String,
        origin_id: Option<String>,
        attributes_json: String,
        metadata_json: String,
    ) -> StorageResult<LocalEntity> {
        Ok(LocalEntity {
            id: LocalId::from_string(id),
            kind: EntityKind::parse(&kind).ok_or(StorageError::UnknownKind(kind))?,
            data_source: DataSourceId::from_string(data_source),
            origin_id,
            attributes: serde_json::from_str(&attributes_json)?,
            metadata: serde_json::from_str(&metadata_json)?,
        })
    }
}

/// Bind a JSON value the way `json_extract` reports it.
fn json_to_sql(value: &Value) -> Box<dyn ToSql> {
    match value {
        Value::Null => Box::new(Null),
        Value::Bool(b) => Box::new(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Box::new(i),
            None => Box::new(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl EntityStore for SqliteStore {
    fn create(&self, entity: &LocalEntity) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO entities (id, kind, data_source, origin_id, attributes_json, metadata_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entity.id.as_str(),
                entity.kind.as_str(),
                entity.data_source.as_str(),
                entity.origin_id,
                serde_json::to_string(&entity.attributes)?,
                serde_json::to_string(&entity.metadata)?,
            ],
        )?;
        Ok(())
    }

    fn update(&self, filter: &EntityFilter, attributes: &Attributes) -> StorageResult<usize> {
        let conn = self.lock()?;
        let matching = Self::query_locked(&conn, filter)?;
        let now = Utc::now();

        for mut entity in matching.iter().cloned() {
            entity.attributes.extend(attributes.clone());
            entity.metadata.modified_at = Some(now);
            conn.execute(
                "UPDATE entities SET attributes_json = ?1, metadata_json = ?2 WHERE kind = ?3 AND id = ?4",
                params![
                    serde_json::to_string(&entity.attributes)?,
                    serde_json::to_string(&entity.metadata)?,
                    entity.kind.as_str(),
                    entity.id.as_str(),
                ],
            )?;
        }

        Ok(matching.len())
    }

    fn count(&self, filter: &EntityFilter) -> StorageResult<usize> {
        let conn = self.lock()?;
        let (clause, params_vec) = Self::where_clause(filter);
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM entities{}", clause),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn query(&self, filter: &EntityFilter) -> StorageResult<Vec<LocalEntity>> {
        let conn = self.lock()?;
        Self::query_locked(&conn, filter)
    }

    fn delete(&self, filter: &EntityFilter) -> StorageResult<usize> {
        let conn = self.lock()?;
        let (clause, params_vec) = Self::where_clause(filter);
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = conn.execute(&format!("DELETE FROM entities{}", clause), params_refs.as_slice())?;
        Ok(rows)
    }

    fn begin(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        if !conn.is_autocommit() {
            return Err(StorageError::Transaction("transaction already open".to_string()));
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> StorageResult<()> {
        self.lock()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> StorageResult<()> {
        self.lock()?.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
