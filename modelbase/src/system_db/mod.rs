use crate::error::{ModelbaseError, Result};
use crate::object::{DataObject, ObjectData};
use crate::registry::{Model, Property, ValidationRuleset};
use crate::value::FieldValue;
use crate::workflow::{Workflow, WorkflowState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::path::Path;

/// The SQLite database holding definitions, objects and migration history.
pub struct SystemDb {
    conn: Connection,
}

impl SystemDb {
    /// Open or create the system database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = SystemDb { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Open an in-memory system database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = SystemDb { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rulesets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                regex_pattern TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                states_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS models (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                namespace TEXT,
                description TEXT,
                display_properties_json TEXT NOT NULL,
                workflow_id TEXT
            );

            CREATE TABLE IF NOT EXISTS properties (
                id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                name TEXT NOT NULL,
                order_index INTEGER NOT NULL,
                definition_json TEXT NOT NULL,
                PRIMARY KEY (model_id, id)
            );

            CREATE TABLE IF NOT EXISTS objects (
                id TEXT PRIMARY KEY,
                model_id TEXT NOT NULL,
                owner_id TEXT,
                current_state_id TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                data_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_objects_model ON objects(model_id);

            CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id TEXT NOT NULL,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    // ── Primitives ───────────────────────────────────────────────────

    /// First row of a query, if any.
    pub fn get<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    /// Every row of a query.
    pub fn all<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Execute a statement, returning the number of rows changed.
    pub fn run<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    // ── Rulesets ─────────────────────────────────────────────────────

    pub fn save_ruleset(&self, ruleset: &ValidationRuleset) -> Result<()> {
        self.run(
            "INSERT OR REPLACE INTO rulesets (id, name, description, regex_pattern)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                ruleset.id,
                ruleset.name,
                ruleset.description,
                ruleset.regex_pattern
            ],
        )?;
        Ok(())
    }

    pub fn list_rulesets(&self) -> Result<Vec<ValidationRuleset>> {
        self.all(
            "SELECT id, name, description, regex_pattern FROM rulesets ORDER BY id",
            [],
            |row| {
                Ok(ValidationRuleset {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    regex_pattern: row.get(3)?,
                })
            },
        )
    }

    /// Returns whether a row was removed.
    pub fn delete_ruleset(&self, id: &str) -> Result<bool> {
        Ok(self.run("DELETE FROM rulesets WHERE id = ?1", params![id])? > 0)
    }

    // ── Workflows ────────────────────────────────────────────────────

    pub fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let states_json = serde_json::to_string(&workflow.states)?;
        self.run(
            "INSERT OR REPLACE INTO workflows (id, name, states_json) VALUES (?1, ?2, ?3)",
            params![workflow.id, workflow.name, states_json],
        )?;
        Ok(())
    }

    pub fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = self.all(
            "SELECT id, name, states_json FROM workflows ORDER BY id",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )?;

        rows.into_iter()
            .map(|(id, name, states_json)| {
                let states: Vec<WorkflowState> = serde_json::from_str(&states_json)?;
                Ok(Workflow { id, name, states })
            })
            .collect()
    }

    pub fn delete_workflow(&self, id: &str) -> Result<bool> {
        Ok(self.run("DELETE FROM workflows WHERE id = ?1", params![id])? > 0)
    }

    // ── Models ───────────────────────────────────────────────────────

    /// Upsert a model and replace its property rows wholesale.
    pub fn save_model(&self, model: &Model) -> Result<()> {
        let display_json = serde_json::to_string(&model.display_properties)?;
        self.run(
            "INSERT INTO models (id, name, namespace, description, display_properties_json, workflow_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                namespace = excluded.namespace,
                description = excluded.description,
                display_properties_json = excluded.display_properties_json,
                workflow_id = excluded.workflow_id",
            params![
                model.id,
                model.name,
                model.namespace,
                model.description,
                display_json,
                model.workflow_id
            ],
        )?;

        self.run("DELETE FROM properties WHERE model_id = ?1", params![model.id])?;
        for property in &model.properties {
            let definition_json = serde_json::to_string(property)?;
            self.run(
                "INSERT INTO properties (id, model_id, name, order_index, definition_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    property.id,
                    model.id,
                    property.name,
                    property.order_index,
                    definition_json
                ],
            )?;
        }
        Ok(())
    }

    pub fn list_models(&self) -> Result<Vec<Model>> {
        let rows = self.all(
            "SELECT id, name, namespace, description, display_properties_json, workflow_id
             FROM models ORDER BY id",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )?;

        let mut models = Vec::with_capacity(rows.len());
        for (id, name, namespace, description, display_json, workflow_id) in rows {
            let properties = self.list_properties(&id)?;
            models.push(Model {
                display_properties: serde_json::from_str(&display_json)?,
                id,
                name,
                namespace,
                description,
                properties,
                workflow_id,
            });
        }
        Ok(models)
    }

    fn list_properties(&self, model_id: &str) -> Result<Vec<Property>> {
        let rows = self.all(
            "SELECT definition_json FROM properties WHERE model_id = ?1 ORDER BY order_index, rowid",
            params![model_id],
            |row| row.get::<_, String>(0),
        )?;
        rows.iter()
            .map(|json| Ok(serde_json::from_str(json)?))
            .collect()
    }

    /// Remove a model, its properties and all of its objects.
    pub fn delete_model(&self, id: &str) -> Result<usize> {
        self.run("DELETE FROM properties WHERE model_id = ?1", params![id])?;
        let objects = self.run("DELETE FROM objects WHERE model_id = ?1", params![id])?;
        self.run("DELETE FROM models WHERE id = ?1", params![id])?;
        Ok(objects)
    }

    // ── Objects ──────────────────────────────────────────────────────

    pub fn insert_object(&self, object: &DataObject) -> Result<()> {
        let data_json = encode_values(&object.values)?;
        self.run(
            "INSERT INTO objects
                (id, model_id, owner_id, current_state_id, is_deleted, deleted_at, created_at, updated_at, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                object.id,
                object.model_id,
                object.owner_id,
                object.current_state_id,
                object.is_deleted,
                object.deleted_at.map(|d| d.to_rfc3339()),
                object.created_at.to_rfc3339(),
                object.updated_at.to_rfc3339(),
                data_json
            ],
        )?;
        Ok(())
    }

    /// Write back every mutable column of an existing object.
    pub fn update_object(&self, object: &DataObject) -> Result<()> {
        let data_json = encode_values(&object.values)?;
        let changed = self.run(
            "UPDATE objects SET
                owner_id = ?3, current_state_id = ?4, is_deleted = ?5, deleted_at = ?6,
                updated_at = ?7, data_json = ?8
             WHERE model_id = ?1 AND id = ?2",
            params![
                object.model_id,
                object.id,
                object.owner_id,
                object.current_state_id,
                object.is_deleted,
                object.deleted_at.map(|d| d.to_rfc3339()),
                object.updated_at.to_rfc3339(),
                data_json
            ],
        )?;
        if changed == 0 {
            return Err(ModelbaseError::ObjectNotFound {
                model: object.model_id.clone(),
                id: object.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_object(&self, model_id: &str, id: &str) -> Result<Option<ObjectRecord>> {
        self.get(
            &format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE model_id = ?1 AND id = ?2"),
            params![model_id, id],
            ObjectRecord::from_row,
        )
    }

    pub fn list_objects(&self, model_id: &str, include_deleted: bool) -> Result<Vec<ObjectRecord>> {
        self.all(
            &format!(
                "SELECT {OBJECT_COLUMNS} FROM objects
                 WHERE model_id = ?1 AND (?2 OR is_deleted = 0)
                 ORDER BY created_at, id"
            ),
            params![model_id, include_deleted],
            ObjectRecord::from_row,
        )
    }

    /// Id of another live object of the model whose property already holds
    /// `value`.
    pub fn find_unique_conflict(
        &self,
        model_id: &str,
        property_id: &str,
        value: &str,
        exclude_id: &str,
    ) -> Result<Option<String>> {
        self.get(
            "SELECT id FROM objects
             WHERE model_id = ?1 AND is_deleted = 0 AND id != ?2
               AND json_extract(data_json, ?3) = ?4
             LIMIT 1",
            params![model_id, exclude_id, json_path(property_id), value],
            |row| row.get(0),
        )
    }

    /// How many objects of the model hold a value for the property.
    pub fn count_values(&self, model_id: &str, property_id: &str) -> Result<usize> {
        let count: Option<i64> = self.get(
            "SELECT COUNT(*) FROM objects
             WHERE model_id = ?1 AND json_type(data_json, ?2) IS NOT NULL
               AND json_type(data_json, ?2) != 'null'",
            params![model_id, json_path(property_id)],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0) as usize)
    }

    /// Drop a property's stored values from every object of the model.
    pub fn purge_property(&self, model_id: &str, property_id: &str) -> Result<usize> {
        let path = json_path(property_id);
        self.run(
            "UPDATE objects SET data_json = json_remove(data_json, ?2)
             WHERE model_id = ?1 AND json_type(data_json, ?2) IS NOT NULL",
            params![model_id, path],
        )
    }

    /// Write `value` into every object of the model that has no value for
    /// the property yet. Existing keys are never overwritten.
    pub fn backfill_property(
        &self,
        model_id: &str,
        property_id: &str,
        value: &FieldValue,
    ) -> Result<usize> {
        let path = json_path(property_id);
        self.run(
            "UPDATE objects SET data_json = json_set(data_json, ?2, json(?3))
             WHERE model_id = ?1 AND json_type(data_json, ?2) IS NULL",
            params![model_id, path, value.to_json()?.to_string()],
        )
    }

    pub fn count_objects(&self, model_id: &str) -> Result<usize> {
        let count: Option<i64> = self.get(
            "SELECT COUNT(*) FROM objects WHERE model_id = ?1 AND is_deleted = 0",
            params![model_id],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0) as usize)
    }

    // ── Migrations ───────────────────────────────────────────────────

    pub fn record_migration(&self, model_id: &str, description: &str) -> Result<()> {
        self.run(
            "INSERT INTO migrations (model_id, description) VALUES (?1, ?2)",
            params![model_id, description],
        )?;
        Ok(())
    }

    /// Recorded migrations as `(model_id, description)`, oldest first.
    pub fn list_migrations(&self) -> Result<Vec<(String, String)>> {
        self.all(
            "SELECT model_id, description FROM migrations ORDER BY id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    // ── Transaction Support ──────────────────────────────────────────

    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback_transaction() {
                    log::error!("Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }
}

const OBJECT_COLUMNS: &str = "id, model_id, owner_id, current_state_id, is_deleted, deleted_at, created_at, updated_at, data_json";

fn json_path(property_id: &str) -> String {
    format!("$.\"{}\"", property_id.replace('"', "\\\""))
}

fn encode_values(values: &ObjectData) -> Result<String> {
    let mut map = serde_json::Map::new();
    for (property_id, value) in values {
        map.insert(property_id.clone(), value.to_json()?);
    }
    Ok(serde_json::Value::Object(map).to_string())
}

/// A row of the objects table.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: String,
    pub model_id: String,
    pub owner_id: Option<String>,
    pub current_state_id: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub data_json: String,
}

impl ObjectRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ObjectRecord {
            id: row.get(0)?,
            model_id: row.get(1)?,
            owner_id: row.get(2)?,
            current_state_id: row.get(3)?,
            is_deleted: row.get(4)?,
            deleted_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            data_json: row.get(8)?,
        })
    }

    /// Decode into a typed object. Keys the model no longer defines, and
    /// values whose shape no longer fits their property, are left out.
    pub fn decode(&self, model: &Model) -> Result<DataObject> {
        let stored: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&self.data_json)?;

        let mut values = ObjectData::new();
        for (property_id, json) in &stored {
            let Some(property) = model.property_by_id(property_id) else {
                continue;
            };
            match FieldValue::from_stored(&property.kind, json) {
                Some(value) => {
                    values.insert(property_id.clone(), value);
                }
                None if json.is_null() => {}
                None => log::warn!(
                    "Object {} has an undecodable value for '{}'; ignoring it",
                    self.id,
                    property.name
                ),
            }
        }

        Ok(DataObject {
            id: self.id.clone(),
            model_id: self.model_id.clone(),
            owner_id: self.owner_id.clone(),
            current_state_id: self.current_state_id.clone(),
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            values,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ModelbaseError::Other(format!("Bad stored timestamp '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::parse_definitions_str;
    use crate::value::RelationshipValue;

    fn contacts() -> Model {
        let bundle = parse_definitions_str(
            r#"
models:
  - id: m-contact
    name: Contact
    display_properties: [Name]
    properties:
      - { id: p-name, name: Name, type: string, required: true }
      - { id: p-email, name: Email, type: string, is_unique: true, order_index: 1 }
      - { id: p-friends, name: Friends, type: relationship, related_model_id: m-contact, relationship_type: many, order_index: 2 }
"#,
        )
        .unwrap();
        bundle.models.into_iter().next().unwrap()
    }

    fn contact(name: &str, email: &str) -> DataObject {
        let mut o = DataObject::new("m-contact", None, Utc::now());
        o.values.insert("p-name".into(), FieldValue::String(name.into()));
        o.values.insert("p-email".into(), FieldValue::String(email.into()));
        o
    }

    #[test]
    fn test_model_round_trip() {
        let db = SystemDb::open_in_memory().unwrap();
        let model = contacts();
        db.save_model(&model).unwrap();

        let loaded = db.list_models().unwrap();
        assert_eq!(loaded.len(), 1);
        pretty_assertions::assert_eq!(loaded[0], model);

        // Saving again replaces the property rows
        let mut trimmed = model.clone();
        trimmed.properties.truncate(1);
        trimmed.display_properties.clear();
        db.save_model(&trimmed).unwrap();
        assert_eq!(db.list_models().unwrap()[0].properties.len(), 1);
    }

    #[test]
    fn test_object_round_trip() {
        let db = SystemDb::open_in_memory().unwrap();
        let model = contacts();

        let mut ada = contact("Ada", "ada@example.com");
        ada.values.insert(
            "p-friends".into(),
            FieldValue::Relationship(RelationshipValue::Many(vec!["x".into()])),
        );
        db.insert_object(&ada).unwrap();

        let record = db.get_object("m-contact", &ada.id).unwrap().unwrap();
        let decoded = record.decode(&model).unwrap();
        assert_eq!(decoded.values, ada.values);
        assert_eq!(decoded.created_at.timestamp(), ada.created_at.timestamp());

        assert!(db.get_object("m-other", &ada.id).unwrap().is_none());
    }

    #[test]
    fn test_soft_deleted_hidden_from_list() {
        let db = SystemDb::open_in_memory().unwrap();
        let mut a = contact("A", "a@example.com");
        let b = contact("B", "b@example.com");
        db.insert_object(&a).unwrap();
        db.insert_object(&b).unwrap();

        a.is_deleted = true;
        a.deleted_at = Some(Utc::now());
        db.update_object(&a).unwrap();

        assert_eq!(db.list_objects("m-contact", false).unwrap().len(), 1);
        assert_eq!(db.list_objects("m-contact", true).unwrap().len(), 2);
        assert_eq!(db.count_objects("m-contact").unwrap(), 1);
    }

    #[test]
    fn test_unique_conflict_ignores_self_and_deleted() {
        let db = SystemDb::open_in_memory().unwrap();
        let a = contact("A", "same@example.com");
        let mut b = contact("B", "same@example.com");
        db.insert_object(&a).unwrap();
        db.insert_object(&b).unwrap();

        let hit = db
            .find_unique_conflict("m-contact", "p-email", "same@example.com", &a.id)
            .unwrap();
        assert_eq!(hit, Some(b.id.clone()));

        b.is_deleted = true;
        db.update_object(&b).unwrap();
        let hit = db
            .find_unique_conflict("m-contact", "p-email", "same@example.com", &a.id)
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn test_purge_and_count_values() {
        let db = SystemDb::open_in_memory().unwrap();
        db.insert_object(&contact("A", "a@example.com")).unwrap();
        db.insert_object(&contact("B", "b@example.com")).unwrap();

        assert_eq!(db.count_values("m-contact", "p-email").unwrap(), 2);
        assert_eq!(db.purge_property("m-contact", "p-email").unwrap(), 2);
        assert_eq!(db.count_values("m-contact", "p-email").unwrap(), 0);
        assert_eq!(db.count_values("m-contact", "p-name").unwrap(), 2);
    }

    #[test]
    fn test_backfill_keeps_existing_values() {
        let db = SystemDb::open_in_memory().unwrap();
        let model = contacts();
        let mut a = contact("A", "a@example.com");
        a.values.remove("p-email");
        let b = contact("B", "b@example.com");
        db.insert_object(&a).unwrap();
        db.insert_object(&b).unwrap();

        let filled = db
            .backfill_property("m-contact", "p-email", &FieldValue::String("none".into()))
            .unwrap();
        assert_eq!(filled, 1);

        let email = |id: &str| {
            db.get_object("m-contact", id)
                .unwrap()
                .unwrap()
                .decode(&model)
                .unwrap()
                .values["p-email"]
                .clone()
        };
        assert_eq!(email(&a.id), FieldValue::String("none".into()));
        assert_eq!(email(&b.id), FieldValue::String("b@example.com".into()));
    }

    #[test]
    fn test_update_missing_object_fails() {
        let db = SystemDb::open_in_memory().unwrap();
        let ghost = contact("Ghost", "g@example.com");
        assert!(matches!(
            db.update_object(&ghost),
            Err(ModelbaseError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn test_transaction_rollback() {
        let db = SystemDb::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|db| {
            db.insert_object(&contact("A", "a@example.com"))?;
            Err(ModelbaseError::Other("abort".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.count_objects("m-contact").unwrap(), 0);

        db.transaction(|db| db.insert_object(&contact("B", "b@example.com")))
            .unwrap();
        assert_eq!(db.count_objects("m-contact").unwrap(), 1);
    }

    #[test]
    fn test_definitions_round_trip() {
        let db = SystemDb::open_in_memory().unwrap();
        let ruleset = ValidationRuleset {
            id: "r-email".into(),
            name: "Email".into(),
            description: None,
            regex_pattern: "^[^@]+@[^@]+$".into(),
        };
        db.save_ruleset(&ruleset).unwrap();
        assert_eq!(db.list_rulesets().unwrap(), vec![ruleset]);
        assert!(db.delete_ruleset("r-email").unwrap());
        assert!(!db.delete_ruleset("r-email").unwrap());

        let workflow = Workflow {
            id: "wf".into(),
            name: "Flow".into(),
            states: vec![WorkflowState {
                id: "open".into(),
                name: "Open".into(),
                is_initial: true,
                successor_state_ids: Default::default(),
            }],
        };
        db.save_workflow(&workflow).unwrap();
        assert_eq!(db.list_workflows().unwrap(), vec![workflow]);

        db.record_migration("m-contact", "Added property 'Email'").unwrap();
        assert_eq!(db.list_migrations().unwrap().len(), 1);
    }
}
