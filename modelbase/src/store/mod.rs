use crate::batch::{self, BatchReport, Mutation};
use crate::error::{ModelbaseError, Result};
use crate::migration::{diff_models, ModelChange};
use crate::object::DataObject;
use crate::registry::{
    parse_definitions, DefinitionBundle, Model, ModelRegistry, PropertyKind, RulesetRegistry,
    ValidationRuleset,
};
use crate::resolver::{self, IncomingReference, Snapshot};
use crate::system_db::SystemDb;
use crate::validation::{self, InputMode, Stamp};
use crate::value::{Attachment, FieldValue, RawValue};
use crate::workflow::{available_transitions, check_object_transition, Workflow, WorkflowSet};
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Name of the database file inside the data directory.
pub const DB_FILE: &str = "modelbase.db";
/// Directory, relative to the data directory, that holds uploaded files.
pub const UPLOADS_DIR: &str = "uploads";

/// The main entry point for modelbase.
/// Opens a data directory, loads definitions from the system database, and
/// runs every definition and object operation against it.
pub struct Store {
    root: PathBuf,
    db: SystemDb,
    models: ModelRegistry,
    rulesets: RulesetRegistry,
    workflows: WorkflowSet,
}

/// Input for a new object. Values are keyed by property name.
#[derive(Debug, Clone, Default)]
pub struct ObjectInput {
    pub values: BTreeMap<String, RawValue>,
    pub owner_id: Option<String>,
    pub current_state_id: Option<String>,
}

/// A partial update. Only supplied properties change; `null` or `""`
/// clears an optional property.
#[derive(Debug, Clone, Default)]
pub struct ObjectUpdate {
    pub values: BTreeMap<String, RawValue>,
    pub current_state_id: Option<String>,
}

/// Everything the detail view of one object shows.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectDetail {
    pub object: serde_json::Value,
    pub display_value: String,
    /// Rendered value of every property, in property order.
    pub fields: Vec<FieldDisplay>,
    pub available_transitions: Vec<StateRef>,
    pub incoming_references: Vec<IncomingReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDisplay {
    pub property: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRef {
    pub id: String,
    pub name: String,
}

impl Store {
    /// Open a store at the given data directory, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(UPLOADS_DIR))?;

        let db = SystemDb::open(&root.join(DB_FILE))?;
        let rulesets = RulesetRegistry::new(db.list_rulesets()?);
        let workflows = WorkflowSet::new(db.list_workflows()?);
        let models = ModelRegistry::new(db.list_models()?);

        log::info!(
            "Opened {} with {} model(s), {} workflow(s)",
            root.display(),
            models.len(),
            workflows.iter().count()
        );

        Ok(Store {
            root,
            db,
            models,
            rulesets,
            workflows,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn rulesets(&self) -> &RulesetRegistry {
        &self.rulesets
    }

    pub fn workflows(&self) -> &WorkflowSet {
        &self.workflows
    }

    /// Resolve a model by id or name.
    pub fn model(&self, id_or_name: &str) -> Result<&Model> {
        self.models.lookup(id_or_name)
    }

    // ── Definitions ──────────────────────────────────────────────────

    pub fn save_ruleset(&mut self, ruleset: ValidationRuleset) -> Result<()> {
        if ruleset.id.trim().is_empty() {
            return Err(ModelbaseError::Definition("Ruleset id must not be empty".into()));
        }
        ruleset.compile()?;
        self.db.save_ruleset(&ruleset)?;
        log::info!("Saved ruleset '{}'", ruleset.name);
        self.rulesets.insert(ruleset);
        Ok(())
    }

    /// Refused while any string property still uses the ruleset.
    pub fn delete_ruleset(&mut self, id: &str) -> Result<()> {
        self.rulesets.require(id)?;
        if let Some((model, property)) = self.models.models().find_map(|m| {
            m.properties
                .iter()
                .find(|p| {
                    matches!(&p.kind, PropertyKind::String { validation_ruleset_id: Some(r), .. } if r == id)
                })
                .map(|p| (m, p))
        }) {
            return Err(ModelbaseError::Definition(format!(
                "Ruleset '{id}' is used by '{}.{}'",
                model.name, property.name
            )));
        }

        self.db.delete_ruleset(id)?;
        self.rulesets = RulesetRegistry::new(self.db.list_rulesets()?);
        log::info!("Deleted ruleset '{id}'");
        Ok(())
    }

    /// Objects sitting on states the new definition drops keep their state
    /// id; transitions then treat them as having no state.
    pub fn save_workflow(&mut self, workflow: Workflow) -> Result<()> {
        workflow.check_definition()?;

        for model in self
            .models
            .models()
            .filter(|m| m.workflow_id.as_deref() == Some(workflow.id.as_str()))
        {
            let stranded = self
                .db
                .list_objects(&model.id, false)?
                .iter()
                .filter(|r| {
                    r.current_state_id
                        .as_deref()
                        .is_some_and(|s| workflow.state(s).is_none())
                })
                .count();
            if stranded > 0 {
                log::warn!(
                    "{stranded} '{}' object(s) are on states no longer in workflow '{}'",
                    model.name,
                    workflow.name
                );
            }
        }

        self.db.save_workflow(&workflow)?;
        log::info!("Saved workflow '{}'", workflow.name);
        self.workflows.insert(workflow);
        Ok(())
    }

    /// Refused while any model is bound to the workflow.
    pub fn delete_workflow(&mut self, id: &str) -> Result<()> {
        self.workflows.require(id)?;
        if let Some(model) = self
            .models
            .models()
            .find(|m| m.workflow_id.as_deref() == Some(id))
        {
            return Err(ModelbaseError::Definition(format!(
                "Workflow '{id}' is bound to model '{}'",
                model.name
            )));
        }

        self.db.delete_workflow(id)?;
        self.workflows = WorkflowSet::new(self.db.list_workflows()?);
        log::info!("Deleted workflow '{id}'");
        Ok(())
    }

    /// Create or replace a model definition and migrate its stored objects.
    pub fn save_model(&mut self, model: Model) -> Result<Vec<ModelChange>> {
        let registry = self.models.clone();
        self.store_model(model, &registry)
    }

    fn store_model(&mut self, mut model: Model, registry: &ModelRegistry) -> Result<Vec<ModelChange>> {
        model.sort_properties();
        registry.check_candidate(&model, &self.rulesets)?;
        if let Some(workflow_id) = &model.workflow_id {
            self.workflows.require(workflow_id)?;
        }

        let changes = diff_models(self.models.get(&model.id), &model);

        for change in &changes {
            if let ModelChange::PropertyTypeChanged { property_id, property, from, to, .. } = change {
                let held = self.db.count_values(&model.id, property_id)?;
                if held > 0 {
                    return Err(ModelbaseError::Definition(format!(
                        "Cannot change '{property}' from {from} to {to}: {held} object(s) hold values"
                    )));
                }
            }
        }

        self.db.transaction(|db| {
            db.save_model(&model)?;
            for change in &changes {
                match change {
                    ModelChange::PropertyRemoved { property_id, .. } => {
                        db.purge_property(&model.id, property_id)?;
                    }
                    ModelChange::PropertyAdded { property_id, backfill: true, .. } => {
                        let default = model
                            .property_by_id(property_id)
                            .and_then(validation::parse_default);
                        if let Some(value) = default {
                            let filled = db.backfill_property(&model.id, property_id, &value)?;
                            log::debug!("Backfilled {filled} object(s) for '{property_id}'");
                        }
                    }
                    _ => {}
                }
                db.record_migration(&model.id, &change.describe())?;
            }
            Ok(())
        })?;

        for change in &changes {
            if change.is_safe() {
                log::info!("{}", change.describe());
            } else {
                log::warn!("{}", change.describe());
            }
        }

        self.models.insert(model);
        Ok(changes)
    }

    /// Remove a model and hard-delete its objects. Refused while another
    /// model still has a relationship pointing at it.
    pub fn delete_model(&mut self, id_or_name: &str) -> Result<usize> {
        let model = self.models.lookup(id_or_name)?.clone();
        if let Some((source, property)) = self
            .models
            .referencing_properties(&model.id)
            .find(|(source, _)| source.id != model.id)
        {
            return Err(ModelbaseError::Definition(format!(
                "Model '{}' is referenced by '{}.{}'",
                model.name, source.name, property.name
            )));
        }

        let object_ids: Vec<String> = self
            .db
            .list_objects(&model.id, true)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let removed = self.db.transaction(|db| db.delete_model(&model.id))?;

        for id in &object_ids {
            let dir = self.root.join(UPLOADS_DIR).join(id);
            if dir.is_dir() {
                std::fs::remove_dir_all(dir)?;
            }
        }

        self.models.remove(&model.id);
        log::info!("Deleted model '{}' and {removed} object(s)", model.name);
        Ok(removed)
    }

    /// Load a YAML bundle of rulesets, workflows and models. Models in one
    /// bundle may reference each other.
    pub fn import_definitions(&mut self, path: &Path) -> Result<Vec<ModelChange>> {
        let bundle = parse_definitions(path)?;
        self.import_bundle(bundle)
    }

    pub fn import_bundle(&mut self, bundle: DefinitionBundle) -> Result<Vec<ModelChange>> {
        for ruleset in bundle.rulesets {
            self.save_ruleset(ruleset)?;
        }
        for workflow in bundle.workflows {
            self.save_workflow(workflow)?;
        }

        let mut registry = self.models.clone();
        for model in &bundle.models {
            registry.insert(model.clone());
        }

        let mut changes = Vec::new();
        for model in bundle.models {
            changes.extend(self.store_model(model, &registry)?);
        }
        Ok(changes)
    }

    // ── Objects ──────────────────────────────────────────────────────

    pub fn create_object(&self, model: &str, input: ObjectInput) -> Result<DataObject> {
        let model = self.models.lookup(model)?;
        let schema = validation::compile(model, &self.rulesets)?;
        let values = schema
            .validate_input(&input.values, InputMode::Create)
            .map_err(ModelbaseError::Validation)?;

        let now = Utc::now();
        let mut object = DataObject::new(&model.id, input.owner_id, now);
        object.values = values
            .into_iter()
            .filter_map(|(id, value)| value.map(|v| (id, v)))
            .collect();
        validation::stamp_auto_dates(model, &mut object.values, now, Stamp::Create);

        if let Some(workflow) = self.model_workflow(model)? {
            object.current_state_id = match input.current_state_id {
                Some(state) => {
                    check_object_transition(workflow, None, &state)?;
                    Some(state)
                }
                None => workflow.initial_states().next().map(|s| s.id.clone()),
            };
        } else if input.current_state_id.is_some() {
            return Err(ModelbaseError::WorkflowNotFound(format!(
                "model '{}' has no workflow",
                model.name
            )));
        }

        self.check_unique(model, &object)?;
        self.save_uploads(&mut object)?;
        self.db.insert_object(&object)?;
        log::debug!("Created {} {}", model.name, object.id);
        Ok(object)
    }

    /// Fetch one object, including soft-deleted ones.
    pub fn get_object(&self, model: &str, id: &str) -> Result<DataObject> {
        let model = self.models.lookup(model)?;
        self.load(model, id)
    }

    pub fn list_objects(&self, model: &str, include_deleted: bool) -> Result<Vec<DataObject>> {
        let model = self.models.lookup(model)?;
        self.db
            .list_objects(&model.id, include_deleted)?
            .iter()
            .map(|r| r.decode(model))
            .collect()
    }

    pub fn update_object(&self, model: &str, id: &str, update: ObjectUpdate) -> Result<DataObject> {
        let model = self.models.lookup(model)?;
        let mut object = self.load_live(model, id)?;

        let schema = validation::compile(model, &self.rulesets)?;
        let values = schema
            .validate_input(&update.values, InputMode::Partial)
            .map_err(ModelbaseError::Validation)?;
        for (property_id, value) in values {
            match value {
                Some(value) => {
                    object.values.insert(property_id, value);
                }
                None => {
                    object.values.remove(&property_id);
                }
            }
        }

        if let Some(target) = update.current_state_id {
            let workflow = self.require_workflow(model)?;
            check_object_transition(workflow, object.current_state_id.as_deref(), &target)?;
            object.current_state_id = Some(target);
        }

        self.check_unique(model, &object)?;
        self.save_uploads(&mut object)?;

        let now = Utc::now();
        validation::stamp_auto_dates(model, &mut object.values, now, Stamp::Update);
        object.updated_at = now;
        self.db.update_object(&object)?;
        Ok(object)
    }

    /// Move one object to another workflow state.
    pub fn transition_object(&self, model: &str, id: &str, target_state_id: &str) -> Result<DataObject> {
        self.update_object(
            model,
            id,
            ObjectUpdate {
                values: BTreeMap::new(),
                current_state_id: Some(target_state_id.to_string()),
            },
        )
    }

    pub fn soft_delete_object(&self, model: &str, id: &str) -> Result<DataObject> {
        let model = self.models.lookup(model)?;
        let mut object = self.load_live(model, id)?;
        let now = Utc::now();
        object.is_deleted = true;
        object.deleted_at = Some(now);
        object.updated_at = now;
        self.db.update_object(&object)?;
        Ok(object)
    }

    /// Undo a soft delete. Unique values taken in the meantime block it.
    pub fn restore_object(&self, model: &str, id: &str) -> Result<DataObject> {
        let model = self.models.lookup(model)?;
        let mut object = self.load(model, id)?;
        if !object.is_deleted {
            return Ok(object);
        }

        self.check_unique(model, &object)?;
        object.is_deleted = false;
        object.deleted_at = None;
        object.updated_at = Utc::now();
        self.db.update_object(&object)?;
        Ok(object)
    }

    pub fn display_value(&self, model: &str, id: &str) -> Result<String> {
        let model = self.models.lookup(model)?;
        let object = self.load(model, id)?;
        let objects = self.snapshot_objects(self.reachable_models(&model.id))?;
        let snapshot = Snapshot::new(&self.models, &objects);
        Ok(resolver::display_value(&object, model, &snapshot))
    }

    /// The object with its label, rendered fields, next states and the
    /// objects that reference it.
    pub fn object_detail(&self, model: &str, id: &str) -> Result<ObjectDetail> {
        let model = self.models.lookup(model)?;
        let object = self.load(model, id)?;
        let objects = self.snapshot_objects(self.models.models().map(|m| m.id.clone()))?;
        let snapshot = Snapshot::new(&self.models, &objects);

        let fields = model
            .properties
            .iter()
            .map(|p| FieldDisplay {
                property: p.name.clone(),
                value: resolver::field_display(&object, p, &snapshot),
            })
            .collect();

        let transitions = match self.model_workflow(model)? {
            Some(workflow) if !object.is_deleted => {
                available_transitions(workflow, object.current_state_id.as_deref())
                    .into_iter()
                    .map(|s| StateRef {
                        id: s.id.clone(),
                        name: s.name.clone(),
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        Ok(ObjectDetail {
            object: object.to_json(model)?,
            display_value: resolver::display_value(&object, model, &snapshot),
            fields,
            available_transitions: transitions,
            incoming_references: resolver::incoming_references(&object, &snapshot),
        })
    }

    /// Labels of every target of a relationship property.
    pub fn expand_relationship(&self, model: &str, id: &str, property_name: &str) -> Result<Vec<String>> {
        let model = self.models.lookup(model)?;
        let property = model.require_property(property_name)?;
        let object = self.load(model, id)?;
        let objects = self.snapshot_objects(self.reachable_models(&model.id))?;
        let snapshot = Snapshot::new(&self.models, &objects);
        Ok(resolver::expand_many(&object, property, &snapshot))
    }

    pub fn apply_batch(&self, model: &str, object_ids: &[String], mutation: &Mutation) -> Result<BatchReport> {
        batch::apply_batch(
            &self.db,
            &self.models,
            &self.rulesets,
            &self.workflows,
            model,
            object_ids,
            mutation,
            Utc::now(),
        )
    }

    /// Counts per model plus definition totals.
    pub fn status(&self) -> Result<serde_json::Value> {
        let mut models = serde_json::Map::new();
        for model in self.models.models() {
            models.insert(
                model.name.clone(),
                serde_json::json!({
                    "id": model.id,
                    "count": self.db.count_objects(&model.id)?,
                    "workflow_id": model.workflow_id,
                }),
            );
        }

        Ok(serde_json::json!({
            "data_dir": self.root.display().to_string(),
            "models": models,
            "workflows": self.workflows.iter().count(),
            "rulesets": self.rulesets.iter().count(),
            "migrations": self.db.list_migrations()?.len(),
        }))
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn load(&self, model: &Model, id: &str) -> Result<DataObject> {
        self.db
            .get_object(&model.id, id)?
            .ok_or_else(|| ModelbaseError::ObjectNotFound {
                model: model.name.clone(),
                id: id.to_string(),
            })?
            .decode(model)
    }

    fn load_live(&self, model: &Model, id: &str) -> Result<DataObject> {
        let object = self.load(model, id)?;
        if object.is_deleted {
            return Err(ModelbaseError::ObjectNotFound {
                model: model.name.clone(),
                id: id.to_string(),
            });
        }
        Ok(object)
    }

    fn model_workflow(&self, model: &Model) -> Result<Option<&Workflow>> {
        model
            .workflow_id
            .as_deref()
            .map(|id| self.workflows.require(id))
            .transpose()
    }

    fn require_workflow(&self, model: &Model) -> Result<&Workflow> {
        self.model_workflow(model)?.ok_or_else(|| {
            ModelbaseError::WorkflowNotFound(format!("model '{}' has no workflow", model.name))
        })
    }

    fn check_unique(&self, model: &Model, object: &DataObject) -> Result<()> {
        for property in model.properties.iter().filter(|p| p.is_unique()) {
            let Some(text) = object.values.get(&property.id).and_then(FieldValue::as_str) else {
                continue;
            };
            if let Some(conflicting_id) =
                self.db
                    .find_unique_conflict(&model.id, &property.id, text, &object.id)?
            {
                return Err(ModelbaseError::UniqueConstraintConflict {
                    property: property.name.clone(),
                    value: text.to_string(),
                    conflicting_id,
                });
            }
        }
        Ok(())
    }

    /// Write pending uploads under `uploads/<object id>/` and replace them
    /// with their stored paths.
    fn save_uploads(&self, object: &mut DataObject) -> Result<()> {
        for value in object.values.values_mut() {
            let FieldValue::Attachment(Attachment::Upload(upload)) = value else {
                continue;
            };
            let dir = self.root.join(UPLOADS_DIR).join(&object.id);
            std::fs::create_dir_all(&dir)?;

            let file_name = upload_file_name(&upload.file_name);
            std::fs::write(dir.join(&file_name), &upload.bytes)?;
            *value = FieldValue::Attachment(Attachment::Stored(format!(
                "{UPLOADS_DIR}/{}/{file_name}",
                object.id
            )));
        }
        Ok(())
    }

    /// Models a label of `model_id` can reach through relationships.
    fn reachable_models(&self, model_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([model_id.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(model) = self.models.get(&id) {
                for property in model.relationship_properties() {
                    if let PropertyKind::Relationship { related_model_id, .. } = &property.kind {
                        queue.push_back(related_model_id.clone());
                    }
                }
            }
        }
        seen.into_iter().collect()
    }

    fn snapshot_objects(
        &self,
        model_ids: impl IntoIterator<Item = String>,
    ) -> Result<HashMap<String, Vec<DataObject>>> {
        let mut objects = HashMap::new();
        for model_id in model_ids {
            let Some(model) = self.models.get(&model_id) else {
                continue;
            };
            let decoded = self
                .db
                .list_objects(&model.id, false)?
                .iter()
                .map(|r| r.decode(model))
                .collect::<Result<Vec<_>>>()?;
            objects.insert(model_id, decoded);
        }
        Ok(objects)
    }
}

/// Slugified stem plus the original extension, e.g. `My Photo.PNG` -> `my-photo.png`.
fn upload_file_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .map(|s| slug::slugify(s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file".to_string());
    match path.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy().to_lowercase()),
        None => stem,
    }
}

/// Turn a JSON object of `{property name: value}` into raw inputs.
pub fn input_from_json(json: serde_json::Value) -> Result<BTreeMap<String, RawValue>> {
    match json {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| (name, RawValue::Json(value)))
            .collect()),
        other => Err(ModelbaseError::Other(format!(
            "Expected a JSON object of property values, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FailureKind;
    use crate::registry::{parse_definitions_str, PropertyType};
    use crate::value::Upload;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    const DEFINITIONS: &str = r#"
rulesets:
  - id: r-email
    name: Email address
    regex_pattern: "^[^@\\s]+@[^@\\s]+$"
workflows:
  - id: wf-task
    name: Task flow
    states:
      - { id: todo, name: Todo, is_initial: true, successor_state_ids: [doing] }
      - { id: doing, name: Doing, successor_state_ids: [done] }
      - { id: done, name: Done }
models:
  - id: m-person
    name: Person
    display_properties: [Name]
    properties:
      - { id: p-name, name: Name, type: string, required: true }
      - { id: p-email, name: Email, type: string, is_unique: true, validation_ruleset_id: r-email, order_index: 1 }
      - { id: p-photo, name: Photo, type: image, order_index: 2 }
  - id: m-task
    name: Task
    workflow_id: wf-task
    display_properties: [Title, Assignee]
    properties:
      - { id: p-title, name: Title, type: string, required: true }
      - { id: p-assignee, name: Assignee, type: relationship, related_model_id: m-person, order_index: 1 }
      - { id: p-points, name: Points, type: number, default_value: "1", order_index: 2 }
      - { id: p-created, name: Created, type: date, auto_set_on_create: true, order_index: 3 }
"#;

    fn setup_test_store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let mut store = Store::open(tmp.path()).unwrap();
        store
            .import_bundle(parse_definitions_str(DEFINITIONS).unwrap())
            .unwrap();
        (tmp, store)
    }

    fn input(values: serde_json::Value) -> ObjectInput {
        ObjectInput {
            values: input_from_json(values).unwrap(),
            ..Default::default()
        }
    }

    fn person(store: &Store, name: &str, email: &str) -> DataObject {
        store
            .create_object("Person", input(json!({ "Name": name, "Email": email })))
            .unwrap()
    }

    #[test]
    fn test_open_store() {
        let (tmp, store) = setup_test_store();
        assert_eq!(store.models().len(), 2);
        assert!(tmp.path().join(DB_FILE).exists());
        assert!(tmp.path().join(UPLOADS_DIR).is_dir());

        // Definitions survive a reopen
        drop(store);
        let reopened = Store::open(tmp.path()).unwrap();
        assert_eq!(reopened.models().len(), 2);
        assert!(reopened.workflows().get("wf-task").is_some());
    }

    #[test]
    fn test_create_applies_defaults_and_initial_state() {
        let (_tmp, store) = setup_test_store();
        let task = store
            .create_object("Task", input(json!({ "Title": "Write docs" })))
            .unwrap();

        let model = store.model("Task").unwrap();
        assert_eq!(task.value(model, "Points"), Some(&FieldValue::Number(1.0)));
        assert!(task.value(model, "Created").is_some());
        assert_eq!(task.current_state_id.as_deref(), Some("todo"));

        let loaded = store.get_object("m-task", &task.id).unwrap();
        assert_eq!(loaded.values, task.values);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let (_tmp, store) = setup_test_store();

        let err = store
            .create_object("Person", input(json!({ "Email": "not-an-email" })))
            .unwrap_err();
        match err {
            ModelbaseError::Validation(errors) => {
                let props: Vec<_> = errors.iter().map(|e| e.property.as_str()).collect();
                assert_eq!(props, vec!["Name", "Email"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut with_state = input(json!({ "Title": "Late" }));
        with_state.current_state_id = Some("done".into());
        assert!(matches!(
            store.create_object("Task", with_state),
            Err(ModelbaseError::Transition(_))
        ));
    }

    #[test]
    fn test_unique_values_and_restore() {
        let (_tmp, store) = setup_test_store();
        let ada = person(&store, "Ada", "ada@example.com");

        let dup = store.create_object(
            "Person",
            input(json!({ "Name": "Other Ada", "Email": "ada@example.com" })),
        );
        assert!(matches!(dup, Err(ModelbaseError::UniqueConstraintConflict { .. })));

        // Soft-deleted objects release their unique values
        store.soft_delete_object("Person", &ada.id).unwrap();
        assert!(store.list_objects("Person", false).unwrap().is_empty());
        assert_eq!(store.list_objects("Person", true).unwrap().len(), 1);
        person(&store, "New Ada", "ada@example.com");

        // ...so restoring the original now conflicts
        assert!(matches!(
            store.restore_object("Person", &ada.id),
            Err(ModelbaseError::UniqueConstraintConflict { .. })
        ));
    }

    #[test]
    fn test_update_and_transition() {
        let (_tmp, store) = setup_test_store();
        let task = store
            .create_object("Task", input(json!({ "Title": "Ship", "Points": 3 })))
            .unwrap();

        let updated = store
            .update_object(
                "Task",
                &task.id,
                ObjectUpdate {
                    values: input_from_json(json!({ "Points": null })).unwrap(),
                    current_state_id: None,
                },
            )
            .unwrap();
        let model = store.model("Task").unwrap();
        assert!(updated.value(model, "Points").is_none());
        assert_eq!(
            updated.value(model, "Title"),
            Some(&FieldValue::String("Ship".into()))
        );

        let moved = store.transition_object("Task", &task.id, "doing").unwrap();
        assert_eq!(moved.current_state_id.as_deref(), Some("doing"));
        assert!(matches!(
            store.transition_object("Task", &task.id, "todo"),
            Err(ModelbaseError::Transition(_))
        ));
    }

    #[test]
    fn test_update_keeps_stamped_create_date() {
        let (_tmp, store) = setup_test_store();
        let task = store
            .create_object("Task", input(json!({ "Title": "a", "Created": "2020-01-01" })))
            .unwrap();
        let model = store.model("Task").unwrap();
        let created = task.value(model, "Created").cloned();
        assert!(created.is_some());

        let updated = store
            .update_object(
                "Task",
                &task.id,
                ObjectUpdate {
                    values: input_from_json(json!({ "Title": "b", "Created": "2020-01-01" })).unwrap(),
                    current_state_id: None,
                },
            )
            .unwrap();
        assert_eq!(updated.value(model, "Created").cloned(), created);

        let cleared = store
            .update_object(
                "Task",
                &task.id,
                ObjectUpdate {
                    values: input_from_json(json!({ "Created": null })).unwrap(),
                    current_state_id: None,
                },
            )
            .unwrap();
        assert_eq!(cleared.value(model, "Created").cloned(), created);

        let loaded = store.get_object("Task", &task.id).unwrap();
        assert_eq!(loaded.value(model, "Created").cloned(), created);
    }

    #[test]
    fn test_display_and_detail() {
        let (_tmp, store) = setup_test_store();
        let ada = person(&store, "Ada", "ada@example.com");
        let task = store
            .create_object(
                "Task",
                input(json!({ "Title": "Review", "Assignee": ada.id.clone() })),
            )
            .unwrap();

        assert_eq!(store.display_value("Task", &task.id).unwrap(), "Review - Ada");
        assert_eq!(
            store.expand_relationship("Task", &task.id, "Assignee").unwrap(),
            vec!["Ada".to_string()]
        );
        assert!(matches!(
            store.expand_relationship("Task", &task.id, "Nope"),
            Err(ModelbaseError::PropertyNotFound { .. })
        ));

        let detail = store.object_detail("Person", &ada.id).unwrap();
        assert_eq!(detail.display_value, "Ada");
        assert_eq!(detail.incoming_references.len(), 1);
        assert_eq!(detail.incoming_references[0].object_id, task.id);
        assert_eq!(detail.object["values"]["Name"], "Ada");

        let task_detail = store.object_detail("Task", &task.id).unwrap();
        assert_eq!(
            task_detail.available_transitions,
            vec![StateRef { id: "doing".into(), name: "Doing".into() }]
        );

        // A deleted target renders as Unknown
        store.soft_delete_object("Person", &ada.id).unwrap();
        assert_eq!(
            store.display_value("Task", &task.id).unwrap(),
            format!("Review - {}", resolver::UNKNOWN_LABEL)
        );
    }

    #[test]
    fn test_uploads_are_written() {
        let (tmp, store) = setup_test_store();
        let mut values = input_from_json(json!({ "Name": "Grace" })).unwrap();
        values.insert(
            "Photo".into(),
            RawValue::Upload(Upload {
                file_name: "Team Photo.PNG".into(),
                bytes: vec![1, 2, 3],
            }),
        );
        let grace = store
            .create_object("Person", ObjectInput { values, ..Default::default() })
            .unwrap();

        let model = store.model("Person").unwrap();
        let expected = format!("uploads/{}/team-photo.png", grace.id);
        assert_eq!(
            grace.value(model, "Photo"),
            Some(&FieldValue::Attachment(Attachment::Stored(expected.clone())))
        );
        assert_eq!(std::fs::read(tmp.path().join(expected)).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_save_model_backfills_and_purges() {
        let (_tmp, mut store) = setup_test_store();
        let task = store
            .create_object("Task", input(json!({ "Title": "Old", "Points": 8 })))
            .unwrap();

        let mut model = store.model("Task").unwrap().clone();
        model.properties.retain(|p| p.name != "Points");
        model.properties.push(
            serde_yaml::from_str(
                "{ id: p-urgent, name: Urgent, type: boolean, default_value: \"true\", order_index: 9 }",
            )
            .unwrap(),
        );
        let changes = store.save_model(model).unwrap();
        assert!(changes.iter().any(|c| matches!(c, ModelChange::PropertyRemoved { .. })));
        assert!(changes
            .iter()
            .any(|c| matches!(c, ModelChange::PropertyAdded { backfill: true, .. })));

        let model = store.model("Task").unwrap();
        let reloaded = store.get_object("Task", &task.id).unwrap();
        assert_eq!(reloaded.value(model, "Urgent"), Some(&FieldValue::Boolean(true)));
        assert!(!reloaded.values.contains_key("p-points"));
        assert_eq!(store.db.count_values("m-task", "p-points").unwrap(), 0);
    }

    #[test]
    fn test_type_change_refused_when_values_exist() {
        let (_tmp, mut store) = setup_test_store();
        store
            .create_object("Task", input(json!({ "Title": "Has points", "Points": 2 })))
            .unwrap();

        let mut model = store.model("Task").unwrap().clone();
        let points = model.properties.iter_mut().find(|p| p.name == "Points").unwrap();
        points.kind = PropertyKind::Rating;
        points.default_value = None;
        assert!(matches!(
            store.save_model(model),
            Err(ModelbaseError::Definition(_))
        ));
    }

    #[test]
    fn test_definition_deletes_are_guarded() {
        let (_tmp, mut store) = setup_test_store();
        assert!(store.delete_workflow("wf-task").is_err());
        assert!(store.delete_ruleset("r-email").is_err());
        assert!(store.delete_model("Person").is_err());

        store.create_object("Task", input(json!({ "Title": "x" }))).unwrap();
        assert_eq!(store.delete_model("Task").unwrap(), 1);
        store.delete_workflow("wf-task").unwrap();
        store.delete_model("Person").unwrap();
        store.delete_ruleset("r-email").unwrap();
        assert!(store.models().is_empty());
    }

    #[test]
    fn test_batch_through_store() {
        let (_tmp, store) = setup_test_store();
        let a = store.create_object("Task", input(json!({ "Title": "a" }))).unwrap();
        let b = store.create_object("Task", input(json!({ "Title": "b" }))).unwrap();

        let report = store
            .apply_batch(
                "Task",
                &[a.id.clone(), b.id.clone()],
                &Mutation::Property {
                    property_name: "Points".into(),
                    property_type: PropertyType::Number,
                    new_value: json!(5).into(),
                },
            )
            .unwrap();
        assert!(report.committed);

        let report = store
            .apply_batch(
                "Task",
                &[a.id.clone(), b.id.clone()],
                &Mutation::WorkflowState { target_state_id: "done".into() },
            )
            .unwrap();
        assert!(!report.committed);
        assert!(report.failures.iter().all(|f| f.kind == FailureKind::Transition));
    }

    #[test]
    fn test_status() {
        let (_tmp, store) = setup_test_store();
        person(&store, "Ada", "ada@example.com");
        let status = store.status().unwrap();
        assert_eq!(status["models"]["Person"]["count"], 1);
        assert_eq!(status["workflows"], 1);
    }
}
