//! Model Registry: model, property and ruleset definitions.

mod parser;
mod types;

pub use parser::{parse_definitions, parse_definitions_str, DefinitionBundle};
pub use types::{
    Model, Property, PropertyDefinition, PropertyKind, PropertyType, RelationshipType,
    ValidationRuleset, MAX_PRECISION,
};

use crate::error::{ModelbaseError, Result};
use crate::validation;
use std::collections::BTreeMap;

/// All known models, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Model>,
}

impl ModelRegistry {
    pub fn new(models: impl IntoIterator<Item = Model>) -> Self {
        let models = models
            .into_iter()
            .map(|mut m| {
                m.sort_properties();
                (m.id.clone(), m)
            })
            .collect();
        ModelRegistry { models }
    }

    pub fn get(&self, id: &str) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&Model> {
        self.get(id)
            .ok_or_else(|| ModelbaseError::ModelNotFound(id.to_string()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Model> {
        self.models.values().find(|m| m.name == name)
    }

    /// Resolve either a model id or a model name.
    pub fn lookup(&self, id_or_name: &str) -> Result<&Model> {
        self.get(id_or_name)
            .or_else(|| self.find_by_name(id_or_name))
            .ok_or_else(|| ModelbaseError::ModelNotFound(id_or_name.to_string()))
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn insert(&mut self, mut model: Model) {
        model.sort_properties();
        self.models.insert(model.id.clone(), model);
    }

    pub fn remove(&mut self, id: &str) -> Option<Model> {
        self.models.remove(id)
    }

    /// Validate a model about to be saved against everything else that is
    /// registered. The candidate may replace a model with the same id.
    pub fn check_candidate(&self, model: &Model, rulesets: &RulesetRegistry) -> Result<()> {
        model.check_definition()?;

        if let Some(other) = self
            .models
            .values()
            .find(|m| m.name == model.name && m.id != model.id)
        {
            return Err(ModelbaseError::Definition(format!(
                "Model name '{}' is already used by model '{}'",
                model.name, other.id
            )));
        }

        for property in &model.properties {
            if let PropertyKind::Relationship { related_model_id, .. } = &property.kind {
                if related_model_id != &model.id && !self.models.contains_key(related_model_id) {
                    return Err(ModelbaseError::Definition(format!(
                        "Property '{}' references unknown model '{related_model_id}'",
                        property.name
                    )));
                }
            }
        }

        // Resolves every ruleset; defaults must pass the same rules as input.
        let schema = validation::compile(model, rulesets)?;
        for rule in schema.rules() {
            validation::check_default(rule)?;
        }

        Ok(())
    }

    /// Relationship properties, across all models, that point at `target_model_id`.
    pub fn referencing_properties<'a>(
        &'a self,
        target_model_id: &'a str,
    ) -> impl Iterator<Item = (&'a Model, &'a Property)> + 'a {
        self.models.values().flat_map(move |model| {
            model.relationship_properties().filter_map(move |property| match &property.kind {
                PropertyKind::Relationship { related_model_id, .. }
                    if related_model_id == target_model_id =>
                {
                    Some((model, property))
                }
                _ => None,
            })
        })
    }
}

/// All known validation rulesets, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RulesetRegistry {
    rulesets: BTreeMap<String, ValidationRuleset>,
}

impl RulesetRegistry {
    pub fn new(rulesets: impl IntoIterator<Item = ValidationRuleset>) -> Self {
        RulesetRegistry {
            rulesets: rulesets.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ValidationRuleset> {
        self.rulesets.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&ValidationRuleset> {
        self.get(id)
            .ok_or_else(|| ModelbaseError::RulesetNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationRuleset> {
        self.rulesets.values()
    }

    pub fn insert(&mut self, ruleset: ValidationRuleset) {
        self.rulesets.insert(ruleset.id.clone(), ruleset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (ModelRegistry, RulesetRegistry) {
        let bundle = parse_definitions_str(
            r#"
rulesets:
  - { id: r-code, name: Code, regex_pattern: '^[A-Z]{3}$' }
models:
  - id: m-person
    name: Person
    properties:
      - { id: p-name, name: Name, type: string }
  - id: m-task
    name: Task
    properties:
      - { id: p-title, name: Title, type: string }
      - { id: p-owner, name: Owner, type: relationship, related_model_id: m-person }
"#,
        )
        .unwrap();
        (
            ModelRegistry::new(bundle.models),
            RulesetRegistry::new(bundle.rulesets),
        )
    }

    fn candidate(yaml: &str) -> Model {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_duplicate_model_name_rejected() {
        let (registry, rulesets) = registry();
        let model = candidate("{ id: m-other, name: Task }");
        assert!(registry.check_candidate(&model, &rulesets).is_err());

        // Same id is a replacement, not a duplicate
        let model = candidate("{ id: m-task, name: Task }");
        assert!(registry.check_candidate(&model, &rulesets).is_ok());
    }

    #[test]
    fn test_unknown_relationship_target_rejected() {
        let (registry, rulesets) = registry();
        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: R, type: relationship, related_model_id: m-nope }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_err());

        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Parent, type: relationship, related_model_id: m-x }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_ok());
    }

    #[test]
    fn test_ruleset_must_exist() {
        let (registry, rulesets) = registry();
        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Code, type: string, validation_ruleset_id: r-missing }] }",
        );
        assert!(matches!(
            registry.check_candidate(&model, &rulesets),
            Err(ModelbaseError::RulesetNotFound(_))
        ));

        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Code, type: string, validation_ruleset_id: r-code }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_ok());
    }

    #[test]
    fn test_bad_default_rejected() {
        let (registry, rulesets) = registry();
        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Count, type: number, default_value: lots }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_err());
    }

    #[test]
    fn test_default_must_satisfy_property_rules() {
        let (registry, rulesets) = registry();
        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Points, type: number, min_value: 10, max_value: 20, default_value: '5' }] }",
        );
        assert!(matches!(
            registry.check_candidate(&model, &rulesets),
            Err(ModelbaseError::Definition(_))
        ));

        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Code, type: string, validation_ruleset_id: r-code, default_value: abc }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_err());

        let model = candidate(
            "{ id: m-x, name: X, properties: [{ id: p1, name: Code, type: string, validation_ruleset_id: r-code, default_value: ABC }] }",
        );
        assert!(registry.check_candidate(&model, &rulesets).is_ok());
    }

    #[test]
    fn test_referencing_properties() {
        let (registry, _) = registry();
        let refs: Vec<_> = registry
            .referencing_properties("m-person")
            .map(|(m, p)| (m.name.as_str(), p.name.as_str()))
            .collect();
        assert_eq!(refs, vec![("Task", "Owner")]);
    }

    #[test]
    fn test_lookup_by_name_or_id() {
        let (registry, _) = registry();
        assert_eq!(registry.lookup("Task").unwrap().id, "m-task");
        assert_eq!(registry.lookup("m-person").unwrap().name, "Person");
        assert!(registry.lookup("Nope").is_err());
    }
}
