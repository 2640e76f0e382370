use crate::error::Result;
use crate::registry::{Model, ValidationRuleset};
use crate::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A set of definitions loaded together, e.g. from `definitions.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionBundle {
    #[serde(default)]
    pub rulesets: Vec<ValidationRuleset>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Parse a definitions YAML file into a DefinitionBundle
pub fn parse_definitions(path: &Path) -> Result<DefinitionBundle> {
    let content = std::fs::read_to_string(path)?;
    parse_definitions_str(&content)
}

/// Parse a definitions YAML string into a DefinitionBundle
pub fn parse_definitions_str(content: &str) -> Result<DefinitionBundle> {
    let bundle: DefinitionBundle = serde_yaml::from_str(content)?;
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PropertyKind, RelationshipType};

    #[test]
    fn test_parse_bundle() {
        let bundle = parse_definitions_str(
            r#"
rulesets:
  - id: r-email
    name: Email
    regex_pattern: '^[^@\s]+@[^@\s]+$'

workflows:
  - id: wf-task
    name: Task flow
    states:
      - { id: todo, name: Todo, is_initial: true, successor_state_ids: [doing] }
      - { id: doing, name: Doing, successor_state_ids: [done] }
      - { id: done, name: Done }

models:
  - id: m-task
    name: Task
    display_properties: [Title]
    workflow_id: wf-task
    properties:
      - { id: p-title, name: Title, type: string, required: true }
      - { id: p-tags, name: Related, type: relationship, related_model_id: m-task, relationship_type: many, order_index: 1 }
"#,
        )
        .unwrap();

        assert_eq!(bundle.rulesets.len(), 1);
        assert_eq!(bundle.workflows[0].states.len(), 3);
        let model = &bundle.models[0];
        assert_eq!(model.workflow_id.as_deref(), Some("wf-task"));
        assert_eq!(
            model.properties[1].kind,
            PropertyKind::Relationship {
                related_model_id: "m-task".into(),
                relationship_type: RelationshipType::Many,
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_property() {
        let result = parse_definitions_str(
            r#"
models:
  - id: m-task
    name: Task
    properties:
      - { id: p-title, name: Title, type: string, precision: 2 }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_empty() {
        let bundle = parse_definitions_str("{}").unwrap();
        assert!(bundle.models.is_empty());
        assert!(bundle.workflows.is_empty());
    }
}
