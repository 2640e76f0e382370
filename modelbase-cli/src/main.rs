use clap::{Parser, Subcommand, ValueEnum};
use modelbase::store::input_from_json;
use modelbase::{Model, Mutation, ObjectInput, ObjectUpdate, PropertyType, RawValue, Store};
use std::path::PathBuf;
use std::process;

/// modelbase CLI: define models and edit their objects from the command line
#[derive(Parser)]
#[command(name = "modelbase", version, about)]
struct Cli {
    /// Path to the data directory (default: current directory)
    #[arg(long, default_value = ".")]
    data_dir: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Import rulesets, workflows and models from a YAML file
    Import {
        /// Definitions file
        file: PathBuf,
    },

    /// List model definitions
    Models,

    /// Create a new object
    Create {
        /// Model id or name
        model: String,
        /// Property values (e.g. --field Name="Ada Lovelace")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Initial workflow state
        #[arg(long)]
        state: Option<String>,
        /// Owner of the new object
        #[arg(long)]
        owner: Option<String>,
    },

    /// Get a single object by id
    Get {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
    },

    /// List objects of a model
    List {
        /// Model id or name
        model: String,
        /// Include soft-deleted objects
        #[arg(long)]
        include_deleted: bool,
    },

    /// Update properties of an object
    Update {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
        /// Property values to change (e.g. --field Points=5)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Soft-delete an object
    Delete {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
    },

    /// Restore a soft-deleted object
    Restore {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
    },

    /// Move an object to another workflow state
    Transition {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
        /// Target state id
        state: String,
    },

    /// Set one property, or the workflow state, on many objects at once
    Batch {
        /// Model id or name
        model: String,
        /// Object ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// Property to set
        #[arg(long, requires = "value", conflicts_with = "state")]
        property: Option<String>,
        /// Declared type of the property (e.g. number, relationship)
        #[arg(long = "type", requires = "property", value_parser = parse_property_type)]
        property_type: Option<PropertyType>,
        /// New value (parsed as JSON when possible)
        #[arg(long)]
        value: Option<String>,
        /// Target workflow state
        #[arg(long)]
        state: Option<String>,
    },

    /// Show the label of an object
    Display {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
    },

    /// List the labels of the objects a relationship points at
    Expand {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
        /// Relationship property name
        property: String,
    },

    /// Show an object with rendered fields, next states and incoming references
    Detail {
        /// Model id or name
        model: String,
        /// Object id
        id: String,
    },

    /// Show model counts and definition totals
    Status,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_property_type(s: &str) -> Result<PropertyType, String> {
    s.parse::<PropertyType>().map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = Store::open(&cli.data_dir)?;

    match cli.command {
        Command::Import { file } => {
            let changes = store.import_definitions(&file)?;
            let described: Vec<String> = changes.iter().map(|c| c.describe()).collect();
            print_output(&serde_json::json!({ "ok": true, "changes": described }), &cli.format)?;
        }

        Command::Models => {
            let models: Vec<_> = store.models().models().collect();
            print_output(&serde_json::to_value(models)?, &cli.format)?;
        }

        Command::Create {
            model,
            fields,
            state,
            owner,
        } => {
            let input = ObjectInput {
                values: input_from_json(fields_to_value(store.model(&model)?, &fields))?,
                owner_id: owner,
                current_state_id: state,
            };
            let object = store.create_object(&model, input)?;
            print_output(&serde_json::json!({ "id": object.id }), &cli.format)?;
        }

        Command::Get { model, id } => {
            let object = store.get_object(&model, &id)?;
            print_output(&object.to_json(store.model(&model)?)?, &cli.format)?;
        }

        Command::List {
            model,
            include_deleted,
        } => {
            let definition = store.model(&model)?;
            let items = store
                .list_objects(&model, include_deleted)?
                .iter()
                .map(|o| o.to_json(definition))
                .collect::<modelbase::Result<Vec<_>>>()?;
            print_output(&serde_json::Value::Array(items), &cli.format)?;
        }

        Command::Update { model, id, fields } => {
            let update = ObjectUpdate {
                values: input_from_json(fields_to_value(store.model(&model)?, &fields))?,
                current_state_id: None,
            };
            store.update_object(&model, &id, update)?;
            print_output(&serde_json::json!({ "ok": true, "id": id }), &cli.format)?;
        }

        Command::Delete { model, id } => {
            store.soft_delete_object(&model, &id)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
        }

        Command::Restore { model, id } => {
            store.restore_object(&model, &id)?;
            print_output(&serde_json::json!({ "ok": true, "restored": id }), &cli.format)?;
        }

        Command::Transition { model, id, state } => {
            let object = store.transition_object(&model, &id, &state)?;
            print_output(
                &serde_json::json!({ "ok": true, "id": id, "current_state_id": object.current_state_id }),
                &cli.format,
            )?;
        }

        Command::Batch {
            model,
            ids,
            property,
            property_type,
            value,
            state,
        } => {
            let mutation = match (property, state) {
                (Some(property_name), None) => {
                    let property_type = match property_type {
                        Some(t) => t,
                        None => store.model(&model)?.require_property(&property_name)?.property_type(),
                    };
                    Mutation::Property {
                        property_name,
                        property_type,
                        new_value: RawValue::Json(parse_value(
                            property_type,
                            value.as_deref().unwrap_or_default(),
                        )),
                    }
                }
                (None, Some(target_state_id)) => Mutation::WorkflowState { target_state_id },
                _ => return Err("batch needs either --property/--value or --state".into()),
            };

            let report = store.apply_batch(&model, &ids, &mutation)?;
            print_output(&serde_json::to_value(&report)?, &cli.format)?;
            if !report.committed {
                return Err(report.message().into());
            }
        }

        Command::Display { model, id } => {
            let label = store.display_value(&model, &id)?;
            print_output(&serde_json::json!({ "id": id, "display_value": label }), &cli.format)?;
        }

        Command::Expand { model, id, property } => {
            let labels = store.expand_relationship(&model, &id, &property)?;
            print_output(&serde_json::json!({ "id": id, "property": property, "labels": labels }), &cli.format)?;
        }

        Command::Detail { model, id } => {
            let detail = store.object_detail(&model, &id)?;
            print_output(&serde_json::to_value(&detail)?, &cli.format)?;
        }

        Command::Status => {
            let result = store.status()?;
            print_output(&result, &cli.format)?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}

/// Text properties take the argument verbatim. Otherwise try JSON first
/// (numbers, booleans, arrays); anything else is a string.
fn parse_value(property_type: PropertyType, raw: &str) -> serde_json::Value {
    if matches!(property_type, PropertyType::String | PropertyType::Markdown) {
        return serde_json::Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn fields_to_value(model: &Model, fields: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, val) in fields {
        let value = match model.property(key) {
            Some(property) => parse_value(property.property_type(), val),
            // Unknown names still reach validation, which reports them
            None => serde_json::from_str(val)
                .unwrap_or_else(|_| serde_json::Value::String(val.clone())),
        };
        map.insert(key.clone(), value);
    }
    serde_json::Value::Object(map)
}
