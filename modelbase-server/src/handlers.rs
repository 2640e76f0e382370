use actix_web::{web, HttpResponse};
use modelbase::batch::BatchReport;
use modelbase::registry::ValidationRuleset;
use modelbase::store::input_from_json;
use modelbase::{
    Model, ModelbaseError, Mutation, ObjectInput, ObjectUpdate, PropertyType, RawValue, Store,
    Workflow,
};
use serde::Deserialize;

use crate::AppState;

/// Configure all API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Status
            .route("/status", web::get().to(status))
            // Definitions
            .route("/models", web::get().to(list_models))
            .route("/models/{model}", web::get().to(get_model))
            .route("/models/{model}", web::put().to(put_model))
            .route("/models/{model}", web::delete().to(delete_model))
            .route("/workflows", web::get().to(list_workflows))
            .route("/workflows/{id}", web::put().to(put_workflow))
            .route("/workflows/{id}", web::delete().to(delete_workflow))
            .route("/rulesets", web::get().to(list_rulesets))
            .route("/rulesets/{id}", web::put().to(put_ruleset))
            .route("/rulesets/{id}", web::delete().to(delete_ruleset))
            // Objects
            .route("/models/{model}/objects", web::get().to(list_objects))
            .route("/models/{model}/objects", web::post().to(create_object))
            .route("/models/{model}/objects/{id}", web::get().to(get_object))
            .route("/models/{model}/objects/{id}", web::patch().to(update_object))
            .route("/models/{model}/objects/{id}", web::delete().to(delete_object))
            .route("/models/{model}/objects/{id}/restore", web::post().to(restore_object))
            .route("/models/{model}/objects/{id}/transition", web::post().to(transition_object))
            .route("/models/{model}/objects/{id}/detail", web::get().to(object_detail))
            // Batch
            .route("/models/{model}/batch", web::post().to(batch_property))
            .route("/models/{model}/batch/state", web::post().to(batch_state)),
    );
}

// ── Helpers ─────────────────────────────────────────────────────────

type Handled = modelbase::Result<HttpResponse>;

fn ok_json(value: serde_json::Value) -> Handled {
    Ok(HttpResponse::Ok().json(value))
}

fn created_json(value: serde_json::Value) -> Handled {
    Ok(HttpResponse::Created().json(value))
}

/// Run `f` against the locked store and turn its error into a response.
fn with_store(state: &AppState, f: impl FnOnce(&mut Store) -> Handled) -> HttpResponse {
    let mut store = match state.store.lock() {
        Ok(store) => store,
        Err(poisoned) => {
            log::error!("Store lock was poisoned by a panicking request");
            poisoned.into_inner()
        }
    };
    f(&mut store).unwrap_or_else(err_response)
}

fn err_response(e: ModelbaseError) -> HttpResponse {
    match &e {
        ModelbaseError::ModelNotFound(_)
        | ModelbaseError::PropertyNotFound { .. }
        | ModelbaseError::WorkflowNotFound(_)
        | ModelbaseError::RulesetNotFound(_)
        | ModelbaseError::ObjectNotFound { .. } => {
            HttpResponse::NotFound().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        ModelbaseError::Validation(errors) => {
            let details: Vec<_> = errors
                .iter()
                .map(|f| serde_json::json!({ "property": f.property, "message": f.message }))
                .collect();
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string(),
                "details": details,
            }))
        }
        ModelbaseError::Transition(_)
        | ModelbaseError::Definition(_)
        | ModelbaseError::PropertyTypeMismatch { .. }
        | ModelbaseError::PropertyNotWritable(_) => {
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        ModelbaseError::UniqueConstraintConflict { .. } => {
            HttpResponse::Conflict().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        _ => {
            log::error!("Internal error: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal server error"
            }))
        }
    }
}

fn batch_response(report: BatchReport) -> Handled {
    if report.committed {
        return ok_json(serde_json::json!({
            "message": report.message(),
            "count": report.succeeded,
        }));
    }

    let details: Vec<_> = report
        .failures
        .iter()
        .map(|f| serde_json::json!({ "objectId": f.object_id, "message": f.message }))
        .collect();
    Ok(HttpResponse::BadRequest().json(serde_json::json!({
        "error": report.message(),
        "details": details,
    })))
}

// ── Status ──────────────────────────────────────────────────────────

async fn status(state: web::Data<AppState>) -> HttpResponse {
    with_store(&state, |store| ok_json(store.status()?))
}

// ── Definitions ─────────────────────────────────────────────────────

async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    with_store(&state, |store| {
        let models: Vec<&Model> = store.models().models().collect();
        ok_json(serde_json::to_value(models)?)
    })
}

async fn get_model(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    with_store(&state, |store| ok_json(serde_json::to_value(store.model(&path)?)?))
}

async fn put_model(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Model>,
) -> HttpResponse {
    let mut model = body.into_inner();
    model.id = path.into_inner();
    with_store(&state, |store| {
        let changes: Vec<String> = store.save_model(model)?.iter().map(|c| c.describe()).collect();
        ok_json(serde_json::json!({ "ok": true, "changes": changes }))
    })
}

async fn delete_model(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    with_store(&state, |store| {
        let removed = store.delete_model(&path)?;
        ok_json(serde_json::json!({ "ok": true, "deleted": path.as_str(), "objects_removed": removed }))
    })
}

async fn list_workflows(state: web::Data<AppState>) -> HttpResponse {
    with_store(&state, |store| {
        let workflows: Vec<&Workflow> = store.workflows().iter().collect();
        ok_json(serde_json::to_value(workflows)?)
    })
}

async fn put_workflow(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<Workflow>,
) -> HttpResponse {
    let mut workflow = body.into_inner();
    workflow.id = path.into_inner();
    with_store(&state, |store| {
        let id = workflow.id.clone();
        store.save_workflow(workflow)?;
        ok_json(serde_json::json!({ "ok": true, "id": id }))
    })
}

async fn delete_workflow(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    with_store(&state, |store| {
        store.delete_workflow(&path)?;
        ok_json(serde_json::json!({ "ok": true, "deleted": path.as_str() }))
    })
}

async fn list_rulesets(state: web::Data<AppState>) -> HttpResponse {
    with_store(&state, |store| {
        let rulesets: Vec<&ValidationRuleset> = store.rulesets().iter().collect();
        ok_json(serde_json::to_value(rulesets)?)
    })
}

async fn put_ruleset(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ValidationRuleset>,
) -> HttpResponse {
    let mut ruleset = body.into_inner();
    ruleset.id = path.into_inner();
    with_store(&state, |store| {
        let id = ruleset.id.clone();
        store.save_ruleset(ruleset)?;
        ok_json(serde_json::json!({ "ok": true, "id": id }))
    })
}

async fn delete_ruleset(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    with_store(&state, |store| {
        store.delete_ruleset(&path)?;
        ok_json(serde_json::json!({ "ok": true, "deleted": path.as_str() }))
    })
}

// ── Objects ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_deleted: bool,
}

#[derive(Deserialize)]
struct CreateBody {
    #[serde(default)]
    values: serde_json::Value,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default, alias = "currentStateId")]
    current_state_id: Option<String>,
}

#[derive(Deserialize)]
struct UpdateBody {
    #[serde(default)]
    values: serde_json::Value,
    #[serde(default, alias = "currentStateId")]
    current_state_id: Option<String>,
}

#[derive(Deserialize)]
struct TransitionBody {
    #[serde(alias = "targetStateId")]
    target_state_id: String,
}

/// A missing or `null` values map means "no values".
fn values_map(values: serde_json::Value) -> modelbase::Result<std::collections::BTreeMap<String, RawValue>> {
    match values {
        serde_json::Value::Null => Ok(Default::default()),
        other => input_from_json(other),
    }
}

async fn list_objects(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> HttpResponse {
    with_store(&state, |store| {
        let model = store.model(&path)?;
        let items = store
            .list_objects(&model.id, query.include_deleted)?
            .iter()
            .map(|o| o.to_json(model))
            .collect::<modelbase::Result<Vec<_>>>()?;
        ok_json(serde_json::Value::Array(items))
    })
}

async fn create_object(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CreateBody>,
) -> HttpResponse {
    let body = body.into_inner();
    with_store(&state, |store| {
        let input = ObjectInput {
            values: values_map(body.values)?,
            owner_id: body.owner_id,
            current_state_id: body.current_state_id,
        };
        let object = store.create_object(&path, input)?;
        created_json(object.to_json(store.model(&path)?)?)
    })
}

async fn get_object(state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (model, id) = path.into_inner();
    with_store(&state, |store| {
        let object = store.get_object(&model, &id)?;
        ok_json(object.to_json(store.model(&model)?)?)
    })
}

async fn update_object(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateBody>,
) -> HttpResponse {
    let (model, id) = path.into_inner();
    let body = body.into_inner();
    with_store(&state, |store| {
        let update = ObjectUpdate {
            values: values_map(body.values)?,
            current_state_id: body.current_state_id,
        };
        let object = store.update_object(&model, &id, update)?;
        ok_json(object.to_json(store.model(&model)?)?)
    })
}

async fn delete_object(state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (model, id) = path.into_inner();
    with_store(&state, |store| {
        store.soft_delete_object(&model, &id)?;
        ok_json(serde_json::json!({ "ok": true, "deleted": id }))
    })
}

async fn restore_object(state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (model, id) = path.into_inner();
    with_store(&state, |store| {
        let object = store.restore_object(&model, &id)?;
        ok_json(object.to_json(store.model(&model)?)?)
    })
}

async fn transition_object(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<TransitionBody>,
) -> HttpResponse {
    let (model, id) = path.into_inner();
    with_store(&state, |store| {
        let object = store.transition_object(&model, &id, &body.target_state_id)?;
        ok_json(object.to_json(store.model(&model)?)?)
    })
}

async fn object_detail(state: web::Data<AppState>, path: web::Path<(String, String)>) -> HttpResponse {
    let (model, id) = path.into_inner();
    with_store(&state, |store| {
        ok_json(serde_json::to_value(store.object_detail(&model, &id)?)?)
    })
}

// ── Batch ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPropertyBody {
    object_ids: Vec<String>,
    property_name: String,
    property_type: String,
    #[serde(default)]
    new_value: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchStateBody {
    object_ids: Vec<String>,
    target_state_id: String,
}

async fn batch_property(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<BatchPropertyBody>,
) -> HttpResponse {
    let body = body.into_inner();
    with_store(&state, |store| {
        let mutation = Mutation::Property {
            property_name: body.property_name,
            property_type: body.property_type.parse::<PropertyType>()?,
            new_value: RawValue::Json(body.new_value),
        };
        batch_response(store.apply_batch(&path, &body.object_ids, &mutation)?)
    })
}

async fn batch_state(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<BatchStateBody>,
) -> HttpResponse {
    let body = body.into_inner();
    with_store(&state, |store| {
        let mutation = Mutation::WorkflowState {
            target_state_id: body.target_state_id,
        };
        batch_response(store.apply_batch(&path, &body.object_ids, &mutation)?)
    })
}
