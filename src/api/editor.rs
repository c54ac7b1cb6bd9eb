/// Node editor REST API endpoints
///
/// Thin bridge between the browser editor and the engine. Every handler
/// converts LiteGraph payloads to engine calls and back; no graph logic lives
/// here. Rejected operations are already recorded by the engine's error hook,
/// so handlers only translate them to a status code.

use crate::{
    api::litegraph::{LiteGraphLink, LiteGraphNode},
    error::EngineError,
    graph::{registry::NodeTypeInfo, types::NodeUpdate, Settings},
    runtime::engine::{Engine, EngineErrorRecord},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for the editor routes
#[derive(Clone)]
pub struct EditorState {
    pub engine: Arc<Engine>,
    /// Panel listed when a request names none
    pub main_panel_id: String,
}

/// `?panel_id=` filter for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PanelQuery {
    pub panel_id: Option<String>,
}

/// Create node editor routes
pub fn create_editor_routes() -> Router<EditorState> {
    Router::new()
        .route("/api/editor/nodes", get(list_nodes).post(create_node))
        .route("/api/editor/nodes/{id}", put(update_node).delete(delete_node))
        .route("/api/editor/nodes/{id}/settings", put(update_settings))
        .route("/api/editor/links", get(list_links).post(create_link).delete(delete_link))
        .route("/api/editor/node-types", get(list_node_types))
        .route("/api/editor/errors", get(list_errors))
}

/// HTTP status for a rejected engine operation
pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::DuplicateId(_) => StatusCode::CONFLICT,
        EngineError::InvalidEndpoint(_)
        | EngineError::UnknownType(_)
        | EngineError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
    }
}

fn rejected(error: EngineError) -> StatusCode {
    status_for(&error)
}

fn node_view(engine: &Engine, id: &str) -> Result<LiteGraphNode, StatusCode> {
    let snapshot = engine.get_node(id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(LiteGraphNode::from_snapshot(&snapshot, &engine.links(None)))
}

/// List nodes on a panel
///
/// GET /api/editor/nodes?panel_id=Main
async fn list_nodes(
    State(state): State<EditorState>,
    Query(query): Query<PanelQuery>,
) -> Json<Vec<LiteGraphNode>> {
    let panel_id = query.panel_id.unwrap_or(state.main_panel_id);
    let links = state.engine.links(None);

    let nodes = state
        .engine
        .nodes(Some(&panel_id))
        .iter()
        .map(|snapshot| LiteGraphNode::from_snapshot(snapshot, &links))
        .collect();

    Json(nodes)
}

/// Create a node from an editor node
///
/// POST /api/editor/nodes
/// Body: { "id": "...", "type": "Time/DelayedValue", "pos": [x, y], "properties": { "objectType": "..." } }
///
/// Properties other than `objectType` are applied as the node's initial settings.
async fn create_node(
    State(state): State<EditorState>,
    Json(payload): Json<LiteGraphNode>,
) -> Result<Json<LiteGraphNode>, StatusCode> {
    let engine = &state.engine;
    let mut node = engine
        .create_configured_node(payload.type_tag(), &payload.settings())
        .map_err(rejected)?;

    if !payload.id.is_empty() {
        node.set_id(payload.id.clone());
    }
    if !payload.title.is_empty() {
        node.title = payload.title.clone();
    }
    node.panel_id = payload
        .panel_id
        .clone()
        .unwrap_or_else(|| state.main_panel_id.clone());
    node.position = payload.position();
    node.size = payload.layout_size();

    let id = engine.add_node(node).map_err(rejected)?;
    tracing::info!("🧱 Editor created node '{}' ({})", id, payload.type_tag());

    node_view(engine, &id).map(Json)
}

/// Move or resize a node
///
/// PUT /api/editor/nodes/:id
/// Body: an editor node; only `title`, `pos` and `size` are read
async fn update_node(
    State(state): State<EditorState>,
    Path(id): Path<String>,
    Json(payload): Json<LiteGraphNode>,
) -> Result<Json<LiteGraphNode>, StatusCode> {
    let mut update = NodeUpdate::new(&id);
    update.title = Some(payload.title.clone()).filter(|title| !title.is_empty());
    update.position = payload.position();
    update.size = payload.layout_size();

    state.engine.update_node(update).map_err(rejected)?;
    node_view(&state.engine, &id).map(Json)
}

/// Replace settings of a node
///
/// PUT /api/editor/nodes/:id/settings
/// Body: { "min": "0", "max": "10" }
async fn update_settings(
    State(state): State<EditorState>,
    Path(id): Path<String>,
    Json(settings): Json<Settings>,
) -> Result<Json<LiteGraphNode>, StatusCode> {
    let mut update = NodeUpdate::new(&id);
    update.settings = Some(settings);

    state.engine.update_node(update).map_err(rejected)?;
    tracing::info!("⚙️ Editor updated settings of node '{}'", id);

    node_view(&state.engine, &id).map(Json)
}

/// Delete a node and its links
///
/// DELETE /api/editor/nodes/:id
async fn delete_node(
    State(state): State<EditorState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let removed = state.engine.remove_node(&id).map_err(rejected)?;

    Ok(Json(json!({
        "message": format!("Node '{}' deleted", id),
        "removed_links": removed.len(),
    })))
}

/// List links on a panel
///
/// GET /api/editor/links?panel_id=Main
async fn list_links(
    State(state): State<EditorState>,
    Query(query): Query<PanelQuery>,
) -> Json<Vec<LiteGraphLink>> {
    let panel_id = query.panel_id.unwrap_or(state.main_panel_id);

    let links = state
        .engine
        .links(Some(&panel_id))
        .iter()
        .filter_map(|link| LiteGraphLink::from_link(link, &state.engine))
        .collect();

    Json(links)
}

/// Link an output slot to an input slot
///
/// POST /api/editor/links
/// Body: { "origin_id": "...", "origin_slot": 0, "target_id": "...", "target_slot": 0 }
async fn create_link(
    State(state): State<EditorState>,
    Json(payload): Json<LiteGraphLink>,
) -> Result<Json<LiteGraphLink>, StatusCode> {
    let engine = &state.engine;
    let (output_id, input_id) = resolve(engine, &payload, "create")?;

    let link = engine.add_link(&output_id, &input_id).map_err(rejected)?;
    LiteGraphLink::from_link(&link, engine)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Remove the link between two slots
///
/// DELETE /api/editor/links
/// Body: same shape as link creation
async fn delete_link(
    State(state): State<EditorState>,
    Json(payload): Json<LiteGraphLink>,
) -> Result<Json<Value>, StatusCode> {
    let engine = &state.engine;
    let (output_id, input_id) = resolve(engine, &payload, "remove")?;

    let link = engine.remove_link(&output_id, &input_id).map_err(rejected)?;
    Ok(Json(json!({ "message": format!("Link '{}' deleted", link.id) })))
}

/// Slot addressing is resolved here, so its failures are reported here too
fn resolve(engine: &Engine, link: &LiteGraphLink, action: &str) -> Result<(String, String), StatusCode> {
    link.resolve_ports(engine).map_err(|e| {
        engine.log_engine_error(format!(
            "Can't {} link from [{}] to [{}]: {}",
            action, link.origin_id, link.target_id, e
        ));
        status_for(&e)
    })
}

/// Node palette
///
/// GET /api/editor/node-types
async fn list_node_types(State(state): State<EditorState>) -> Json<Vec<NodeTypeInfo>> {
    Json(state.engine.registry().list())
}

/// Recently rejected operations, oldest first
///
/// GET /api/editor/errors
async fn list_errors(State(state): State<EditorState>) -> Json<Vec<EngineErrorRecord>> {
    Json(state.engine.recent_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::NodeTypeRegistry;
    use crate::graph::types::MAIN_PANEL_ID;
    use crate::nodes::{constant, delayed_value, panel, slider};
    use crate::runtime::clock::ManualClock;
    use std::collections::BTreeMap;

    fn state() -> EditorState {
        EditorState {
            engine: Arc::new(Engine::new(
                Arc::new(NodeTypeRegistry::with_builtin_nodes()),
                Arc::new(ManualClock::new()),
            )),
            main_panel_id: MAIN_PANEL_ID.to_string(),
        }
    }

    fn editor_node(id: &str, type_tag: &str) -> LiteGraphNode {
        LiteGraphNode {
            id: id.to_string(),
            properties: BTreeMap::from([("objectType".to_string(), type_tag.to_string())]),
            pos: Some([10.0, 20.0]),
            ..Default::default()
        }
    }

    fn editor_link(origin: &str, target: &str, target_slot: usize) -> LiteGraphLink {
        LiteGraphLink {
            origin_id: origin.to_string(),
            origin_slot: 0,
            target_id: target.to_string(),
            target_slot,
            ..Default::default()
        }
    }

    async fn add(state: &EditorState, id: &str, type_tag: &str) -> LiteGraphNode {
        create_node(State(state.clone()), Json(editor_node(id, type_tag)))
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_create_and_list_nodes() {
        let state = state();
        let created = add(&state, "d1", delayed_value::TYPE_TAG).await;

        assert_eq!(created.id, "d1");
        assert_eq!(created.title, "Delayed Value");
        assert_eq!(created.pos, Some([10.0, 20.0]));
        assert_eq!(created.panel_id.as_deref(), Some(MAIN_PANEL_ID));

        let Json(main) = list_nodes(State(state.clone()), Query(PanelQuery::default())).await;
        assert_eq!(main.len(), 1);

        let Json(other) = list_nodes(
            State(state.clone()),
            Query(PanelQuery {
                panel_id: Some("Other".to_string()),
            }),
        )
        .await;
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_create_node_status_codes() {
        let state = state();
        add(&state, "c1", constant::TYPE_TAG).await;

        let duplicate = create_node(State(state.clone()), Json(editor_node("c1", constant::TYPE_TAG))).await;
        assert_eq!(duplicate.unwrap_err(), StatusCode::CONFLICT);

        let unknown = create_node(State(state.clone()), Json(editor_node("x", "Foo.Bar.DoesNotExist"))).await;
        assert_eq!(unknown.unwrap_err(), StatusCode::BAD_REQUEST);

        let Json(errors) = list_errors(State(state.clone())).await;
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_link_lifecycle() {
        let state = state();
        add(&state, "c1", constant::TYPE_TAG).await;
        add(&state, "d1", delayed_value::TYPE_TAG).await;

        let Json(link) = create_link(State(state.clone()), Json(editor_link("c1", "d1", 1)))
            .await
            .unwrap();
        assert_eq!(link.target_slot, 1);

        let Json(links) = list_links(State(state.clone()), Query(PanelQuery::default())).await;
        assert_eq!(links, vec![link.clone()]);

        delete_link(State(state.clone()), Json(editor_link("c1", "d1", 1)))
            .await
            .unwrap();
        assert_eq!(state.engine.link_count(), 0);

        let missing = delete_link(State(state.clone()), Json(editor_link("c1", "d1", 1))).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_to_unknown_slot_is_not_found() {
        let state = state();
        add(&state, "c1", constant::TYPE_TAG).await;
        add(&state, "d1", delayed_value::TYPE_TAG).await;

        let result = create_link(State(state.clone()), Json(editor_link("c1", "d1", 5))).await;

        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
        assert_eq!(state.engine.recent_errors().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_propagate_through_link() {
        let state = state();
        add(&state, "c1", constant::TYPE_TAG).await;
        add(&state, "d1", delayed_value::TYPE_TAG).await;
        create_link(State(state.clone()), Json(editor_link("c1", "d1", 1)))
            .await
            .unwrap();

        let settings = Settings::from([("value".to_string(), "250".to_string())]);
        let Json(view) = update_settings(State(state.clone()), Path("c1".to_string()), Json(settings))
            .await
            .unwrap();

        assert_eq!(view.properties.get("value").map(String::as_str), Some("250"));
        let interval_input = state.engine.get_node("d1").unwrap().inputs[1].clone();
        assert_eq!(interval_input.value.as_deref(), Some("250"));
    }

    #[tokio::test]
    async fn test_invalid_slider_settings_rejected() {
        let state = state();
        add(&state, "s1", slider::TYPE_TAG).await;

        let settings = Settings::from([
            ("min".to_string(), "5".to_string()),
            ("max".to_string(), "1".to_string()),
        ]);
        let result = update_settings(State(state.clone()), Path("s1".to_string()), Json(settings)).await;

        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
        let snapshot = state.engine.get_node("s1").unwrap();
        assert_eq!(snapshot.settings.get("max").map(String::as_str), Some("100"));
    }

    #[tokio::test]
    async fn test_update_and_delete_node() {
        let state = state();
        add(&state, "c1", constant::TYPE_TAG).await;

        let layout = LiteGraphNode {
            pos: Some([1.0, 2.0]),
            size: Some([140.0, 30.0]),
            ..Default::default()
        };
        let Json(view) = update_node(State(state.clone()), Path("c1".to_string()), Json(layout))
            .await
            .unwrap();
        assert_eq!(view.pos, Some([1.0, 2.0]));
        assert_eq!(view.size, Some([140.0, 30.0]));
        assert_eq!(view.title, "Constant");

        delete_node(State(state.clone()), Path("c1".to_string()))
            .await
            .unwrap();
        let again = delete_node(State(state.clone()), Path("c1".to_string())).await;
        assert_eq!(again.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_node_types_palette() {
        let Json(types) = list_node_types(State(state())).await;
        let tags: Vec<&str> = types.iter().map(|t| t.type_tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                constant::TYPE_TAG,
                panel::PANEL_TYPE_TAG,
                panel::INPUT_TYPE_TAG,
                panel::OUTPUT_TYPE_TAG,
                delayed_value::TYPE_TAG,
                slider::TYPE_TAG,
            ]
        );
    }

    #[tokio::test]
    async fn test_create_node_applies_properties() {
        let state = state();
        let mut payload = editor_node("c1", constant::TYPE_TAG);
        payload.properties.insert("value".to_string(), "on".to_string());

        let Json(view) = create_node(State(state.clone()), Json(payload)).await.unwrap();

        assert_eq!(view.properties.get("value").map(String::as_str), Some("on"));
        let output = state.engine.get_node("c1").unwrap().outputs[0].clone();
        assert_eq!(output.value.as_deref(), Some("on"));

        let mut bad = editor_node("s1", slider::TYPE_TAG);
        bad.properties.insert("min".to_string(), "9".to_string());
        bad.properties.insert("max".to_string(), "1".to_string());
        let rejected = create_node(State(state.clone()), Json(bad)).await;
        assert_eq!(rejected.unwrap_err(), StatusCode::BAD_REQUEST);
        assert!(state.engine.get_node("s1").is_none());
    }

    #[tokio::test]
    async fn test_panel_node_exposes_inner_ports() {
        let state = state();
        add(&state, "p1", panel::PANEL_TYPE_TAG).await;
        let mut inner = editor_node("in1", panel::INPUT_TYPE_TAG);
        inner.panel_id = Some("p1".to_string());
        inner.properties.insert("name".to_string(), "Lux".to_string());
        create_node(State(state.clone()), Json(inner)).await.unwrap();

        let Json(nodes) = list_nodes(State(state.clone()), Query(PanelQuery::default())).await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].inputs.len(), 1);
        assert_eq!(nodes[0].inputs[0].name, "Lux");

        let Json(inside) = list_nodes(
            State(state.clone()),
            Query(PanelQuery {
                panel_id: Some("p1".to_string()),
            }),
        )
        .await;
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].properties.get("name").map(String::as_str), Some("Lux"));
    }
}
