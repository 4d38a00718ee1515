use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const PROJECT: &str = "Traditional Template";
pub const USERNAME: &str = "administrator";
pub const PASSWORD: &str = "";

/// Priority menu, in id order starting at 1.
pub const PRIORITIES: [&str; 4] = ["Immediate", "Before Beta", "Before Release", "Future Release"];

/// Test cases that test runs can be generated from.
pub const TEST_CASE_IDS: [u64; 2] = [1, 2];

/// Sub-records only returned when named in `?expand=`.
const EXPANDABLE: [&str; 2] = ["foundByRecords", "eventsData"];

#[derive(Default)]
struct Store {
    issues: BTreeMap<u64, Value>,
    tokens: Vec<String>,
    next_event_id: u64,
    next_test_run_id: u64,
}

impl Store {
    fn seeded() -> Self {
        let mut issues = BTreeMap::new();
        issues.insert(1, seed_issue(1, "Crash when saving a report", "Immediate"));
        issues.insert(2, seed_issue(2, "Typo on login page", "Future Release"));
        Self {
            issues,
            ..Self::default()
        }
    }
}

type Db = Arc<RwLock<Store>>;

fn seed_issue(id: u64, summary: &str, priority: &str) -> Value {
    json!({
        "id": id,
        "tag": format!("IS-{id}"),
        "fields": [
            {"label": "Summary", "type": "string", "string": summary},
            {"label": "Priority", "type": "menuItem",
             "menuItem": {"id": priority_id(priority), "label": priority}},
            {"label": "Description", "type": "formattedString",
             "formattedString": {"isFormatted": true, "text": "<p>Steps to reproduce</p>"}},
            {"label": "Entered By", "type": "user", "user": {"id": 1, "username": "Administrator"}},
            {"label": "Date Entered", "type": "dateTime", "dateTime": "2019-01-04T12:46:37Z"},
        ],
        "foundByRecords": {
            "foundByRecordsData": [{
                "dateFound": "2019-01-04",
                "description": {"isFormatted": false, "text": "Found during smoke test"},
                "foundBy": {"username": "Administrator"},
                "versionFound": "0.9",
            }],
        },
    })
}

fn priority_id(label: &str) -> Option<i64> {
    PRIORITIES.iter().position(|p| *p == label).map(|i| i as i64 + 1)
}

/// Error body in the backend's wire shape.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    element_path: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            element_path: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid or missing credentials")
    }

    fn at(mut self, path: impl Into<String>) -> Self {
        self.element_path = Some(path.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "code": self.status.canonical_reason().unwrap_or("Error"),
            "statusCode": self.status.as_u16(),
            "message": self.message,
        });
        if let Some(path) = &self.element_path {
            body["errorElementPath"] = json!(path);
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.to_json())).into_response()
    }
}

#[derive(Deserialize)]
pub struct IssueQuery {
    pub expand: Option<String>,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::seeded()));
    Router::new()
        .route("/versions", get(versions))
        .route("/projects", get(list_projects))
        .route("/{project}/token", get(issue_token))
        .route("/{project}/issues", get(list_issues))
        .route("/{project}/issues/{id}", get(get_issue).put(update_issue))
        .route("/{project}/issues/{id}/events", post(add_events))
        .route("/{project}/testruns/generate", post(generate_test_runs))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn authorization(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, value) = raw.split_once(' ')?;
    Some((scheme.to_ascii_lowercase(), value.trim().to_string()))
}

fn require_basic(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = format!("{USERNAME}:{PASSWORD}");
    match authorization(headers) {
        Some((scheme, value)) if scheme == "basic" => {
            let decoded = STANDARD
                .decode(value)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if decoded.as_deref() == Some(expected.as_str()) {
                Ok(())
            } else {
                Err(ApiError::unauthorized())
            }
        }
        _ => Err(ApiError::unauthorized()),
    }
}

async fn require_bearer(db: &Db, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some((scheme, token)) = authorization(headers) else {
        return Err(ApiError::unauthorized());
    };
    if scheme == "bearer" && db.read().await.tokens.contains(&token) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

fn check_project(project: &str) -> Result<(), ApiError> {
    if project == PROJECT {
        Ok(())
    } else {
        Err(ApiError::not_found(format!("Project '{project}' not found")))
    }
}

/// Copy of `issue` without the sub-records not named in `expand`.
fn present(issue: &Value, expand: Option<&str>) -> Value {
    let requested: Vec<&str> = expand
        .map(|e| e.split(',').map(str::trim).collect())
        .unwrap_or_default();
    let mut shown = issue.clone();
    if let Value::Object(map) = &mut shown {
        for key in EXPANDABLE {
            if !requested.contains(&key) {
                map.remove(key);
            }
        }
    }
    shown
}

/// Check one wire field, resolving Priority menu items to their id.
fn validate_field(base: &str, field: &mut Value) -> Result<(), ApiError> {
    let label = field
        .get("label")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Field is missing a label").at(base))?
        .to_string();
    let type_tag = field
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request(format!("Field '{label}' is missing a type")).at(base))?
        .to_string();
    if field.get(&type_tag).is_none() {
        return Err(ApiError::bad_request(format!("Field '{label}' has no {type_tag} value"))
            .at(format!("{base}/{type_tag}")));
    }

    match type_tag.as_str() {
        "menuItem" if label == "Priority" => {
            let item = &mut field["menuItem"];
            let item_label = item.get("label").and_then(Value::as_str).unwrap_or_default().to_string();
            let resolved = priority_id(&item_label).ok_or_else(|| {
                ApiError::bad_request(format!("'{item_label}' is not a valid Priority"))
                    .at(format!("{base}/menuItem/label"))
            })?;
            if let Some(id) = item.get("id").and_then(Value::as_i64) {
                if id != resolved {
                    return Err(ApiError::bad_request(format!(
                        "Menu item id {id} does not match label '{item_label}'"
                    ))
                    .at(format!("{base}/menuItem/id")));
                }
            }
            item["id"] = json!(resolved);
        }
        "formattedString" => {
            let flag = field["formattedString"].get("isFormatted");
            if flag.is_some_and(|f| !f.is_boolean()) {
                return Err(ApiError::bad_request("isFormatted must be a boolean")
                    .at(format!("{base}/formattedString/isFormatted")));
            }
        }
        _ => {}
    }
    Ok(())
}

async fn versions() -> Json<Value> {
    Json(json!({"versions": [{"version": "v0"}]}))
}

async fn list_projects(headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    require_basic(&headers)?;
    Ok(Json(json!({"projects": [{"id": 1, "name": PROJECT}]})))
}

async fn issue_token(
    State(db): State<Db>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_basic(&headers)?;
    check_project(&project)?;
    let token = Uuid::new_v4().simple().to_string();
    db.write().await.tokens.push(token.clone());
    Ok(Json(json!({"accessToken": token, "expiresOn": "2099-01-01T00:00:00Z"})))
}

async fn list_issues(
    State(db): State<Db>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_bearer(&db, &headers).await?;
    check_project(&project)?;
    let store = db.read().await;
    let issues: Vec<Value> = store.issues.values().map(|issue| present(issue, None)).collect();
    Ok(Json(json!({"issues": issues})))
}

async fn get_issue(
    State(db): State<Db>,
    Path((project, id)): Path<(String, u64)>,
    Query(query): Query<IssueQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_bearer(&db, &headers).await?;
    check_project(&project)?;
    let store = db.read().await;
    let issue = store
        .issues
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("Issue {id} not found")))?;
    Ok(Json(present(issue, query.expand.as_deref())))
}

async fn update_issue(
    State(db): State<Db>,
    Path((project, id)): Path<(String, u64)>,
    Query(query): Query<IssueQuery>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require_bearer(&db, &headers).await?;
    check_project(&project)?;
    let mut fields = body
        .get("fields")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Issue must include a fields array").at("/fields"))?;
    for (index, field) in fields.iter_mut().enumerate() {
        validate_field(&format!("/fields/{index}"), field)?;
    }

    let mut store = db.write().await;
    let issue = store
        .issues
        .get_mut(&id)
        .ok_or_else(|| ApiError::not_found(format!("Issue {id} not found")))?;
    issue["fields"] = Value::Array(fields);
    if let Some(records) = body.pointer("/foundByRecords/foundByRecordsData") {
        issue["foundByRecords"]["foundByRecordsData"] = records.clone();
    }
    Ok(Json(present(issue, query.expand.as_deref())))
}

async fn add_events(
    State(db): State<Db>,
    Path((project, id)): Path<(String, u64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_bearer(&db, &headers).await?;
    check_project(&project)?;
    let events = body
        .get("eventsData")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("Request must include eventsData").at("/eventsData"))?;

    let mut store = db.write().await;
    if !store.issues.contains_key(&id) {
        return Err(ApiError::not_found(format!("Issue {id} not found")));
    }

    let mut created = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        let base = format!("/eventsData/{index}");
        if event.get("name").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(ApiError::bad_request("Workflow event requires a name").at(format!("{base}/name")));
        }
        let mut stored = event.clone();
        if let Some(fields) = stored.get_mut("fields").and_then(Value::as_array_mut) {
            for (i, field) in fields.iter_mut().enumerate() {
                validate_field(&format!("{base}/fields/{i}"), field)?;
            }
        }
        created.push(stored);
    }
    for event in &mut created {
        store.next_event_id += 1;
        event["id"] = json!(store.next_event_id);
    }

    if let Some(issue) = store.issues.get_mut(&id) {
        if !issue["eventsData"].is_array() {
            issue["eventsData"] = json!([]);
        }
        if let Some(list) = issue["eventsData"].as_array_mut() {
            list.extend(created.iter().cloned());
        }
    }
    Ok((StatusCode::CREATED, Json(json!({"eventsData": created}))))
}

async fn generate_test_runs(
    State(db): State<Db>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_bearer(&db, &headers).await?;
    check_project(&project)?;
    let ids = body
        .get("testCaseIDs")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("Request must include testCaseIDs").at("/testCaseIDs"))?;
    let set_label = body
        .pointer("/testRunSet/label")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Request must name a test run set").at("/testRunSet/label"))?;

    let mut store = db.write().await;
    let mut runs = Vec::new();
    let mut errors = Vec::new();
    for (index, raw) in ids.iter().enumerate() {
        match raw.as_u64().filter(|id| TEST_CASE_IDS.contains(id)) {
            Some(test_case) => {
                store.next_test_run_id += 1;
                let n = store.next_test_run_id;
                runs.push(json!({
                    "id": n,
                    "tag": format!("TR-{n}"),
                    "testCaseID": test_case,
                    "testRunSet": {"label": set_label},
                    "variants": body.get("variants").cloned().unwrap_or_else(|| json!([])),
                    "eventsData": body.get("eventsData").cloned().unwrap_or_else(|| json!([])),
                }));
            }
            None => errors.push(
                ApiError::not_found(format!("Test case {raw} not found"))
                    .at(format!("/testCaseIDs/{index}"))
                    .to_json(),
            ),
        }
    }

    let status = match (runs.is_empty(), errors.is_empty()) {
        (_, true) => StatusCode::CREATED,
        (false, false) => StatusCode::PARTIAL_CONTENT,
        (true, false) => StatusCode::BAD_REQUEST,
    };
    let mut payload = json!({"testRuns": runs});
    if !errors.is_empty() {
        payload["errors"] = Value::Array(errors);
    }
    Ok((status, Json(payload)))
}
