//! Example call sites: each one builds a URL, executes, inspects the
//! envelope, and where needed reads or rewrites fields and executes again.
//!
//! Progress goes to `out`; a failed step returns an error carrying the
//! message an operator should see. Backend error lines have already been
//! printed by the executor by then.

use std::io::Write;

use alm_core::fields::{read_fields, write_fields};
use alm_core::{
    get_value, set_value, AccessToken, Field, FieldValue, FormattedString, MenuItem, ProjectList, RequestExecutor,
    ResponseEnvelope, Transport, UserRef,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// A workflow event and the fields to set with it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsData {
    pub events_data: Vec<WorkflowEvent>,
}

/// One "Found by" (reported by) sub-record of an issue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundByRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_found: Option<String>,
    pub description: FormattedString,
    pub found_by: UserRef,
    pub version_found: String,
}

impl FoundByRecord {
    /// Without a date the backend records the current one.
    pub fn new(date_found: Option<&str>, description: &str, found_by: &str, version_found: &str) -> Self {
        Self {
            date_found: date_found.map(str::to_string),
            description: FormattedString {
                text: description.to_string(),
                ..FormattedString::default()
            },
            found_by: UserRef {
                username: found_by.to_string(),
                ..UserRef::default()
            },
            version_found: version_found.to_string(),
        }
    }
}

/// One test variant and the menu values to generate runs for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub label: String,
    pub menu_item_array: Vec<MenuItem>,
}

impl Variant {
    /// Parse `Label=Value`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (label, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("variant '{raw}' must look like Label=Value"))?;
        Ok(Self {
            label: label.trim().to_string(),
            menu_item_array: vec![MenuItem {
                label: value.trim().to_string(),
                ..MenuItem::default()
            }],
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestRunSet {
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestRuns {
    #[serde(rename = "testCaseIDs")]
    pub test_case_ids: Vec<u64>,
    pub test_run_set: TestRunSet,
    pub variants: Vec<Variant>,
    pub events_data: Vec<WorkflowEvent>,
}

fn issue_path<T: Transport>(exec: &RequestExecutor<T>, issue_id: u64) -> String {
    format!("{}/issues/{issue_id}", exec.config().project_path())
}

/// Successful payload, or an error built from `failure`.
fn require_payload(envelope: ResponseEnvelope, failure: impl FnOnce() -> String) -> Result<Value> {
    if !envelope.is_success() {
        bail!(failure());
    }
    envelope
        .into_payload()
        .ok_or_else(|| anyhow!("{}: response had no body", failure()))
}

/// Print every project the configured user can access.
pub fn list_projects<T: Transport>(exec: &RequestExecutor<T>, out: &mut dyn Write) -> Result<()> {
    let envelope = exec.get("projects", None);
    if !envelope.is_success() {
        let mut message = String::from("Failed to retrieve projects.");
        if envelope.status_code() == 500 {
            message.push_str(
                "\n\tTroubleshooting advice: Is the Helix ALM Server running? Check the REST API \
                 \"helixAlmHostName\" and \"helixAlmPort\" in the helix-alm-rest-api/config/config.json file.",
            );
        }
        bail!(message);
    }
    let projects: ProjectList = match envelope.into_payload() {
        Some(payload) => serde_json::from_value(payload).context("unexpected projects listing")?,
        None => ProjectList::default(),
    };
    writeln!(out, "Projects = {}", projects.projects.len())?;
    for project in &projects.projects {
        writeln!(out, "{}", project.name)?;
    }
    Ok(())
}

/// Exchange the configured basic credentials for a project token.
pub fn access_token<T: Transport>(exec: &RequestExecutor<T>) -> Result<AccessToken> {
    let path = format!("{}/token", exec.config().project_path());
    let payload = require_payload(exec.get(&path, None), || {
        format!("Failed to get an access token for project '{}'.", exec.config().project)
    })?;
    serde_json::from_value(payload).context("unexpected token response")
}

/// Print `<tag> - <Summary>` for each issue.
pub fn list_issues<T: Transport>(exec: &RequestExecutor<T>, token: &AccessToken, out: &mut dyn Write) -> Result<()> {
    let path = format!("{}/issues", exec.config().project_path());
    let payload = require_payload(exec.get(&path, Some(token)), || "Failed to retrieve issues.".to_string())?;
    let issues = payload.get("issues").and_then(Value::as_array).cloned().unwrap_or_default();
    for issue in &issues {
        let fields = read_fields(issue)?;
        let tag = issue.get("tag").and_then(Value::as_str).unwrap_or("?");
        let summary = get_value(&fields, "Summary").and_then(FieldValue::as_str).unwrap_or("");
        writeln!(out, "{tag} - {summary}")?;
    }
    Ok(())
}

/// Fetch an issue, set its Priority by label and write it back.
pub fn set_priority<T: Transport>(
    exec: &RequestExecutor<T>,
    token: &AccessToken,
    issue_id: u64,
    priority: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let path = issue_path(exec, issue_id);
    let mut issue = require_payload(exec.get(&path, Some(token)), || {
        format!("Failed to retrieve an issue with ID {issue_id}.")
    })?;

    let mut fields = read_fields(&issue)?;
    set_value(&mut fields, "Priority", Value::String(priority.to_string()))?;
    write_fields(&mut issue, &fields)?;

    if !exec.put(&path, Some(token), &issue).is_success() {
        bail!("Failed to update issue {issue_id}.");
    }
    writeln!(out, "Issue updated")?;
    Ok(())
}

/// Append a Found by record to an issue.
pub fn add_found_by<T: Transport>(
    exec: &RequestExecutor<T>,
    token: &AccessToken,
    issue_id: u64,
    record: &FoundByRecord,
    out: &mut dyn Write,
) -> Result<()> {
    let path = format!("{}?expand=foundByRecords", issue_path(exec, issue_id));
    let mut issue = require_payload(exec.get(&path, Some(token)), || {
        format!("Failed to retrieve an issue with ID {issue_id}.")
    })?;

    append_found_by(&mut issue, serde_json::to_value(record)?)
        .with_context(|| format!("Issue {issue_id} has an unexpected shape."))?;

    if !exec.put(&path, Some(token), &issue).is_success() {
        bail!("Failed to add reported by record to issue {issue_id}.");
    }
    writeln!(out, "Added reported by record")?;
    Ok(())
}

/// Push `record` onto `foundByRecords.foundByRecordsData`, creating the
/// containers when they are absent or null.
fn append_found_by(issue: &mut Value, record: Value) -> Result<()> {
    let Some(issue) = issue.as_object_mut() else {
        bail!("issue is not a JSON object");
    };
    let container = issue
        .entry("foundByRecords")
        .or_insert_with(|| Value::Object(Map::new()));
    if container.is_null() {
        *container = Value::Object(Map::new());
    }
    let Some(container) = container.as_object_mut() else {
        bail!("foundByRecords is not a JSON object");
    };
    let list = container
        .entry("foundByRecordsData")
        .or_insert_with(|| Value::Array(Vec::new()));
    if list.is_null() {
        *list = Value::Array(Vec::new());
    }
    let Some(list) = list.as_array_mut() else {
        bail!("foundByRecordsData is not a JSON array");
    };
    list.push(record);
    Ok(())
}

/// Post one workflow event to an issue.
pub fn add_event<T: Transport>(
    exec: &RequestExecutor<T>,
    token: &AccessToken,
    issue_id: u64,
    event: WorkflowEvent,
    out: &mut dyn Write,
) -> Result<()> {
    let path = format!("{}/events", issue_path(exec, issue_id));
    let body = EventsData {
        events_data: vec![event],
    };
    let payload = require_payload(exec.post(&path, Some(token), &body), || {
        format!("Failed to add workflow event to issue with ID {issue_id}.")
    })?;
    let id = payload.pointer("/eventsData/0/id").cloned().unwrap_or(Value::Null);
    writeln!(out, "Added workflow event {id}")?;
    Ok(())
}

/// Generate test runs. 201 and 206 are both successes; 206 also reports
/// the test cases that could not be generated.
pub fn generate_test_runs<T: Transport>(
    exec: &RequestExecutor<T>,
    token: &AccessToken,
    request: &GenerateTestRuns,
    out: &mut dyn Write,
) -> Result<()> {
    let path = format!("{}/testruns/generate", exec.config().project_path());
    let envelope = exec.post(&path, Some(token), request);
    if !envelope.is_success() {
        bail!("Failed to generate test runs.");
    }

    let status = envelope.status_code();
    if status != 201 && status != 206 {
        writeln!(out, "Unexpected status code of {status}")?;
        for error in envelope.errors() {
            writeln!(out, "{error}")?;
        }
        bail!("Unexpected status code of {status} while generating test runs.");
    }

    let runs = envelope
        .payload()
        .and_then(|p| p.get("testRuns"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    match runs.first() {
        Some(first) => writeln!(
            out,
            "Generated {} test runs. First generated test run has the tag {}",
            runs.len(),
            first.get("tag").and_then(Value::as_str).unwrap_or("?"),
        )?,
        None => writeln!(out, "Parameters provided resulted in 0 test runs generated.")?,
    }
    if status == 206 {
        for error in envelope.errors() {
            writeln!(out, "{error}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use alm_core::{ClientConfig, HttpMethod, HttpRequest, HttpResponse, TransportOutcome};
    use serde_json::json;

    use super::*;

    /// Answers with queued JSON bodies, in order, and records what was sent.
    #[derive(Default)]
    struct Canned {
        replies: RefCell<Vec<(u16, Value)>>,
        sent: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        fn replying(replies: Vec<(u16, Value)>) -> Self {
            Self {
                replies: RefCell::new(replies),
                ..Self::default()
            }
        }
    }

    impl Transport for Canned {
        fn send(&self, request: &HttpRequest) -> TransportOutcome {
            self.sent.borrow_mut().push(request.clone());
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                return TransportOutcome::Unreachable("no reply queued".to_string());
            }
            let (status, body) = replies.remove(0);
            TransportOutcome::Response(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            })
        }
    }

    fn record() -> FoundByRecord {
        FoundByRecord::new(Some("2019-04-01"), "seen again", "Administrator", "1.0")
    }

    #[test]
    fn found_by_on_malformed_issue_is_an_error() {
        for issue in [
            json!({"id": 1, "foundByRecords": []}),
            json!({"id": 1, "foundByRecords": {"foundByRecordsData": "none"}}),
            json!(["not", "an", "issue"]),
        ] {
            let exec = RequestExecutor::new(ClientConfig::default(), Canned::replying(vec![(200, issue.clone())]));
            let err = add_found_by(&exec, &AccessToken::new("t"), 1, &record(), &mut Vec::<u8>::new()).unwrap_err();
            assert_eq!(err.to_string(), "Issue 1 has an unexpected shape.", "{issue}");
            // Nothing was written back.
            assert_eq!(exec.transport().sent.borrow().len(), 1);
        }
    }

    #[test]
    fn found_by_creates_missing_containers() {
        let exec = RequestExecutor::new(
            ClientConfig::default(),
            Canned::replying(vec![(200, json!({"id": 1, "foundByRecords": null})), (200, json!({"id": 1}))]),
        );
        let mut out = Vec::<u8>::new();
        add_found_by(&exec, &AccessToken::new("t"), 1, &record(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Added reported by record\n");

        let sent = exec.transport().sent.borrow();
        assert_eq!(sent[1].method, HttpMethod::Put);
        let body: Value = serde_json::from_str(sent[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["foundByRecords"]["foundByRecordsData"][0]["versionFound"], "1.0");
    }

    #[test]
    fn variant_parses_label_and_value() {
        let variant = Variant::parse("Operating System = Windows").unwrap();
        assert_eq!(
            serde_json::to_value(variant).unwrap(),
            json!({"label": "Operating System", "menuItemArray": [{"label": "Windows"}]})
        );
    }

    #[test]
    fn variant_requires_equals() {
        assert!(Variant::parse("Windows").is_err());
    }

    #[test]
    fn generate_request_wire_shape() {
        let request = GenerateTestRuns {
            test_case_ids: vec![1],
            test_run_set: TestRunSet {
                label: "Alpha 1 Tests".to_string(),
            },
            variants: Vec::new(),
            events_data: vec![WorkflowEvent {
                name: "Pass".to_string(),
                fields: vec![Field::string("Notes", "Passed by REST API")],
            }],
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({
                "testCaseIDs": [1],
                "testRunSet": {"label": "Alpha 1 Tests"},
                "variants": [],
                "eventsData": [{"name": "Pass", "fields": [
                    {"label": "Notes", "type": "string", "string": "Passed by REST API"}
                ]}],
            })
        );
    }

    #[test]
    fn found_by_record_is_plain_text() {
        let record = FoundByRecord::new(Some("2019-04-01"), "new record", "Administrator", "1.0");
        assert_eq!(
            serde_json::to_value(record).unwrap(),
            json!({
                "dateFound": "2019-04-01",
                "description": {"isFormatted": false, "text": "new record"},
                "foundBy": {"username": "Administrator"},
                "versionFound": "1.0",
            })
        );
    }
}
