//! Command-line workflows over the ALM REST client.
//!
//! Each workflow is a plain function over a `RequestExecutor`, so the same
//! code drives the binary and the tests against the mock backend.

pub mod workflows;

pub use workflows::{
    access_token, add_event, add_found_by, generate_test_runs, list_issues, list_projects, set_priority,
    FoundByRecord, GenerateTestRuns, TestRunSet, Variant, WorkflowEvent,
};
