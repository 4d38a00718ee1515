//! Wire DTOs shared by every call site.
//!
//! # Design
//! Only the shapes the client itself depends on are typed. Records such as
//! issues and test runs stay `serde_json::Value`, since their schema belongs
//! to the backend; their field lists are read through `crate::fields`.

use serde::{Deserialize, Serialize};

/// Bearer credential scoped to one project, returned by `<project>/token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<String>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_on: None,
        }
    }
}

/// One entry of the `projects` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
}

/// Body of `GET projects`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_uses_camel_case() {
        let token: AccessToken =
            serde_json::from_str(r#"{"accessToken":"abc","expiresOn":"2019-04-01T00:00:00Z"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_on.as_deref(), Some("2019-04-01T00:00:00Z"));
    }

    #[test]
    fn token_without_expiry() {
        let json = serde_json::to_value(AccessToken::new("abc")).unwrap();
        assert_eq!(json, serde_json::json!({"accessToken": "abc"}));
    }

    #[test]
    fn project_list_tolerates_missing_ids() {
        let list: ProjectList = serde_json::from_str(r#"{"projects":[{"name":"Sample"}]}"#).unwrap();
        assert_eq!(list.projects[0].name, "Sample");
        assert!(list.projects[0].id.is_none());
    }
}
