//! GCP Projects
//!
//! Project metadata lookups used to build the common columns.

use super::client::GcpClient;
use crate::engine::Result;
use serde_json::Value;

/// Project information
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_number: String,
    pub lifecycle_state: String,
}

impl From<&Value> for Project {
    fn from(value: &Value) -> Self {
        let field = |name: &str, default: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            project_id: field("projectId", "-"),
            name: field("name", "-"),
            project_number: field("projectNumber", "-"),
            lifecycle_state: field("lifecycleState", "UNKNOWN"),
        }
    }
}

/// Fetch one project by id
pub async fn get_project(client: &GcpClient, project_id: &str) -> Result<Project> {
    let url = client.resourcemanager_url(&format!(
        "projects/{}",
        urlencoding::encode(project_id)
    ));
    let response = client.get(&url).await?;

    Ok(Project::from(&response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_from_value() {
        let project = Project::from(&json!({
            "projectId": "alpha-project",
            "name": "Alpha",
            "projectNumber": "123456789012",
            "lifecycleState": "ACTIVE"
        }));

        assert_eq!(project.project_id, "alpha-project");
        assert_eq!(project.project_number, "123456789012");
        assert_eq!(project.lifecycle_state, "ACTIVE");
    }

    #[test]
    fn test_project_defaults() {
        let project = Project::from(&json!({}));
        assert_eq!(project.project_number, "-");
        assert_eq!(project.lifecycle_state, "UNKNOWN");
    }
}
