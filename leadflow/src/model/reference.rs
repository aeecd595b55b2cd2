//! Reference dictionaries loaded once per batch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::timeline::StatusRef;

/// One pipeline with its status labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name.
    pub name: String,
    /// Status id to label.
    #[serde(default, alias = "status")]
    pub statuses: HashMap<i64, String>,
}

/// `{pipeline_id: {name, statuses}}` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDirectory {
    pipelines: HashMap<i64, Pipeline>,
}

impl PipelineDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, id: i64, pipeline: Pipeline) -> Self {
        self.pipelines.insert(id, pipeline);
        self
    }

    /// Inserts or replaces a pipeline.
    pub fn insert(&mut self, id: i64, pipeline: Pipeline) {
        self.pipelines.insert(id, pipeline);
    }

    /// Looks up a pipeline.
    #[must_use]
    pub fn pipeline(&self, id: i64) -> Option<&Pipeline> {
        self.pipelines.get(&id)
    }

    /// Resolves a status label. `None` when either level is unknown.
    #[must_use]
    pub fn status_label(&self, status: StatusRef) -> Option<&str> {
        self.pipeline(status.pipeline_id)
            .and_then(|p| p.statuses.get(&status.id))
            .map(String::as_str)
    }

    /// Number of pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if no pipelines are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statuses: HashMap::new(),
        }
    }

    /// Adds a status label.
    #[must_use]
    pub fn with_status(mut self, id: i64, label: impl Into<String>) -> Self {
        self.statuses.insert(id, label.into());
        self
    }
}

/// A CRM user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name.
    pub name: String,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
    /// Team or group.
    #[serde(default)]
    pub group: Option<String>,
}

impl User {
    /// Creates a user with a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// `{user_id: user}` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserDirectory {
    users: HashMap<i64, User>,
}

impl UserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user.
    #[must_use]
    pub fn with_user(mut self, id: i64, user: User) -> Self {
        self.users.insert(id, user);
        self
    }

    /// Inserts or replaces a user.
    pub fn insert(&mut self, id: i64, user: User) {
        self.users.insert(id, user);
    }

    /// Looks up a user.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&User> {
        self.users.get(&id)
    }

    /// Resolves an optional id to a display name.
    #[must_use]
    pub fn name_of(&self, id: Option<i64>) -> Option<&str> {
        id.and_then(|id| self.get(id)).map(|u| u.name.as_str())
    }
}

/// Read-only reference data shared by every lead of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Pipelines and statuses.
    pub pipelines: PipelineDirectory,
    /// Users.
    pub users: UserDirectory,
}

impl ReferenceData {
    /// Bundles both dictionaries.
    #[must_use]
    pub const fn new(pipelines: PipelineDirectory, users: UserDirectory) -> Self {
        Self { pipelines, users }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label_lookup() {
        let dir = PipelineDirectory::new()
            .with_pipeline(10, Pipeline::new("Main").with_status(1, "НОВЫЕ ЗАЯВКИ"));

        assert_eq!(
            dir.status_label(StatusRef { id: 1, pipeline_id: 10 }),
            Some("НОВЫЕ ЗАЯВКИ")
        );
        assert_eq!(dir.status_label(StatusRef { id: 2, pipeline_id: 10 }), None);
        assert_eq!(dir.status_label(StatusRef { id: 1, pipeline_id: 11 }), None);
    }

    #[test]
    fn test_pipeline_directory_from_json() {
        let dir: PipelineDirectory = serde_json::from_str(
            r#"{"10": {"name": "Main", "status": {"142": "Успешно реализовано"}}}"#,
        )
        .unwrap();
        assert_eq!(
            dir.status_label(StatusRef { id: 142, pipeline_id: 10 }),
            Some("Успешно реализовано")
        );
    }

    #[test]
    fn test_user_name_of() {
        let users = UserDirectory::new().with_user(7, User::named("Ana"));
        assert_eq!(users.name_of(Some(7)), Some("Ana"));
        assert_eq!(users.name_of(Some(8)), None);
        assert_eq!(users.name_of(None), None);
    }
}
