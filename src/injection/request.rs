use thiserror::Error;
use crate::runtime::definition::DefinitionId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("'{0}' is not a usable node id (whitespace is not allowed)")]
    InvalidId(String),
}

fn check_id(id: &str) -> Result<(), RequestError> {
    if id.is_empty() {
        return Err(RequestError::Empty("id"));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(RequestError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// A user task to inject. Required fields are taken by the constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTaskSpec {
    id: String,
    name: String,
    assignee: Option<String>,
    join_on_complete: bool,
}

impl UserTaskSpec {
    pub fn new(id: &str, name: &str) -> Result<Self, RequestError> {
        check_id(id)?;
        if name.trim().is_empty() {
            return Err(RequestError::Empty("name"));
        }
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            assignee: None,
            join_on_complete: true,
        })
    }

    pub fn with_assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }

    /// Whether the injected branch is merged back before the anchor's continuation.
    pub fn join_on_complete(mut self, join: bool) -> Self {
        self.join_on_complete = join;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }

    pub fn joins(&self) -> bool {
        self.join_on_complete
    }
}

/// A deployed definition to embed as a sub-process.
#[derive(Debug, Clone, PartialEq)]
pub struct SubProcessSpec {
    id: String,
    definition: DefinitionId,
    join_on_complete: bool,
}

impl SubProcessSpec {
    pub fn new(id: &str, definition: DefinitionId) -> Result<Self, RequestError> {
        check_id(id)?;
        if definition.key.is_empty() {
            return Err(RequestError::Empty("definition key"));
        }
        Ok(Self {
            id: id.to_string(),
            definition,
            join_on_complete: true,
        })
    }

    pub fn join_on_complete(mut self, join: bool) -> Self {
        self.join_on_complete = join;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &DefinitionId {
        &self.definition
    }

    pub fn joins(&self) -> bool {
        self.join_on_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_spec_defaults_to_joining() {
        let spec = UserTaskSpec::new("custom_task", "My injected task").unwrap();
        assert!(spec.joins());
        assert_eq!(spec.assignee(), None);
    }

    #[test]
    fn task_spec_rejects_blank_fields() {
        assert_eq!(UserTaskSpec::new("", "x"), Err(RequestError::Empty("id")));
        assert_eq!(UserTaskSpec::new("a", "  "), Err(RequestError::Empty("name")));
        assert!(matches!(UserTaskSpec::new("a b", "x"), Err(RequestError::InvalidId(_))));
    }
}
