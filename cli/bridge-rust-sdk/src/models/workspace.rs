use std::path::Path;

use derive_more::Display;

use super::validation::ValidationErrors;

/// Name of the GeoServer workspace a project is published to.
///
/// Derived from the project file name, it is empty for unsaved projects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Display)]
pub struct WorkspaceName(String);

impl WorkspaceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The basename of the project file without extension,
    /// with spaces replaced by underscores.
    pub fn from_project_path(path: Option<&Path>) -> Self {
        let name = path
            .and_then(|path| path.file_stem())
            .map(|stem| stem.to_string_lossy().replace(' ', "_"))
            .unwrap_or_default();
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add an error for every reason this name cannot be used as a workspace.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        if self.is_empty() {
            errors.add(
                "Project is not saved. Project must be saved before publishing layers to GeoServer.",
            );
        }
        // a '.' conflicts with GeoServer's namespace resolution
        if self.0.contains('.') {
            errors.add(
                "Project name contains unsupported characters ('.'). \
                 Please save with a different name and try again.",
            );
        }
    }
}

impl AsRef<str> for WorkspaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn derived_from_project_basename() {
        let path = PathBuf::from("/home/user/maps/City Parcels.toml");
        assert_eq!(
            WorkspaceName::from_project_path(Some(&path)).as_str(),
            "City_Parcels"
        );
    }

    #[test]
    fn unsaved_project_has_empty_workspace() {
        let workspace = WorkspaceName::from_project_path(None);
        assert!(workspace.is_empty());

        let mut errors = ValidationErrors::default();
        workspace.validate(&mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn dots_are_rejected() {
        let path = PathBuf::from("/maps/city.v2.toml");
        let workspace = WorkspaceName::from_project_path(Some(&path));
        assert_eq!(workspace.as_str(), "city.v2");

        let mut errors = ValidationErrors::default();
        workspace.validate(&mut errors);
        assert!(errors.iter().any(|e| e.contains("('.')")));
    }

    proptest! {
        #[test]
        fn derived_names_never_contain_spaces(stem in "[a-zA-Z0-9 _-]{1,20}") {
            let path = PathBuf::from(format!("/maps/{stem}.toml"));
            let workspace = WorkspaceName::from_project_path(Some(&path));
            prop_assert!(!workspace.as_str().contains(' '));
        }
    }
}
