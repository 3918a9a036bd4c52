use indexmap::IndexSet;

/// Human readable problems collected before publishing.
///
/// Adding the same message twice keeps a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(IndexSet<String>);

impl ValidationErrors {
    pub fn add(&mut self, error: impl Into<String>) {
        self.0.insert(error.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl IntoIterator for ValidationErrors {
    type IntoIter = indexmap::set::IntoIter<String>;
    type Item = String;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
