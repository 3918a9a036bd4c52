use serde::{Deserialize, Serialize};

/// A (possibly nested) layer group to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub layers: Vec<GroupMember>,
}

/// A member of a layer group, either a layer name or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupMember {
    Layer(String),
    Group(GroupDescriptor),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn members_deserialize_untagged() {
        let group: GroupDescriptor = serde_json::from_value(json!({
            "name": "base",
            "title": "Base map",
            "abstract": "Background layers",
            "layers": ["roads", {"name": "water", "title": "Water", "layers": ["rivers"]}]
        }))
        .unwrap();

        assert_eq!(group.abstract_text, "Background layers");
        assert_eq!(group.layers[0], GroupMember::Layer("roads".to_string()));
        assert_eq!(
            group.layers[1],
            GroupMember::Group(GroupDescriptor {
                name: "water".to_string(),
                title: "Water".to_string(),
                abstract_text: String::new(),
                layers: vec![GroupMember::Layer("rivers".to_string())],
            })
        );
    }
}
