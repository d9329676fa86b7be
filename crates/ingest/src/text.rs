use serde_json::Value;

/// Display names of a record's tags.
///
/// Accepts CKAN tag objects (`display_name`, `displaytext` or `name`) and
/// plain strings.
pub fn tag_names(metadata: &Value) -> Vec<String> {
    let Some(tags) = metadata.get("tags").and_then(Value::as_array) else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(|tag| match tag {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => ["display_name", "displaytext", "name"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str)),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Text embedded for a record: labeled title, description and tags, in that order
pub fn embedding_text(metadata: &Value) -> String {
    let field = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
    };

    format!(
        "Title: {} Description: {} Tags: {}",
        field("title"),
        field("notes"),
        tag_names(metadata).join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedding_text_layout() {
        let metadata = json!({
            "title": "Road Closures",
            "notes": "Current closures on provincial highways.",
            "tags": [{ "display_name": "roads" }, { "displaytext": "transport" }, "alerts"],
        });
        assert_eq!(
            embedding_text(&metadata),
            "Title: Road Closures Description: Current closures on provincial highways. Tags: roads, transport, alerts"
        );
    }

    #[test]
    fn test_missing_fields_render_empty() {
        assert_eq!(embedding_text(&json!({})), "Title:  Description:  Tags: ");
    }

    #[test]
    fn test_tag_names_skip_unusable_entries() {
        let metadata = json!({ "tags": [{ "id": 1 }, 42, " ", { "name": "water" }] });
        assert_eq!(tag_names(&metadata), vec!["water"]);
    }
}
