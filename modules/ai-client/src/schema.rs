use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types usable as a strict structured-output schema.
///
/// Strict-mode `json_schema` response formats require every object to set
/// `additionalProperties: false`, list all properties as `required`
/// (nullable ones included), and contain no `$ref` indirection. This is
/// derived mechanically from the `schemars` schema.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> serde_json::Value {
        let mut value = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        let definitions = value
            .as_object()
            .and_then(|m| m.get("definitions").or_else(|| m.get("$defs")))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        tighten(&mut value, &definitions);

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$defs");
            map.remove("$schema");
        }
        value
    }

    fn output_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// One recursive pass: inline refs, collapse single-entry allOf wrappers,
/// and make every object schema strict.
fn tighten(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(path)) = map.get("$ref").cloned() {
                let name = path
                    .trim_start_matches("#/definitions/")
                    .trim_start_matches("#/$defs/");
                if let Some(def) = definitions.get(name) {
                    *value = def.clone();
                    tighten(value, definitions);
                    return;
                }
            }

            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    *value = all_of.into_iter().next().unwrap();
                    tighten(value, definitions);
                    return;
                }
            }

            if map.get("type") == Some(&serde_json::Value::String("object".into())) {
                map.insert("additionalProperties".into(), serde_json::Value::Bool(false));
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let required: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".into(), serde_json::Value::Array(required));
                }
            }

            for (_, child) in map.iter_mut() {
                tighten(child, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                tighten(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Page {
        url: String,
        number: Option<u32>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Listing {
        pages: Vec<Page>,
        source: String,
    }

    #[test]
    fn objects_are_strict() {
        let schema = Listing::strict_schema();
        assert_eq!(schema["additionalProperties"], false);

        let required = schema["required"].as_array().unwrap();
        let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
        assert!(names.contains(&"pages"));
        assert!(names.contains(&"source"));
    }

    #[test]
    fn nullable_fields_are_still_required() {
        let schema = Page::strict_schema();
        let names: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(names.contains(&"number"));
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = Listing::strict_schema();
        let rendered = serde_json::to_string(&schema).unwrap();
        assert!(!rendered.contains("$ref"));
        assert!(schema.get("definitions").is_none());
        assert!(schema.get("$schema").is_none());

        let item = &schema["properties"]["pages"]["items"];
        assert_eq!(item["type"], "object");
        assert_eq!(item["additionalProperties"], false);
    }

    #[test]
    fn output_name_matches_type() {
        assert_eq!(Listing::output_name(), "Listing");
    }
}
