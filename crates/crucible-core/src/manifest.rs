//! Plugin manifest: per-plugin metadata parsed from `manifest.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON object alias used for config sections and free-form metadata.
pub type JsonMap = serde_json::Map<String, Value>;

/// Metadata describing a single plugin, parsed from the `manifest.json`
/// inside its folder at discovery time.
///
/// The manifest is immutable for the lifetime of a loaded plugin and is
/// discarded at unload. `name` must equal the plugin's folder name and
/// `contract` must equal the folder-name prefix; discovery cross-validates
/// both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin identifier (equals the folder name).
    pub name: String,
    /// Semantic version string, e.g. `"1.0.0"`.
    pub version: String,
    /// Contract tag this plugin implements (`"tts"`, `"stt"`, `"llm"`, …).
    pub contract: String,
    /// Entry symbol the loader resolves in the factory registry.
    pub entry_point: String,

    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,

    /// Package requirement strings, e.g. `"onnxruntime>=1.16"`.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Interpreter constraint carried over from python-era plugin tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_requires: Option<String>,

    #[serde(default)]
    pub gpu_required: bool,
    #[serde(default)]
    pub gpu_recommended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory_mb: Option<u64>,

    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional capabilities the plugin declares beyond the contract's
    /// required set (e.g. `"streaming"`).
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// JSON Schema for the plugin's own configuration section.
    #[serde(default)]
    pub config_schema: JsonMap,
    /// Defaults overlaid by caller-supplied config at initialization.
    #[serde(default)]
    pub default_config: JsonMap,
}

impl PluginManifest {
    /// Parses a manifest from a JSON value, failing on missing required keys.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Display name, falling back to the identifier when unset.
    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Wire form for JSON-RPC responses, with the display-name fallback
    /// applied.
    pub fn to_wire(&self) -> Value {
        let mut value = serde_json::to_value(self).expect("manifest serializes");
        value["display_name"] = Value::String(self.display_name().to_string());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "name": "tts_example_plugin",
            "version": "1.0.0",
            "contract": "tts",
            "entry_point": "tts_example",
        })
    }

    #[test]
    fn parses_minimal_manifest_with_defaults() {
        let manifest = PluginManifest::from_value(minimal()).unwrap();
        assert_eq!(manifest.name, "tts_example_plugin");
        assert_eq!(manifest.contract, "tts");
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.default_config.is_empty());
        assert!(!manifest.gpu_required);
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut value = minimal();
        value.as_object_mut().unwrap().remove("contract");
        assert!(PluginManifest::from_value(value).is_err());
    }

    #[test]
    fn wire_form_falls_back_to_name_for_display() {
        let manifest = PluginManifest::from_value(minimal()).unwrap();
        let wire = manifest.to_wire();
        assert_eq!(wire["display_name"], "tts_example_plugin");

        let mut value = minimal();
        value["display_name"] = json!("Example TTS");
        let manifest = PluginManifest::from_value(value).unwrap();
        assert_eq!(manifest.to_wire()["display_name"], "Example TTS");
    }

    #[test]
    fn preserves_default_config_section() {
        let mut value = minimal();
        value["default_config"] = json!({"default_voice": "alice", "sample_rate": 22050});
        let manifest = PluginManifest::from_value(value).unwrap();
        assert_eq!(manifest.default_config["default_voice"], "alice");
    }
}
