//! Manifest and contract validation.
//!
//! Two depths:
//!
//! - **Shallow** (pre-load): the manifest document is checked against the
//!   manifest JSON Schema and the contract tag is checked against the
//!   contract registry.
//! - **Deep** (load-time): additionally the plugin's factory is resolved
//!   from the process registry, a throwaway instance is constructed, and its
//!   operation table is diffed against the contract's required and optional
//!   method sets. Missing required methods are fatal.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crucible_core::registry::{self, RegistryError};

use crate::discovery::DiscoveredPlugin;

/// Built-in contract registry, used when `contracts_registry.yaml` is absent
/// from the config directory. The shipped config file carries the same
/// definitions.
const DEFAULT_CONTRACTS: &str = r#"
contracts:
  tts:
    description: Text-to-speech synthesis
    methods:
      required:
        - name: synthesize
          params:
            - { name: text, kind: string, required: true }
            - { name: voice_id, kind: string, required: false }
            - { name: options, kind: object, required: false }
          returns: { kind: object }
        - name: list_voices
          params: []
          returns: { kind: array }
        - name: set_voice
          params:
            - { name: voice_id, kind: string, required: true }
          returns: { kind: boolean }
      optional:
        - name: current_voice
          params: []
          returns: { kind: string }
        - name: supported_languages
          params: []
          returns: { kind: array }
  stt:
    description: Speech-to-text transcription
    methods:
      required:
        - name: transcribe
          params:
            - { name: audio_data, kind: string, required: true }
            - { name: options, kind: object, required: false }
          returns: { kind: object }
      optional:
        - name: start_streaming
          params:
            - { name: config, kind: object, required: false }
          returns: { kind: boolean }
        - name: feed_audio
          params:
            - { name: chunk, kind: string, required: true }
          returns: { kind: object }
        - name: stop_streaming
          params: []
          returns: { kind: object }
        - name: supported_languages
          params: []
          returns: { kind: array }
  llm:
    description: Large-language-model completion
    methods:
      required:
        - name: complete
          params:
            - { name: messages, kind: array, required: true }
            - { name: options, kind: object, required: false }
          returns: { kind: object }
        - name: complete_stream
          params:
            - { name: messages, kind: array, required: true }
            - { name: options, kind: object, required: false }
          returns: { kind: array }
        - name: list_models
          params: []
          returns: { kind: array }
      optional:
        - name: set_model
          params:
            - { name: model_id, kind: string, required: true }
          returns: { kind: boolean }
        - name: current_model
          params: []
          returns: { kind: string }
"#;

/// One declared parameter of a contract method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodParam {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

/// Declared return shape of a contract method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodReturns {
    pub kind: String,
}

/// One method in a contract's capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<MethodParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<MethodReturns>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractMethods {
    #[serde(default)]
    pub required: Vec<MethodSpec>,
    #[serde(default)]
    pub optional: Vec<MethodSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub methods: ContractMethods,
}

#[derive(Debug, Deserialize)]
struct ContractDocument {
    #[serde(default)]
    contracts: BTreeMap<String, ContractInfo>,
}

/// Process-scoped mapping from contract tag to its method sets.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, ContractInfo>,
}

impl ContractRegistry {
    /// Loads `contracts_registry.yaml` from the config directory, falling
    /// back to the built-in definitions.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join("contracts_registry.yaml");
        let document = match fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str::<ContractDocument>(&content) {
                Ok(document) => document,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse contracts_registry.yaml, using defaults");
                    Self::default_document()
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "contracts_registry.yaml not found, using defaults");
                Self::default_document()
            }
        };
        debug!(count = document.contracts.len(), "Loaded contract definitions");
        Self { contracts: document.contracts }
    }

    fn default_document() -> ContractDocument {
        serde_yaml::from_str(DEFAULT_CONTRACTS).expect("built-in contract registry parses")
    }

    /// Registry with only the built-in definitions.
    pub fn builtin() -> Self {
        Self { contracts: Self::default_document().contracts }
    }

    pub fn knows(&self, contract: &str) -> bool {
        self.contracts.contains_key(contract)
    }

    pub fn tags(&self) -> Vec<&str> {
        self.contracts.keys().map(String::as_str).collect()
    }

    pub fn info(&self, contract: &str) -> Option<&ContractInfo> {
        self.contracts.get(contract)
    }

    /// Names of methods a plugin claiming `contract` must implement.
    pub fn required_methods(&self, contract: &str) -> BTreeSet<String> {
        self.method_names(contract, |m| &m.required)
    }

    /// Names of methods a plugin claiming `contract` may implement.
    pub fn optional_methods(&self, contract: &str) -> BTreeSet<String> {
        self.method_names(contract, |m| &m.optional)
    }

    fn method_names(
        &self,
        contract: &str,
        pick: impl Fn(&ContractMethods) -> &Vec<MethodSpec>,
    ) -> BTreeSet<String> {
        self.contracts
            .get(contract)
            .map(|info| pick(&info.methods).iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Outcome of validating one plugin.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub plugin_name: String,
    /// Overall verdict; false as soon as any error is recorded.
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub manifest_valid: bool,
    pub contract_valid: bool,
    /// Contract methods present on the instance.
    pub methods_found: Vec<String>,
    /// Required methods absent from the instance (fatal).
    pub methods_missing: Vec<String>,
    /// Instance methods beyond the contract's declared sets.
    pub methods_extra: Vec<String>,
}

impl ValidationResult {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            manifest_valid: true,
            contract_valid: true,
            methods_found: Vec::new(),
            methods_missing: Vec::new(),
            methods_extra: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.valid = false;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Wire form for JSON-RPC responses.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "plugin_name": self.plugin_name,
            "valid": self.valid,
            "errors": self.errors,
            "warnings": self.warnings,
            "manifest_valid": self.manifest_valid,
            "contract_valid": self.contract_valid,
            "methods": {
                "found": self.methods_found,
                "missing": self.methods_missing,
                "extra": self.methods_extra,
            },
        })
    }
}

/// Validates plugins against the manifest schema and contract registry.
pub struct PluginValidator {
    schema: Option<jsonschema::Validator>,
    contracts: ContractRegistry,
}

impl PluginValidator {
    /// Loads the manifest schema and contract registry from the config
    /// directory. A missing or invalid schema degrades to warnings on every
    /// validation rather than failing construction.
    pub fn load(config_dir: &Path) -> Self {
        let schema_path = config_dir.join("manifest_schema.json");
        let schema = match fs::read_to_string(&schema_path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(document) => match jsonschema::validator_for(&document) {
                    Ok(validator) => Some(validator),
                    Err(e) => {
                        error!(error = %e, "Invalid manifest schema, schema validation disabled");
                        None
                    }
                },
                Err(e) => {
                    error!(error = %e, "Failed to parse manifest_schema.json, schema validation disabled");
                    None
                }
            },
            Err(_) => {
                warn!(path = %schema_path.display(), "manifest_schema.json not found");
                None
            }
        };

        Self { schema, contracts: ContractRegistry::load(config_dir) }
    }

    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    fn validate_manifest_schema(&self, manifest: &Value, result: &mut ValidationResult) {
        let Some(schema) = &self.schema else {
            result.add_warning("Manifest schema not loaded, skipping schema validation");
            return;
        };

        let mut failed = false;
        for err in schema.iter_errors(manifest) {
            failed = true;
            let path = err.instance_path.to_string();
            if path.is_empty() {
                result.add_error(format!("Manifest schema validation failed: {err}"));
            } else {
                result.add_error(format!("Manifest schema validation failed: {err} (at {path})"));
            }
        }
        if failed {
            result.manifest_valid = false;
        }
    }

    fn validate_contract_exists(&self, contract: &str, result: &mut ValidationResult) -> bool {
        if !self.contracts.knows(contract) {
            result.add_error(format!(
                "Unknown contract type '{contract}'. Valid types: {}",
                self.contracts.tags().join(", ")
            ));
            return false;
        }
        true
    }

    /// Deep stage: factory resolution, instantiation, and method diffing.
    fn validate_instance(
        &self,
        entry_point: &str,
        contract: &str,
        result: &mut ValidationResult,
    ) {
        let factory = match registry::find_factory(entry_point) {
            Ok(factory) => factory,
            Err(RegistryError::NotRegistered(_)) => {
                let mut available = registry::registered_entry_points();
                available.sort_unstable();
                result.add_error(format!(
                    "Failed to resolve plugin factory '{entry_point}': not registered in this \
                     host build (available: {})",
                    available.join(", ")
                ));
                return;
            }
            Err(err @ RegistryError::Ambiguous(..)) => {
                result.add_error(format!("Failed to resolve plugin factory '{entry_point}': {err}"));
                return;
            }
        };

        if factory.contract != contract {
            result.contract_valid = false;
            result.add_error(format!(
                "Factory '{entry_point}' serves contract '{}' but manifest declares '{contract}'",
                factory.contract
            ));
            return;
        }

        let instance = match catch_unwind(AssertUnwindSafe(factory.construct)) {
            Ok(instance) => instance,
            Err(_) => {
                result.add_error(format!("Plugin factory '{entry_point}' panicked during construction"));
                return;
            }
        };

        let required = self.contracts.required_methods(contract);
        let optional = self.contracts.optional_methods(contract);
        let present: BTreeSet<String> =
            instance.methods().iter().map(|m| m.to_string()).collect();

        for method in &required {
            if !present.contains(method) {
                result.methods_missing.push(method.clone());
                result.add_error(format!("Missing required method: {method}"));
            }
        }

        result.methods_found = present
            .iter()
            .filter(|m| required.contains(*m) || optional.contains(*m))
            .cloned()
            .collect();
        result.methods_extra = present
            .iter()
            .filter(|m| !required.contains(*m) && !optional.contains(*m))
            .cloned()
            .collect();

        if !result.methods_missing.is_empty() {
            result.contract_valid = false;
        }
    }

    /// Fully validates a discovered plugin.
    ///
    /// Discovery errors are carried over first; a plugin that already failed
    /// discovery is not probed further.
    pub fn validate_from_discovery(
        &self,
        discovered: &DiscoveredPlugin,
        deep_validate: bool,
    ) -> ValidationResult {
        let mut result = ValidationResult::new(&discovered.name);

        for error in &discovered.errors {
            result.add_error(error.clone());
        }
        if !discovered.valid {
            return result;
        }

        self.validate_manifest_schema(&Value::Object(discovered.raw_manifest.clone()), &mut result);

        if !self.validate_contract_exists(&discovered.contract, &mut result) {
            return result;
        }

        if deep_validate {
            self.validate_instance(&discovered.entry_point, &discovered.contract, &mut result);
        }

        if result.valid {
            info!(plugin = %result.plugin_name, "Validation passed");
        } else {
            warn!(
                plugin = %result.plugin_name,
                errors = result.errors.len(),
                "Validation failed"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_tts_manifest, write_plugin_dir};
    use crate::discovery::Discovery;
    use serde_json::json;
    use tempfile::TempDir;

    fn discovered(root: &TempDir, manifest: Value) -> DiscoveredPlugin {
        let plugins = root.path().join("plugins");
        let name = manifest["name"].as_str().unwrap().to_string();
        write_plugin_dir(&plugins, &name, manifest);
        Discovery::new(&plugins, &root.path().join("config"))
            .find(&name)
            .unwrap()
    }

    #[test]
    fn builtin_registry_knows_core_contracts() {
        let registry = ContractRegistry::builtin();
        assert!(registry.knows("tts"));
        assert!(registry.knows("stt"));
        assert!(registry.knows("llm"));
        assert!(!registry.knows("ocr"));

        let required = registry.required_methods("llm");
        assert!(required.contains("complete"));
        assert!(required.contains("complete_stream"));
        assert!(required.contains("list_models"));
    }

    #[test]
    fn shallow_validation_passes_without_schema_document() {
        let root = TempDir::new().unwrap();
        let validator = PluginValidator::load(&root.path().join("config"));
        let plugin = discovered(&root, fake_tts_manifest("tts_fake_plugin"));

        let result = validator.validate_from_discovery(&plugin, false);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.warnings.iter().any(|w| w.contains("schema not loaded")));
    }

    #[test]
    fn deep_validation_finds_contract_methods() {
        let root = TempDir::new().unwrap();
        let validator = PluginValidator::load(&root.path().join("config"));
        let plugin = discovered(&root, fake_tts_manifest("tts_fake_plugin"));

        let result = validator.validate_from_discovery(&plugin, true);
        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.contract_valid);
        assert!(result.methods_found.contains(&"synthesize".to_string()));
        assert!(result.methods_missing.is_empty());
    }

    #[test]
    fn unregistered_entry_point_fails_deep_validation() {
        let root = TempDir::new().unwrap();
        let validator = PluginValidator::load(&root.path().join("config"));
        let mut manifest = fake_tts_manifest("tts_fake_plugin");
        manifest["entry_point"] = json!("missing_factory");
        let plugin = discovered(&root, manifest);

        let result = validator.validate_from_discovery(&plugin, true);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("not registered")));
    }

    #[test]
    fn discovery_errors_short_circuit_validation() {
        let root = TempDir::new().unwrap();
        let validator = PluginValidator::load(&root.path().join("config"));
        let mut manifest = fake_tts_manifest("tts_fake_plugin");
        manifest["contract"] = json!("llm");
        let plugin = discovered(&root, manifest);

        let result = validator.validate_from_discovery(&plugin, true);
        assert!(!result.valid);
        assert!(result.methods_found.is_empty(), "deep stage must not run");
    }

    #[test]
    fn schema_violations_mark_manifest_invalid() {
        let root = TempDir::new().unwrap();
        let config = root.path().join("config");
        std::fs::create_dir_all(&config).unwrap();
        std::fs::write(
            config.join("manifest_schema.json"),
            json!({
                "type": "object",
                "required": ["name", "version", "contract", "entry_point"],
                "properties": {
                    "version": {"type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$"}
                }
            })
            .to_string(),
        )
        .unwrap();

        let validator = PluginValidator::load(&config);
        let mut manifest = fake_tts_manifest("tts_fake_plugin");
        manifest["version"] = json!("one-point-oh");
        let plugin = discovered(&root, manifest);

        let result = validator.validate_from_discovery(&plugin, false);
        assert!(!result.valid);
        assert!(!result.manifest_valid);
        assert!(result.errors.iter().any(|e| e.contains("schema validation failed")));
    }

    #[test]
    fn contract_mismatch_against_factory_is_fatal() {
        // Manifest and folder agree on "stt", but the factory registered
        // under this entry point serves "tts".
        let root = TempDir::new().unwrap();
        let validator = PluginValidator::load(&root.path().join("config"));
        let manifest = json!({
            "name": "stt_fake_plugin",
            "version": "1.0.0",
            "contract": "stt",
            "entry_point": "fake_tts",
        });
        let plugin = discovered(&root, manifest);

        let result = validator.validate_from_discovery(&plugin, true);
        assert!(!result.valid);
        assert!(!result.contract_valid);
        assert!(result.errors.iter().any(|e| e.contains("serves contract 'tts'")));
    }
}
