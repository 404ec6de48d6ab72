//! Plugin discovery: filesystem scan plus the static prefix registry.
//!
//! Discovery combines two sources:
//!
//! 1. A static registry (`contract_prefixes.yaml`) naming the folder-name
//!    prefixes the host accepts and the contract tag each maps to.
//! 2. A dynamic scan of the plugins directory for folders matching
//!    `<prefix>_<body>_plugin`, each carrying a `manifest.json`.
//!
//! Discovery never fails: every problem is accumulated onto the affected
//! plugin's error list and the scan continues. A plugin is *valid* only when
//! its error list is empty.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crucible_core::manifest::{JsonMap, PluginManifest};

/// Registry entry for one accepted folder-name prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixInfo {
    /// Contract tag plugins under this prefix must declare.
    pub contract: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct PrefixDocument {
    #[serde(default)]
    prefixes: BTreeMap<String, PrefixInfo>,
}

/// Accepted prefixes with the compiled folder-name matcher.
#[derive(Debug, Clone)]
pub struct PrefixRegistry {
    prefixes: BTreeMap<String, PrefixInfo>,
    pattern: Regex,
}

impl PrefixRegistry {
    /// Loads `contract_prefixes.yaml` from the config directory, falling
    /// back to the built-in tts/stt/llm set when the file is absent.
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join("contract_prefixes.yaml");
        let prefixes = match fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str::<PrefixDocument>(&content) {
                Ok(document) => document.prefixes,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse contract_prefixes.yaml, using defaults");
                    Self::default_prefixes()
                }
            },
            Err(_) => {
                warn!(path = %path.display(), "contract_prefixes.yaml not found, using defaults");
                Self::default_prefixes()
            }
        };
        Self::from_prefixes(prefixes)
    }

    fn default_prefixes() -> BTreeMap<String, PrefixInfo> {
        [
            ("tts", "Text-to-speech plugins"),
            ("stt", "Speech-to-text plugins"),
            ("llm", "Large-language-model plugins"),
        ]
        .into_iter()
        .map(|(tag, description)| {
            (
                tag.to_string(),
                PrefixInfo { contract: tag.to_string(), description: description.to_string() },
            )
        })
        .collect()
    }

    fn from_prefixes(prefixes: BTreeMap<String, PrefixInfo>) -> Self {
        let alternatives: Vec<&str> = prefixes.keys().map(String::as_str).collect();
        let pattern = format!("^({})_[a-z0-9_]+_plugin$", alternatives.join("|"));
        // The alternatives are plain identifiers, so the pattern always compiles.
        let pattern = Regex::new(&pattern).expect("prefix pattern compiles");
        debug!(count = prefixes.len(), "Loaded contract prefixes");
        Self { prefixes, pattern }
    }

    /// Accepted prefix strings.
    pub fn tags(&self) -> Vec<&str> {
        self.prefixes.keys().map(String::as_str).collect()
    }

    /// Registry entry for `prefix`, if accepted.
    pub fn info(&self, prefix: &str) -> Option<&PrefixInfo> {
        self.prefixes.get(prefix)
    }

    /// Whether `contract` is a known contract tag.
    pub fn knows_contract(&self, contract: &str) -> bool {
        self.prefixes.values().any(|info| info.contract == contract)
    }

    /// Validates a plugin folder name against `<prefix>_<body>_plugin`.
    ///
    /// Returns the extracted prefix on success, or the accumulated errors.
    pub fn validate_folder_name(&self, folder_name: &str) -> Result<String, Vec<String>> {
        if folder_name.starts_with('_') || folder_name.starts_with('.') {
            return Err(vec![
                "Folder name starts with underscore or dot (reserved)".to_string(),
            ]);
        }

        match self.pattern.captures(folder_name) {
            Some(captures) => Ok(captures[1].to_string()),
            None => {
                let accepted = self.tags().join(", ");
                Err(vec![format!(
                    "Folder name '{folder_name}' does not match pattern. \
                     Expected: <prefix>_<name>_plugin where prefix is one of: {accepted}"
                )])
            }
        }
    }
}

/// A plugin found on disk, before loading.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Absolute path to the plugin folder.
    pub path: PathBuf,
    /// Raw manifest document (empty when unreadable).
    pub raw_manifest: JsonMap,
    /// Fully-typed manifest, present only when every required key parsed.
    pub manifest: Option<PluginManifest>,
    /// Contract tag from the manifest (`"unknown"` when absent).
    pub contract: String,
    pub name: String,
    pub version: String,
    pub entry_point: String,
    /// True only when the error list is empty.
    pub valid: bool,
    pub errors: Vec<String>,
}

impl DiscoveredPlugin {
    /// Wire form for JSON-RPC responses.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "path": self.path.display().to_string(),
            "manifest": Value::Object(self.raw_manifest.clone()),
            "contract": self.contract,
            "name": self.name,
            "version": self.version,
            "entry_point": self.entry_point,
            "valid": self.valid,
            "errors": self.errors,
        })
    }
}

/// Scans a plugins directory against the prefix registry.
pub struct Discovery {
    plugins_dir: PathBuf,
    prefixes: PrefixRegistry,
}

impl Discovery {
    pub fn new(plugins_dir: impl Into<PathBuf>, config_dir: &Path) -> Self {
        let plugins_dir = plugins_dir.into();
        let prefixes = PrefixRegistry::load(config_dir);
        debug!(plugins_dir = %plugins_dir.display(), "Discovery initialized");
        Self { plugins_dir, prefixes }
    }

    /// Builds a discovery over an already-loaded prefix registry.
    pub fn with_registry(plugins_dir: impl Into<PathBuf>, prefixes: PrefixRegistry) -> Self {
        Self { plugins_dir: plugins_dir.into(), prefixes }
    }

    pub fn prefixes(&self) -> &PrefixRegistry {
        &self.prefixes
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Parses `manifest.json` inside a plugin folder.
    ///
    /// Returns the raw document (when readable) and any errors found:
    /// missing file, malformed JSON, or missing required keys.
    pub fn parse_manifest(&self, plugin_path: &Path) -> (Option<JsonMap>, Vec<String>) {
        let manifest_path = plugin_path.join("manifest.json");

        let content = match fs::read_to_string(&manifest_path) {
            Ok(content) => content,
            Err(_) => {
                return (
                    None,
                    vec![format!("manifest.json not found in {}", plugin_path.display())],
                );
            }
        };

        let raw: JsonMap = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return (None, vec!["manifest.json is not a JSON object".to_string()]),
            Err(e) => return (None, vec![format!("Invalid JSON in manifest.json: {e}")]),
        };

        let mut errors = Vec::new();
        for key in ["name", "version", "contract", "entry_point"] {
            if !raw.contains_key(key) {
                errors.push(format!("Missing required field '{key}' in manifest.json"));
            }
        }

        (Some(raw), errors)
    }

    /// Discovers a single plugin folder, accumulating all validation errors.
    pub fn discover_plugin(&self, plugin_path: &Path) -> DiscoveredPlugin {
        let folder_name = plugin_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut errors = Vec::new();

        let prefix = match self.prefixes.validate_folder_name(&folder_name) {
            Ok(prefix) => Some(prefix),
            Err(name_errors) => {
                errors.extend(name_errors);
                None
            }
        };

        let (raw, manifest_errors) = self.parse_manifest(plugin_path);
        errors.extend(manifest_errors);

        let Some(raw) = raw else {
            return DiscoveredPlugin {
                path: plugin_path.to_path_buf(),
                raw_manifest: JsonMap::new(),
                manifest: None,
                contract: "unknown".to_string(),
                name: folder_name,
                version: "0.0.0".to_string(),
                entry_point: "plugin".to_string(),
                valid: false,
                errors,
            };
        };

        let str_field = |key: &str, fallback: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        let name = str_field("name", &folder_name);
        let version = str_field("version", "0.0.0");
        let contract = str_field("contract", "unknown");
        let entry_point = str_field("entry_point", "plugin");

        if name != folder_name {
            errors.push(format!(
                "Manifest name '{name}' does not match folder name '{folder_name}'"
            ));
        }

        if let Some(prefix) = &prefix
            && *prefix != contract
        {
            errors.push(format!(
                "Folder prefix '{prefix}' does not match manifest contract '{contract}'"
            ));
        }

        if !self.prefixes.knows_contract(&contract) {
            errors.push(format!(
                "Unknown contract type '{contract}'. Valid types: {}",
                self.prefixes.tags().join(", ")
            ));
        }

        let manifest = PluginManifest::from_value(Value::Object(raw.clone())).ok();

        DiscoveredPlugin {
            path: plugin_path.to_path_buf(),
            raw_manifest: raw,
            manifest,
            contract,
            name,
            version,
            entry_point,
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Scans the plugins directory.
    ///
    /// Entries that are not directories and names starting with `_` or `.`
    /// (reserved for the host's own subtrees) are skipped. A missing
    /// directory yields an empty result with a warning.
    pub fn scan(&self, include_invalid: bool) -> Vec<DiscoveredPlugin> {
        let mut discovered = Vec::new();

        let entries = match fs::read_dir(&self.plugins_dir) {
            Ok(entries) => entries,
            Err(_) => {
                warn!(path = %self.plugins_dir.display(), "Plugins directory does not exist");
                return discovered;
            }
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                !name.starts_with('.') && !name.starts_with('_')
            })
            .collect();
        folders.sort();

        for folder in folders {
            let plugin = self.discover_plugin(&folder);
            if plugin.valid || include_invalid {
                debug!(
                    plugin = %plugin.name,
                    contract = %plugin.contract,
                    valid = plugin.valid,
                    "Discovered plugin"
                );
                discovered.push(plugin);
            }
        }

        info!(count = discovered.len(), "Discovery complete");
        discovered
    }

    /// Scans for valid plugins of one contract tag.
    pub fn scan_by_contract(&self, contract: &str, include_invalid: bool) -> Vec<DiscoveredPlugin> {
        self.scan(include_invalid)
            .into_iter()
            .filter(|p| p.contract == contract)
            .collect()
    }

    /// Finds one plugin by folder name.
    pub fn find(&self, name: &str) -> Option<DiscoveredPlugin> {
        let plugin_path = self.plugins_dir.join(name);
        if !plugin_path.exists() {
            return None;
        }
        Some(self.discover_plugin(&plugin_path))
    }

    /// Valid plugin names grouped by contract tag.
    pub fn contracts_summary(&self) -> BTreeMap<String, Vec<String>> {
        let mut summary: BTreeMap<String, Vec<String>> = self
            .prefixes
            .prefixes
            .values()
            .map(|info| (info.contract.clone(), Vec::new()))
            .collect();

        for plugin in self.scan(false) {
            if let Some(names) = summary.get_mut(&plugin.contract) {
                names.push(plugin.name);
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_plugin(root: &Path, folder: &str, manifest: Value) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
    }

    fn discovery(root: &TempDir) -> Discovery {
        // No contract_prefixes.yaml in the temp config dir: built-in defaults.
        Discovery::new(root.path().join("plugins"), &root.path().join("config"))
    }

    fn tts_manifest(name: &str) -> Value {
        json!({
            "name": name,
            "version": "1.0.0",
            "contract": "tts",
            "entry_point": "tts_example",
        })
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        let root = TempDir::new().unwrap();
        assert!(discovery(&root).scan(true).is_empty());
    }

    #[test]
    fn valid_plugin_is_discovered() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        write_plugin(&plugins, "tts_example_plugin", tts_manifest("tts_example_plugin"));

        let found = discovery(&root).scan(false);
        assert_eq!(found.len(), 1);
        let plugin = &found[0];
        assert!(plugin.valid, "errors: {:?}", plugin.errors);
        assert_eq!(plugin.contract, "tts");
        assert_eq!(plugin.entry_point, "tts_example");
        assert!(plugin.manifest.is_some());
    }

    #[test]
    fn bad_folder_name_accumulates_error() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        write_plugin(&plugins, "tts_example", tts_manifest("tts_example"));

        let found = discovery(&root).scan(true);
        assert_eq!(found.len(), 1);
        assert!(!found[0].valid);
        assert!(found[0].errors.iter().any(|e| e.contains("does not match pattern")));
    }

    #[test]
    fn uppercase_body_is_rejected() {
        let root = TempDir::new().unwrap();
        let registry = PrefixRegistry::load(root.path());
        assert!(registry.validate_folder_name("tts_Example_plugin").is_err());
        assert!(registry.validate_folder_name("tts__plugin").is_err());
        assert!(registry.validate_folder_name("tts_example_plugin").is_ok());
        assert!(registry.validate_folder_name("tts_multi_word_plugin").is_ok());
    }

    #[test]
    fn reserved_folders_are_skipped() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        write_plugin(&plugins, "_host", json!({}));
        write_plugin(&plugins, ".cache", json!({}));
        write_plugin(&plugins, "tts_example_plugin", tts_manifest("tts_example_plugin"));

        let found = discovery(&root).scan(true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "tts_example_plugin");
    }

    #[test]
    fn name_mismatch_is_cross_validated() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        write_plugin(&plugins, "tts_example_plugin", tts_manifest("tts_other_plugin"));

        let found = discovery(&root).scan(true);
        assert!(!found[0].valid);
        assert!(found[0].errors.iter().any(|e| e.contains("does not match folder name")));
    }

    #[test]
    fn prefix_contract_mismatch_is_cross_validated() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        let mut manifest = tts_manifest("tts_example_plugin");
        manifest["contract"] = json!("llm");
        write_plugin(&plugins, "tts_example_plugin", manifest);

        let found = discovery(&root).scan(true);
        assert!(!found[0].valid);
        assert!(
            found[0]
                .errors
                .iter()
                .any(|e| e.contains("does not match manifest contract"))
        );
    }

    #[test]
    fn malformed_manifest_is_an_error_not_a_panic() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        let dir = plugins.join("tts_broken_plugin");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("manifest.json"), "{not json").unwrap();

        let found = discovery(&root).scan(true);
        assert!(!found[0].valid);
        assert!(found[0].errors.iter().any(|e| e.contains("Invalid JSON")));
    }

    #[test]
    fn custom_prefix_registry_is_honored() {
        let root = TempDir::new().unwrap();
        let config = root.path().join("config");
        fs::create_dir_all(&config).unwrap();
        fs::write(
            config.join("contract_prefixes.yaml"),
            "prefixes:\n  ocr:\n    contract: ocr\n    description: OCR plugins\n",
        )
        .unwrap();

        let plugins = root.path().join("plugins");
        write_plugin(
            &plugins,
            "ocr_fast_plugin",
            json!({
                "name": "ocr_fast_plugin",
                "version": "0.1.0",
                "contract": "ocr",
                "entry_point": "ocr_fast",
            }),
        );

        let discovery = Discovery::new(&plugins, &config);
        let found = discovery.scan(false);
        assert_eq!(found.len(), 1, "custom prefix should validate");
        assert_eq!(found[0].contract, "ocr");
    }

    #[test]
    fn find_and_summary_locate_plugins() {
        let root = TempDir::new().unwrap();
        let plugins = root.path().join("plugins");
        write_plugin(&plugins, "tts_example_plugin", tts_manifest("tts_example_plugin"));

        let discovery = discovery(&root);
        assert!(discovery.find("tts_example_plugin").is_some());
        assert!(discovery.find("tts_absent_plugin").is_none());

        let summary = discovery.contracts_summary();
        assert_eq!(summary["tts"], vec!["tts_example_plugin".to_string()]);
        assert!(summary["llm"].is_empty());
    }
}
