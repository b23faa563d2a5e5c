//! Scenario script model and processor registration.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name under which the HLS processor is registered.
pub const PROCESSOR_NAME: &str = "hlsPluginStream";

/// A load-test script: global config plus scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Global configuration.
    #[serde(default)]
    pub config: ScriptConfig,
    /// Scenarios run by virtual users.
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// Global script configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Names of registered processors.
    #[serde(default)]
    pub processor: Vec<String>,
}

/// One scenario of a script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Scenario name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Processors run after every response, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_response: Option<Vec<String>>,
}

/// Registers the HLS processor and attaches it after every response of
/// every scenario, creating missing lists. Registering twice is a no-op.
pub fn register(script: &mut Script) {
    if !script.config.processor.iter().any(|p| p == PROCESSOR_NAME) {
        script.config.processor.push(PROCESSOR_NAME.to_string());
    }
    for scenario in &mut script.scenarios {
        let hooks = scenario.after_response.get_or_insert_with(Vec::new);
        if !hooks.iter().any(|h| h == PROCESSOR_NAME) {
            hooks.push(PROCESSOR_NAME.to_string());
        }
    }
    debug!(scenarios = script.scenarios.len(), "hls processor registered");
}
