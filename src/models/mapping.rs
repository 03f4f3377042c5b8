// Model name mapping (Claude → backend)
// Author: kelexine (https://github.com/kelexine)

use crate::config::ModelMappingConfig;

/// Map the model id a client sent to the backend model id.
///
/// - ids containing `haiku` use the completion model
/// - other `claude-*` ids, and any request with thinking enabled, use the reasoning model
/// - anything else is already a backend id and passes through
///
/// Each branch falls back to the other configured model, then to the requested id.
pub fn map_model(requested: &str, thinking: bool, mapping: &ModelMappingConfig) -> String {
    let normalized = requested.trim().to_ascii_lowercase();
    let reasoning = mapping.reasoning_model.as_deref().filter(|m| !m.is_empty());
    let completion = mapping.completion_model.as_deref().filter(|m| !m.is_empty());

    let mapped = if normalized.starts_with("claude") && normalized.contains("haiku") && !thinking {
        completion.or(reasoning)
    } else if thinking || normalized.starts_with("claude") {
        reasoning.or(completion)
    } else {
        None
    };

    mapped.unwrap_or(requested).to_string()
}
