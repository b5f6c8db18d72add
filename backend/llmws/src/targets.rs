//! Candidate server resolution.
//!
//! Builds the ordered target list for a logical model from the layered
//! sources, normalizes endpoint notation (including the common
//! single-slash and backslash typos), dedups, and ranks by how well each
//! server's declared capability tags match the model's preferences.

use std::cmp::Reverse;

use moltgate_config::{DeploymentDefaults, EnvProvider, ModelParams};
use tracing::debug;

/// Comma-list of candidate servers supplied via the environment.
pub const ENV_SERVERS: &str = "MOLTGATE_LLMWS_SERVERS";
/// Single-server environment fallback.
pub const ENV_SERVER: &str = "MOLTGATE_LLMWS_SERVER";
/// Compiled-in last-resort endpoint; keeps the target list non-empty.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8765";

/// One candidate inference server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Normalized WebSocket URI.
    pub url: String,
    /// Declared capability tags, lower-cased and whitespace-collapsed.
    pub capabilities: Vec<String>,
}

/// Produce the ordered, deduplicated target list for one call.
///
/// Source priority: model servers list, model single server, deployment
/// servers list, deployment single server, `MOLTGATE_LLMWS_SERVERS`,
/// `MOLTGATE_LLMWS_SERVER`, then [`DEFAULT_ENDPOINT`]. Malformed or empty
/// entries are dropped silently; dedup keeps the first occurrence.
pub fn resolve_targets(
    model: Option<&ModelParams>,
    defaults: Option<&DeploymentDefaults>,
    env: &dyn EnvProvider,
) -> Vec<Target> {
    let mut raw_entries: Vec<String> = Vec::new();

    if let Some(model) = model {
        raw_entries.extend(model.overrides.servers.iter().cloned());
        raw_entries.extend(model.overrides.server.clone());
    }
    if let Some(defaults) = defaults {
        raw_entries.extend(defaults.servers.iter().cloned());
        raw_entries.extend(defaults.server.clone());
    }
    if let Some(list) = env.var(ENV_SERVERS) {
        raw_entries.extend(list.split(',').map(str::to_string));
    }
    raw_entries.extend(env.var(ENV_SERVER));
    raw_entries.push(DEFAULT_ENDPOINT.to_string());

    let mut targets: Vec<Target> = Vec::new();
    for entry in &raw_entries {
        let Some(target) = parse_entry(entry) else {
            continue;
        };
        if targets.iter().any(|t| t.url == target.url) {
            continue;
        }
        targets.push(target);
    }

    if let Some(preferred) = model.map(|m| normalize_tags(&m.capabilities)) {
        if !preferred.is_empty() {
            rank_by_capability(&mut targets, &preferred);
        }
    }

    debug!(count = targets.len(), "Resolved inference targets");
    targets
}

/// Parse one configured entry: `url` or `url|tag1,tag2`.
fn parse_entry(entry: &str) -> Option<Target> {
    let (url_part, tags_part) = match entry.split_once('|') {
        Some((url, tags)) => (url, Some(tags)),
        None => (entry, None),
    };
    let url = normalize_url(url_part)?;
    let capabilities = tags_part
        .map(|tags| normalize_tags(&tags.split(',').map(str::to_string).collect::<Vec<_>>()))
        .unwrap_or_default();
    Some(Target { url, capabilities })
}

/// Normalize an endpoint string to a `scheme://…` WebSocket URI.
///
/// Backslash host notation is tolerated as a typo (`ws:\\host` →
/// `ws://host`), as is a single-slash scheme (`ws:/host` → `ws://host`).
/// Unschemed entries get the default `ws://` prefix. Empty input is `None`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let cleaned = raw.trim().replace('\\', "/");
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.contains("://") {
        return Some(cleaned);
    }

    // Single-slash scheme typo: `ws:/host:port`.
    if let Some((scheme, rest)) = cleaned.split_once(":/") {
        if is_scheme(scheme) {
            let host = rest.trim_start_matches('/');
            if host.is_empty() {
                return None;
            }
            return Some(format!("{scheme}://{host}"));
        }
    }

    let host = cleaned.trim_start_matches('/');
    if host.is_empty() {
        return None;
    }
    Some(format!("ws://{host}"))
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lower-case and whitespace-collapse capability tags, dropping empties.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| {
            tag.to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Stable reorder by descending match score: targets matching every
/// preferred tag first, then by raw matched count; equal scores keep their
/// source order.
fn rank_by_capability(targets: &mut [Target], preferred: &[String]) {
    targets.sort_by_key(|target| {
        let matched = preferred
            .iter()
            .filter(|tag| target.capabilities.iter().any(|c| c == *tag))
            .count();
        let full = matched == preferred.len();
        (Reverse(full as u8), Reverse(matched))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use moltgate_config::MapEnv;

    fn model_with(servers: &[&str], capabilities: &[&str]) -> ModelParams {
        ModelParams {
            overrides: DeploymentDefaults {
                servers: servers.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn slash_typos_normalize_to_double_slash() {
        assert_eq!(
            normalize_url(r"ws:\\host:9000").as_deref(),
            Some("ws://host:9000")
        );
        assert_eq!(
            normalize_url("ws:/host:9000").as_deref(),
            Some("ws://host:9000")
        );
        assert_eq!(
            normalize_url("ws://host:9000").as_deref(),
            Some("ws://host:9000")
        );
    }

    #[test]
    fn unschemed_entries_get_ws_prefix() {
        assert_eq!(
            normalize_url("host:9000").as_deref(),
            Some("ws://host:9000")
        );
        assert_eq!(normalize_url("//host").as_deref(), Some("ws://host"));
        assert!(normalize_url("   ").is_none());
        assert!(normalize_url("").is_none());
    }

    #[test]
    fn list_is_never_empty() {
        let targets = resolve_targets(None, None, &MapEnv::new());
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].url, DEFAULT_ENDPOINT);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let model = model_with(&["ws://a:1", "ws:/a:1"], &[]);
        let defaults = DeploymentDefaults {
            server: Some("a:1".to_string()),
            ..Default::default()
        };
        let targets = resolve_targets(Some(&model), Some(&defaults), &MapEnv::new());
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["ws://a:1", DEFAULT_ENDPOINT]);
    }

    #[test]
    fn env_entries_rank_after_configured_ones() {
        let model = model_with(&["ws://configured:1"], &[]);
        let env = MapEnv::new()
            .set(ENV_SERVERS, "ws://env-a:1,ws://env-b:1")
            .set(ENV_SERVER, "ws://env-c:1");
        let targets = resolve_targets(Some(&model), None, &env);
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "ws://configured:1",
                "ws://env-a:1",
                "ws://env-b:1",
                "ws://env-c:1",
                DEFAULT_ENDPOINT,
            ]
        );
    }

    #[test]
    fn capability_match_reorders_ahead_of_source_priority() {
        let model = model_with(&["ws://plain:1", "ws://gpu:1|vision,audio"], &["vision"]);
        let targets = resolve_targets(Some(&model), None, &MapEnv::new());
        assert_eq!(targets[0].url, "ws://gpu:1");
        assert_eq!(targets[0].capabilities, vec!["vision", "audio"]);
        assert_eq!(targets[1].url, "ws://plain:1");
    }

    #[test]
    fn full_match_outranks_partial_match() {
        let model = model_with(
            &["ws://partial:1|vision", "ws://full:1|vision,audio"],
            &["vision", "audio"],
        );
        let targets = resolve_targets(Some(&model), None, &MapEnv::new());
        assert_eq!(targets[0].url, "ws://full:1");
        assert_eq!(targets[1].url, "ws://partial:1");
    }

    #[test]
    fn equal_scores_keep_source_order() {
        let model = model_with(&["ws://a:1", "ws://b:1", "ws://c:1|vision"], &["vision"]);
        let targets = resolve_targets(Some(&model), None, &MapEnv::new());
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["ws://c:1", "ws://a:1", "ws://b:1", DEFAULT_ENDPOINT]
        );
    }

    #[test]
    fn tags_are_lowercased_and_collapsed() {
        let model = model_with(&["ws://a:1|  Vision ,  LONG   Context "], &[]);
        let targets = resolve_targets(Some(&model), None, &MapEnv::new());
        assert_eq!(targets[0].capabilities, vec!["vision", "long context"]);
    }
}
