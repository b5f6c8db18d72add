//! Outgoing prompt assembly.
//!
//! The final user prompt is the raw request text, optionally preceded by a
//! windowed slice of the session transcript and a handful of memory
//! snippets. Both sections are strictly additive: when neither applies,
//! the raw prompt goes out untouched so simple calls stay free of
//! boilerplate markers.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use moltgate_config::RuntimeSettings;
use moltgate_memory::MemorySearch;
use moltgate_transcript::{read_messages, Role};

/// Snippet count requested from the memory collaborator.
const MEMORY_SNIPPET_LIMIT: usize = 5;
/// Total character budget for the rendered memory section body.
const MEMORY_CHAR_BUDGET: usize = 1_500;

const HISTORY_HEADER: &str = "Conversation history:";
const MEMORY_HEADER: &str = "Relevant memory:";
const REQUEST_MARKER: &str = "Current user request:";

/// One caller-supplied attachment. `data` is base64, optionally wrapped in
/// a `data:<mime>;base64,` URI.
#[derive(Debug, Clone)]
pub struct MediaInput {
    pub data: String,
    pub mime: Option<String>,
}

/// Wire shape of one media item on the `inference` frame.
#[derive(Debug, Clone, Serialize)]
pub struct MediaFrame {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: String,
    pub name: String,
}

/// The assembled `(system, user, media)` triple for one request.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
    pub media: Vec<MediaFrame>,
}

/// Assemble the outgoing prompt.
pub async fn build_prompt(
    system_prompt: &str,
    user_text: &str,
    settings: &RuntimeSettings,
    transcript_path: Option<&Path>,
    memory: Option<&dyn MemorySearch>,
    media: &[MediaInput],
) -> BuiltPrompt {
    let history = transcript_path.and_then(|path| history_block(settings, path));
    let memory_section = match memory {
        Some(memory) => memory_block(memory, user_text).await,
        None => None,
    };

    let mut sections: Vec<String> = Vec::new();
    sections.extend(history);
    sections.extend(memory_section);

    let user = if sections.is_empty() {
        user_text.to_string()
    } else {
        format!(
            "{}\n\n{REQUEST_MARKER}\n{user_text}",
            sections.join("\n\n")
        )
    };

    BuiltPrompt {
        system: system_prompt.to_string(),
        user,
        media: encode_media(media),
    }
}

/// Render the windowed conversation history, newest-bounded.
///
/// Walks backward from the most recent message, taking at most
/// `history_turns` entries while the running character count stays under
/// `history_chars`. Assistant entries matching the silent-reply sentinel
/// never make it into the window. If even the single most recent entry
/// blows the budget, it is truncated with an ellipsis instead of dropping
/// history entirely.
fn history_block(settings: &RuntimeSettings, path: &Path) -> Option<String> {
    if !settings.include_history || settings.history_turns == 0 {
        return None;
    }

    let messages = match read_messages(path) {
        Ok(messages) => messages,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Transcript unreadable; skipping history");
            return None;
        }
    };

    let relevant: Vec<_> = messages
        .iter()
        .filter(|m| {
            !(m.role == Role::Assistant && m.content.trim() == settings.silent_reply_sentinel)
        })
        .collect();

    let mut picked: Vec<String> = Vec::new();
    let mut used = 0usize;
    for entry in relevant.iter().rev() {
        if picked.len() >= settings.history_turns {
            break;
        }
        let len = entry.content.chars().count();
        if used + len > settings.history_chars {
            if picked.is_empty() {
                let truncated: String = entry
                    .content
                    .chars()
                    .take(settings.history_chars.saturating_sub(1))
                    .collect();
                picked.push(format!("{}: {truncated}…", entry.role.label()));
            }
            break;
        }
        used += len;
        picked.push(format!("{}: {}", entry.role.label(), entry.content));
    }

    if picked.is_empty() {
        return None;
    }
    picked.reverse();
    Some(format!("{HISTORY_HEADER}\n{}", picked.join("\n")))
}

/// Query the memory collaborator and render a bounded snippet section.
/// Strictly best-effort: any failure just omits the section.
async fn memory_block(memory: &dyn MemorySearch, user_text: &str) -> Option<String> {
    let hits = match memory.search(user_text, MEMORY_SNIPPET_LIMIT).await {
        Ok(hits) => hits,
        Err(err) => {
            debug!(error = %err, "Memory search failed; skipping injection");
            return None;
        }
    };

    let mut lines: Vec<String> = Vec::new();
    let mut remaining = MEMORY_CHAR_BUDGET;
    for hit in hits.iter().take(MEMORY_SNIPPET_LIMIT) {
        let snippet = hit.snippet.trim();
        if snippet.is_empty() {
            continue;
        }
        if remaining < 8 {
            break;
        }
        let len = snippet.chars().count();
        let rendered = if len + 2 > remaining {
            let clipped: String = snippet.chars().take(remaining.saturating_sub(3)).collect();
            format!("- {clipped}…")
        } else {
            format!("- {snippet}")
        };
        remaining = remaining.saturating_sub(rendered.chars().count());
        lines.push(rendered);
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("{MEMORY_HEADER}\n{}", lines.join("\n")))
}

/// Re-encode caller media into wire frames: bare base64 (any data-URI
/// prefix stripped), extension inferred from the declared MIME type,
/// defaulting to PNG.
fn encode_media(media: &[MediaInput]) -> Vec<MediaFrame> {
    media
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let data = match input.data.split_once("base64,") {
                Some((prefix, rest)) if prefix.starts_with("data:") => rest,
                _ => input.data.as_str(),
            };
            let ext = match input.mime.as_deref() {
                Some("image/jpeg") | Some("image/jpg") => "jpg",
                Some("image/gif") => "gif",
                Some("image/webp") => "webp",
                _ => "png",
            };
            MediaFrame {
                kind: "image",
                data: data.to_string(),
                name: format!("image-{}.{ext}", index + 1),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use moltgate_memory::MemoryHit;
    use moltgate_transcript::append_turn;
    use tempfile::TempDir;

    struct FixedMemory(Vec<&'static str>);

    #[async_trait]
    impl MemorySearch for FixedMemory {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MemoryHit>> {
            Ok(self
                .0
                .iter()
                .map(|s| MemoryHit {
                    snippet: s.to_string(),
                    score: None,
                    source: None,
                })
                .collect())
        }
    }

    struct BrokenMemory;

    #[async_trait]
    impl MemorySearch for BrokenMemory {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MemoryHit>> {
            anyhow::bail!("search backend unreachable")
        }
    }

    fn settings() -> RuntimeSettings {
        RuntimeSettings::default()
    }

    #[tokio::test]
    async fn bare_prompt_stays_unmodified() {
        let prompt = build_prompt("sys", "what time is it?", &settings(), None, None, &[]).await;
        assert_eq!(prompt.system, "sys");
        assert_eq!(prompt.user, "what time is it?");
        assert!(prompt.media.is_empty());
    }

    #[tokio::test]
    async fn sections_render_in_history_memory_request_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        append_turn(&path, "s1", Path::new("/w"), "earlier question", "earlier answer")
            .await
            .unwrap();

        let memory = FixedMemory(vec!["user prefers tea"]);
        let prompt = build_prompt(
            "sys",
            "new question",
            &settings(),
            Some(&path),
            Some(&memory),
            &[],
        )
        .await;

        let history_at = prompt.user.find(HISTORY_HEADER).unwrap();
        let memory_at = prompt.user.find(MEMORY_HEADER).unwrap();
        let marker_at = prompt.user.find(REQUEST_MARKER).unwrap();
        assert!(history_at < memory_at && memory_at < marker_at);
        assert!(prompt.user.contains("User: earlier question"));
        assert!(prompt.user.contains("Assistant: earlier answer"));
        assert!(prompt.user.contains("- user prefers tea"));
        assert!(prompt.user.ends_with("new question"));
    }

    #[tokio::test]
    async fn silent_replies_are_dropped_from_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        append_turn(&path, "s1", Path::new("/w"), "ping", "NO_REPLY")
            .await
            .unwrap();
        append_turn(&path, "s1", Path::new("/w"), "real question", "real answer")
            .await
            .unwrap();

        let prompt =
            build_prompt("sys", "next", &settings(), Some(&path), None, &[]).await;
        assert!(!prompt.user.contains("NO_REPLY"));
        assert!(prompt.user.contains("User: ping"));
        assert!(prompt.user.contains("Assistant: real answer"));
    }

    #[tokio::test]
    async fn history_respects_turn_budget_newest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        for i in 0..5 {
            append_turn(
                &path,
                "s1",
                Path::new("/w"),
                &format!("q{i}"),
                &format!("a{i}"),
            )
            .await
            .unwrap();
        }

        let mut settings = settings();
        settings.history_turns = 3;
        let prompt = build_prompt("sys", "next", &settings, Some(&path), None, &[]).await;

        // Only the newest three entries survive, back in chronological order.
        assert!(!prompt.user.contains("User: q3"));
        let a3 = prompt.user.find("Assistant: a3").unwrap();
        let q4 = prompt.user.find("User: q4").unwrap();
        let a4 = prompt.user.find("Assistant: a4").unwrap();
        assert!(a3 < q4 && q4 < a4);
    }

    #[tokio::test]
    async fn oversized_latest_entry_is_truncated_not_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.jsonl");
        append_turn(&path, "s1", Path::new("/w"), "q", &"x".repeat(500))
            .await
            .unwrap();

        let mut settings = settings();
        settings.history_chars = 40;
        let prompt = build_prompt("sys", "next", &settings, Some(&path), None, &[]).await;

        assert!(prompt.user.contains(HISTORY_HEADER));
        assert!(prompt.user.contains('…'));
        assert!(!prompt.user.contains(&"x".repeat(50)));
    }

    #[tokio::test]
    async fn memory_failure_is_swallowed() {
        let prompt = build_prompt("sys", "hi", &settings(), None, Some(&BrokenMemory), &[]).await;
        assert_eq!(prompt.user, "hi");
    }

    #[tokio::test]
    async fn long_snippets_are_clipped_with_ellipsis() {
        let long: &'static str = Box::leak("m".repeat(3_000).into_boxed_str());
        let memory = FixedMemory(vec![long]);
        let prompt = build_prompt("sys", "hi", &settings(), None, Some(&memory), &[]).await;

        assert!(prompt.user.contains(MEMORY_HEADER));
        assert!(prompt.user.contains('…'));
        let body_len = prompt.user.chars().count();
        assert!(body_len < 2_000, "memory section exceeded budget: {body_len}");
    }

    #[tokio::test]
    async fn media_strips_data_uri_and_infers_extension() {
        let media = [
            MediaInput {
                data: "data:image/jpeg;base64,AAAA".into(),
                mime: Some("image/jpeg".into()),
            },
            MediaInput {
                data: "BBBB".into(),
                mime: None,
            },
        ];
        let prompt = build_prompt("sys", "hi", &settings(), None, None, &media).await;

        assert_eq!(prompt.media.len(), 2);
        assert_eq!(prompt.media[0].data, "AAAA");
        assert_eq!(prompt.media[0].name, "image-1.jpg");
        assert_eq!(prompt.media[1].data, "BBBB");
        assert_eq!(prompt.media[1].name, "image-2.png");
    }
}
