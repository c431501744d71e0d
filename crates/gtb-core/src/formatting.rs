//! Outbound text utilities (long-message segmentation, previews, uptime).

use chrono::{DateTime, Utc};
use regex::Regex;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn flush(parts: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    current.clear();
}

/// Split a paragraph into sentences at punctuation followed by whitespace.
///
/// The punctuation stays with the preceding sentence; the separating
/// whitespace is consumed.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let boundary = Regex::new(r"[.!?]\s+").expect("valid regex");

    let mut out = Vec::new();
    let mut start = 0usize;
    for m in boundary.find_iter(paragraph) {
        // The matched punctuation char is ASCII, so +1 lands on a char boundary.
        out.push(&paragraph[start..m.start() + 1]);
        start = m.end();
    }
    if start < paragraph.len() {
        out.push(&paragraph[start..]);
    }
    out
}

/// Split an oversized message into chunks of at most `max_len` characters.
///
/// Splits preferentially at paragraph boundaries, then sentence boundaries,
/// then word boundaries. A single word longer than `max_len` occupies its own
/// chunk verbatim. Chunks are trimmed of surrounding whitespace.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if char_len(&current) + char_len(paragraph) + 2 > max_len {
            flush(&mut parts, &mut current);

            if char_len(paragraph) > max_len {
                for sentence in split_sentences(paragraph) {
                    if char_len(&current) + char_len(sentence) + 1 > max_len {
                        flush(&mut parts, &mut current);
                    }

                    if char_len(sentence) > max_len {
                        for word in sentence.split_whitespace() {
                            if char_len(&current) + char_len(word) + 1 > max_len {
                                flush(&mut parts, &mut current);
                                current.push_str(word);
                            } else {
                                if !current.is_empty() {
                                    current.push(' ');
                                }
                                current.push_str(word);
                            }
                        }
                    } else {
                        if !current.is_empty() {
                            current.push(' ');
                        }
                        current.push_str(sentence);
                    }
                }
            } else {
                current.push_str(paragraph);
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    flush(&mut parts, &mut current);
    parts
}

/// Truncate to `max_len` characters, appending an ellipsis when shortened.
pub fn truncate_chars(s: &str, max_len: usize) -> String {
    if char_len(s) <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Human-readable uptime since `start` ("2d 3h 15m" / "3h 15m" / "15m").
pub fn format_uptime(start: DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(start).num_seconds().max(0);
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        return format!("{days}d {hours}h {minutes}m");
    }
    if hours > 0 {
        return format!("{hours}h {minutes}m");
    }
    format!("{minutes}m")
}
