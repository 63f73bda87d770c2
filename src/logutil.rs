//! Log sanitizing helpers. Device lines and relay payloads are untrusted text, so
//! anything that reaches a log line goes through here first to keep it single-line
//! and bounded.

use std::fmt::Write;

/// Longest rendering (in chars) emitted by [`escape_log`].
const MAX_LOG_CHARS: usize = 300;

/// Render a raw device line or datagram as one bounded log-safe line.
///
/// MeshCom firmware mixes ANSI colour sequences and stray CR/LF into its console
/// output; ESC shows up as `\e`, other controls as `\n`, `\r`, `\t` or `\xNN`.
/// Anything past 300 chars is replaced by `…`.
pub fn escape_log(s: &str) -> String {
    let mut chars = s.chars();
    let mut out = String::with_capacity(s.len().min(MAX_LOG_CHARS) + 8);
    for ch in chars.by_ref().take(MAX_LOG_CHARS) {
        push_escaped(&mut out, ch);
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{1b}' => out.push_str("\\e"),
        c if c.is_control() => {
            let _ = write!(out, "\\x{:02X}", c as u32);
        }
        c => out.push(c),
    }
}

/// Escaped preview capped at `max_bytes` of the source text. Never cuts inside a
/// multi-byte char; truncated previews end with `...`.
pub fn preview(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}
