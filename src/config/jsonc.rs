//! JSONC (JSON with `//` and `/* */` comments) helpers.
//!
//! `strip_comments` turns a commented document into plain JSON that
//! `serde_json` can parse. It is string-aware: comment markers inside a
//! string literal are left untouched.

/// Strip `//` line comments and `/* */` block comments from `content`.
///
/// Newlines inside comments are preserved so line numbers in any downstream
/// parse error still line up with the original file.
pub fn strip_comments(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                result.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    chars.next();
                    for nc in chars.by_ref() {
                        if nc == '\n' {
                            result.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = ' ';
                    for nc in chars.by_ref() {
                        if prev == '*' && nc == '/' {
                            break;
                        }
                        if nc == '\n' {
                            result.push('\n');
                        }
                        prev = nc;
                    }
                }
                _ => result.push(c),
            },
            _ => result.push(c),
        }
    }

    result
}

/// Replace the scalar value of `"section"."key"` in a raw JSONC document
/// with `new_value_literal` (already JSON-encoded, e.g. `"\"text\""` or
/// `"true"`), without touching anything else — comments, formatting, and
/// unrelated keys survive untouched.
///
/// Returns `None` if `section` or `key` cannot be located, in which case the
/// caller should fall back to appending the key (handled by `ConfigStore`).
pub fn replace_scalar(raw: &str, section: &str, key: &str, new_value_literal: &str) -> Option<String> {
    let section_start = find_section_object(raw, section)?;
    let section_body_start = section_start;
    let section_body_end = find_matching_brace(raw, section_body_start)?;

    let body = &raw[section_body_start..=section_body_end];
    let (value_start, value_end) = find_key_value_span(body, key)?;

    let mut out = String::with_capacity(raw.len());
    out.push_str(&raw[..section_body_start]);
    out.push_str(&body[..value_start]);
    out.push_str(new_value_literal);
    out.push_str(&body[value_end..]);
    out.push_str(&raw[section_body_end + 1..]);
    Some(out)
}

/// Find the byte offset of the `{` that opens the object for `"section": { ... }`
/// at the top level of `raw`. Returns the offset of that `{`.
fn find_section_object(raw: &str, section: &str) -> Option<usize> {
    let needle = format!("\"{section}\"");
    let key_pos = raw.find(&needle)?;
    let after_key = &raw[key_pos + needle.len()..];
    let colon_rel = after_key.find(':')?;
    let after_colon = &after_key[colon_rel + 1..];
    let brace_rel = after_colon.find('{')?;
    Some(key_pos + needle.len() + colon_rel + 1 + brace_rel)
}

/// Given the offset of an opening `{`, find the offset of its matching `}`.
/// Brace-depth counting is string-aware so braces inside string values don't
/// confuse the scan.
fn find_matching_brace(raw: &str, open_pos: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut i = open_pos;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Within `body` (an object literal including its braces), find the byte span
/// of the *value* for `"key": <value>` — i.e. everything after the colon up
/// to (but not including) the next top-level comma or the closing brace.
fn find_key_value_span(body: &str, key: &str) -> Option<(usize, usize)> {
    let needle = format!("\"{key}\"");
    let mut search_from = 0;
    loop {
        let rel = body[search_from..].find(&needle)?;
        let key_pos = search_from + rel;
        // Make sure this is actually a key (followed by optional whitespace then ':'),
        // not a substring match inside a longer key name.
        let after = &body[key_pos + needle.len()..];
        let trimmed = after.trim_start();
        if let Some(rest) = trimmed.strip_prefix(':') {
            let ws_len = after.len() - trimmed.len();
            let colon_pos = key_pos + needle.len() + ws_len;
            let value_start_rel = rest.len() - rest.trim_start().len();
            let value_start = colon_pos + 1 + value_start_rel;
            let value_end = scan_value_end(body, value_start)?;
            return Some((value_start, value_end));
        }
        search_from = key_pos + needle.len();
    }
}

/// Starting at the first character of a JSON value, return the offset one
/// past its last character (stopping at a top-level `,` or `}`).
fn scan_value_end(body: &str, value_start: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = value_start;
    if i >= bytes.len() {
        return None;
    }
    if bytes[i] as char == '"' {
        i += 1;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == '"' {
                return Some(i + 1);
            }
            i += 1;
        }
        return None;
    }
    // number / bool / null — scan until a delimiter
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == ',' || c == '}' || c == '\n' {
            break;
        }
        i += 1;
    }
    // Trim trailing whitespace from the scanned span.
    let mut end = i;
    while end > value_start && (bytes[end - 1] as char).is_whitespace() {
        end -= 1;
    }
    Some(end)
}
