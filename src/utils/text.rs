/// Removes a surrounding markdown code fence, if any.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if !s.starts_with("```") {
        return s.to_string();
    }
    let body = s.trim_start_matches("```");
    // drop the info string ("json", "text", ...) on the opening fence line
    let body = match body.find('\n') {
        Some(idx) if is_info_string(body[..idx].trim()) => &body[idx + 1..],
        _ => body,
    };
    body.trim_end().trim_end_matches("```").trim().to_string()
}

fn is_info_string(tag: &str) -> bool {
    tag.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// Keeps only ASCII digits, e.g. `"about 50,000 words"` -> `"50000"`.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strips a leading list marker such as `1.`, `2、`, `3)` or `- `.
/// Returns `None` when the line does not start with one.
pub fn strip_list_marker(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let mut chars = rest.chars();
    match chars.next() {
        Some('.') | Some('、') | Some(')') | Some('）') | Some('．') => Some(chars.as_str().trim()),
        _ => None,
    }
}

/// File-system safe directory name for a project title.
pub fn project_slug(title: &str) -> String {
    let slug: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let slug = slug.trim_matches(|c| c == '.' || c == '_').to_string();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
