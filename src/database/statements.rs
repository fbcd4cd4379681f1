//! Split SQL scripts into individual statements

/// Split a script on top-level semicolons.
///
/// Semicolons inside string literals, quoted identifiers, comments and
/// dollar-quoted bodies do not end a statement. In `E'...'` escape strings a
/// backslash escapes the next character. Comments are dropped and
/// empty statements are skipped.
pub fn split_statements(script: &str) -> Vec<String> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                current.push(' ');
                continue;
            }
            '\'' | '"' => {
                let escapes = c == '\'' && is_escape_prefix(&chars, i);
                i = copy_quoted(&chars, i, c, escapes, &mut current);
                continue;
            }
            '$' => {
                if let Some(tag) = dollar_tag(&chars, i) {
                    i = copy_dollar_quoted(&chars, i, &tag, &mut current);
                    continue;
                }
                current.push(c);
            }
            ';' => push_statement(&mut statements, &mut current),
            _ => current.push(c),
        }
        i += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Whether the quote at `quote` opens an `E'...'` escape string
fn is_escape_prefix(chars: &[char], quote: usize) -> bool {
    let Some(prefix) = quote.checked_sub(1) else {
        return false;
    };
    if !matches!(chars[prefix], 'E' | 'e') {
        return false;
    }
    prefix
        .checked_sub(1)
        .map_or(true, |before| !(chars[before].is_alphanumeric() || chars[before] == '_'))
}

/// Copy a quoted literal starting at `start`; a doubled quote is an escape,
/// and so is a backslash when `backslash_escapes` is set.
/// Returns the index after the closing quote.
fn copy_quoted(
    chars: &[char],
    start: usize,
    quote: char,
    backslash_escapes: bool,
    out: &mut String,
) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        out.push(chars[i]);
        if backslash_escapes && chars[i] == '\\' {
            if let Some(&escaped) = chars.get(i + 1) {
                out.push(escaped);
            }
            i += 2;
            continue;
        }
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                out.push(quote);
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    i
}

/// `$tag$` opening at `start`, if any. Positional parameters like `$1` are not tags.
fn dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if chars.get(j) != Some(&'$') {
        return None;
    }
    if chars.get(start + 1).map_or(false, |c| c.is_ascii_digit()) {
        return None;
    }
    Some(chars[start..=j].iter().collect())
}

fn copy_dollar_quoted(chars: &[char], start: usize, tag: &str, out: &mut String) -> usize {
    let tag: Vec<char> = tag.chars().collect();
    out.extend(tag.iter());
    let mut i = start + tag.len();
    while i < chars.len() {
        if chars[i..].starts_with(&tag) {
            out.extend(tag.iter());
            return i + tag.len();
        }
        out.push(chars[i]);
        i += 1;
    }
    i
}
