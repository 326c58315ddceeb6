//! Minimal quoted-CSV reading and writing.
//!
//! Checkpoint files, analyzer output, and statistics files are all
//! comma-separated with a header row. Commit messages and method
//! signatures can contain commas and quotes, so fields follow the usual
//! quoting convention: a field containing `,`, `"`, or a newline is
//! wrapped in double quotes, with embedded quotes doubled.

/// Split one line into fields, honoring double-quote escaping.
///
/// A lone opening quote with no closing partner consumes the rest of the
/// line; callers treat structurally impossible rows as malformed by
/// checking the field count.
///
/// # Examples
///
/// ```
/// use churnscope_core::table::split_row;
///
/// let fields = split_row(r#"3,abc123,"fix: parse, then retry",2021-04-01"#);
/// assert_eq!(fields[2], "fix: parse, then retry");
/// assert_eq!(fields.len(), 4);
/// ```
pub fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Join fields into one line, quoting where necessary.
///
/// # Examples
///
/// ```
/// use churnscope_core::table::format_row;
///
/// let line = format_row(&["3", "abc123", "fix: parse, then retry"]);
/// assert_eq!(line, r#"3,abc123,"fix: parse, then retry""#);
/// ```
pub fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let field = field.as_ref();
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_split() {
        assert_eq!(split_row("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_fields_are_preserved() {
        assert_eq!(split_row("a,,c"), vec!["a", "", "c"]);
        assert_eq!(split_row(""), vec![""]);
    }

    #[test]
    fn quoted_comma_stays_in_field() {
        assert_eq!(
            split_row(r#"1,"hello, world",2"#),
            vec!["1", "hello, world", "2"]
        );
    }

    #[test]
    fn doubled_quotes_unescape() {
        assert_eq!(split_row(r#""say ""hi""""#), vec![r#"say "hi""#]);
    }

    #[test]
    fn format_quotes_only_when_needed() {
        assert_eq!(format_row(&["plain", "text"]), "plain,text");
        assert_eq!(format_row(&["a,b"]), r#""a,b""#);
        assert_eq!(format_row(&[r#"say "hi""#]), r#""say ""hi""""#);
    }

    #[test]
    fn commit_message_round_trips() {
        let message = r#"merge: branch "feature/x", closes #12"#;
        let line = format_row(&["7", "deadbeef", message, "2020-01-01 00:00:00"]);
        let fields = split_row(&line);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[2], message);
    }
}
