/// One non-empty source line split into its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub label: Option<String>,
    pub opcode: String,
    pub operands: Vec<String>,
}

/// Cut the line at the first `;` that is not inside a quoted string.
pub fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// A line holds nothing to execute when it is blank or only a comment.
pub fn is_blank_or_comment(line: &str) -> bool {
    strip_comment(line).trim().is_empty()
}

/// Split a line into label, opcode and operands.
///
/// A label starts in the first column; the opcode follows whitespace. The
/// operand field ends at the first whitespace outside a quoted string, and
/// whatever follows it is treated as a comment.
pub fn split_line(line: &str) -> Result<Option<SourceLine>, String> {
    let text = strip_comment(line).trim_end();
    if text.trim().is_empty() {
        return Ok(None);
    }

    let (label, rest) = if text.starts_with(char::is_whitespace) {
        (None, text.trim_start())
    } else {
        let end = text.find(char::is_whitespace).unwrap_or(text.len());
        (Some(text[..end].to_string()), text[end..].trim_start())
    };

    if rest.is_empty() {
        return Err("missing instruction".to_string());
    }

    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let opcode = rest[..end].to_string();
    let field = operand_field(rest[end..].trim_start())?;

    Ok(Some(SourceLine {
        label,
        opcode,
        operands: split_operands(field),
    }))
}

fn operand_field(text: &str) -> Result<&str, String> {
    let mut in_quotes = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => return Ok(&text[..i]),
            _ => {}
        }
    }
    if in_quotes {
        return Err("unterminated string".to_string());
    }
    Ok(text)
}

/// Split an operand field by commas outside quoted strings.
pub fn split_operands(field: &str) -> Vec<String> {
    if field.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in field.chars() {
        match ch {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Decode the contents of a `'...'` string, where `''` is a quote.
pub fn unquote(text: &str) -> Option<String> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::new();
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.next() != Some('\'') {
                return None;
            }
        }
        out.push(ch);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_label_opcode_and_operands() {
        let line = split_line("LOOP     LD    GR1,DATA,GR2 ; load").unwrap().unwrap();
        assert_eq!(line.label.as_deref(), Some("LOOP"));
        assert_eq!(line.opcode, "LD");
        assert_eq!(line.operands, vec!["GR1", "DATA", "GR2"]);
    }

    #[test]
    fn keeps_spaces_and_semicolons_inside_strings() {
        let line = split_line("MSG  DC  'a; b',10").unwrap().unwrap();
        assert_eq!(line.operands, vec!["'a; b'", "10"]);
        assert_eq!(unquote("'It''s'").as_deref(), Some("It's"));
    }

    #[test]
    fn blank_and_comment_lines() {
        assert!(is_blank_or_comment(""));
        assert!(is_blank_or_comment("   \t"));
        assert!(is_blank_or_comment("  ; comment"));
        assert!(!is_blank_or_comment("  RET ; comment"));
        assert_eq!(split_line("; only a comment").unwrap(), None);
    }

    #[test]
    fn label_without_instruction_is_an_error() {
        assert!(split_line("LONELY").is_err());
        assert!(split_line("  DC 'open").is_err());
    }
}
