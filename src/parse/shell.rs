use tree_sitter::{Node, Parser};

/// Split a command line into its simple commands.
///
/// Uses the tree-sitter-bash grammar so that lists, pipelines, subshells
/// and command substitutions all contribute their inner commands. When the
/// line does not parse cleanly, falls back to a quote-aware split on
/// `&&`, `||`, `|`, `;` and newlines.
pub fn segments(command: &str) -> Vec<String> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match parse_segments(trimmed) {
        Some(found) if !found.is_empty() => found,
        _ => split_compound(trimmed),
    }
}

fn parse_segments(command: &str) -> Option<Vec<String>> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_bash::LANGUAGE.into())
        .ok()?;
    let tree = parser.parse(command, None)?;
    let root = tree.root_node();
    if root.has_error() {
        log::debug!("parse: tree-sitter error, using fallback splitter");
        return None;
    }
    let mut out = Vec::new();
    collect_commands(root, command.as_bytes(), &mut out);
    Some(out)
}

/// Depth-first walk collecting the text of every `command` node.
fn collect_commands(node: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    if node.kind() == "command"
        && let Ok(text) = node.utf8_text(source)
    {
        let text = text.trim();
        if !text.is_empty() {
            out.push(text.to_string());
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_commands(child, source, out);
    }
}

fn flush(buf: &mut String, parts: &mut Vec<String>) {
    let part = buf.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    buf.clear();
}

/// Split at shell operators (&&, ||, |, |&, ;, newline),
/// respecting single/double quotes and backslash escapes.
fn split_compound(command: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let (mut sq, mut dq, mut esc) = (false, false, false);
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if esc {
            buf.push(c);
            esc = false;
            continue;
        }
        let quoted = sq || dq;
        match c {
            '\\' if !sq => {
                esc = true;
                buf.push(c);
            }
            '\'' if !dq => {
                sq = !sq;
                buf.push(c);
            }
            '"' if !sq => {
                dq = !dq;
                buf.push(c);
            }
            '&' if !quoted && chars.peek() == Some(&'&') => {
                chars.next();
                flush(&mut buf, &mut parts);
            }
            '|' if !quoted => {
                if matches!(chars.peek(), Some('|' | '&')) {
                    chars.next();
                }
                flush(&mut buf, &mut parts);
            }
            ';' | '\n' if !quoted => flush(&mut buf, &mut parts),
            _ => buf.push(c),
        }
    }
    flush(&mut buf, &mut parts);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command() {
        assert_eq!(segments("git status"), vec!["git status"]);
    }

    #[test]
    fn empty_command() {
        assert!(segments("   ").is_empty());
    }

    #[test]
    fn and_list() {
        assert_eq!(
            segments("npm test && git commit -m 'x'"),
            vec!["npm test", "git commit -m 'x'"]
        );
    }

    #[test]
    fn quoted_operator_not_split() {
        assert_eq!(segments("echo 'a && b'"), vec!["echo 'a && b'"]);
    }

    #[test]
    fn substitution_contributes_inner_command() {
        let segs = segments("echo \"$(git commit -m y)\"");
        assert!(segs.iter().any(|s| s == "git commit -m y"), "{segs:?}");
    }

    #[test]
    fn fallback_split_operators() {
        assert_eq!(
            split_compound("a && b || c | d |& e ; f"),
            vec!["a", "b", "c", "d", "e", "f"]
        );
    }

    #[test]
    fn fallback_split_respects_quotes() {
        assert_eq!(
            split_compound("git commit -m \"a; b\" && ls"),
            vec!["git commit -m \"a; b\"", "ls"]
        );
    }

    #[test]
    fn fallback_keeps_fd_duplication() {
        assert_eq!(split_compound("npm test 2>&1"), vec!["npm test 2>&1"]);
    }
}
