//! Deterministic line splitter used when the agent tiers fail
//!
//! Breaks at the last whitespace at or before the break column that is
//! outside string literals and before any inline comment. Comments rewrap
//! under the same `#` marker; code continues with ` \` unless the break sits
//! inside open brackets, where Python continues implicitly.

use aios_core::char_len;

/// Iteration cap; each split also strictly shrinks the remainder.
const MAX_PIECES: usize = 64;
const CONTINUATION_INDENT: &str = "    ";

/// Comment text read by tools; splitting it changes or drops the directive.
const DIRECTIVES: [&str; 11] = [
    "noqa", "type:", "fmt:", "pylint:", "mypy:", "pyright:", "pragma", "isort:", "flake8:",
    "coding:", "-*-",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackSplit {
    pub lines: Vec<String>,
    /// False when some remainder had no safe break point and was left long.
    pub complete: bool,
}

impl FallbackSplit {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// A whitespace position safe to break at, and whether it is inside brackets.
#[derive(Clone, Copy, Debug)]
struct BreakPoint {
    index: usize,
    depth: usize,
}

pub fn split_line(line: &str, max_length: usize, break_column: usize) -> FallbackSplit {
    let line = line.trim_end();
    if char_len(line) <= max_length {
        return FallbackSplit { lines: vec![line.to_string()], complete: true };
    }

    let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
    let body = &line[indent.len()..];

    if is_directive(body) {
        return FallbackSplit { lines: vec![line.to_string()], complete: false };
    }
    if body.starts_with('#') {
        split_comment(line, &indent, body, max_length, break_column)
    } else {
        split_code(line, &indent, max_length, break_column)
    }
}

/// Shebangs and tool pragmas are left as they are.
fn is_directive(body: &str) -> bool {
    if body.starts_with("#!") {
        return true;
    }
    let Some(text) = body.strip_prefix('#') else {
        return false;
    };
    let text = text.trim_start().to_ascii_lowercase();
    DIRECTIVES.iter().any(|d| text.starts_with(d))
}

fn split_comment(
    line: &str,
    indent: &str,
    body: &str,
    max_length: usize,
    break_column: usize,
) -> FallbackSplit {
    let marker: String = body.chars().take_while(|c| *c == '#').collect();
    let prefix = format!("{}{} ", indent, marker);
    let prefix_len = char_len(&prefix);
    let limit = break_column.min(max_length);

    let mut lines = Vec::new();
    let mut current = line.to_string();
    for _ in 0..MAX_PIECES {
        if char_len(&current) <= max_length {
            lines.push(current);
            return FallbackSplit { lines, complete: true };
        }
        let chars: Vec<char> = current.chars().collect();
        let found = (prefix_len..=limit.min(chars.len().saturating_sub(1)))
            .rev()
            .find(|&i| chars[i].is_whitespace());
        let Some(p) = found else { break };

        let head: String = chars[..p].iter().collect();
        let rest: String = chars[p..].iter().collect();
        lines.push(head.trim_end().to_string());
        current = format!("{}{}", prefix, rest.trim_start());
    }
    lines.push(current);
    FallbackSplit { lines, complete: false }
}

fn split_code(line: &str, indent: &str, max_length: usize, break_column: usize) -> FallbackSplit {
    let continuation = format!("{}{}", indent, CONTINUATION_INDENT);
    let cont_len = char_len(&continuation);

    let mut lines = Vec::new();
    let mut current = line.to_string();
    let mut depth = 0usize;
    for _ in 0..MAX_PIECES {
        if char_len(&current) <= max_length {
            lines.push(current);
            return FallbackSplit { lines, complete: true };
        }
        let chars: Vec<char> = current.chars().collect();
        let points = break_points(&chars, depth);

        // A backslash adds two columns, so explicit breaks need that headroom.
        let chosen = points.iter().rev().copied().find(|bp| {
            let limit = if bp.depth > 0 {
                break_column.min(max_length)
            } else {
                break_column.min(max_length.saturating_sub(2))
            };
            bp.index > cont_len && bp.index <= limit
        });
        let Some(bp) = chosen else { break };

        let head: String = chars[..bp.index].iter().collect();
        let rest: String = chars[bp.index..].iter().collect();
        let head = head.trim_end();
        if bp.depth > 0 {
            lines.push(head.to_string());
        } else {
            lines.push(format!("{} \\", head));
        }
        depth = bp.depth;
        current = format!("{}{}", continuation, rest.trim_start());
    }
    lines.push(current);
    FallbackSplit { lines, complete: false }
}

/// Whitespace outside strings, up to any inline comment.
fn break_points(chars: &[char], start_depth: usize) -> Vec<BreakPoint> {
    let n = chars.len();
    let mut points = Vec::new();
    let mut depth = start_depth;
    let mut quote: Option<(char, bool)> = None;
    let mut i = 0;

    while i < n {
        let c = chars[i];
        if let Some((q, triple)) = quote {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                if !triple {
                    quote = None;
                } else if i + 2 < n && chars[i + 1] == q && chars[i + 2] == q {
                    quote = None;
                    i += 3;
                    continue;
                }
            }
            i += 1;
            continue;
        }

        match c {
            '#' => break,
            '"' | '\'' => {
                let triple = i + 2 < n && chars[i + 1] == c && chars[i + 2] == c;
                quote = Some((c, triple));
                i += if triple { 3 } else { 1 };
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() => points.push(BreakPoint { index: i, depth }),
            _ => {}
        }
        i += 1;
    }
    points
}
