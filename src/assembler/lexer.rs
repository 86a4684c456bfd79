use num::Num;

/// a tagged value from the lexer (§3 "Token"), carrying its source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Label(String),
    Instruction { mnemonic: String, operands: Vec<String> },
    Directive { name: String, payload: String },
    DataDefinition { form: String, values: Vec<String> },
    EquDefinition { name: String, expr: String },
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexedLine {
    pub line_no: usize,
    pub token: Token,
}

/// strips a `;`-to-end-of-line comment, as the very first step before
/// any other processing (§4.B lexical rules).
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

const DIRECTIVES: &[&str] = &[
    "name", "author", "version", "strategy", "code", "data", "const", "org", "align", "space",
    "include",
];

/// lexes one already comment-stripped, trimmed line.
pub fn lex_line(raw: &str, line_no: usize) -> LexedLine {
    let text = raw.trim();
    if text.is_empty() {
        return LexedLine {
            line_no,
            token: Token::Blank,
        };
    }

    if let Some(label) = text.strip_suffix(':') {
        return LexedLine {
            line_no,
            token: Token::Label(label.trim().to_string()),
        };
    }

    if let Some(rest) = text.strip_prefix('.') {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_string();
        let payload = parts.next().unwrap_or("").trim().trim_matches('"').to_string();
        if DIRECTIVES.contains(&name.as_str()) {
            return LexedLine {
                line_no,
                token: Token::Directive { name, payload },
            };
        }
        return LexedLine {
            line_no,
            token: Token::Directive {
                name,
                payload: String::new(),
            },
        };
    }

    let mut words = text.splitn(2, char::is_whitespace);
    let first = words.next().unwrap_or("");
    let remainder = words.next().unwrap_or("").trim();

    if matches!(first.to_ascii_lowercase().as_str(), "db" | "dw" | "dq") {
        let values = remainder.split(',').map(|s| s.trim().to_string()).collect();
        return LexedLine {
            line_no,
            token: Token::DataDefinition {
                form: first.to_ascii_lowercase(),
                values,
            },
        };
    }

    if first.eq_ignore_ascii_case("equ") {
        // `name equ value` — `equ` itself is the second word in the
        // usual reading; support both `name equ expr` in one line.
        let mut parts = remainder.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_string();
        let expr = parts.next().unwrap_or("").trim().to_string();
        return LexedLine {
            line_no,
            token: Token::EquDefinition { name, expr },
        };
    }
    // `name equ value` with name as first word and `equ` as second.
    if remainder.to_ascii_lowercase().starts_with("equ ") || remainder.eq_ignore_ascii_case("equ") {
        let expr = remainder[4.min(remainder.len())..].trim().to_string();
        return LexedLine {
            line_no,
            token: Token::EquDefinition {
                name: first.to_string(),
                expr,
            },
        };
    }

    let operands = if remainder.is_empty() {
        Vec::new()
    } else {
        split_operands(remainder)
    };
    LexedLine {
        line_no,
        token: Token::Instruction {
            mnemonic: first.to_ascii_lowercase(),
            operands,
        },
    }
}

fn split_operands(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// numeric literal parsing: decimal (`-?\d+`), `$hex`, or `0x`-hex.
/// both hex forms are accepted per the open-question resolution in
/// DESIGN.md.
pub fn parse_number(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let (body, radix) = if let Some(hex) = s.strip_prefix('$') {
        (hex, 16)
    } else if let Some(hex) = s.strip_prefix("-$") {
        return <i64 as Num>::from_str_radix(hex, 16).ok().map(|v| -v);
    } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else {
        (s, 10)
    };
    <i64 as Num>::from_str_radix(body, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments() {
        assert_eq!(strip_comment("mov r0, r1 ; copy"), "mov r0, r1 ");
        assert_eq!(strip_comment("nop"), "nop");
    }

    #[test]
    fn parses_decimal_and_both_hex_forms() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("-7"), Some(-7));
        assert_eq!(parse_number("$ff"), Some(255));
        assert_eq!(parse_number("0xff"), Some(255));
    }

    #[test]
    fn lexes_label_and_instruction() {
        let l = lex_line("start:", 1);
        assert_eq!(l.token, Token::Label("start".to_string()));
        let l2 = lex_line("mov #1, r0", 2);
        match l2.token {
            Token::Instruction { mnemonic, operands } => {
                assert_eq!(mnemonic, "mov");
                assert_eq!(operands, vec!["#1".to_string(), "r0".to_string()]);
            }
            _ => panic!("expected instruction"),
        }
    }
}
