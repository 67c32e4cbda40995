//! Node.js harness
//!
//! The entry symbol is probed with `typeof`, which is only emitted for plain,
//! non-reserved identifiers. Anything else falls through to `handler`.

use super::template::{Fragment, Template, TemplateError};
use crate::core::Function;
use crate::engine::codec::{INPUT_FILE, OUTPUT_FILE};

const TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/files/harness/function.js.tmpl"
));

const RESERVED: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "undefined", "var", "void", "while", "with", "yield",
];

pub fn render(function: &Function) -> Result<String, TemplateError> {
    Template::parse(TEMPLATE)?.render(&[
        ("user_code", Fragment::Verbatim(&function.code)),
        ("input_file", Fragment::StringLiteral(INPUT_FILE)),
        ("output_file", Fragment::StringLiteral(OUTPUT_FILE)),
        ("entry_probe", Fragment::Code(entry_probe(function.entry_symbol()))),
    ])
}

/// Expression evaluating to the named function, or `undefined`
fn entry_probe(symbol: &str) -> String {
    if is_plain_identifier(symbol) {
        format!("(typeof {0} === 'function' ? {0} : undefined)", symbol)
    } else {
        "undefined".to_string()
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    first_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}
