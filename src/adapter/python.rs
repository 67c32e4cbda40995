//! Python harness
//!
//! The entry name is passed as a string and resolved through `globals()`,
//! so any symbol text is safe to embed.

use super::template::{Fragment, Template, TemplateError};
use crate::core::Function;
use crate::engine::codec::{INPUT_FILE, OUTPUT_FILE};

const TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/files/harness/function.py.tmpl"
));

pub fn render(function: &Function) -> Result<String, TemplateError> {
    Template::parse(TEMPLATE)?.render(&[
        ("user_code", Fragment::Verbatim(&function.code)),
        ("input_file", Fragment::StringLiteral(INPUT_FILE)),
        ("output_file", Fragment::StringLiteral(OUTPUT_FILE)),
        ("entry_name", Fragment::StringLiteral(function.entry_symbol())),
    ])
}
