//! Go harness
//!
//! The generated `main` does not call into user code; it echoes the input and
//! the requested entry point. User code is compiled alongside it, so it must be
//! valid `package main` source without its own `main` function.

use super::template::{Fragment, Template, TemplateError};
use crate::core::Function;
use crate::engine::codec::{INPUT_FILE, OUTPUT_FILE};

const TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/files/harness/main.go.tmpl"
));

pub fn render(function: &Function) -> Result<String, TemplateError> {
    Template::parse(TEMPLATE)?.render(&[
        ("user_code", Fragment::Verbatim(&function.code)),
        ("input_file", Fragment::StringLiteral(INPUT_FILE)),
        ("output_file", Fragment::StringLiteral(OUTPUT_FILE)),
        ("entry_name", Fragment::StringLiteral(function.entry_symbol())),
    ])
}
