//! The unit-script language.
//!
//! Modules are plain text: one or more `unit` classes plus `register`
//! statements that publish a class under a global name.
//!
//! ```text
//! unit Gain {
//!     parameters [{"name": "gain", "defaultValue": 1, "minValue": 0, "maxValue": 2}];
//!     state keepalive = true;
//!     on "disconnect" { keepalive = false; }
//!     process {
//!         for channel in channels {
//!             for i in 0..len(channel.input) {
//!                 channel.output[i] = channel.input[i] * parameters.gain
//!             }
//!         }
//!         return keepalive;
//!     }
//! }
//! register "gain" Gain;
//! ```
//!
//! Loading goes [`parser`] then [`compile`]; the resolved [`Program`] is run
//! per block by the interpreter in `eval`.

pub mod ast;
pub mod compile;
pub(crate) mod eval;
pub mod lexer;
pub mod parser;

pub use compile::{CompiledModule, Program};

use crate::error::LoadError;

/// Parses and resolves module source text.
pub fn compile_source(src: &str) -> Result<CompiledModule, LoadError> {
    let module = parser::parse_module(src)?;
    compile::compile_module(&module, src)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Arbitrary text never panics the front end; it either loads or reports an error.
        #[test]
        fn arbitrary_text_never_panics(src in "\\PC{0,200}") {
            let _ = compile_source(&src);
        }

        /// User snippets spliced into a sample loop either load or fail with a positioned error.
        #[test]
        fn spliced_snippets_report_positions(body in "[a-z0-9_ +*/().=\\[\\];{}-]{0,80}") {
            let src = format!(
                "unit U {{ process {{ for ch in channels {{ for i in 0..len(ch.input) {{ {body} }} }} }} }}\nregister \"u\" U;"
            );
            if let Err(err) = compile_source(&src) {
                prop_assert!(err.position().is_some(), "{err}");
            }
        }
    }
}
