//! Processing-unit source generation.
//!
//! Turns a per-sample code snippet plus parameter descriptors into the text of
//! a unit-script module. The generated unit:
//!
//! - declares the clamped parameters as k-rate controls;
//! - runs the snippet once per sample (`i`) per channel, with `input`,
//!   `output` and `parameters` bound, catching and logging any fault so one
//!   bad channel never takes the pipeline down;
//! - implements the drain handshake: a `keepalive` flag cleared by the
//!   `"disconnect"` message and returned from `process`, so the unit reports
//!   stop on the first block after the message arrives.
//!
//! ## Snippet bindings
//!
//! The snippet is the body of a per-sample loop and sees four names:
//!
//! | Name | Value |
//! |------|-------|
//! | `input` | read-only samples of the current channel |
//! | `output` | writable samples of the current channel |
//! | `parameters` | parameter values by name; unknown names read 0 |
//! | `i` | index of the current sample within the block |
//!
//! Because the whole snippet repeats for every `i`, a snippet that loops over
//! the block itself (an RMS meter, say) does that work once per sample.
//!
//! Generation is plain string building and cannot fail. The registration
//! statement is appended separately by the registry.

use crate::params::ParameterDescriptor;
use livefx_host::ParamSpec;

/// Class name of every generated unit.
pub const CLASS_NAME: &str = "CustomProcessor";

/// The control message that starts a unit's drain.
pub const DISCONNECT_MESSAGE: &str = "disconnect";

/// Module line on which the user's snippet begins.
pub const FIRST_USER_LINE: u32 = 14;

/// Generates the module source for `code` and `params`.
pub fn generate(code: &str, params: &[ParameterDescriptor]) -> String {
    let specs: Vec<ParamSpec> = params.iter().map(ParameterDescriptor::to_spec).collect();
    let json = serde_json::to_string(&specs).unwrap_or_else(|_| String::from("[]"));
    format!(
        r#"unit {CLASS_NAME} {{
    parameters {json};
    state keepalive = true;
    on "{DISCONNECT_MESSAGE}" {{ keepalive = false; }}
    process {{
        for channel in channels {{
            try {{ run(channel.input, channel.output, parameters); }}
            catch fault {{ warn(fault); }}
        }}
        return keepalive;
    }}
    fn run(input, output, parameters) {{
        for i in 0..len(input) {{
{code}
        }}
    }}
}}
"#
    )
}

/// The statement that publishes the generated class under `name`.
pub fn registration(name: &str) -> String {
    format!("register \"{name}\" {CLASS_NAME};\n")
}

/// Maps a line of a generated module back to the line of `code` it came from.
///
/// Returns `None` for lines belonging to the generated scaffolding.
pub fn user_code_line(code: &str, module_line: u32) -> Option<u32> {
    let lines = code.lines().count().max(1) as u32;
    let line = module_line.checked_sub(FIRST_USER_LINE)? + 1;
    (line <= lines).then_some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefx_host::{LoadError, script::compile_source};

    fn gain() -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::new("gain", 1.0, 0.0, 2.0)]
    }

    fn with_registration(src: &str) -> String {
        format!("{src}{}", registration("1"))
    }

    #[test]
    fn generated_module_loads() {
        let src = generate("output[i] = input[i] * parameters.gain", &gain());
        let module = compile_source(&with_registration(&src)).unwrap();
        let (name, program) = &module.registrations[0];
        assert_eq!(name, "1");
        assert_eq!(program.class(), CLASS_NAME);
        assert_eq!(program.params()[0].name, "gain");
        assert!(program.handles(DISCONNECT_MESSAGE));
    }

    #[test]
    fn parameters_are_clamped_and_k_rate() {
        let src = generate("", &[ParameterDescriptor::new("drive", 10.0, 0.0, 4.0)]);
        assert!(src.contains(r#""defaultValue":4.0"#), "{src}");
        assert!(src.contains(r#""automationRate":"k-rate""#), "{src}");
    }

    #[test]
    fn snippet_is_embedded_verbatim() {
        let code = "let y = input[i]\noutput[i] = y * 0.5";
        let src = generate(code, &[]);
        assert!(src.contains(code));
    }

    #[test]
    fn user_code_starts_on_first_user_line() {
        let src = generate("MARKER", &gain());
        let line = src.lines().position(|l| l == "MARKER").unwrap() as u32 + 1;
        assert_eq!(line, FIRST_USER_LINE);
    }

    #[test]
    fn error_lines_map_back_to_snippet() {
        let code = "output[i] = input[i]\noutput[i] = nope";
        let src = with_registration(&generate(code, &[]));
        let err = compile_source(&src).err().unwrap();
        let pos = err.position().unwrap();
        assert!(matches!(err, LoadError::Semantic { .. }));
        assert_eq!(user_code_line(code, pos.line), Some(2));
    }

    #[test]
    fn scaffolding_lines_have_no_user_line() {
        assert_eq!(user_code_line("x", 1), None);
        assert_eq!(user_code_line("x", FIRST_USER_LINE + 1), None);
        assert_eq!(user_code_line("a\nb", FIRST_USER_LINE + 1), Some(2));
    }

    #[test]
    fn empty_parameter_set() {
        let src = generate("output[i] = input[i]", &[]);
        assert!(src.contains("parameters [];"));
        assert!(compile_source(&with_registration(&src)).is_ok());
    }
}
