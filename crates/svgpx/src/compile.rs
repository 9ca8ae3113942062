//! Top-level entry points (spec §6), grounded on the teacher's `run.rs`
//! `Runner` shape, collapsed to a single synchronous call: spec.md explicitly
//! excludes external-function suspension, so there is no need for the
//! teacher's async progress/resume machinery.

use crate::{
    evaluator::{CompileOptions, CompileResult, Evaluator},
    parser::Parser,
    trace::{AnnotateTrace, NoopTrace},
};

pub use crate::error::{CompileError, ErrorKind, Result};

/// Parses and evaluates `source`, returning the compiled layers/logs/context
/// or the first `CompileError` encountered.
pub fn compile(source: &str, options: CompileOptions) -> Result<CompileResult> {
    let program = Parser::parse_program(source)?;
    let evaluator = Evaluator::new(source, options, Box::new(NoopTrace));
    let (result, _trace) = evaluator.run(&program)?;
    Ok(result)
}

/// Parses and evaluates `source` exactly as [`compile`] does, but returns the
/// interleaved source/trace transcript described in spec §4.11 instead of
/// a `CompileResult`.
pub fn compile_annotated(source: &str, options: CompileOptions) -> Result<String> {
    let program = Parser::parse_program(source)?;
    let evaluator = Evaluator::new(source, options, Box::new(AnnotateTrace::default()));
    let (_result, trace) = evaluator.run(&program)?;
    Ok(trace.into_output().expect("compile_annotated() always constructs an AnnotateTrace"))
}
