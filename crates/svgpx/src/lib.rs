#![doc = include_str!("../../../README.md")]

mod ast;
mod compile;
mod environment;
mod error;
mod evaluator;
mod layer;
mod lexer;
mod numeric;
mod parser;
mod path_context;
mod pathblock;
mod source_map;
mod stdlib;
mod trace;
mod value;

pub use crate::{
    compile::{compile, compile_annotated},
    error::{CompileError, ErrorKind, Result},
    evaluator::{CompileOptions, CompileResult},
    layer::{ContextSnapshot, LayerOutput, TextElement, TextNode},
    stdlib::log::{LogEntry, LogPart},
    value::{Point, Value},
};
