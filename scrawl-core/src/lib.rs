//! Scrawl: a terse stack language for drawing stroke glyphs.
//!
//! A program is compiled in two stages (scan, then resolve) into a flat
//! instruction array, and executed by a turtle-state stack machine that
//! traces Bézier paths. See [`compile`] and [`Vm`] for the entry points.

pub mod error;
pub mod interpreter;
pub mod program;
pub mod resolver;
pub mod scanner;
pub mod token;

pub use error::{CompileError, CompileErrorKind, RuntimeError, RuntimeErrorKind};
pub use interpreter::{RunOutput, Vm};
pub use program::{FuncEntry, Instr, Op, Program};

use scrawl_graphics::types::Scalar;

/// Compile source text into an executable program.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    resolver::resolve(&scanner::tokenize(source)?)
}

/// Compile and run in one step with a fresh machine.
pub fn run(
    source: &str,
    entry: Option<&str>,
    args: &[Scalar],
) -> Result<RunOutput, Box<dyn std::error::Error>> {
    let program = compile(source)?;
    Ok(Vm::new().run(&program, entry, args)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_run_one_shot() {
        let out = run(">", None, &[]).expect("run");
        assert_eq!(out.path.len(), 2);
    }

    #[test]
    fn compile_errors_propagate() {
        assert!(run("&", None, &[]).is_err());
    }
}
