//! Resolver turning a token stream into an executable program.
//!
//! Resolution is two passes over a work list of cells, one cell per final
//! instruction.
//!
//! The first pass walks a cursor left to right and rewrites locally:
//! - infix arithmetic between two literals folds into one constant
//! - infix arithmetic before a literal, argument or name reference swaps
//!   into postfix order
//! - a scale operator followed by a literal denominator becomes the
//!   reciprocal pushed before the operator, so `r4` turns by a quarter and
//!   `3r4` by three quarters
//! - `<argc> $name =` collapses into a frame prologue and registers the
//!   name; with no literal count the declaration vanishes and the entry
//!   address is the body start
//! - `$name !` collapses into a single call cell
//!
//! Every rewrite touches only cells at or after the cursor, so entry
//! addresses recorded for earlier declarations stay valid. The second pass
//! maps cells one-to-one onto instructions: name references become the
//! entry address by then known for the whole stream (forward references
//! included), calls pick up the callee's declared argument count, and each
//! `?` gets the index of the first separator or closing bracket at its own
//! nesting level.

use std::collections::HashMap;

use scrawl_graphics::types::Scalar;

use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::program::{op_from_char, FuncEntry, Instr, Program};
use crate::token::{Span, Token, TokenKind};

/// Resolve a token stream into a program.
pub fn resolve(tokens: &[Token]) -> CompileResult<Program> {
    let mut cells = to_cells(tokens);
    let mut functions = HashMap::new();
    rewrite(&mut cells, &mut functions)?;
    let code = lower(&cells, &functions)?;
    Ok(Program::new(code, functions))
}

// ---------------------------------------------------------------------------
// Work cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Num(Scalar),
    Op(char),
    Sep,
    Arg(usize),
    Fetch(usize),
    Name(String, Span),
    CallName(String, Span),
    Frame(usize),
    Cond(Span),
    Decl(Span),
}

fn to_cells(tokens: &[Token]) -> Vec<Cell> {
    tokens
        .iter()
        .map(|t| match &t.kind {
            TokenKind::Number(v) => Cell::Num(*v),
            TokenKind::Op('?') => Cell::Cond(t.span),
            TokenKind::Op(c) => Cell::Op(*c),
            TokenKind::Arg(n) => Cell::Arg(*n),
            TokenKind::FuncRef(name) => Cell::Name(name.clone(), t.span),
            TokenKind::Decl => Cell::Decl(t.span),
            TokenKind::Sep => Cell::Sep,
        })
        .collect()
}

fn as_num(cell: &Cell) -> Option<Scalar> {
    match cell {
        Cell::Num(v) => Some(*v),
        _ => None,
    }
}

const INFIX: &str = "+-*/pG@";
const SCALE: &str = "xyzrlRL";

fn fold(op: char, lhs: Scalar, rhs: Scalar) -> Scalar {
    match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        '*' => lhs * rhs,
        '/' => lhs / rhs,
        'p' => lhs.powf(rhs),
        // 'G'
        _ => Scalar::from(u8::from(lhs > rhs)),
    }
}

// ---------------------------------------------------------------------------
// First pass: cursor rewriting
// ---------------------------------------------------------------------------

fn rewrite(cells: &mut Vec<Cell>, functions: &mut HashMap<String, FuncEntry>) -> CompileResult<()> {
    // the scanner guarantees separators at both ends, so cells[i - 1] and
    // cells[i + 1] always exist for the cells the cursor visits
    let mut i = 1;
    while i + 1 < cells.len() {
        match cells[i].clone() {
            Cell::Op(c) if INFIX.contains(c) => {
                match (as_num(&cells[i - 1]), cells[i + 1].clone()) {
                    (Some(lhs), Cell::Num(rhs)) if c != '@' => {
                        cells[i - 1] = Cell::Num(fold(c, lhs, rhs));
                        cells.drain(i..=i + 1);
                        // the cursor already points at the next cell
                    }
                    (_, Cell::Num(_)) | (_, Cell::Name(..)) => {
                        cells.swap(i, i + 1);
                        i += 2;
                    }
                    (_, Cell::Arg(n)) => {
                        cells[i] = Cell::Fetch(n);
                        cells[i + 1] = Cell::Op(c);
                        i += 2;
                    }
                    _ => i += 1,
                }
            }
            Cell::Op(c) if SCALE.contains(c) => match as_num(&cells[i + 1]) {
                Some(rhs) => {
                    if let Some(lhs) = as_num(&cells[i - 1]) {
                        cells[i - 1] = Cell::Num(lhs / rhs);
                        cells.remove(i + 1);
                        i += 1;
                    } else {
                        cells[i] = Cell::Num(1.0 / rhs);
                        cells[i + 1] = Cell::Op(c);
                        i += 2;
                    }
                }
                None => i += 1,
            },
            Cell::Arg(n) => {
                cells[i] = Cell::Fetch(n);
                i += 1;
            }
            Cell::Op('!') => {
                if let Cell::Name(name, span) = cells[i - 1].clone() {
                    cells[i - 1] = Cell::CallName(name, span);
                    cells.remove(i);
                    // the removal shifted the next cell under the cursor
                } else {
                    i += 1;
                }
            }
            Cell::Decl(span) => {
                i = declare(cells, functions, i, span)?;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Collapse a declaration at cursor `i` and return the new cursor.
fn declare(
    cells: &mut Vec<Cell>,
    functions: &mut HashMap<String, FuncEntry>,
    i: usize,
    span: Span,
) -> CompileResult<usize> {
    let Cell::Name(name, name_span) = cells[i - 1].clone() else {
        return Err(CompileError::new(
            CompileErrorKind::BadDeclaration,
            "a declaration must follow a function name",
            span,
        ));
    };
    if functions.contains_key(&name) {
        return Err(CompileError::new(
            CompileErrorKind::Redefinition,
            format!("function ${name} is declared twice"),
            name_span,
        ));
    }
    let argc = match i.checked_sub(2).and_then(|j| as_num(&cells[j])) {
        Some(v) => {
            if v < 0.0 || v.fract() != 0.0 {
                return Err(CompileError::new(
                    CompileErrorKind::BadDeclaration,
                    format!("argument count of ${name} must be a non-negative integer"),
                    span,
                ));
            }
            Some(v as usize)
        }
        None => None,
    };
    match argc {
        Some(argc) => {
            functions.insert(name, FuncEntry { addr: i - 2, argc });
            cells[i - 2] = Cell::Frame(argc);
            cells.drain(i - 1..=i);
            Ok(i - 1)
        }
        None => {
            // no prologue cell; the entry address is the body start
            functions.insert(name, FuncEntry { addr: i - 1, argc: 0 });
            cells.drain(i - 1..=i);
            Ok(i - 1)
        }
    }
}

// ---------------------------------------------------------------------------
// Second pass: lowering to instructions
// ---------------------------------------------------------------------------

fn lower(cells: &[Cell], functions: &HashMap<String, FuncEntry>) -> CompileResult<Vec<Instr>> {
    let mut code = Vec::with_capacity(cells.len());
    for (i, cell) in cells.iter().enumerate() {
        let instr = match cell {
            Cell::Num(v) => Instr::Num(*v),
            Cell::Sep => Instr::Sep,
            Cell::Arg(n) | Cell::Fetch(n) => Instr::Fetch(*n),
            Cell::Frame(argc) => Instr::Frame(*argc),
            Cell::Op(c) => match op_from_char(*c) {
                Some(op) => Instr::Op(op),
                None => {
                    return Err(CompileError::unlocated(
                        CompileErrorKind::InvalidCharacter,
                        format!("unknown operator {c:?}"),
                    ));
                }
            },
            Cell::Cond(span) => Instr::CondSkip(skip_target(cells, i, *span)?),
            Cell::Name(name, span) => {
                let f = lookup(functions, name, *span)?;
                Instr::Num(f.addr as Scalar)
            }
            Cell::CallName(name, span) => {
                let f = lookup(functions, name, *span)?;
                Instr::Call {
                    addr: f.addr,
                    argc: f.argc,
                }
            }
            Cell::Decl(span) => {
                return Err(CompileError::new(
                    CompileErrorKind::BadDeclaration,
                    "a declaration must follow a function name",
                    *span,
                ));
            }
        };
        code.push(instr);
    }
    Ok(code)
}

fn lookup(
    functions: &HashMap<String, FuncEntry>,
    name: &str,
    span: Span,
) -> CompileResult<FuncEntry> {
    functions.get(name).copied().ok_or_else(|| {
        CompileError::new(
            CompileErrorKind::UndefinedFunction,
            format!("function ${name} is not declared"),
            span,
        )
    })
}

/// Find the skip target for a conditional at `i`: the first separator at
/// the conditional's own bracket level, or the bracket that closes it.
fn skip_target(cells: &[Cell], i: usize, span: Span) -> CompileResult<usize> {
    let mut depth = 0usize;
    for (j, cell) in cells.iter().enumerate().skip(i + 1) {
        match cell {
            Cell::Sep if depth == 0 => return Ok(j),
            Cell::Op('[' | '(' | '{') => depth += 1,
            Cell::Op(']' | ')' | '}') => {
                if depth == 0 {
                    return Ok(j);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    Err(CompileError::new(
        CompileErrorKind::UnbalancedDelimiter,
        "conditional has no statement end inside balanced brackets",
        span,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Block, Heading, Op};
    use crate::scanner::tokenize;

    fn compile(source: &str) -> Program {
        resolve(&tokenize(source).expect("tokenize")).expect("resolve")
    }

    fn compile_err(source: &str) -> CompileError {
        resolve(&tokenize(source).expect("tokenize")).expect_err("must fail")
    }

    #[test]
    fn infix_constants_fold() {
        assert_eq!(
            compile("1+2+3").code(),
            &[Instr::Sep, Instr::Num(6.0), Instr::Sep]
        );
        assert_eq!(
            compile("2p3G7").code(),
            // 2p3 folds to 8, then G folds the comparison with 7
            &[Instr::Sep, Instr::Num(1.0), Instr::Sep]
        );
    }

    #[test]
    fn infix_before_literal_swaps_to_postfix() {
        // `$1-1`: the argument fetch is already in place, the literal
        // moves in front of the operator
        assert_eq!(
            compile("$1-1").code(),
            &[
                Instr::Sep,
                Instr::Fetch(1),
                Instr::Num(1.0),
                Instr::Op(Op::Sub),
                Instr::Sep
            ]
        );
    }

    #[test]
    fn infix_before_argument_reference() {
        assert_eq!(
            compile("5*$2").code(),
            &[
                Instr::Sep,
                Instr::Num(5.0),
                Instr::Fetch(2),
                Instr::Op(Op::Mul),
                Instr::Sep
            ]
        );
    }

    #[test]
    fn peek_never_folds() {
        assert_eq!(
            compile("5@1").code(),
            &[
                Instr::Sep,
                Instr::Num(5.0),
                Instr::Num(1.0),
                Instr::Op(Op::Peek),
                Instr::Sep
            ]
        );
    }

    #[test]
    fn scale_shorthand_divides() {
        // bare `r4` pushes the reciprocal
        assert_eq!(
            compile("r4").code(),
            &[Instr::Sep, Instr::Num(0.25), Instr::Op(Op::TurnR), Instr::Sep]
        );
        // `3r4` divides the preceding literal in place
        assert_eq!(
            compile("3r4").code(),
            &[Instr::Sep, Instr::Num(0.75), Instr::Op(Op::TurnR), Instr::Sep]
        );
    }

    #[test]
    fn declaration_with_arguments() {
        let prog = compile("1$f=>");
        assert_eq!(prog.function("f"), Some(FuncEntry { addr: 1, argc: 1 }));
        assert_eq!(
            prog.code(),
            &[
                Instr::Sep,
                Instr::Frame(1),
                Instr::Op(Op::Line(Heading::East)),
                Instr::Sep
            ]
        );
    }

    #[test]
    fn declaration_without_arguments() {
        let prog = compile("$t=<");
        assert_eq!(prog.function("t"), Some(FuncEntry { addr: 1, argc: 0 }));
        assert_eq!(
            prog.code(),
            &[Instr::Sep, Instr::Op(Op::Line(Heading::West)), Instr::Sep]
        );
    }

    #[test]
    fn call_rewrites_with_declared_argc() {
        let prog = compile("2$f=> $f!");
        assert_eq!(prog.code()[4], Instr::Call { addr: 1, argc: 2 });
    }

    #[test]
    fn forward_reference_resolves() {
        let prog = compile("$f! 1$f=>");
        assert_eq!(prog.code()[1], Instr::Call { addr: 3, argc: 1 });
    }

    #[test]
    fn standalone_name_is_an_address_literal() {
        let prog = compile("$t=65,66 $t");
        let addr = prog.function("t").expect("declared").addr;
        assert_eq!(prog.code().last(), Some(&Instr::Sep));
        assert_eq!(prog.code()[prog.len() - 2], Instr::Num(addr as f64));
        assert_eq!(prog.literal_at(addr), Some(65.0));
        assert_eq!(prog.literal_at(addr + 1), Some(66.0));
    }

    #[test]
    fn conditional_targets_statement_end() {
        let prog = compile("$1?> <");
        assert_eq!(prog.code()[2], Instr::CondSkip(4));
        assert_eq!(prog.code()[4], Instr::Sep);
    }

    #[test]
    fn conditional_targets_enclosing_close() {
        let prog = compile("[1?>]");
        assert_eq!(prog.code()[3], Instr::CondSkip(5));
        assert_eq!(prog.code()[5], Instr::Op(Op::Close));
    }

    #[test]
    fn conditional_skips_over_nested_blocks() {
        let prog = compile("[1?[>] <]");
        // the inner bracket belongs to the guarded statement
        assert_eq!(prog.code()[3], Instr::CondSkip(7));
        assert_eq!(prog.code()[7], Instr::Sep);
    }

    #[test]
    fn undefined_function_is_rejected() {
        assert_eq!(compile_err("$g!").kind, CompileErrorKind::UndefinedFunction);
        assert_eq!(compile_err("$g").kind, CompileErrorKind::UndefinedFunction);
    }

    #[test]
    fn redefinition_is_rejected() {
        assert_eq!(
            compile_err("1$f=> 1$f=<").kind,
            CompileErrorKind::Redefinition
        );
    }

    #[test]
    fn declaration_without_name_is_rejected() {
        assert_eq!(compile_err("1 =>").kind, CompileErrorKind::BadDeclaration);
    }

    #[test]
    fn fractional_argument_count_is_rejected() {
        assert_eq!(
            compile_err("1.5$f=>").kind,
            CompileErrorKind::BadDeclaration
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let a = compile("1$f=[$1?1r8$1-1$f!b 1z4;1r8>]");
        let b = compile("1$f=[$1?1r8$1-1$f!b 1z4;1r8>]");
        assert_eq!(a.code(), b.code());
        assert_eq!(a.function("f"), b.function("f"));
    }

    #[test]
    fn brackets_lower_to_blocks() {
        let prog = compile("[(>)]{<}");
        assert_eq!(prog.code()[1], Instr::Op(Op::Open(Block::Scoped)));
        assert_eq!(prog.code()[2], Instr::Op(Op::Open(Block::Probe)));
        assert_eq!(prog.code()[4], Instr::Op(Op::Close));
        assert_eq!(prog.code()[6], Instr::Op(Op::Open(Block::Ghost)));
    }
}
