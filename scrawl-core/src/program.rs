//! Compiled program representation.
//!
//! A program is a flat array of instructions plus a table of declared
//! functions. Instruction indices double as addresses: function entries,
//! conditional skip targets and the values pushed by standalone `$name`
//! references all index this array, so the resolver is careful never to
//! shift code it has already handed out addresses into.

use std::collections::HashMap;

use scrawl_graphics::types::Scalar;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Pen heading for the four line operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    /// `>`
    East,
    /// `^`
    North,
    /// `<`
    West,
    /// `v`
    South,
}

impl Heading {
    /// Unit step in the untransformed frame.
    #[must_use]
    pub const fn unit(self) -> (Scalar, Scalar) {
        match self {
            Self::East => (1.0, 0.0),
            Self::North => (0.0, 1.0),
            Self::West => (-1.0, 0.0),
            Self::South => (0.0, -1.0),
        }
    }
}

/// The three block-opening brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// `[` runs the body on the current state and restores only the
    /// transform afterwards; position and stack changes survive.
    Scoped,
    /// `(` runs the body on a copy of the state and discards every state
    /// change, leaving a pen-up move back to the pre-block position.
    Probe,
    /// `{` draws the body into a discarded scratch buffer; only the
    /// position survives, as a pen-up move to the body's last drawn point.
    Ghost,
}

/// A stack-machine operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `p`, exponentiation
    Pow,
    /// `G`, greater-than pushing 1 or 0
    Gt,
    /// `$`, fetch the argument slot named by the popped index
    FetchDyn,
    /// `P`, pop and discard
    Drop,
    /// `x`
    StretchX,
    /// `y`
    StretchY,
    /// `z`, uniform scale
    Scale,
    /// `r`, clockwise turn in fractions of a full revolution
    TurnR,
    /// `l`, counter-clockwise turn
    TurnL,
    /// `R`, clockwise turn measured from a half revolution
    TurnRHalf,
    /// `L`, counter-clockwise turn measured from a half revolution
    TurnLHalf,
    /// `i`, shear along x
    ShearX,
    /// `j`, shear along y
    ShearY,
    /// `>` `^` `<` `v`, draw one transformed unit step
    Line(Heading),
    /// `;`, pen-up unit step along the transformed x axis
    Skip,
    /// `|`, restore the state captured at block entry, keeping position
    Reset,
    /// `[` `(` `{`
    Open(Block),
    /// `]` `)` `}`
    Close,
    /// `:`, pop a bound and run the next statement that many times
    Loop,
    /// `!`, call the address popped from the stack
    CallDyn,
    /// `@`, pop an index and a base address and push the literal there
    Peek,
    /// `b`, return from the innermost call, or end the block
    Break,
    /// `M`, mark the last vertex for duplication after a detour
    MarkDuplicate,
    /// `C`, link the pen position back to the previous contour
    MarkLink,
    /// `s`, replace the last corner with a rounded curve
    RoundCorner,
    /// `S`, smooth the trailing straight-line run into a spline
    Smooth,
}

/// Map a source character to its operator, if it is one.
///
/// `?` is absent: conditionals resolve to [`Instr::CondSkip`] with a
/// precomputed target instead of reaching the interpreter as an operator.
#[must_use]
pub fn op_from_char(c: char) -> Option<Op> {
    Some(match c {
        '+' => Op::Add,
        '-' => Op::Sub,
        '*' => Op::Mul,
        '/' => Op::Div,
        'p' => Op::Pow,
        'G' => Op::Gt,
        '$' => Op::FetchDyn,
        'P' => Op::Drop,
        'x' => Op::StretchX,
        'y' => Op::StretchY,
        'z' => Op::Scale,
        'r' => Op::TurnR,
        'l' => Op::TurnL,
        'R' => Op::TurnRHalf,
        'L' => Op::TurnLHalf,
        'i' => Op::ShearX,
        'j' => Op::ShearY,
        '>' => Op::Line(Heading::East),
        '^' => Op::Line(Heading::North),
        '<' => Op::Line(Heading::West),
        'v' => Op::Line(Heading::South),
        ';' => Op::Skip,
        '|' => Op::Reset,
        '[' => Op::Open(Block::Scoped),
        '(' => Op::Open(Block::Probe),
        '{' => Op::Open(Block::Ghost),
        ']' | ')' | '}' => Op::Close,
        ':' => Op::Loop,
        '!' => Op::CallDyn,
        '@' => Op::Peek,
        'b' => Op::Break,
        'M' => Op::MarkDuplicate,
        'C' => Op::MarkLink,
        's' => Op::RoundCorner,
        'S' => Op::Smooth,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// One resolved instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    /// Push a constant. Standalone `$name` references also compile to a
    /// constant holding the function's entry address.
    Num(Scalar),
    /// Execute an operator.
    Op(Op),
    /// Statement boundary. Ends the active call frame if one opened at
    /// this nesting level, otherwise ends a single-statement region.
    Sep,
    /// Push argument slot `n` of the active frame; slot 0 is the
    /// innermost loop counter.
    Fetch(usize),
    /// Function prologue: rebase the frame on the top `argc` stack values.
    Frame(usize),
    /// Pop a condition; jump to the target when it is zero.
    CondSkip(usize),
    /// Memoized call to a declared function.
    Call {
        /// Entry address of the callee.
        addr: usize,
        /// Number of arguments consumed from the stack.
        argc: usize,
    },
}

// ---------------------------------------------------------------------------
// Program
// ---------------------------------------------------------------------------

/// A declared function's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncEntry {
    /// Instruction index where the body starts.
    pub addr: usize,
    /// Declared argument count.
    pub argc: usize,
}

/// A resolved, executable program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    code: Vec<Instr>,
    functions: HashMap<String, FuncEntry>,
}

impl Program {
    pub(crate) fn new(code: Vec<Instr>, functions: HashMap<String, FuncEntry>) -> Self {
        Self { code, functions }
    }

    /// The instruction array.
    #[must_use]
    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns `true` for a program with no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// All declared functions by name.
    #[must_use]
    pub fn functions(&self) -> &HashMap<String, FuncEntry> {
        &self.functions
    }

    /// Look up a declared function.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<FuncEntry> {
        self.functions.get(name).copied()
    }

    /// The constant stored at `addr`, if that instruction is a literal.
    /// This is what the `@` operator reads at run time.
    #[must_use]
    pub fn literal_at(&self, addr: usize) -> Option<Scalar> {
        match self.code.get(addr) {
            Some(Instr::Num(v)) => Some(*v),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_character_maps() {
        for c in "+-*/pG$P xyzrlRLij ><^v ;|[](){}:!@b MCsS".chars() {
            if c != ' ' {
                assert!(op_from_char(c).is_some(), "missing operator {c:?}");
            }
        }
        assert_eq!(op_from_char('?'), None);
        assert_eq!(op_from_char('q'), None);
    }

    #[test]
    fn headings_step_where_expected() {
        assert_eq!(Heading::East.unit(), (1.0, 0.0));
        assert_eq!(Heading::South.unit(), (0.0, -1.0));
    }

    #[test]
    fn literal_lookup() {
        let prog = Program::new(
            vec![Instr::Sep, Instr::Num(65.0), Instr::Op(Op::Drop)],
            HashMap::new(),
        );
        assert_eq!(prog.literal_at(1), Some(65.0));
        assert_eq!(prog.literal_at(2), None);
        assert_eq!(prog.literal_at(9), None);
    }
}
