//! Stack-machine interpreter.
//!
//! Execution is a hybrid of host recursion and an explicit frame stack.
//! Brackets, loop bodies and conditionals nest statically, so each block
//! runs as a recursive [`Vm::exec`] level over the same instruction array.
//! Function calls do not recurse in the host: a call pushes a [`Frame`]
//! with its return address and jumps, and the separator that ends the
//! callee's single statement pops the frame and jumps back. Each level
//! remembers how many frames were live when it started, so a frame opened
//! inside a block can never unwind past that block's entry.
//!
//! Memoized calls record the geometry a callee produced, re-expressed in
//! the frame the callee was entered in. A later call with the same entry
//! address and bit-identical arguments replays vertices, position delta
//! and transform delta through the current transform instead of executing
//! the body. A callee entered under a singular transform is executed but
//! never cached, since its local frame cannot be reconstructed.

use std::collections::HashMap;

use log::{debug, trace};

use scrawl_graphics::path::{Command, TracedPath};
use scrawl_graphics::transform::Transform;
use scrawl_graphics::types::{Point, Scalar, Vec2};

use crate::error::{RunResult, RuntimeError, RuntimeErrorKind};
use crate::program::{Block, Instr, Op, Program};


/// Nesting and call-depth limit.
const DEFAULT_MAX_DEPTH: usize = 4096;

// ---------------------------------------------------------------------------
// Machine state
// ---------------------------------------------------------------------------

/// The mutable turtle state threaded through execution.
#[derive(Debug, Clone)]
struct State {
    /// Current local-to-world linear map.
    transform: Transform,
    /// Pen position in world coordinates.
    pos: Point,
    /// Operand stack.
    stack: Vec<Scalar>,
    /// Iteration counter of the innermost loop, read by slot 0.
    iteration: Scalar,
}

impl State {
    fn new(args: &[Scalar]) -> Self {
        Self {
            transform: Transform::IDENTITY,
            pos: Point::ORIGIN,
            stack: args.to_vec(),
            iteration: 0.0,
        }
    }

    fn pop(&mut self, ip: usize) -> RunResult<Scalar> {
        self.stack.pop().ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::StackUnderflow, "operand stack is empty", ip)
        })
    }
}

/// One pending function activation.
#[derive(Debug, Clone)]
struct Frame {
    /// Where to resume when the callee's statement ends.
    ret_ip: usize,
    /// Snapshot taken at the call site, with the arguments already on the
    /// stack. `|` in the body rewinds to this, not to the host level.
    entry: State,
    /// First argument slot of the activation.
    base: usize,
    /// Stack cells drained from `base` when the frame pops.
    drop: usize,
    /// Set for memoized calls that are recording.
    memo: Option<PendingMemo>,
}

/// Bookkeeping for a memoized call being recorded.
#[derive(Debug, Clone)]
struct PendingMemo {
    key: MemoKey,
    /// Output length at call time; everything past it belongs to the call.
    mark: usize,
    /// Inverse of the entry transform.
    inv: Transform,
    /// Pen position at call time.
    pos0: Point,
    /// Stack index where the callee's return values start after cleanup.
    arg0: usize,
}

// ---------------------------------------------------------------------------
// Memo cache
// ---------------------------------------------------------------------------

/// Cache key: entry address, the ambient loop counter, and the argument
/// bit patterns. The counter is part of the key because a body can read
/// it through slot 0, so it is an input like any argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    addr: usize,
    iteration: u64,
    args: Vec<u64>,
}

fn memo_key(addr: usize, iteration: Scalar, args: &[Scalar]) -> MemoKey {
    MemoKey {
        addr,
        iteration: canon_bits(iteration),
        args: args.iter().map(|&v| canon_bits(v)).collect(),
    }
}

/// Argument bits with negative zero folded onto zero.
fn canon_bits(v: Scalar) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Everything needed to replay a recorded call in a new frame.
#[derive(Debug, Clone)]
struct MemoEntry {
    /// Net transform change, expressed in the entry frame.
    delta: Transform,
    /// Net position change, expressed in the entry frame.
    dpos: Vec2,
    /// Recorded commands.
    cmds: Vec<Command>,
    /// Recorded vertices, relative to the entry position in the entry frame.
    verts: Vec<Point>,
    /// Values the call left on the stack.
    ret: Vec<Scalar>,
}

// ---------------------------------------------------------------------------
// Virtual machine
// ---------------------------------------------------------------------------

/// The result of one program run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The canonicalized drawing.
    pub path: TracedPath,
    /// Whatever the program left on the operand stack.
    pub returns: Vec<Scalar>,
}

/// A reusable interpreter. The memo cache survives across runs of the same
/// program, so repeated glyph renderings get cheaper.
#[derive(Debug)]
pub struct Vm {
    memo: Option<HashMap<MemoKey, MemoEntry>>,
    frames: Vec<Frame>,
    max_depth: usize,
    nest: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A machine with memoization enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            memo: Some(HashMap::new()),
            frames: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            nest: 0,
        }
    }

    /// A machine that always executes calls directly.
    #[must_use]
    pub fn without_memo() -> Self {
        Self {
            memo: None,
            ..Self::new()
        }
    }

    /// Override the nesting and call-depth limit.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Drop all recorded calls. Required when switching to a different
    /// program, since cache keys hold instruction addresses.
    pub fn clear_memo(&mut self) {
        if let Some(cache) = self.memo.as_mut() {
            cache.clear();
        }
    }

    /// Number of recorded calls in the cache.
    #[must_use]
    pub fn cached_calls(&self) -> usize {
        self.memo.as_ref().map_or(0, HashMap::len)
    }

    /// Run a program from the top, or from a declared entry point.
    ///
    /// `args` seeds the operand stack; with an entry point they are the
    /// function's arguments. The output path starts with a pen-up move
    /// to the origin and is returned in canonical form.
    pub fn run(
        &mut self,
        program: &Program,
        entry: Option<&str>,
        args: &[Scalar],
    ) -> RunResult<RunOutput> {
        self.frames.clear();
        self.nest = 0;
        let (ip, single) = match entry {
            Some(name) => {
                let f = program.function(name).ok_or_else(|| {
                    RuntimeError::new(
                        RuntimeErrorKind::UnknownFunction,
                        format!("no function named ${name}"),
                        0,
                    )
                })?;
                (f.addr, true)
            }
            None => (0, false),
        };
        debug!("run entry={entry:?} ip={ip} args={args:?}");
        let st = State::new(args);
        let mut out = TracedPath::with_start(st.pos);
        let (st, _) = self.exec(program, st, ip, 0, single, &mut out)?;
        Ok(RunOutput {
            path: out.canonicalize(),
            returns: st.stack,
        })
    }

    /// Execute one nesting level, guarded by the depth limit.
    fn exec(
        &mut self,
        program: &Program,
        st: State,
        ip: usize,
        base: usize,
        single: bool,
        out: &mut TracedPath,
    ) -> RunResult<(State, usize)> {
        if self.nest >= self.max_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::RecursionLimit,
                "block nesting is too deep",
                ip,
            ));
        }
        self.nest += 1;
        let result = self.exec_level(program, st, ip, base, single, out);
        self.nest -= 1;
        result
    }

    /// The dispatch loop for one level. Returns the state and the index of
    /// the instruction that ended the level, which the caller either steps
    /// past (blocks) or re-examines at its own level (loop bodies).
    #[allow(clippy::too_many_lines)]
    fn exec_level(
        &mut self,
        program: &Program,
        mut st: State,
        mut ip: usize,
        base: usize,
        single: bool,
        out: &mut TracedPath,
    ) -> RunResult<(State, usize)> {
        let code = program.code();
        let entry = st.clone();
        let frame_floor = self.frames.len();
        let mut level_base = base;
        let mut level_drop = 0usize;

        loop {
            let Some(instr) = code.get(ip) else { break };
            trace!("ip={ip} {instr:?} stack={:?}", st.stack);
            match *instr {
                Instr::Num(v) => {
                    st.stack.push(v);
                    ip += 1;
                }
                Instr::Fetch(slot) => {
                    let eff = self.frames.last().map_or(level_base, |f| f.base);
                    let v = fetch(&st, eff, slot as Scalar, ip)?;
                    st.stack.push(v);
                    ip += 1;
                }
                Instr::Frame(argc) => {
                    // a run from the top flows through declaration bodies;
                    // a prologue met with too few values rebases on what is
                    // there and lets an actual fetch report the gap
                    let new_base = st.stack.len().saturating_sub(argc);
                    if self.frames.len() > frame_floor {
                        if let Some(f) = self.frames.last_mut() {
                            f.base = new_base;
                            f.drop = argc;
                        }
                    } else {
                        level_base = new_base;
                        level_drop = argc;
                    }
                    ip += 1;
                }
                Instr::CondSkip(target) => {
                    let cond = st.pop(ip)?;
                    ip = if cond == 0.0 { target } else { ip + 1 };
                }
                Instr::Sep => {
                    if self.frames.len() > frame_floor {
                        if let Some(frame) = self.frames.pop() {
                            ip = self.finish_frame(&mut st, out, frame);
                        }
                    } else if single {
                        break;
                    } else {
                        ip += 1;
                    }
                }
                Instr::Call { addr, argc } => {
                    if argc > st.stack.len() {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::StackUnderflow,
                            "call is missing arguments",
                            ip,
                        ));
                    }
                    let key = self
                        .memo
                        .is_some()
                        .then(|| {
                            memo_key(addr, st.iteration, &st.stack[st.stack.len() - argc..])
                        });
                    let hit = key
                        .as_ref()
                        .and_then(|k| self.memo.as_ref().and_then(|m| m.get(k)));
                    if let Some(found) = hit {
                        for (cmd, v) in found.cmds.iter().zip(&found.verts) {
                            out.push(*cmd, st.pos + st.transform.apply(v.to_vec2()));
                        }
                        st.pos += st.transform.apply(found.dpos);
                        st.transform = found.delta.then(&st.transform);
                        let ret = found.ret.clone();
                        st.stack.truncate(st.stack.len() - argc);
                        st.stack.extend_from_slice(&ret);
                        ip += 1;
                    } else {
                        if self.frames.len() >= self.max_depth {
                            return Err(RuntimeError::new(
                                RuntimeErrorKind::RecursionLimit,
                                "call depth exceeds the limit",
                                ip,
                            ));
                        }
                        let call_base = st.stack.len() - argc;
                        let memo = key.and_then(|key| {
                            st.transform.inverse().map(|inv| PendingMemo {
                                key,
                                mark: out.len(),
                                inv,
                                pos0: st.pos,
                                arg0: call_base,
                            })
                        });
                        self.frames.push(Frame {
                            ret_ip: ip + 1,
                            entry: st.clone(),
                            base: call_base,
                            drop: argc,
                            memo,
                        });
                        ip = addr;
                    }
                }
                Instr::Op(op) => match op {
                    Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow | Op::Gt => {
                        let rhs = st.pop(ip)?;
                        let lhs = st.pop(ip)?;
                        st.stack.push(match op {
                            Op::Add => lhs + rhs,
                            Op::Sub => lhs - rhs,
                            Op::Mul => lhs * rhs,
                            Op::Div => lhs / rhs,
                            Op::Pow => lhs.powf(rhs),
                            _ => Scalar::from(u8::from(lhs > rhs)),
                        });
                        ip += 1;
                    }
                    Op::FetchDyn => {
                        let slot = st.pop(ip)?;
                        let eff = self.frames.last().map_or(level_base, |f| f.base);
                        let v = fetch(&st, eff, slot, ip)?;
                        st.stack.push(v);
                        ip += 1;
                    }
                    Op::Drop => {
                        st.pop(ip)?;
                        ip += 1;
                    }
                    Op::StretchX
                    | Op::StretchY
                    | Op::Scale
                    | Op::TurnR
                    | Op::TurnL
                    | Op::TurnRHalf
                    | Op::TurnLHalf
                    | Op::ShearX
                    | Op::ShearY => {
                        let k = st.pop(ip)?;
                        let map = match op {
                            Op::StretchX => Transform::stretch_x(k),
                            Op::StretchY => Transform::stretch_y(k),
                            Op::Scale => Transform::scaled(k),
                            Op::TurnR => Transform::rotation_turns(-k),
                            Op::TurnL => Transform::rotation_turns(k),
                            Op::TurnRHalf => Transform::rotation_turns(k - 0.5),
                            Op::TurnLHalf => Transform::rotation_turns(0.5 - k),
                            Op::ShearX => Transform::shear_x(k),
                            _ => Transform::shear_y(k),
                        };
                        // local maps compose on the right of the current one
                        st.transform = map.then(&st.transform);
                        ip += 1;
                    }
                    Op::Line(heading) => {
                        let (ux, uy) = heading.unit();
                        st.pos += st.transform.apply(Vec2::new(ux, uy));
                        out.line_to(st.pos);
                        ip += 1;
                    }
                    Op::Skip => {
                        st.pos += st.transform.apply(Vec2::new(1.0, 0.0));
                        out.move_to(st.pos);
                        ip += 1;
                    }
                    Op::Reset => {
                        // inside a call opened at this level, the call site
                        // is the rewind point, not the level entry
                        let pos = st.pos;
                        st = if self.frames.len() > frame_floor {
                            match self.frames.last() {
                                Some(f) => f.entry.clone(),
                                None => entry.clone(),
                            }
                        } else {
                            entry.clone()
                        };
                        st.pos = pos;
                        ip += 1;
                    }
                    Op::Open(block) => {
                        let eff = self.frames.last().map_or(level_base, |f| f.base);
                        match block {
                            Block::Scoped => {
                                let saved = st.transform;
                                let (next, end) =
                                    self.exec(program, st, ip + 1, eff, false, out)?;
                                st = next;
                                st.transform = saved;
                                ip = end + 1;
                            }
                            Block::Probe => {
                                let before = st.pos;
                                let (_, end) =
                                    self.exec(program, st.clone(), ip + 1, eff, false, out)?;
                                out.move_to(before);
                                ip = end + 1;
                            }
                            Block::Ghost => {
                                let mut scratch = TracedPath::new();
                                let (next, end) = self.exec(
                                    program,
                                    st.clone(),
                                    ip + 1,
                                    eff,
                                    false,
                                    &mut scratch,
                                )?;
                                st.pos = next.pos;
                                let lift = scratch.last_point().unwrap_or(st.pos);
                                out.move_to(lift);
                                ip = end + 1;
                            }
                        }
                    }
                    Op::Close => break,
                    Op::Loop => {
                        let bound = st.pop(ip)?;
                        let start = ip + 1;
                        #[allow(clippy::cast_possible_truncation)]
                        let n = bound as i64;
                        if n <= 0 {
                            // an empty loop still consumes its body
                            ip = statement_end(code, start);
                        } else {
                            let mut end = start;
                            for k in 0..n {
                                st.iteration = k as Scalar;
                                let eff = self.frames.last().map_or(level_base, |f| f.base);
                                let (next, e) =
                                    self.exec(program, st, start, eff, true, out)?;
                                st = next;
                                end = e;
                            }
                            // the terminator is re-examined at this level
                            ip = end;
                        }
                    }
                    Op::CallDyn => {
                        let target = st.pop(ip)?;
                        let addr = as_addr(target, code.len(), ip)?;
                        if self.frames.len() >= self.max_depth {
                            return Err(RuntimeError::new(
                                RuntimeErrorKind::RecursionLimit,
                                "call depth exceeds the limit",
                                ip,
                            ));
                        }
                        let eff = self.frames.last().map_or(level_base, |f| f.base);
                        self.frames.push(Frame {
                            ret_ip: ip + 1,
                            entry: st.clone(),
                            base: eff,
                            drop: 0,
                            memo: None,
                        });
                        ip = addr;
                    }
                    Op::Peek => {
                        let idx = st.pop(ip)?;
                        let table = st.pop(ip)?;
                        let addr = as_addr(table + idx, code.len(), ip)?;
                        let v = program.literal_at(addr).ok_or_else(|| {
                            RuntimeError::new(
                                RuntimeErrorKind::Assertion,
                                format!("no literal at address {addr}"),
                                ip,
                            )
                        })?;
                        st.stack.push(v);
                        ip += 1;
                    }
                    Op::Break => {
                        if self.frames.len() > frame_floor {
                            if let Some(frame) = self.frames.pop() {
                                ip = self.finish_frame(&mut st, out, frame);
                            }
                        } else {
                            break;
                        }
                    }
                    Op::MarkDuplicate => {
                        let p = out.last_point().unwrap_or(st.pos);
                        out.push(Command::DuplicateLast, p);
                        ip += 1;
                    }
                    Op::MarkLink => {
                        if out.last_command() == Some(Command::MoveTo) {
                            out.push(Command::LinkToPrevious, st.pos);
                        }
                        ip += 1;
                    }
                    Op::RoundCorner => match out.round_last_corner() {
                        Some(p) => {
                            st.pos = p;
                            ip += 1;
                        }
                        None => {
                            return Err(RuntimeError::new(
                                RuntimeErrorKind::Assertion,
                                "corner rounding needs four drawn vertices",
                                ip,
                            ));
                        }
                    },
                    Op::Smooth => {
                        out.smooth_line_run();
                        ip += 1;
                    }
                },
            }
        }

        // frames opened at this level that never saw their statement end
        while self.frames.len() > frame_floor {
            if let Some(frame) = self.frames.pop() {
                let _ = self.finish_frame(&mut st, out, frame);
            }
        }
        let hi = (level_base + level_drop).min(st.stack.len());
        let lo = level_base.min(hi);
        st.stack.drain(lo..hi);
        Ok((st, ip))
    }

    /// Pop bookkeeping for a finished activation: drain the argument
    /// cells, record the memo entry if one is pending, and hand back the
    /// return address.
    fn finish_frame(&mut self, st: &mut State, out: &TracedPath, frame: Frame) -> usize {
        let hi = (frame.base + frame.drop).min(st.stack.len());
        let lo = frame.base.min(hi);
        st.stack.drain(lo..hi);
        if let Some(pending) = frame.memo {
            self.record(st, out, &pending);
        }
        frame.ret_ip
    }

    /// Store the finished call's geometry re-expressed in its entry frame.
    fn record(&mut self, st: &State, out: &TracedPath, p: &PendingMemo) {
        let Some(cache) = self.memo.as_mut() else { return };
        let ret = st.stack.get(p.arg0..).map_or_else(Vec::new, <[Scalar]>::to_vec);
        let delta = st.transform.then(&p.inv);
        let dpos = p.inv.apply(st.pos - p.pos0);
        let span = p.mark..out.len();
        let cmds = out.commands()[span.clone()].to_vec();
        let verts = out.vertices()[span]
            .iter()
            .map(|&v| p.inv.apply(v - p.pos0).to_point())
            .collect();
        trace!(
            "memo record addr={} args={:?} cmds={} ret={:?}",
            p.key.addr,
            p.key.args,
            cmds.len(),
            ret
        );
        cache.insert(p.key.clone(), MemoEntry { delta, dpos, cmds, verts, ret });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read an argument slot. Slot 0 is the loop counter; slot `n` is the
/// n-th value of the active frame.
fn fetch(st: &State, base: usize, slot: Scalar, ip: usize) -> RunResult<Scalar> {
    if slot == 0.0 {
        return Ok(st.iteration);
    }
    if slot < 0.0 || slot.fract() != 0.0 {
        return Err(RuntimeError::new(
            RuntimeErrorKind::Assertion,
            format!("{slot} is not an argument slot"),
            ip,
        ));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = base + slot as usize - 1;
    st.stack.get(index).copied().ok_or_else(|| {
        RuntimeError::new(
            RuntimeErrorKind::StackUnderflow,
            format!("argument slot {slot} is outside the frame"),
            ip,
        )
    })
}

/// Check that a computed value names an instruction.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_addr(v: Scalar, len: usize, ip: usize) -> RunResult<usize> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && (v as usize) < len {
        Ok(v as usize)
    } else {
        Err(RuntimeError::new(
            RuntimeErrorKind::BadAddress,
            format!("{v} is not an instruction address"),
            ip,
        ))
    }
}

/// Index of the separator or closing bracket that ends the statement
/// starting at `from`, at that statement's own nesting level.
fn statement_end(code: &[Instr], from: usize) -> usize {
    let mut depth = 0usize;
    for (j, instr) in code.iter().enumerate().skip(from) {
        match instr {
            Instr::Sep if depth == 0 => return j,
            Instr::Op(Op::Open(_)) => depth += 1,
            Instr::Op(Op::Close) => {
                if depth == 0 {
                    return j;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    code.len()
}
