//! The traced path: a flat command/vertex buffer and its canonicalizer.
//!
//! The interpreter appends `(Command, Point)` pairs as the turtle moves.
//! Two commands are *deferred sentinels* that only the canonicalization
//! pass resolves:
//!
//! - [`Command::DuplicateLast`] — becomes a `MoveTo` at the vertex recorded
//!   immediately before it (a pen-lift that stays put).
//! - [`Command::LinkToPrevious`] — retroactively turns the `MoveTo` just
//!   before it into a `LineTo`, connecting a previously pen-lifted point to
//!   the path, and then disappears.
//!
//! Canonicalization also collapses runs of consecutive `MoveTo`s (only the
//! final pen position before drawing resumes matters) and guarantees the
//! result starts with a `MoveTo`. The pass is a fixed point: running it on
//! its own output changes nothing.

use kurbo::BezPath;

use crate::types::{Point, Scalar, Vec2};

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A path-drawing command. Cubic segments occupy three consecutive entries:
/// `CurveCtrl1`, `CurveCtrl2`, `CurveEnd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Lift the pen and move to the vertex.
    MoveTo,
    /// Draw a straight segment to the vertex.
    LineTo,
    /// First control point of a cubic segment.
    CurveCtrl1,
    /// Second control point of a cubic segment.
    CurveCtrl2,
    /// End point of a cubic segment.
    CurveEnd,
    /// Deferred: connect the preceding pen-lift into the path.
    LinkToPrevious,
    /// Deferred: pen-lift to the previously recorded vertex.
    DuplicateLast,
}

// ---------------------------------------------------------------------------
// TracedPath
// ---------------------------------------------------------------------------

/// An append-only sequence of `(Command, Point)` pairs.
///
/// Commands and vertices are stored in parallel vectors; the two lengths are
/// always equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TracedPath {
    cmds: Vec<Command>,
    verts: Vec<Point>,
}

impl TracedPath {
    /// An empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cmds: Vec::new(),
            verts: Vec::new(),
        }
    }

    /// A buffer seeded with a `MoveTo` at the given start point.
    #[must_use]
    pub fn with_start(start: Point) -> Self {
        let mut p = Self::new();
        p.move_to(start);
        p
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// The recorded commands.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.cmds
    }

    /// The recorded vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.verts
    }

    /// Append an entry.
    pub fn push(&mut self, cmd: Command, vertex: Point) {
        self.cmds.push(cmd);
        self.verts.push(vertex);
    }

    /// Append a pen-lift.
    pub fn move_to(&mut self, vertex: Point) {
        self.push(Command::MoveTo, vertex);
    }

    /// Append a straight segment.
    pub fn line_to(&mut self, vertex: Point) {
        self.push(Command::LineTo, vertex);
    }

    /// The most recently recorded vertex.
    #[must_use]
    pub fn last_point(&self) -> Option<Point> {
        self.verts.last().copied()
    }

    /// The most recently recorded command.
    #[must_use]
    pub fn last_command(&self) -> Option<Command> {
        self.cmds.last().copied()
    }

    /// Drop all entries at or past `mark`.
    pub fn truncate(&mut self, mark: usize) {
        self.cmds.truncate(mark);
        self.verts.truncate(mark);
    }

    // -----------------------------------------------------------------------
    // Vertex rewrites (corner rounding and spline fitting)
    // -----------------------------------------------------------------------

    /// Replace the corner formed by the last four vertices with one cubic.
    ///
    /// With the last four vertices `p0 p1 p2 p3`, the last three entries are
    /// replaced by a cubic ending at `p = p0 + p2 − p1` whose control points
    /// are `p1` and `p + p2 − p3` (the reflected chord vectors of the two
    /// adjacent segments). Returns the new endpoint, or `None` when fewer
    /// than four vertices are recorded.
    pub fn round_last_corner(&mut self) -> Option<Point> {
        let n = self.len();
        if n < 4 {
            return None;
        }
        let p0 = self.verts[n - 4];
        let p1 = self.verts[n - 3];
        let p2 = self.verts[n - 2];
        let p3 = self.verts[n - 1];

        let end = p0 + (p2 - p1);
        let ctrl2 = end + (p2 - p3);

        self.truncate(n - 3);
        self.push(Command::CurveCtrl1, p1);
        self.push(Command::CurveCtrl2, ctrl2);
        self.push(Command::CurveEnd, end);
        Some(end)
    }

    /// Replace the trailing run of `LineTo` vertices with a smooth chain of
    /// cubic segments through the same points.
    ///
    /// Interior tangents are a quarter of the sum of the two adjacent chord
    /// vectors (a Catmull-Rom-style estimate); the two end segments elevate
    /// the corresponding one-control quadratics to cubics. A run shorter
    /// than two segments, or one with no anchor vertex before it, is left
    /// untouched. Returns `true` if the buffer was rewritten.
    pub fn smooth_line_run(&mut self) -> bool {
        let mut begin = self.len();
        while begin > 0 && self.cmds[begin - 1] == Command::LineTo {
            begin -= 1;
        }
        let n = self.len() - begin;
        if n < 2 || begin == 0 {
            return false;
        }

        // q[0] is the anchor; q[1..=n] is the run being replaced.
        let q: Vec<Point> = self.verts[begin - 1..].to_vec();
        self.truncate(begin);

        let tangent = |i: usize| -> Vec2 {
            // Quarter of the sum of the chords entering and leaving q[i].
            ((q[i] - q[i - 1]) + (q[i + 1] - q[i])) * 0.25
        };

        // First segment: quadratic with control q[1] − t₁, elevated.
        self.push_elevated_quad(q[0], q[1] - tangent(1), q[1]);

        // Interior segments: full cubics between consecutive run points.
        for i in 1..n - 1 {
            self.push(Command::CurveCtrl1, q[i] + tangent(i));
            self.push(Command::CurveCtrl2, q[i + 1] - tangent(i + 1));
            self.push(Command::CurveEnd, q[i + 1]);
        }

        // Last segment: quadratic with control q[n−1] + tₙ₋₁, elevated.
        self.push_elevated_quad(q[n - 1], q[n - 1] + tangent(n - 1), q[n]);
        true
    }

    /// Append the cubic elevation of the quadratic `(from, ctrl, to)`.
    fn push_elevated_quad(&mut self, from: Point, ctrl: Point, to: Point) {
        const TWO_THIRDS: Scalar = 2.0 / 3.0;
        self.push(Command::CurveCtrl1, from + (ctrl - from) * TWO_THIRDS);
        self.push(Command::CurveCtrl2, to + (ctrl - to) * TWO_THIRDS);
        self.push(Command::CurveEnd, to);
    }

    // -----------------------------------------------------------------------
    // Canonicalization
    // -----------------------------------------------------------------------

    /// Produce the renderer-ready form of the buffer.
    ///
    /// Resolves the deferred sentinels, collapses redundant pen-lifts, and
    /// guarantees a leading `MoveTo`. Idempotent.
    #[must_use]
    pub fn canonicalize(&self) -> Self {
        let mut path = collapse_moves(self);

        // DuplicateLast → a MoveTo at the vertex recorded just before it.
        // The replacement reads the pre-pass vertices so that consecutive
        // sentinels each see their own predecessor.
        let snapshot = path.verts.clone();
        for i in 0..path.len() {
            if path.cmds[i] == Command::DuplicateLast {
                path.cmds[i] = Command::MoveTo;
                if i > 0 {
                    path.verts[i] = snapshot[i - 1];
                }
            }
        }

        // LinkToPrevious → the preceding MoveTo becomes a LineTo, the
        // sentinel itself disappears.
        for i in 0..path.len() {
            if path.cmds[i] == Command::LinkToPrevious && i > 0 {
                path.cmds[i - 1] = Command::LineTo;
            }
        }
        let mut resolved = Self::new();
        for i in 0..path.len() {
            if path.cmds[i] != Command::LinkToPrevious {
                resolved.push(path.cmds[i], path.verts[i]);
            }
        }

        // Sentinel resolution can create fresh MoveTo runs.
        let mut out = collapse_moves(&resolved);

        if out.cmds.first().is_some_and(|&c| c != Command::MoveTo) {
            out.cmds.insert(0, Command::MoveTo);
            out.verts.insert(0, out.verts[0]);
        }

        debug_assert_eq!(out.cmds.len(), out.verts.len());
        out
    }

    /// Convert a canonical buffer to a `kurbo::BezPath`.
    ///
    /// Must only be called on the output of [`Self::canonicalize`]; deferred
    /// sentinels are not representable and are skipped.
    #[must_use]
    pub fn to_bez_path(&self) -> BezPath {
        let mut bp = BezPath::new();
        let mut i = 0;
        while i < self.len() {
            match self.cmds[i] {
                Command::MoveTo => bp.move_to(self.verts[i]),
                Command::LineTo => bp.line_to(self.verts[i]),
                Command::CurveCtrl1 if i + 2 < self.len() => {
                    bp.curve_to(self.verts[i], self.verts[i + 1], self.verts[i + 2]);
                    i += 2;
                }
                _ => {}
            }
            i += 1;
        }
        bp
    }
}

/// Keep only the last `MoveTo` of every consecutive run. Sentinels break
/// runs, so a `MoveTo` directly before one always survives.
fn collapse_moves(path: &TracedPath) -> TracedPath {
    let mut out = TracedPath::new();
    for i in 0..path.len() {
        let redundant = path.cmds[i] == Command::MoveTo
            && path.cmds.get(i + 1) == Some(&Command::MoveTo);
        if !redundant {
            out.push(path.cmds[i], path.verts[i]);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON;

    fn pt(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < EPSILON && (a.y - b.y).abs() < EPSILON
    }

    // -- canonicalization --

    #[test]
    fn collapses_consecutive_moves() {
        let mut p = TracedPath::new();
        p.move_to(pt(0.0, 0.0));
        p.move_to(pt(1.0, 0.0));
        p.move_to(pt(2.0, 0.0));
        p.line_to(pt(3.0, 0.0));
        let c = p.canonicalize();
        assert_eq!(c.commands(), &[Command::MoveTo, Command::LineTo]);
        assert!(close(c.vertices()[0], pt(2.0, 0.0)));
    }

    #[test]
    fn duplicate_last_becomes_move_to_previous_vertex() {
        let mut p = TracedPath::new();
        p.move_to(pt(0.0, 0.0));
        p.line_to(pt(1.0, 1.0));
        p.push(Command::DuplicateLast, pt(9.0, 9.0)); // placeholder vertex
        let c = p.canonicalize();
        assert_eq!(
            c.commands(),
            &[Command::MoveTo, Command::LineTo, Command::MoveTo]
        );
        assert!(close(c.vertices()[2], pt(1.0, 1.0)));
    }

    #[test]
    fn link_to_previous_welds_the_pen_lift() {
        let mut p = TracedPath::new();
        p.move_to(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        p.move_to(pt(2.0, 0.0));
        p.push(Command::LinkToPrevious, pt(2.0, 0.0));
        let c = p.canonicalize();
        assert_eq!(
            c.commands(),
            &[Command::MoveTo, Command::LineTo, Command::LineTo]
        );
        assert!(close(c.vertices()[2], pt(2.0, 0.0)));
    }

    #[test]
    fn prepends_move_to_when_missing() {
        let mut p = TracedPath::new();
        p.line_to(pt(1.0, 0.0));
        let c = p.canonicalize();
        assert_eq!(c.commands(), &[Command::MoveTo, Command::LineTo]);
        assert!(close(c.vertices()[0], pt(1.0, 0.0)));
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let mut p = TracedPath::new();
        p.move_to(pt(0.0, 0.0));
        p.move_to(pt(0.5, 0.0));
        p.line_to(pt(1.0, 0.0));
        p.push(Command::DuplicateLast, pt(1.0, 0.0));
        p.move_to(pt(2.0, 0.0));
        p.push(Command::LinkToPrevious, pt(2.0, 0.0));
        p.line_to(pt(3.0, 0.0));
        let once = p.canonicalize();
        let twice = once.canonicalize();
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_buffer_canonicalizes_to_empty() {
        assert!(TracedPath::new().canonicalize().is_empty());
    }

    // -- corner rounding --

    #[test]
    fn round_corner_replaces_last_three_entries() {
        let mut p = TracedPath::with_start(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        p.line_to(pt(1.0, 1.0));
        p.line_to(pt(2.0, 1.0));
        let end = p.round_last_corner().unwrap();
        // p = p0 + p2 − p1 = (0,0) + (1,1) − (1,0) = (0,1)
        assert!(close(end, pt(0.0, 1.0)));
        assert_eq!(p.len(), 4);
        assert_eq!(
            &p.commands()[1..],
            &[Command::CurveCtrl1, Command::CurveCtrl2, Command::CurveEnd]
        );
        assert!(close(p.vertices()[1], pt(1.0, 0.0))); // ctrl1 = p1
    }

    #[test]
    fn round_corner_needs_four_vertices() {
        let mut p = TracedPath::with_start(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        assert!(p.round_last_corner().is_none());
    }

    // -- spline fitting --

    #[test]
    fn smooth_run_passes_through_the_same_points() {
        let mut p = TracedPath::with_start(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        p.line_to(pt(2.0, 1.0));
        p.line_to(pt(3.0, 0.0));
        assert!(p.smooth_line_run());

        // Three segments, each a Ctrl1/Ctrl2/End triple.
        assert_eq!(p.len(), 1 + 3 * 3);
        let ends: Vec<Point> = p
            .commands()
            .iter()
            .zip(p.vertices())
            .filter(|(c, _)| **c == Command::CurveEnd)
            .map(|(_, v)| *v)
            .collect();
        assert!(close(ends[0], pt(1.0, 0.0)));
        assert!(close(ends[1], pt(2.0, 1.0)));
        assert!(close(ends[2], pt(3.0, 0.0)));
    }

    #[test]
    fn smooth_run_needs_two_segments() {
        let mut p = TracedPath::with_start(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        assert!(!p.smooth_line_run());
        assert_eq!(p.commands(), &[Command::MoveTo, Command::LineTo]);
    }

    #[test]
    fn smooth_run_needs_an_anchor() {
        let mut p = TracedPath::new();
        p.line_to(pt(1.0, 0.0));
        p.line_to(pt(2.0, 0.0));
        assert!(!p.smooth_line_run());
    }

    // -- BezPath export --

    #[test]
    fn bez_path_roundtrip_shape() {
        let mut p = TracedPath::with_start(pt(0.0, 0.0));
        p.line_to(pt(1.0, 0.0));
        p.line_to(pt(1.0, 1.0));
        p.line_to(pt(2.0, 1.0));
        p.round_last_corner().unwrap();
        let bp = p.canonicalize().to_bez_path();
        assert_eq!(bp.elements().len(), 3); // MoveTo, LineTo, CurveTo
    }
}
