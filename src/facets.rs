//! Facet stream interpretation
//!
//! The facet payload is a compact connectivity codec: a byte stream of
//! commands whose low nibble selects an operation (the high nibble is
//! reserved and ignored). The interpreter keeps two pieces of state, a FIFO
//! of directed edges between already-emitted vertex indices and a running
//! vertex offset that implicit operations consume. Most triangles cost a
//! single byte: the front edge plus the next implicit vertex.
//!
//! Inline operands are little-endian signed integers. 16-bit operands occupy
//! four bytes on the wire (two value bytes followed by two padding bytes);
//! 32-bit operands occupy four. A negative operand is relative to the
//! current vertex offset.
//!
//! The interpreter never fails outright: underflowing the edge queue or
//! running out of operand bytes stops interpretation and returns the
//! triangles emitted so far, with a diagnostic describing where the stream
//! went wrong.

use crate::error::Diagnostic;
use crate::model::Triangle;
use std::collections::VecDeque;
use tracing::warn;

const OPCODE_MASK: u8 = 0x0F;

// Both operand widths advance the cursor by four bytes.
const OPERAND_LEN: usize = 4;

/// One decoded command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opcode {
    /// Pop the front edge, fan to the next implicit vertex
    AdvanceNew,
    /// Join the front edge with the back edge's origin
    WrapBack,
    /// Join the front edge with the following edge's tip
    WrapNext,
    /// Move the front edge to the back unchanged
    Rotate,
    /// Start a fresh strip from three implicit vertices
    RestartImplicit,
    /// Start a fresh strip from three 16-bit operands
    Restart16,
    /// Start a fresh strip from three 32-bit operands
    Restart32,
    /// Fan the front edge to a 16-bit operand vertex
    Absolute16,
    /// Fan the front edge to a 32-bit operand vertex
    Absolute32,
    /// Collapse the seam between the back and front of the queue
    Stitch,
    /// Consume one implicit vertex without emitting
    SkipVertex,
    /// Reserved command, skipped with a warning
    Reserved(u8),
}

impl Opcode {
    fn from_command(byte: u8) -> Self {
        match byte & OPCODE_MASK {
            0 => Opcode::AdvanceNew,
            1 => Opcode::WrapBack,
            2 => Opcode::WrapNext,
            3 => Opcode::Rotate,
            4 => Opcode::RestartImplicit,
            5 => Opcode::Restart16,
            6 => Opcode::Restart32,
            7 => Opcode::Absolute16,
            8 => Opcode::Absolute32,
            9 => Opcode::Stitch,
            10 => Opcode::SkipVertex,
            op => Opcode::Reserved(op),
        }
    }
}

/// Result of interpreting a facet stream
#[derive(Debug, Clone, Default)]
pub struct FacetOutput {
    /// Triangles in emission order
    pub triangles: Vec<Triangle>,
    /// Everything the interpreter had to recover from
    pub diagnostics: Vec<Diagnostic>,
}

/// Interpret a facet stream into triangles
///
/// `expected_count` is the document's `facet_count`; a well-formed stream
/// emits exactly that many triangles, and a mismatch is recorded as a
/// diagnostic rather than an error. `legacy_restart_edge` selects the edge
/// set old encoders used when restarting a strip.
pub fn interpret(data: &[u8], expected_count: usize, legacy_restart_edge: bool) -> FacetOutput {
    let mut interpreter = Interpreter {
        data,
        cursor: 0,
        queue: VecDeque::new(),
        vertex_offset: 0,
        triangles: Vec::with_capacity(expected_count),
        diagnostics: Vec::new(),
        legacy_restart_edge,
    };
    interpreter.run();

    if interpreter.triangles.len() != expected_count {
        warn!(
            expected = expected_count,
            actual = interpreter.triangles.len(),
            "facet stream emitted unexpected triangle count"
        );
        interpreter.diagnostics.push(Diagnostic::TriangleCountMismatch {
            expected: expected_count,
            actual: interpreter.triangles.len(),
        });
    }

    FacetOutput {
        triangles: interpreter.triangles,
        diagnostics: interpreter.diagnostics,
    }
}

/// Signal returned by each step: keep going or stop on a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Stop,
}

struct Interpreter<'a> {
    data: &'a [u8],
    cursor: usize,
    queue: VecDeque<(u32, u32)>,
    vertex_offset: u32,
    triangles: Vec<Triangle>,
    diagnostics: Vec<Diagnostic>,
    legacy_restart_edge: bool,
}

impl Interpreter<'_> {
    fn run(&mut self) {
        while self.cursor < self.data.len() {
            let at = self.cursor;
            let opcode = Opcode::from_command(self.data[self.cursor]);
            self.cursor += 1;
            if self.step(opcode, at) == Step::Stop {
                break;
            }
        }
    }

    fn step(&mut self, opcode: Opcode, at: usize) -> Step {
        match opcode {
            Opcode::AdvanceNew => {
                let Some((a, b)) = self.pop_front(at) else {
                    return Step::Stop;
                };
                let v = self.vertex_offset;
                self.emit(a, v, b);
                self.queue.push_back((a, v));
                self.queue.push_back((v, b));
                self.vertex_offset += 1;
            }
            Opcode::WrapBack => {
                let Some((a, b)) = self.pop_front(at) else {
                    return Step::Stop;
                };
                let Some((p, _)) = self.pop_back(at) else {
                    return Step::Stop;
                };
                self.emit(a, p, b);
                self.queue.push_back((p, b));
            }
            Opcode::WrapNext => {
                let Some((a, b)) = self.pop_front(at) else {
                    return Step::Stop;
                };
                let Some((_, d)) = self.pop_front(at) else {
                    return Step::Stop;
                };
                self.emit(a, d, b);
                self.queue.push_back((a, d));
            }
            Opcode::Rotate => {
                let Some(edge) = self.pop_front(at) else {
                    return Step::Stop;
                };
                self.queue.push_back(edge);
            }
            Opcode::RestartImplicit => {
                let v0 = self.vertex_offset;
                self.restart(v0, v0 + 1, v0 + 2);
                self.vertex_offset += 3;
            }
            Opcode::Restart16 => {
                let Some(v0) = self.read_operand(at, true) else {
                    return Step::Stop;
                };
                let Some(v1) = self.read_operand(at, true) else {
                    return Step::Stop;
                };
                let Some(v2) = self.read_operand(at, true) else {
                    return Step::Stop;
                };
                self.restart(v0, v1, v2);
            }
            Opcode::Restart32 => {
                let Some(v0) = self.read_operand(at, false) else {
                    return Step::Stop;
                };
                let Some(v1) = self.read_operand(at, false) else {
                    return Step::Stop;
                };
                let Some(v2) = self.read_operand(at, false) else {
                    return Step::Stop;
                };
                self.restart(v0, v1, v2);
            }
            Opcode::Absolute16 => {
                let Some(index) = self.read_operand(at, true) else {
                    return Step::Stop;
                };
                return self.absolute(index, at);
            }
            Opcode::Absolute32 => {
                let Some(index) = self.read_operand(at, false) else {
                    return Step::Stop;
                };
                return self.absolute(index, at);
            }
            Opcode::Stitch => {
                let Some((a, b)) = self.pop_front(at) else {
                    return Step::Stop;
                };
                if self.queue.len() > 1 {
                    if let (Some(&front), Some(&back)) = (self.queue.front(), self.queue.back()) {
                        if back.0 == front.0 || (back.0 == b && back.1 == a) {
                            self.queue.pop_back();
                        } else if let Some(last) = self.queue.back_mut() {
                            last.1 = front.1;
                        }
                    }
                }
            }
            Opcode::SkipVertex => {
                self.vertex_offset += 1;
            }
            Opcode::Reserved(op) => {
                warn!(opcode = op, offset = at, "skipping reserved facet command");
                self.diagnostics
                    .push(Diagnostic::InvalidOpcode { opcode: op, offset: at });
            }
        }
        Step::Continue
    }

    /// Clear the queue and start a fresh strip from an explicit triangle
    fn restart(&mut self, v0: u32, v1: u32, v2: u32) {
        self.queue.clear();
        self.emit(v0, v1, v2);
        self.queue.push_back((v0, v1));
        self.queue.push_back((v1, v2));
        // The closing edge must return to v0; old encoders wrote (v2, v1),
        // which leaves the loop open.
        if self.legacy_restart_edge {
            self.queue.push_back((v2, v1));
        } else {
            self.queue.push_back((v2, v0));
        }
    }

    /// Fan the front edge to an explicitly-addressed vertex
    fn absolute(&mut self, index: u32, at: usize) -> Step {
        let Some((a, b)) = self.pop_front(at) else {
            return Step::Stop;
        };
        self.emit(a, index, b);
        self.queue.push_back((a, index));
        self.queue.push_back((index, b));
        Step::Continue
    }

    fn emit(&mut self, v1: u32, v2: u32, v3: u32) {
        self.triangles.push(Triangle::new(v1, v2, v3));
    }

    /// Read one inline operand and resolve it against the vertex offset
    ///
    /// Returns `None` after recording a diagnostic when the stream is
    /// truncated or the operand resolves below zero.
    fn read_operand(&mut self, at: usize, halfword: bool) -> Option<u32> {
        if self.cursor + OPERAND_LEN > self.data.len() {
            warn!(offset = at, "facet stream ran out of operand bytes");
            self.diagnostics
                .push(Diagnostic::FacetStreamTruncated { offset: at });
            self.cursor = self.data.len();
            return None;
        }

        let d = &self.data[self.cursor..self.cursor + OPERAND_LEN];
        let value = if halfword {
            i16::from_le_bytes([d[0], d[1]]) as i64
        } else {
            i32::from_le_bytes([d[0], d[1], d[2], d[3]]) as i64
        };
        self.cursor += OPERAND_LEN;

        if value < 0 {
            let absolute = self.vertex_offset as i64 + value;
            if absolute < 0 {
                warn!(
                    offset = at,
                    operand = value,
                    vertex_offset = self.vertex_offset,
                    "relative operand resolves below zero"
                );
                self.diagnostics.push(Diagnostic::NegativeIndex { offset: at });
                return None;
            }
            Some(absolute as u32)
        } else {
            Some(value as u32)
        }
    }

    fn pop_front(&mut self, at: usize) -> Option<(u32, u32)> {
        let edge = self.queue.pop_front();
        if edge.is_none() {
            self.underflow(at);
        }
        edge
    }

    fn pop_back(&mut self, at: usize) -> Option<(u32, u32)> {
        let edge = self.queue.pop_back();
        if edge.is_none() {
            self.underflow(at);
        }
        edge
    }

    fn underflow(&mut self, at: usize) {
        warn!(offset = at, "facet command popped an empty edge queue");
        self.diagnostics.push(Diagnostic::QueueUnderflow { offset: at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangles(output: &FacetOutput) -> Vec<(u32, u32, u32)> {
        output
            .triangles
            .iter()
            .map(|t| (t.v1, t.v2, t.v3))
            .collect()
    }

    /// Run a stream and also expose the final interpreter state
    fn run_stream(data: &[u8], legacy: bool) -> (Interpreter<'_>, Vec<Diagnostic>) {
        let mut interpreter = Interpreter {
            data,
            cursor: 0,
            queue: VecDeque::new(),
            vertex_offset: 0,
            triangles: Vec::new(),
            diagnostics: Vec::new(),
            legacy_restart_edge: legacy,
        };
        interpreter.run();
        let diags = interpreter.diagnostics.clone();
        (interpreter, diags)
    }

    #[test]
    fn test_restart_implicit() {
        let (state, diags) = run_stream(&[0x04], false);
        assert_eq!(state.triangles, vec![Triangle::new(0, 1, 2)]);
        assert_eq!(state.queue, VecDeque::from([(0, 1), (1, 2), (2, 0)]));
        assert_eq!(state.vertex_offset, 3);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_restart_legacy_edge_set() {
        let (state, _) = run_stream(&[0x04], true);
        assert_eq!(state.queue, VecDeque::from([(0, 1), (1, 2), (2, 1)]));
    }

    #[test]
    fn test_restart_then_advance() {
        let (state, diags) = run_stream(&[0x04, 0x00], false);
        assert_eq!(
            state.triangles,
            vec![Triangle::new(0, 1, 2), Triangle::new(0, 3, 1)]
        );
        assert_eq!(
            state.queue,
            VecDeque::from([(1, 2), (2, 0), (0, 3), (3, 1)])
        );
        assert_eq!(state.vertex_offset, 4);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_full_rotation_restores_queue() {
        let (state, _) = run_stream(&[0x04, 0x03, 0x03, 0x03], false);
        assert_eq!(state.triangles.len(), 1);
        assert_eq!(state.queue, VecDeque::from([(0, 1), (1, 2), (2, 0)]));
    }

    #[test]
    fn test_high_nibble_ignored() {
        let (state, diags) = run_stream(&[0xF4], false);
        assert_eq!(state.triangles, vec![Triangle::new(0, 1, 2)]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_absolute16_negative_operand() {
        // operand 0xFFFE = -2 relative to offset 3 resolves to vertex 1
        let (state, diags) = run_stream(&[0x04, 0x07, 0xFE, 0xFF, 0x00, 0x00], false);
        assert_eq!(
            state.triangles,
            vec![Triangle::new(0, 1, 2), Triangle::new(0, 1, 1)]
        );
        assert_eq!(
            state.queue,
            VecDeque::from([(1, 2), (2, 0), (0, 1), (1, 1)])
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_absolute16_padding_bytes_skipped() {
        // padding bytes carry garbage; only the first two bytes are the value
        let (state, _) = run_stream(&[0x04, 0x07, 0x05, 0x00, 0xAA, 0xBB], false);
        assert_eq!(state.triangles[1], Triangle::new(0, 5, 1));
    }

    #[test]
    fn test_absolute32() {
        let (state, diags) = run_stream(&[0x04, 0x08, 0x09, 0x00, 0x00, 0x00], false);
        assert_eq!(state.triangles[1], Triangle::new(0, 9, 1));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_restart16_explicit_vertices() {
        let stream = [
            0x05, 0x07, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00,
        ];
        let (state, diags) = run_stream(&stream, false);
        assert_eq!(state.triangles, vec![Triangle::new(7, 8, 9)]);
        assert_eq!(state.queue, VecDeque::from([(7, 8), (8, 9), (9, 7)]));
        // explicit restarts do not consume implicit vertices
        assert_eq!(state.vertex_offset, 0);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_restart32_explicit_vertices() {
        let stream = [
            0x06, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00,
        ];
        let (state, _) = run_stream(&stream, false);
        assert_eq!(state.triangles, vec![Triangle::new(3, 1, 2)]);
        assert_eq!(state.vertex_offset, 0);
    }

    #[test]
    fn test_wrap_back() {
        // queue [(0,1),(1,2),(2,0)]: pop front (0,1), pop back (2,0),
        // emit (0,2,1), enqueue (2,1)
        let (state, diags) = run_stream(&[0x04, 0x01], false);
        assert_eq!(state.triangles[1], Triangle::new(0, 2, 1));
        assert_eq!(state.queue, VecDeque::from([(1, 2), (2, 1)]));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_wrap_next() {
        // pop (0,1) and (1,2), emit (0,2,1), enqueue (0,2)
        let (state, diags) = run_stream(&[0x04, 0x02], false);
        assert_eq!(state.triangles[1], Triangle::new(0, 2, 1));
        assert_eq!(state.queue, VecDeque::from([(2, 0), (0, 2)]));
        assert!(diags.is_empty());
    }

    #[test]
    fn test_stitch_rewrites_back_edge() {
        // after popping (0,1): front (1,2), back (2,0); neither drop rule
        // applies so the back tip is rewritten to the front tip
        let (state, diags) = run_stream(&[0x04, 0x09], false);
        assert_eq!(state.triangles.len(), 1);
        assert_eq!(state.queue, VecDeque::from([(1, 2), (2, 2)]));
        assert!(diags.is_empty());
    }

    /// Run one stitch against a hand-built queue
    fn stitch_with_queue(edges: &[(u32, u32)]) -> VecDeque<(u32, u32)> {
        let mut interpreter = Interpreter {
            data: &[0x09],
            cursor: 0,
            queue: VecDeque::from(edges.to_vec()),
            vertex_offset: 0,
            triangles: Vec::new(),
            diagnostics: Vec::new(),
            legacy_restart_edge: false,
        };
        interpreter.run();
        assert!(interpreter.diagnostics.is_empty());
        interpreter.queue
    }

    #[test]
    fn test_stitch_drops_back_on_shared_origin() {
        // after popping (9,9): front (1,2) and back (1,7) share an origin,
        // so the back edge is dropped
        let queue = stitch_with_queue(&[(9, 9), (1, 2), (1, 7)]);
        assert_eq!(queue, VecDeque::from([(1, 2)]));
    }

    #[test]
    fn test_stitch_drops_reversed_back_edge() {
        // the back edge (2,1) is the reverse of the popped front (1,2)
        let queue = stitch_with_queue(&[(1, 2), (5, 6), (2, 1)]);
        assert_eq!(queue, VecDeque::from([(5, 6)]));
    }

    #[test]
    fn test_stitch_is_noop_on_short_queue() {
        let (state, diags) = run_stream(&[0x04, 0x09, 0x09, 0x09], false);
        // stitch 1 rewrites the back edge to (2,2); stitches 2 and 3 only
        // pop because one or zero edges remain
        assert_eq!(state.triangles.len(), 1);
        assert!(state.queue.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_skip_vertex_shifts_implicit_numbering() {
        let (state, diags) = run_stream(&[0x0A, 0x04], false);
        assert_eq!(state.triangles, vec![Triangle::new(1, 2, 3)]);
        assert_eq!(state.vertex_offset, 4);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_reserved_opcode_skipped() {
        let output = interpret(&[0x0B, 0x04], 1, false);
        assert_eq!(triangles(&output), vec![(0, 1, 2)]);
        assert_eq!(
            output.diagnostics,
            vec![Diagnostic::InvalidOpcode { opcode: 11, offset: 0 }]
        );
    }

    #[test]
    fn test_underflow_stops_with_partial_mesh() {
        // each wrap-back shrinks the queue by one edge; the fourth one runs
        // out mid-command and interpretation stops with three triangles
        let output = interpret(&[0x04, 0x01, 0x01, 0x01], 6, false);
        assert_eq!(output.triangles.len(), 3);
        assert!(output
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::QueueUnderflow { .. })));
        assert!(output
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::TriangleCountMismatch { .. })));
    }

    #[test]
    fn test_underflow_on_empty_stream_start() {
        let output = interpret(&[0x00], 0, false);
        assert!(output.triangles.is_empty());
        assert_eq!(output.diagnostics[0], Diagnostic::QueueUnderflow { offset: 0 });
    }

    #[test]
    fn test_truncated_operand() {
        let output = interpret(&[0x04, 0x07, 0xFE], 2, false);
        assert_eq!(triangles(&output), vec![(0, 1, 2)]);
        assert_eq!(
            output.diagnostics[0],
            Diagnostic::FacetStreamTruncated { offset: 1 }
        );
    }

    #[test]
    fn test_negative_resolution_stops() {
        // operand -5 against offset 3 resolves below zero
        let output = interpret(&[0x04, 0x07, 0xFB, 0xFF, 0x00, 0x00], 2, false);
        assert_eq!(triangles(&output), vec![(0, 1, 2)]);
        assert_eq!(output.diagnostics[0], Diagnostic::NegativeIndex { offset: 1 });
    }

    #[test]
    fn test_count_match_is_quiet() {
        let output = interpret(&[0x04, 0x00, 0x00], 3, false);
        assert_eq!(output.triangles.len(), 3);
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_count_mismatch_reported() {
        let output = interpret(&[0x04], 5, false);
        assert_eq!(
            output.diagnostics,
            vec![Diagnostic::TriangleCountMismatch {
                expected: 5,
                actual: 1
            }]
        );
    }

    #[test]
    fn test_empty_stream() {
        let output = interpret(&[], 0, false);
        assert!(output.triangles.is_empty());
        assert!(output.diagnostics.is_empty());
    }

    #[test]
    fn test_long_strip_walks_the_queue() {
        // one restart then six advances: a fan growing off rotating edges
        let output = interpret(&[0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], 7, false);
        assert_eq!(output.triangles.len(), 7);
        assert!(output.diagnostics.is_empty());
        // every index stays below the number of implicit vertices consumed
        for t in &output.triangles {
            for index in t.indices() {
                assert!(index < 9);
            }
        }
    }
}
