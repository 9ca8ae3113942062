//! Execution tracing (spec §4.11), grounded on the teacher's `VmTracer`
//! pattern: a trait with default no-op hooks so [`NoopTrace`] costs nothing,
//! and an instrumented implementation ([`AnnotateTrace`]) for `Annotate`.

pub trait Trace {
    fn on_for_loop(&mut self, _header: &str, _line: u32, _total: Option<u64>) {}
    fn on_iteration(&mut self, _index: i64) {}
    fn end_for_loop(&mut self) {}
    fn on_call(&mut self, _rendered: &str, _line: u32) {}
    fn on_command(&mut self, _token: &str) {}

    /// Returns the annotated transcript, for implementations that build one.
    /// `NoopTrace` has nothing to hand back; `AnnotateTrace` overrides this.
    fn into_output(self: Box<Self>) -> Option<String> {
        None
    }
}

#[derive(Debug, Default)]
pub struct NoopTrace;

impl Trace for NoopTrace {}

/// Builds the `//--- …`-interleaved transcript described in spec §4.11.
#[derive(Debug, Default)]
pub struct AnnotateTrace {
    lines: Vec<String>,
    /// Per active for-loop: the total iteration count (if known up front)
    /// and how many have been seen so far, to drive the >16 elision rule.
    loop_stack: Vec<LoopState>,
}

#[derive(Debug)]
struct LoopState {
    total: Option<u64>,
    seen: u64,
    /// Set by [`AnnotateTrace::on_iteration`] for the duration of an elided
    /// middle iteration; [`AnnotateTrace::on_command`] consults it so the
    /// command tokens an elided iteration's body emits are dropped along
    /// with its `//--- iteration N` comment, not just the comment.
    eliding: bool,
}

const ELIDE_THRESHOLD: u64 = 16;
const EDGE_COUNT: u64 = 3;

impl Trace for AnnotateTrace {
    fn on_for_loop(&mut self, header: &str, line: u32, total: Option<u64>) {
        self.lines.push(format!("//--- {header} from line {line}"));
        self.loop_stack.push(LoopState { total, seen: 0, eliding: false });
    }

    fn on_iteration(&mut self, index: i64) {
        let Some(state) = self.loop_stack.last_mut() else {
            self.lines.push(format!("//--- iteration {index}"));
            return;
        };
        let seen = state.seen;
        state.seen += 1;
        state.eliding = false;
        if let Some(total) = state.total {
            if total > ELIDE_THRESHOLD {
                if seen == EDGE_COUNT {
                    self.lines.push(format!("//--- ... {} more iterations ...", total - 2 * EDGE_COUNT));
                }
                if seen >= EDGE_COUNT && seen < total - EDGE_COUNT {
                    state.eliding = true;
                    return;
                }
            }
        }
        self.lines.push(format!("//--- iteration {index}"));
    }

    fn end_for_loop(&mut self) {
        self.loop_stack.pop();
    }

    fn on_call(&mut self, rendered: &str, line: u32) {
        if self.loop_stack.last().is_some_and(|state| state.eliding) {
            return;
        }
        self.lines.push(format!("//--- {rendered} called from line {line}"));
    }

    fn on_command(&mut self, token: &str) {
        if self.loop_stack.last().is_some_and(|state| state.eliding) {
            return;
        }
        self.lines.push(token.to_string());
    }

    fn into_output(self: Box<Self>) -> Option<String> {
        Some(self.lines.join("\n"))
    }
}
