//! Lexical scope resolution and closure-capture synthesis.
//!
//! One [`Frame`] exists per function being compiled, innermost on top of
//! [`Resolver`]'s stack. Resolving a name that lives in an outer frame
//! threads a reference through every intervening frame's closure list,
//! deduplicated so the same captured slot is never listed twice, and
//! rewrites the reference one frame at a time until it reaches the
//! innermost frame as a `closure` offset.

use quill_core::GlobalEnv;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Local(usize),
    Closure(usize),
    Global(usize),
}

/// Where a captured slot's current value lives, from the point of view of
/// the frame that encloses the one doing the capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSource {
    Local(usize),
    Closure(usize),
}

#[derive(Debug, Clone)]
pub struct ClosureSlot {
    pub source: CaptureSource,
    pub name: String,
}

struct Scope {
    names: HashMap<String, usize>,
}

pub struct Frame {
    scopes: Vec<Scope>,
    next_local: usize,
    max_local: usize,
    loop_depth: u32,
    pub closure_list: Vec<ClosureSlot>,
}

impl Frame {
    fn new() -> Frame {
        Frame {
            scopes: vec![Scope { names: HashMap::new() }],
            next_local: 0,
            max_local: 0,
            loop_depth: 0,
            closure_list: Vec::new(),
        }
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.scopes.iter().rev().find_map(|s| s.names.get(name).copied())
    }

    fn add_capture(&mut self, source: CaptureSource, name: &str) -> usize {
        if let Some(pos) = self.closure_list.iter().position(|c| c.source == source) {
            return pos;
        }
        self.closure_list.push(ClosureSlot { source, name: name.to_string() });
        self.closure_list.len() - 1
    }

    pub fn max_local(&self) -> usize {
        self.max_local
    }
}

/// The outcome of entering a new lexical block: the offsets assigned to its
/// declared names, and whether the emitter must clear them on entry.
pub struct BlockEntry {
    pub offsets: Vec<usize>,
    pub needs_clear: bool,
}

pub struct Resolver<'g> {
    frames: Vec<Frame>,
    globals: &'g mut GlobalEnv,
    current_module: Option<String>,
}

impl<'g> Resolver<'g> {
    pub fn new(globals: &'g mut GlobalEnv) -> Self {
        Resolver { frames: Vec::new(), globals, current_module: None }
    }

    pub fn with_module(globals: &'g mut GlobalEnv, module: impl Into<String>) -> Self {
        Resolver { frames: Vec::new(), globals, current_module: Some(module.into()) }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pop the innermost frame, handing back its final closure list (the
    /// capture order the `closure N` instruction at the use site must
    /// follow) and its maximum local-slot count (the code header's
    /// `nlocals`).
    pub fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("pop_frame called with no active frame")
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    pub fn enter_loop(&mut self) {
        self.frames.last_mut().expect("no active frame").loop_depth += 1;
    }

    pub fn exit_loop(&mut self) {
        self.frames.last_mut().expect("no active frame").loop_depth -= 1;
    }

    /// Declare `names` as new locals in a freshly pushed block scope,
    /// returning their offsets and whether the emitter should clear them:
    /// only skip clearing when the high-water mark is freshly extended and
    /// we are not inside a loop.
    pub fn enter_block(&mut self, names: &[String]) -> BlockEntry {
        let frame = self.frames.last_mut().expect("no active frame");
        let start = frame.next_local;
        let end = start + names.len();
        let extends_high_water = end > frame.max_local;
        frame.max_local = frame.max_local.max(end);
        frame.next_local = end;

        let in_loop = frame.loop_depth > 0;
        let needs_clear = !(extends_high_water && !in_loop);

        let mut scope = Scope { names: HashMap::new() };
        let offsets: Vec<usize> = (start..end).collect();
        for (name, offset) in names.iter().zip(offsets.iter()) {
            scope.names.insert(name.clone(), *offset);
        }
        frame.scopes.push(scope);
        BlockEntry { offsets, needs_clear }
    }

    /// Leave the block scope most recently entered. Slots are not
    /// reclaimed: a closure captured inside the block may outlive it.
    pub fn exit_block(&mut self) {
        let frame = self.frames.last_mut().expect("no active frame");
        frame.scopes.pop();
    }

    /// Resolve a bare name against the lexical stack, falling back to the
    /// global environment on a miss.
    pub fn resolve(&mut self, name: &str) -> Resolved {
        if let Some(offset) = self.frames.last().and_then(|f| f.find_local(name)) {
            return Resolved::Local(offset);
        }
        for k in 1..self.frames.len() {
            let idx_from_top = self.frames.len() - 1 - k;
            if let Some(local_offset) = self.frames[idx_from_top].find_local(name) {
                let mut source = CaptureSource::Local(local_offset);
                // Thread the capture from frame `idx_from_top` down through
                // every intervening frame to the innermost.
                for j in (idx_from_top + 1..self.frames.len()).rev() {
                    let pos = self.frames[j].add_capture(source, name);
                    source = CaptureSource::Closure(pos);
                }
                let CaptureSource::Closure(final_pos) = source else {
                    unreachable!("the innermost frame always records a Closure capture")
                };
                return Resolved::Closure(final_pos);
            }
        }
        Resolved::Global(self.globals.lookup(name))
    }

    /// Force a global lookup regardless of any shadowing lexical name
    /// (the `global:` prefix).
    pub fn resolve_global(&mut self, name: &str) -> usize {
        self.globals.lookup(name)
    }

    pub fn global_writable(&mut self, name: &str) -> bool {
        self.globals.mwritable(name, self.current_module.as_deref())
    }

    pub fn globals_mut(&mut self) -> &mut GlobalEnv {
        self.globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(globals: &mut GlobalEnv) -> Resolver<'_> {
        Resolver::new(globals)
    }

    #[test]
    fn resolves_a_plain_local() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        r.enter_block(&["x".to_string()]);
        assert_eq!(r.resolve("x"), Resolved::Local(0));
        r.exit_block();
        r.pop_frame();
    }

    #[test]
    fn miss_resolves_to_global() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        assert_eq!(r.resolve("undefined"), Resolved::Global(0));
        r.pop_frame();
    }

    #[test]
    fn captures_one_level_up() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        r.enter_block(&["x".to_string()]);
        r.push_frame(); // nested lambda
        let resolved = r.resolve("x");
        assert_eq!(resolved, Resolved::Closure(0));
        let inner = r.pop_frame();
        assert_eq!(inner.closure_list.len(), 1);
        assert_eq!(inner.closure_list[0].source, CaptureSource::Local(0));
        r.exit_block();
        r.pop_frame();
    }

    #[test]
    fn capture_threads_through_two_frames() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame(); // frame 0 (outermost)
        r.enter_block(&["x".to_string()]);
        r.push_frame(); // frame 1
        r.push_frame(); // frame 2 (innermost), resolves x
        assert_eq!(r.resolve("x"), Resolved::Closure(0));
        let frame2 = r.pop_frame();
        assert_eq!(frame2.closure_list[0].source, CaptureSource::Closure(0));
        let frame1 = r.pop_frame();
        assert_eq!(frame1.closure_list[0].source, CaptureSource::Local(0));
        r.exit_block();
        r.pop_frame();
    }

    #[test]
    fn repeated_capture_is_deduplicated() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        r.enter_block(&["x".to_string()]);
        r.push_frame();
        assert_eq!(r.resolve("x"), Resolved::Closure(0));
        assert_eq!(r.resolve("x"), Resolved::Closure(0));
        let inner = r.pop_frame();
        assert_eq!(inner.closure_list.len(), 1);
        r.exit_block();
        r.pop_frame();
    }

    #[test]
    fn block_reuses_slots_unless_high_water_extended() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        let first = r.enter_block(&["a".to_string(), "b".to_string()]);
        assert!(!first.needs_clear); // fresh slots, not in a loop
        r.exit_block();
        let second = r.enter_block(&["c".to_string()]);
        assert!(second.needs_clear); // reusing a previously-reached slot
        r.exit_block();
        r.pop_frame();
    }

    #[test]
    fn loop_body_always_needs_clear() {
        let mut globals = GlobalEnv::new();
        let mut r = resolver(&mut globals);
        r.push_frame();
        r.enter_loop();
        let entry = r.enter_block(&["x".to_string()]);
        assert!(entry.needs_clear);
        r.exit_block();
        r.exit_loop();
        r.pop_frame();
    }
}
