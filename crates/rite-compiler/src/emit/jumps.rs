//! Pending jumps and loop bookkeeping.
//!
//! A forward jump is emitted before its target is known. Its offset field
//! address goes into a [`JumpList`], and the list is resolved in one go once
//! the target is reached. Loop constructs keep their lists in a
//! [`LoopStack`] so `break`, `next` and `redo` can find them.

/// Offset-field addresses of jumps waiting for the same target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JumpList(Vec<u32>);

impl JumpList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pos: u32) {
        self.0.push(pos);
    }

    /// Add a jump that may have been optimized away.
    pub fn push_opt(&mut self, pos: Option<u32>) {
        if let Some(pos) = pos {
            self.0.push(pos);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Option<u32>> for JumpList {
    fn from(pos: Option<u32>) -> Self {
        Self(pos.into_iter().collect())
    }
}

impl IntoIterator for JumpList {
    type Item = u32;
    type IntoIter = std::vec::IntoIter<u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// What kind of construct a loop record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// `while` / `until`
    Normal,
    /// Block body; `break` leaves through the caller.
    Block,
    /// Protected body of `begin ... rescue`.
    Begin,
    /// Rescue clauses of `begin ... rescue`.
    Rescue,
}

#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub kind: LoopKind,
    /// Where `next` jumps (the condition of a `while`).
    pub next_target: Option<u32>,
    /// Where `redo` jumps (the start of the body).
    pub redo_target: Option<u32>,
    /// Pending `break` jumps, resolved when the loop ends.
    pub breaks: JumpList,
    /// Register receiving the loop's value, `None` when it is discarded.
    pub result_reg: Option<u16>,
}

/// Stack of loop records of one scope, innermost last.
#[derive(Debug, Default)]
pub struct LoopStack {
    loops: Vec<LoopInfo>,
}

impl LoopStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_loop(&mut self, kind: LoopKind, result_reg: Option<u16>) -> &mut LoopInfo {
        self.loops.push(LoopInfo {
            kind,
            next_target: None,
            redo_target: None,
            breaks: JumpList::new(),
            result_reg,
        });
        let last = self.loops.len() - 1;
        &mut self.loops[last]
    }

    pub fn exit_loop(&mut self) -> Option<LoopInfo> {
        self.loops.pop()
    }

    pub fn current(&self) -> Option<&LoopInfo> {
        self.loops.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut LoopInfo> {
        self.loops.last_mut()
    }

    /// Innermost loop that `break`/`next`/`redo` apply to, skipping
    /// `begin`/`rescue` records.
    pub fn target_mut(&mut self) -> Option<&mut LoopInfo> {
        self.loops
            .iter_mut()
            .rev()
            .find(|l| !matches!(l.kind, LoopKind::Begin | LoopKind::Rescue))
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.loops.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_opt_skips_missing_jumps() {
        let mut list = JumpList::new();
        list.push_opt(None);
        list.push_opt(Some(4));
        list.push(9);
        assert_eq!(list.len(), 2);
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec![4, 9]);
    }

    #[test]
    fn nested_loops() {
        let mut stack = LoopStack::new();
        stack.enter_loop(LoopKind::Normal, Some(3)).next_target = Some(0);
        stack.enter_loop(LoopKind::Normal, None).next_target = Some(10);
        assert_eq!(stack.target_mut().unwrap().next_target, Some(10));
        stack.target_mut().unwrap().breaks.push(20);
        let inner = stack.exit_loop().unwrap();
        assert_eq!(inner.breaks.len(), 1);
        assert_eq!(stack.target_mut().unwrap().next_target, Some(0));
        assert!(stack.target_mut().unwrap().breaks.is_empty());
    }

    #[test]
    fn begin_records_are_transparent() {
        let mut stack = LoopStack::new();
        stack.enter_loop(LoopKind::Normal, None).next_target = Some(7);
        stack.enter_loop(LoopKind::Begin, None);
        stack.current_mut().unwrap().kind = LoopKind::Rescue;
        assert_eq!(stack.current().unwrap().kind, LoopKind::Rescue);
        assert_eq!(stack.target_mut().unwrap().next_target, Some(7));
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn no_target_outside_loops() {
        let mut stack = LoopStack::new();
        assert!(stack.target_mut().is_none());
        stack.enter_loop(LoopKind::Begin, None);
        assert!(stack.target_mut().is_none());
    }
}
