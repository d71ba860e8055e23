use std::cell::Cell;

use bumpalo::Bump;
use rite_core::Sym;

use crate::node::*;

/// Arena-backed constructor for syntax trees.
///
/// Every node gets the builder's current [`SourcePos`]; move it with
/// [`AstBuilder::set_line`] and friends while building.
pub struct AstBuilder<'ast> {
    arena: &'ast Bump,
    pos: Cell<SourcePos>,
}

impl<'ast> AstBuilder<'ast> {
    pub fn new(arena: &'ast Bump) -> Self {
        Self {
            arena,
            pos: Cell::new(SourcePos::default()),
        }
    }

    pub fn arena(&self) -> &'ast Bump {
        self.arena
    }

    pub fn set_line(&self, line: u16) {
        let mut pos = self.pos.get();
        pos.line = line;
        self.pos.set(pos);
    }

    pub fn set_file(&self, file: Sym) {
        let mut pos = self.pos.get();
        pos.file = file;
        self.pos.set(pos);
    }

    pub fn set_offset(&self, offset: u32) {
        let mut pos = self.pos.get();
        pos.offset = offset;
        self.pos.set(pos);
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    pub fn node(&self, kind: NodeKind<'ast>) -> Node<'ast> {
        Node::new(kind, self.pos.get())
    }

    pub fn alloc(&self, node: Node<'ast>) -> &'ast Node<'ast> {
        self.arena.alloc(node)
    }

    pub fn nodes(&self, nodes: &[Node<'ast>]) -> &'ast [Node<'ast>] {
        self.arena.alloc_slice_copy(nodes)
    }

    pub fn syms(&self, syms: &[Sym]) -> &'ast [Sym] {
        self.arena.alloc_slice_copy(syms)
    }

    fn opt(&self, node: Option<Node<'ast>>) -> Option<&'ast Node<'ast>> {
        node.map(|n| self.alloc(n))
    }

    /// Sequence of statements as a single optional node.
    fn seq(&self, stmts: &[Node<'ast>]) -> Option<&'ast Node<'ast>> {
        match stmts {
            [] => None,
            [one] => Some(self.alloc(*one)),
            many => Some(self.alloc(self.stmts(many))),
        }
    }

    // ------------------------------------------------------------------
    // Structure and literals
    // ------------------------------------------------------------------

    pub fn program(&self, locals: &[Sym], stmts: &[Node<'ast>]) -> Node<'ast> {
        let body = self.body(locals, Params::default(), stmts);
        self.node(NodeKind::Program(self.arena.alloc(body)))
    }

    pub fn stmts(&self, stmts: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::Statements(self.nodes(stmts)))
    }

    pub fn nil(&self) -> Node<'ast> {
        self.node(NodeKind::Nil)
    }

    pub fn true_(&self) -> Node<'ast> {
        self.node(NodeKind::True)
    }

    pub fn false_(&self) -> Node<'ast> {
        self.node(NodeKind::False)
    }

    pub fn self_(&self) -> Node<'ast> {
        self.node(NodeKind::SelfRef)
    }

    pub fn int(&self, value: i64) -> Node<'ast> {
        self.node(NodeKind::Integer(value))
    }

    pub fn bigint(&self, digits: &str, base: u8, negative: bool) -> Node<'ast> {
        let lit = self.arena.alloc(BigIntLit {
            digits: self.arena.alloc_slice_copy(digits.as_bytes()),
            base,
            negative,
        });
        self.node(NodeKind::BigInt(lit))
    }

    pub fn float(&self, value: f64) -> Node<'ast> {
        self.node(NodeKind::Float(value))
    }

    pub fn str(&self, bytes: impl AsRef<[u8]>) -> Node<'ast> {
        self.node(NodeKind::Str(self.arena.alloc_slice_copy(bytes.as_ref())))
    }

    pub fn interp(&self, parts: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::Interpolated(self.nodes(parts)))
    }

    pub fn sym(&self, sym: Sym) -> Node<'ast> {
        self.node(NodeKind::Symbol(sym))
    }

    pub fn array(&self, elems: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::Array(self.nodes(elems)))
    }

    /// Hash literal from key/value pairs.
    pub fn hash(&self, pairs: &[(Node<'ast>, Node<'ast>)]) -> Node<'ast> {
        let elems: Vec<_> = pairs
            .iter()
            .map(|&(k, v)| HashElement::Pair(k, v))
            .collect();
        self.hash_elements(&elems)
    }

    pub fn hash_elements(&self, elems: &[HashElement<'ast>]) -> Node<'ast> {
        self.node(NodeKind::Hash(self.arena.alloc_slice_copy(elems)))
    }

    pub fn range(
        &self,
        low: Option<Node<'ast>>,
        high: Option<Node<'ast>>,
        exclusive: bool,
    ) -> Node<'ast> {
        self.node(NodeKind::Range {
            low: self.opt(low),
            high: self.opt(high),
            exclusive,
        })
    }

    pub fn splat(&self, value: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::Splat(self.alloc(value)))
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub fn local(&self, name: Sym) -> Node<'ast> {
        self.node(NodeKind::LocalVar(name))
    }

    pub fn ivar(&self, name: Sym) -> Node<'ast> {
        self.node(NodeKind::IVar(name))
    }

    pub fn gvar(&self, name: Sym) -> Node<'ast> {
        self.node(NodeKind::GVar(name))
    }

    pub fn cvar(&self, name: Sym) -> Node<'ast> {
        self.node(NodeKind::CVar(name))
    }

    pub fn constant(&self, name: Sym) -> Node<'ast> {
        self.node(NodeKind::Const(name))
    }

    pub fn scoped_const(&self, scope: ConstScope<'ast>, name: Sym) -> Node<'ast> {
        self.node(NodeKind::ScopedConst { scope, name })
    }

    pub fn assign(&self, target: Target, value: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::Assign {
            target,
            value: self.alloc(value),
        })
    }

    pub fn assign_local(&self, name: Sym, value: Node<'ast>) -> Node<'ast> {
        self.assign(Target::Local(name), value)
    }

    pub fn op_assign(&self, target: Target, op: Sym, value: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::OpAssign {
            target,
            op,
            value: self.alloc(value),
        })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// `recv.name(args)`, or `name(args)` on self when `recv` is `None`.
    pub fn call(&self, recv: Option<Node<'ast>>, name: Sym, args: &[Node<'ast>]) -> Node<'ast> {
        self.call_with(Call {
            receiver: self.opt(recv),
            name,
            args: self.nodes(args),
            kwargs: &[],
            block: None,
            safe_nav: false,
        })
    }

    /// `name(args)` on self.
    pub fn fcall(&self, name: Sym, args: &[Node<'ast>]) -> Node<'ast> {
        self.call(None, name, args)
    }

    /// `recv&.name(args)`
    pub fn safe_call(&self, recv: Node<'ast>, name: Sym, args: &[Node<'ast>]) -> Node<'ast> {
        self.call_with(Call {
            receiver: Some(self.alloc(recv)),
            name,
            args: self.nodes(args),
            kwargs: &[],
            block: None,
            safe_nav: true,
        })
    }

    /// Call with a block (or block-pass) argument.
    pub fn call_block(
        &self,
        recv: Option<Node<'ast>>,
        name: Sym,
        args: &[Node<'ast>],
        block: Node<'ast>,
    ) -> Node<'ast> {
        self.call_with(Call {
            receiver: self.opt(recv),
            name,
            args: self.nodes(args),
            kwargs: &[],
            block: Some(self.alloc(block)),
            safe_nav: false,
        })
    }

    pub fn call_with(&self, call: Call<'ast>) -> Node<'ast> {
        self.node(NodeKind::Call(self.arena.alloc(call)))
    }

    pub fn kwargs(&self, pairs: &[(Node<'ast>, Node<'ast>)]) -> &'ast [HashElement<'ast>] {
        self.arena
            .alloc_slice_fill_iter(pairs.iter().map(|&(k, v)| HashElement::Pair(k, v)))
    }

    pub fn block(&self, body: Body<'ast>) -> Node<'ast> {
        self.node(NodeKind::Block(self.arena.alloc(body)))
    }

    pub fn block_pass(&self, value: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::BlockPass(self.alloc(value)))
    }

    pub fn lambda(&self, body: Body<'ast>) -> Node<'ast> {
        self.node(NodeKind::Lambda(self.arena.alloc(body)))
    }

    pub fn super_(&self, args: &[Node<'ast>], block: Option<Node<'ast>>) -> Node<'ast> {
        let call = self.arena.alloc(SuperCall {
            args: self.nodes(args),
            block: self.opt(block),
        });
        self.node(NodeKind::Super(call))
    }

    pub fn yield_(&self, args: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::Yield(self.nodes(args)))
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    pub fn and(&self, lhs: Node<'ast>, rhs: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::And(self.alloc(lhs), self.alloc(rhs)))
    }

    pub fn or(&self, lhs: Node<'ast>, rhs: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::Or(self.alloc(lhs), self.alloc(rhs)))
    }

    pub fn not(&self, value: Node<'ast>) -> Node<'ast> {
        self.node(NodeKind::Not(self.alloc(value)))
    }

    pub fn if_(
        &self,
        cond: Node<'ast>,
        then: Option<Node<'ast>>,
        otherwise: Option<Node<'ast>>,
    ) -> Node<'ast> {
        self.node(NodeKind::If {
            cond: self.alloc(cond),
            then: self.opt(then),
            otherwise: self.opt(otherwise),
        })
    }

    pub fn while_(&self, cond: Node<'ast>, body: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::While {
            cond: self.alloc(cond),
            body: self.seq(body),
            until: false,
        })
    }

    pub fn until(&self, cond: Node<'ast>, body: &[Node<'ast>]) -> Node<'ast> {
        self.node(NodeKind::While {
            cond: self.alloc(cond),
            body: self.seq(body),
            until: true,
        })
    }

    pub fn when(&self, conditions: &[Node<'ast>], body: &[Node<'ast>]) -> When<'ast> {
        When {
            conditions: self.nodes(conditions),
            body: self.seq(body),
        }
    }

    pub fn case(
        &self,
        subject: Option<Node<'ast>>,
        whens: &[When<'ast>],
        otherwise: Option<Node<'ast>>,
    ) -> Node<'ast> {
        let case = self.arena.alloc(CaseExpr {
            subject: self.opt(subject),
            whens: self.arena.alloc_slice_copy(whens),
            otherwise: self.opt(otherwise),
        });
        self.node(NodeKind::Case(case))
    }

    pub fn break_(&self, value: Option<Node<'ast>>) -> Node<'ast> {
        self.node(NodeKind::Break(self.opt(value)))
    }

    pub fn next(&self, value: Option<Node<'ast>>) -> Node<'ast> {
        self.node(NodeKind::Next(self.opt(value)))
    }

    pub fn redo(&self) -> Node<'ast> {
        self.node(NodeKind::Redo)
    }

    pub fn return_(&self, value: Option<Node<'ast>>) -> Node<'ast> {
        self.node(NodeKind::Return(self.opt(value)))
    }

    pub fn rescue_clause(
        &self,
        classes: &[Node<'ast>],
        binding: Option<Target>,
        body: &[Node<'ast>],
    ) -> RescueClause<'ast> {
        RescueClause {
            classes: self.nodes(classes),
            binding,
            body: self.seq(body),
        }
    }

    pub fn begin(
        &self,
        body: &[Node<'ast>],
        rescues: &[RescueClause<'ast>],
        otherwise: Option<Node<'ast>>,
        ensure: Option<Node<'ast>>,
    ) -> Node<'ast> {
        let block = self.arena.alloc(BeginBlock {
            body: self.seq(body),
            rescues: self.arena.alloc_slice_copy(rescues),
            otherwise: self.opt(otherwise),
            ensure: self.opt(ensure),
        });
        self.node(NodeKind::Begin(block))
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    /// Scope body with `locals` in slot order (parameters first).
    pub fn body(&self, locals: &[Sym], params: Params<'ast>, stmts: &[Node<'ast>]) -> Body<'ast> {
        Body {
            locals: self.syms(locals),
            params,
            body: self.seq(stmts),
        }
    }

    /// Parameters with only required names.
    pub fn required_params(&self, names: &[Sym]) -> Params<'ast> {
        Params {
            required: self.syms(names),
            ..Params::default()
        }
    }

    pub fn optional_params(&self, params: &[(Sym, Node<'ast>)]) -> &'ast [OptionalParam<'ast>] {
        self.arena.alloc_slice_fill_iter(
            params
                .iter()
                .map(|&(name, default)| OptionalParam { name, default }),
        )
    }

    pub fn def(&self, name: Sym, body: Body<'ast>) -> Node<'ast> {
        self.node(NodeKind::Def {
            name,
            body: self.arena.alloc(body),
        })
    }

    pub fn class(
        &self,
        name: Sym,
        superclass: Option<Node<'ast>>,
        body: Body<'ast>,
    ) -> Node<'ast> {
        let def = self.arena.alloc(ClassDef {
            scope: ConstScope::Lexical,
            name,
            superclass: self.opt(superclass),
            body: self.arena.alloc(body),
        });
        self.node(NodeKind::Class(def))
    }

    pub fn module(&self, name: Sym, body: Body<'ast>) -> Node<'ast> {
        let def = self.arena.alloc(ModuleDef {
            scope: ConstScope::Lexical,
            name,
            body: self.arena.alloc(body),
        });
        self.node(NodeKind::Module(def))
    }

    pub fn sclass(&self, target: Node<'ast>, body: Body<'ast>) -> Node<'ast> {
        self.node(NodeKind::SClass {
            target: self.alloc(target),
            body: self.arena.alloc(body),
        })
    }

    pub fn alias(&self, new_name: Sym, old_name: Sym) -> Node<'ast> {
        self.node(NodeKind::Alias { new_name, old_name })
    }

    pub fn undef(&self, names: &[Sym]) -> Node<'ast> {
        self.node(NodeKind::Undef(self.syms(names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rite_core::SymbolTable;

    #[test]
    fn nodes_carry_current_position() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        b.set_line(3);
        b.set_offset(17);
        let n = b.int(5);
        assert_eq!(n.pos.line, 3);
        assert_eq!(n.pos.offset, 17);
        assert_eq!(n.kind, NodeKind::Integer(5));
    }

    #[test]
    fn body_collapses_single_statement() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let one = b.body(&[], Params::default(), &[b.nil()]);
        assert!(matches!(one.body.map(|n| n.kind), Some(NodeKind::Nil)));
        let many = b.body(&[], Params::default(), &[b.nil(), b.true_()]);
        assert!(matches!(
            many.body.map(|n| n.kind),
            Some(NodeKind::Statements(s)) if s.len() == 2
        ));
        assert!(b.body(&[], Params::default(), &[]).body.is_none());
    }

    #[test]
    fn call_shapes() {
        let arena = Bump::new();
        let mut symbols = SymbolTable::new();
        let puts = symbols.intern("puts");
        let b = AstBuilder::new(&arena);
        let call = b.fcall(puts, &[b.str("hi")]);
        let NodeKind::Call(c) = call.kind else {
            panic!("expected a call");
        };
        assert!(c.receiver.is_none());
        assert_eq!(c.name, puts);
        assert_eq!(c.args.len(), 1);
        assert!(!c.safe_nav);
    }

    #[test]
    fn string_bytes_are_copied_into_arena() {
        let arena = Bump::new();
        let b = AstBuilder::new(&arena);
        let owned = String::from("abc");
        let node = b.str(&owned);
        drop(owned);
        assert_eq!(node.kind, NodeKind::Str(b"abc"));
    }
}
