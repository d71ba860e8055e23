//! Node definitions.
//!
//! Every node is `Copy`: it is a small tag plus references into the arena.
//! Literal payloads (string bytes, big-integer digits, local tables) are
//! arena slices as well.

use rite_core::Sym;

/// Where a node came from.
///
/// `line == 0` means "unknown"; the generator then keeps the previous line.
/// `file == Sym::NULL` means "same file as the enclosing code".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourcePos {
    /// Byte offset into the source buffer.
    pub offset: u32,
    pub line: u16,
    pub file: Sym,
}

/// A syntax tree node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<'ast> {
    pub kind: NodeKind<'ast>,
    pub pos: SourcePos,
}

impl<'ast> Node<'ast> {
    #[inline]
    pub fn new(kind: NodeKind<'ast>, pos: SourcePos) -> Self {
        Self { kind, pos }
    }

    /// Whether this node always evaluates to a truthy literal.
    pub fn is_always_true(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::True
                | NodeKind::Integer(_)
                | NodeKind::Float(_)
                | NodeKind::Str(_)
                | NodeKind::Symbol(_)
        )
    }

    /// Whether this node always evaluates to `nil` or `false`.
    pub fn is_always_false(&self) -> bool {
        matches!(self.kind, NodeKind::Nil | NodeKind::False)
    }
}

/// The kind of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind<'ast> {
    // -------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------
    /// Top-level program. Only valid as the root.
    Program(&'ast Body<'ast>),
    /// Statement sequence; the value is that of the last statement.
    Statements(&'ast [Node<'ast>]),

    // -------------------------------------------------------------------
    // Literals
    // -------------------------------------------------------------------
    Nil,
    True,
    False,
    SelfRef,
    Integer(i64),
    /// Integer literal outside the 64-bit range, kept as digits.
    BigInt(&'ast BigIntLit<'ast>),
    Float(f64),
    Str(&'ast [u8]),
    /// `"a#{b}c"`: parts are string literals and arbitrary expressions.
    Interpolated(&'ast [Node<'ast>]),
    Symbol(Sym),
    /// `[a, *b, c]`
    Array(&'ast [Node<'ast>]),
    /// `{k => v, **h}`
    Hash(&'ast [HashElement<'ast>]),
    /// `a..b` / `a...b`; either end may be missing.
    Range {
        low: Option<&'ast Node<'ast>>,
        high: Option<&'ast Node<'ast>>,
        exclusive: bool,
    },
    /// `*expr`, inside array literals and argument lists.
    Splat(&'ast Node<'ast>),

    // -------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------
    /// Local variable of this or an enclosing block scope.
    LocalVar(Sym),
    IVar(Sym),
    GVar(Sym),
    CVar(Sym),
    Const(Sym),
    /// `Scope::Name` or `::Name`.
    ScopedConst { scope: ConstScope<'ast>, name: Sym },
    /// `target = value`
    Assign {
        target: Target,
        value: &'ast Node<'ast>,
    },
    /// `target op= value`, including `||=` and `&&=`.
    OpAssign {
        target: Target,
        op: Sym,
        value: &'ast Node<'ast>,
    },

    // -------------------------------------------------------------------
    // Calls
    // -------------------------------------------------------------------
    Call(&'ast Call<'ast>),
    /// `&expr` in the block position of a call.
    BlockPass(&'ast Node<'ast>),
    /// `{ |x| ... }` / `do ... end` in the block position of a call.
    Block(&'ast Body<'ast>),
    /// `-> (x) { ... }`
    Lambda(&'ast Body<'ast>),
    Super(&'ast SuperCall<'ast>),
    Yield(&'ast [Node<'ast>]),

    // -------------------------------------------------------------------
    // Control flow
    // -------------------------------------------------------------------
    And(&'ast Node<'ast>, &'ast Node<'ast>),
    Or(&'ast Node<'ast>, &'ast Node<'ast>),
    Not(&'ast Node<'ast>),
    If {
        cond: &'ast Node<'ast>,
        then: Option<&'ast Node<'ast>>,
        otherwise: Option<&'ast Node<'ast>>,
    },
    /// `while`/`until` loop.
    While {
        cond: &'ast Node<'ast>,
        body: Option<&'ast Node<'ast>>,
        until: bool,
    },
    Case(&'ast CaseExpr<'ast>),
    Break(Option<&'ast Node<'ast>>),
    Next(Option<&'ast Node<'ast>>),
    Redo,
    Return(Option<&'ast Node<'ast>>),
    /// `begin ... rescue ... else ... ensure ... end`
    Begin(&'ast BeginBlock<'ast>),

    // -------------------------------------------------------------------
    // Definitions
    // -------------------------------------------------------------------
    Def { name: Sym, body: &'ast Body<'ast> },
    Class(&'ast ClassDef<'ast>),
    Module(&'ast ModuleDef<'ast>),
    /// `class << target`
    SClass {
        target: &'ast Node<'ast>,
        body: &'ast Body<'ast>,
    },
    Alias { new_name: Sym, old_name: Sym },
    Undef(&'ast [Sym]),
}

/// Digits of an integer literal too large for 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigIntLit<'ast> {
    /// ASCII digits in `base`, without sign or prefix.
    pub digits: &'ast [u8],
    pub base: u8,
    pub negative: bool,
}

/// One element of a hash literal or keyword argument list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HashElement<'ast> {
    Pair(Node<'ast>, Node<'ast>),
    /// `**expr`
    Splat(Node<'ast>),
}

/// Assignable variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Local(Sym),
    IVar(Sym),
    GVar(Sym),
    CVar(Sym),
    Const(Sym),
}

/// Lexical scope of a constant reference or class definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstScope<'ast> {
    /// Resolved from the current lexical scope.
    Lexical,
    /// `::Name`
    Root,
    /// `expr::Name`
    Expr(&'ast Node<'ast>),
}

/// A method call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Call<'ast> {
    /// `None` for a call on the implicit `self`.
    pub receiver: Option<&'ast Node<'ast>>,
    pub name: Sym,
    /// Positional arguments; may contain [`NodeKind::Splat`].
    pub args: &'ast [Node<'ast>],
    /// Keyword arguments, empty when there are none.
    pub kwargs: &'ast [HashElement<'ast>],
    /// [`NodeKind::Block`] or [`NodeKind::BlockPass`].
    pub block: Option<&'ast Node<'ast>>,
    /// `recv&.name`
    pub safe_nav: bool,
}

/// `super(args)` with explicit arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperCall<'ast> {
    pub args: &'ast [Node<'ast>],
    pub block: Option<&'ast Node<'ast>>,
}

/// Scope body of a program, method, block, lambda or class.
///
/// `locals` lists every local of the scope in slot order, parameters first.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body<'ast> {
    pub locals: &'ast [Sym],
    pub params: Params<'ast>,
    pub body: Option<&'ast Node<'ast>>,
}

/// Formal parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Params<'ast> {
    pub required: &'ast [Sym],
    pub optional: &'ast [OptionalParam<'ast>],
    /// Rest parameter; `Some(Sym::NULL)` for an anonymous `*`.
    pub rest: Option<Sym>,
    /// Required parameters after the rest parameter.
    pub post: &'ast [Sym],
    pub block: Option<Sym>,
}

impl Params<'_> {
    /// Whether no parameters were declared at all.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
            && self.optional.is_empty()
            && self.rest.is_none()
            && self.post.is_empty()
            && self.block.is_none()
    }
}

/// `name = default` in a parameter list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionalParam<'ast> {
    pub name: Sym,
    pub default: Node<'ast>,
}

/// `case subject; when ...; else ...; end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaseExpr<'ast> {
    /// `None` for a subject-less `case`, where each condition is tested
    /// for truthiness.
    pub subject: Option<&'ast Node<'ast>>,
    pub whens: &'ast [When<'ast>],
    pub otherwise: Option<&'ast Node<'ast>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct When<'ast> {
    pub conditions: &'ast [Node<'ast>],
    pub body: Option<&'ast Node<'ast>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeginBlock<'ast> {
    pub body: Option<&'ast Node<'ast>>,
    pub rescues: &'ast [RescueClause<'ast>],
    pub otherwise: Option<&'ast Node<'ast>>,
    pub ensure: Option<&'ast Node<'ast>>,
}

/// `rescue A, B => e`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RescueClause<'ast> {
    /// Exception classes; empty means `StandardError`.
    pub classes: &'ast [Node<'ast>],
    pub binding: Option<Target>,
    pub body: Option<&'ast Node<'ast>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassDef<'ast> {
    pub scope: ConstScope<'ast>,
    pub name: Sym,
    pub superclass: Option<&'ast Node<'ast>>,
    pub body: &'ast Body<'ast>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleDef<'ast> {
    pub scope: ConstScope<'ast>,
    pub name: Sym,
    pub body: &'ast Body<'ast>,
}
