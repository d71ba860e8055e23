//! Method, class and module definitions.

use rite_ast::{Body, ClassDef, ConstScope, ModuleDef, Node};
use rite_core::Sym;

use super::{Generator, Result};
use crate::bytecode::OpCode;
use crate::scope::{Scope, ScopeKind};

impl Generator {
    /// `def name ... end`: the method body is a child unit installed on the
    /// target class with `DEF`.
    pub(super) fn gen_def(&mut self, s: &mut Scope, name: Sym, body: &Body<'_>, val: bool) -> Result<()> {
        let sym = s.sym(name)?;
        let idx = self.lambda_body(s, body, ScopeKind::Method)?;
        let sp = s.sp();
        s.code.op1(OpCode::TClass, sp)?;
        s.push()?;
        s.code.op2(OpCode::Method, sp + 1, idx)?;
        s.push()?;
        s.pop_n(2)?;
        s.code.op2(OpCode::Def, sp, sym)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// Outer class or module of a definition, pushed.
    fn gen_definition_scope(&mut self, s: &mut Scope, scope: ConstScope<'_>) -> Result<()> {
        let sp = s.sp();
        match scope {
            ConstScope::Lexical => s.code.op1(OpCode::LoadNil, sp)?,
            ConstScope::Root => s.code.op1(OpCode::OClass, sp)?,
            ConstScope::Expr(outer) => return self.codegen(s, outer, true),
        }
        s.push()
    }

    /// Run a class-like body on the class in `sp`, or yield `nil` for an
    /// empty one.
    fn gen_class_body(&mut self, s: &mut Scope, body: &Body<'_>, sp: u16) -> Result<()> {
        if body.body.is_none() {
            return s.code.op1(OpCode::LoadNil, sp);
        }
        let idx = self.class_body(s, body)?;
        s.code.op2(OpCode::Exec, sp, idx)
    }

    pub(super) fn gen_class(&mut self, s: &mut Scope, def: &ClassDef<'_>, val: bool) -> Result<()> {
        self.gen_definition_scope(s, def.scope)?;
        match def.superclass {
            Some(superclass) => self.codegen(s, superclass, true)?,
            None => self.gen_load(s, OpCode::LoadNil, true)?,
        }
        s.pop_n(2)?;
        let idx = s.sym(def.name)?;
        let sp = s.sp();
        s.code.op2(OpCode::Class, sp, idx)?;
        self.gen_class_body(s, def.body, sp)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_module(&mut self, s: &mut Scope, def: &ModuleDef<'_>, val: bool) -> Result<()> {
        self.gen_definition_scope(s, def.scope)?;
        s.pop()?;
        let idx = s.sym(def.name)?;
        let sp = s.sp();
        s.code.op2(OpCode::Module, sp, idx)?;
        self.gen_class_body(s, def.body, sp)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    /// `class << target`
    pub(super) fn gen_sclass(
        &mut self,
        s: &mut Scope,
        target: &Node<'_>,
        body: &Body<'_>,
        val: bool,
    ) -> Result<()> {
        self.codegen(s, target, true)?;
        s.pop()?;
        let sp = s.sp();
        s.code.op1(OpCode::SClass, sp)?;
        self.gen_class_body(s, body, sp)?;
        if val {
            s.push()?;
        }
        Ok(())
    }

    pub(super) fn gen_alias(
        &mut self,
        s: &mut Scope,
        new_name: Sym,
        old_name: Sym,
        val: bool,
    ) -> Result<()> {
        let new_idx = s.sym(new_name)?;
        let old_idx = s.sym(old_name)?;
        s.code.op2(OpCode::Alias, new_idx, old_idx)?;
        self.gen_load(s, OpCode::LoadNil, val)
    }

    pub(super) fn gen_undef(&mut self, s: &mut Scope, names: &[Sym], val: bool) -> Result<()> {
        for &name in names {
            let idx = s.sym(name)?;
            s.code.op1(OpCode::Undef, idx)?;
        }
        self.gen_load(s, OpCode::LoadNil, val)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{compile, insns, ops};
    use crate::bytecode::OpCode;
    use rite_ast::{ClassDef, ConstScope, Params};

    #[test]
    fn def_installs_method_on_target_class() {
        let (irep, symbols) = compile(|b, syms| {
            let m = syms.intern("greet");
            let body = b.body(&[], Params::default(), &[b.str("hi")]);
            b.program(&[], &[b.def(m, body)])
        });
        assert_eq!(
            ops(&irep),
            [
                OpCode::TClass,
                OpCode::Method,
                OpCode::Def,
                OpCode::Return,
                OpCode::Stop
            ]
        );
        let code = insns(&irep);
        assert_eq!((code[0].a, code[1].a, code[2].a), (1, 2, 1));
        assert_eq!(irep.syms[code[2].b as usize], symbols.lookup("greet").unwrap());
        // DEF leaves the method name in its register
        assert_eq!((code[3].op, code[3].a), (OpCode::Return, 1));

        let method = &irep.children[0];
        assert_eq!(
            ops(method),
            [OpCode::Enter, OpCode::String, OpCode::Return]
        );
    }

    #[test]
    fn class_with_superclass_runs_body() {
        let (irep, _) = compile(|b, syms| {
            let foo = syms.intern("Foo");
            let base = syms.intern("Base");
            let m = syms.intern("m");
            let body = b.body(
                &[],
                Params::default(),
                &[b.def(m, b.body(&[], Params::default(), &[]))],
            );
            b.program(&[], &[b.class(foo, Some(b.constant(base)), body)])
        });
        assert_eq!(
            &ops(&irep)[..4],
            [OpCode::LoadNil, OpCode::GetConst, OpCode::Class, OpCode::Exec]
        );
        assert_eq!(irep.children.len(), 1);
        let class_body = &irep.children[0];
        assert!(ops(class_body).contains(&OpCode::Def));
        assert_eq!(class_body.children.len(), 1);
    }

    #[test]
    fn empty_class_is_nil() {
        let (irep, _) = compile(|b, syms| {
            let foo = syms.intern("Foo");
            b.program(&[], &[b.class(foo, None, b.body(&[], Params::default(), &[]))])
        });
        assert_eq!(
            ops(&irep),
            [
                OpCode::LoadNil,
                OpCode::LoadNil,
                OpCode::Class,
                OpCode::LoadNil,
                OpCode::Return,
                OpCode::Stop
            ]
        );
        assert!(irep.children.is_empty());
    }

    #[test]
    fn root_scoped_class_uses_object() {
        let (irep, _) = compile(|b, syms| {
            let foo = syms.intern("Foo");
            let def = b.arena().alloc(ClassDef {
                scope: ConstScope::Root,
                name: foo,
                superclass: None,
                body: b.arena().alloc(b.body(&[], Params::default(), &[])),
            });
            b.program(&[], &[b.node(rite_ast::NodeKind::Class(def))])
        });
        assert_eq!(ops(&irep)[0], OpCode::OClass);
    }

    #[test]
    fn module_and_singleton_class() {
        let (irep, _) = compile(|b, syms| {
            let util = syms.intern("Util");
            let m = syms.intern("m");
            let body = b.body(&[], Params::default(), &[b.def(m, b.body(&[], Params::default(), &[]))]);
            let sbody = b.body(&[], Params::default(), &[b.nil()]);
            b.program(&[], &[b.module(util, body), b.sclass(b.self_(), sbody)])
        });
        let all = ops(&irep);
        assert!(all.contains(&OpCode::Module));
        assert!(all.contains(&OpCode::SClass));
        assert_eq!(all.iter().filter(|&&op| op == OpCode::Exec).count(), 2);
        assert_eq!(irep.children.len(), 2);
    }

    #[test]
    fn class_body_is_class_scope() {
        let (irep, _) = compile(|b, syms| {
            let foo = syms.intern("Foo");
            let body = b.body(&[], Params::default(), &[b.yield_(&[])]);
            b.program(&[], &[b.class(foo, None, body)])
        });
        // yield in a class body resolves against the class scope itself
        let push = insns(&irep.children[0])
            .into_iter()
            .find(|i| i.op == OpCode::BlkPush)
            .unwrap();
        assert_eq!(push.b, 0);
    }

    #[test]
    fn alias_and_undef() {
        let (irep, _) = compile(|b, syms| {
            let a = syms.intern("a");
            let b_ = syms.intern("b");
            b.program(&[], &[b.alias(a, b_), b.undef(&[a, b_])])
        });
        assert_eq!(
            ops(&irep),
            [
                OpCode::Alias,
                OpCode::Undef,
                OpCode::Undef,
                OpCode::LoadNil,
                OpCode::Return,
                OpCode::Stop
            ]
        );
        let code = insns(&irep);
        assert_eq!((code[0].a, code[0].b), (0, 1));
    }
}
