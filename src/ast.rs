//! A minimal demonstration AST and visitor, existing purely to exercise the
//! Code Builder end-to-end from the CLI and from tests. Not a parser: there
//! is no source text here, only constructed values. See module docs in
//! `driver` for how a function body is turned into a `BuiltMethod`.

use crate::classfile::code_builder::{CodeBuilder, JavaType};
use crate::classfile::descriptor::MethodDescriptor;
use crate::classfile::label::LabelId;
use crate::classfile::opcode::ComparisonType;
use crate::error::CodegenError;

#[derive(Debug, Clone)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i32),
    LongLit(i64),
    FloatLit(f32),
    DoubleLit(f64),
    StringLit(String),
    NullLit,
    Var(u16, JavaType),
    Unary(UnaryOp, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>, JavaType),
    /// Evaluates to an `int` 0/1 via a comparison of two values of the given type.
    Compare(ComparisonType, Box<Expr>, Box<Expr>, JavaType),
    /// Stores into a local and leaves nothing on the stack; valid only as a
    /// top-level statement in this demonstration AST, not nested inside
    /// another expression.
    Assign(u16, JavaType, Box<Expr>),
    StaticCall { class: String, name: String, descriptor: MethodDescriptor, args: Vec<Expr> },
    InstanceCall { class: String, name: String, descriptor: MethodDescriptor, receiver: Box<Expr>, args: Vec<Expr> },
    GetStatic { class: String, field: String, ty: String },
    GetField { class: String, field: String, ty: String, receiver: Box<Expr> },
}

/// A structured condition: lowers directly to the Code Builder's
/// single-operand (`jump_if`) or double-operand (`jump_if_icmp`/
/// `jump_if_acmp`/`jump_if_null`) branch families, rather than being built
/// out of `Expr` boolean values, matching how a real compiler lowers
/// `if`/`while` conditions without materialising an intermediate 0/1 unless
/// it has to.
#[derive(Debug, Clone)]
pub enum Cond {
    IntCompare(ComparisonType, Expr, Expr),
    RefEqual(bool, Expr, Expr),
    IsNull(bool, Expr),
    NonZero(Expr),
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    If(Cond, Vec<Stmt>, Vec<Stmt>),
    While(Cond, Vec<Stmt>),
    DoWhile(Vec<Stmt>, Cond),
    For(Option<Box<Stmt>>, Option<Cond>, Option<Box<Stmt>>, Vec<Stmt>),
    Switch(Expr, Vec<(i32, Vec<Stmt>)>, Option<Vec<Stmt>>),
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Vec<Stmt>),
}

/// Drives a [`CodeBuilder`] over an AST. Kept as a trait (rather than a
/// plain free function) so an embedder can override individual node kinds —
/// e.g. to add intrinsics — without forking the whole walk.
pub trait Visitor {
    fn visit_expr(&mut self, builder: &mut CodeBuilder, expr: &Expr) -> Result<(), CodegenError>;
    fn visit_stmt(&mut self, builder: &mut CodeBuilder, stmt: &Stmt) -> Result<(), CodegenError>;
    fn visit_block(&mut self, builder: &mut CodeBuilder, stmts: &[Stmt]) -> Result<(), CodegenError> {
        for s in stmts {
            self.visit_stmt(builder, s)?;
        }
        Ok(())
    }
}

/// The reference visitor implementation; stateless beyond the builder it is
/// handed on each call.
#[derive(Default)]
pub struct DefaultVisitor;

impl DefaultVisitor {
    /// Branches to `target` when `cond` evaluates to `want_true`, evaluating
    /// its operands first. Used directly by `if`, which has no need of the
    /// control stack and so can use the cheapest two-operand opcode for the
    /// comparison (e.g. `if_icmpne`) instead of materialising an
    /// intermediate boolean.
    fn branch(&mut self, b: &mut CodeBuilder, cond: &Cond, want_true: bool, target: LabelId) -> Result<(), CodegenError> {
        match cond {
            Cond::IntCompare(op, lhs, rhs) => {
                self.visit_expr(b, lhs)?;
                self.visit_expr(b, rhs)?;
                let op = if want_true { *op } else { negate_cmp(*op) };
                b.jump_if_icmp(op, target);
            }
            Cond::RefEqual(equal, lhs, rhs) => {
                self.visit_expr(b, lhs)?;
                self.visit_expr(b, rhs)?;
                let equal = if want_true { *equal } else { !*equal };
                b.jump_if_acmp(equal, target);
            }
            Cond::IsNull(is_null, value) => {
                self.visit_expr(b, value)?;
                let is_null = if want_true { *is_null } else { !*is_null };
                if is_null {
                    b.jump_if_null(target);
                } else {
                    b.jump_if_nonnull(target);
                }
            }
            Cond::NonZero(value) => {
                self.visit_expr(b, value)?;
                let cmp = if want_true { ComparisonType::NotEqual } else { ComparisonType::Equal };
                b.jump_if(cmp, target);
            }
        }
        Ok(())
    }

    /// Materialises `cond` as an `int` 0/1 on the stack, for loops: the
    /// structured loop helpers on [`CodeBuilder`] only understand a single
    /// value compared against zero, since that's what lets them track
    /// `break`/`continue` targets on the control stack. Paid once per loop
    /// iteration; `if` avoids this cost via `branch`.
    fn materialize_cond(&mut self, b: &mut CodeBuilder, cond: &Cond) -> Result<(), CodegenError> {
        if let Cond::NonZero(value) = cond {
            self.visit_expr(b, value)?;
            return Ok(());
        }
        let true_label = b.create_label();
        let end_label = b.create_label();
        self.branch(b, cond, true, true_label)?;
        b.emit_constant_int(0);
        b.jump(end_label, "cond");
        b.place_label(true_label);
        b.emit_constant_int(1);
        b.place_label(end_label);
        Ok(())
    }
}

impl Visitor for DefaultVisitor {
    fn visit_expr(&mut self, b: &mut CodeBuilder, expr: &Expr) -> Result<(), CodegenError> {
        match expr {
            Expr::IntLit(v) => b.emit_constant_int(*v),
            Expr::LongLit(v) => b.emit_constant_long(*v),
            Expr::FloatLit(v) => b.emit_constant_float(*v),
            Expr::DoubleLit(v) => b.emit_constant_double(*v),
            Expr::StringLit(s) => b.emit_constant_string(s.clone()),
            Expr::NullLit => b.emit_constant_null(),
            Expr::Var(index, ty) => b.emit_load(ty.clone(), *index),
            Expr::Unary(op, inner) => {
                self.visit_expr(b, inner)?;
                match op {
                    UnaryOp::Neg => b.emit_neg(JavaType::Int),
                    UnaryOp::Not => {
                        b.emit_constant_int(-1);
                        b.emit_xor(false);
                    }
                }
            }
            Expr::Arith(op, lhs, rhs, ty) => {
                self.visit_expr(b, lhs)?;
                self.visit_expr(b, rhs)?;
                match op {
                    ArithOp::Add => b.emit_add(ty.clone()),
                    ArithOp::Sub => b.emit_sub(ty.clone()),
                    ArithOp::Mul => b.emit_mul(ty.clone()),
                    ArithOp::Div => b.emit_div(ty.clone()),
                    ArithOp::Rem => b.emit_rem(ty.clone()),
                    ArithOp::And => b.emit_and(matches!(ty, JavaType::Long)),
                    ArithOp::Or => b.emit_or(matches!(ty, JavaType::Long)),
                    ArithOp::Xor => b.emit_xor(matches!(ty, JavaType::Long)),
                    ArithOp::Shl => b.emit_shl(matches!(ty, JavaType::Long)),
                    ArithOp::Shr => b.emit_shr(matches!(ty, JavaType::Long)),
                    ArithOp::Ushr => b.emit_ushr(matches!(ty, JavaType::Long)),
                }
            }
            Expr::Compare(cmp, lhs, rhs, ty) => {
                // Materialises the comparison as an int 0/1, for use as an
                // ordinary subexpression (e.g. the scrutinee of a switch).
                let true_label = b.create_label();
                let end_label = b.create_label();
                match ty {
                    JavaType::Int => {
                        self.visit_expr(b, lhs)?;
                        self.visit_expr(b, rhs)?;
                        b.jump_if_icmp(*cmp, true_label);
                    }
                    JavaType::Long => {
                        self.visit_expr(b, lhs)?;
                        self.visit_expr(b, rhs)?;
                        b.emit_lcmp();
                        b.jump_if(*cmp, true_label);
                    }
                    JavaType::Float => {
                        self.visit_expr(b, lhs)?;
                        self.visit_expr(b, rhs)?;
                        b.emit_fcmp(matches!(cmp, ComparisonType::GreaterThan | ComparisonType::GreaterThanEqual));
                        b.jump_if(*cmp, true_label);
                    }
                    JavaType::Double => {
                        self.visit_expr(b, lhs)?;
                        self.visit_expr(b, rhs)?;
                        b.emit_dcmp(matches!(cmp, ComparisonType::GreaterThan | ComparisonType::GreaterThanEqual));
                        b.jump_if(*cmp, true_label);
                    }
                    JavaType::Reference(_) => {
                        self.visit_expr(b, lhs)?;
                        self.visit_expr(b, rhs)?;
                        b.jump_if_acmp(matches!(cmp, ComparisonType::Equal), true_label);
                    }
                }
                b.emit_constant_int(0);
                b.jump(end_label, "compare");
                b.place_label(true_label);
                b.emit_constant_int(1);
                b.place_label(end_label);
            }
            Expr::Assign(index, ty, value) => {
                self.visit_expr(b, value)?;
                b.emit_store(ty.clone(), *index);
            }
            Expr::StaticCall { class, name, descriptor, args } => {
                for a in args {
                    self.visit_expr(b, a)?;
                }
                b.emit_invokestatic(class, name, descriptor);
            }
            Expr::InstanceCall { class, name, descriptor, receiver, args } => {
                self.visit_expr(b, receiver)?;
                for a in args {
                    self.visit_expr(b, a)?;
                }
                b.emit_invokevirtual(class, name, descriptor);
            }
            Expr::GetStatic { class, field, ty } => b.emit_getstatic(class, field, ty)?,
            Expr::GetField { class, field, ty, receiver } => {
                self.visit_expr(b, receiver)?;
                b.emit_getfield(class, field, ty)?;
            }
        }
        Ok(())
    }

    fn visit_stmt(&mut self, b: &mut CodeBuilder, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Expr(e) => {
                let discards_value = !matches!(
                    e,
                    Expr::Assign(..)
                        | Expr::StaticCall { descriptor: MethodDescriptor(_, None), .. }
                        | Expr::InstanceCall { descriptor: MethodDescriptor(_, None), .. }
                );
                self.visit_expr(b, e)?;
                if discards_value {
                    b.emit_pop();
                }
            }
            Stmt::If(cond, then, else_) => {
                // No control-stack entry needed: `if` is never a `break`/
                // `continue` target, so the cheap two-operand branch can be
                // used directly instead of going through `begin_if`'s
                // single-value-vs-zero convention. The negated condition
                // skips straight past the then-block, matching how javac
                // lays out `if`/`else`.
                let else_label = b.create_label();
                let end_label = b.create_label();
                self.branch(b, cond, false, else_label)?;
                self.visit_block(b, then)?;
                b.jump(end_label, "if");
                b.place_label(else_label);
                self.visit_block(b, else_)?;
                b.place_label(end_label);
            }
            Stmt::While(cond, body) => {
                b.begin_while();
                self.materialize_cond(b, cond)?;
                b.while_after_condition(ComparisonType::NotEqual);
                self.visit_block(b, body)?;
                b.end_while();
            }
            Stmt::DoWhile(body, cond) => {
                b.begin_do_while();
                self.visit_block(b, body)?;
                self.materialize_cond(b, cond)?;
                b.end_do_while(ComparisonType::NotEqual);
            }
            Stmt::For(init, cond, post, body) => {
                if let Some(init) = init {
                    self.visit_stmt(b, init)?;
                }
                b.begin_for();
                match cond {
                    Some(cond) => self.materialize_cond(b, cond)?,
                    None => b.emit_constant_int(1),
                }
                b.for_after_condition(ComparisonType::NotEqual);
                self.visit_block(b, body)?;
                b.for_begin_post();
                if let Some(post) = post {
                    self.visit_stmt(b, post)?;
                }
                b.end_for();
            }
            Stmt::Switch(scrutinee, cases, default) => {
                self.visit_expr(b, scrutinee)?;
                b.begin_switch();
                for (value, body) in cases {
                    b.switch_case(*value);
                    self.visit_block(b, body)?;
                }
                if let Some(body) = default {
                    b.switch_default();
                    self.visit_block(b, body)?;
                }
                b.end_switch();
            }
            Stmt::Break => b.emit_break(),
            Stmt::Continue => b.emit_continue(),
            Stmt::Return(value) => match value {
                Some(e) => {
                    let ty = expr_java_type(e);
                    self.visit_expr(b, e)?;
                    b.emit_return(Some(ty));
                }
                None => b.emit_return(None),
            },
            Stmt::Block(stmts) => self.visit_block(b, stmts)?,
        }
        Ok(())
    }
}

fn negate_cmp(cmp: ComparisonType) -> ComparisonType {
    match cmp {
        ComparisonType::Equal => ComparisonType::NotEqual,
        ComparisonType::NotEqual => ComparisonType::Equal,
        ComparisonType::LessThan => ComparisonType::GreaterThanEqual,
        ComparisonType::GreaterThanEqual => ComparisonType::LessThan,
        ComparisonType::GreaterThan => ComparisonType::LessThanEqual,
        ComparisonType::LessThanEqual => ComparisonType::GreaterThan,
    }
}

/// Infers the verification-relevant type an expression evaluates to, for
/// `return`'s opcode family selection. A real front end would carry this
/// from the type checker; the demonstration AST derives it structurally.
fn expr_java_type(e: &Expr) -> JavaType {
    match e {
        Expr::IntLit(_) => JavaType::Int,
        Expr::LongLit(_) => JavaType::Long,
        Expr::FloatLit(_) => JavaType::Float,
        Expr::DoubleLit(_) => JavaType::Double,
        Expr::StringLit(_) => JavaType::Reference("Ljava/lang/String;".to_string()),
        Expr::NullLit => JavaType::Reference("Ljava/lang/Object;".to_string()),
        Expr::Var(_, ty) => ty.clone(),
        Expr::Unary(_, inner) => expr_java_type(inner),
        Expr::Arith(_, _, _, ty) => ty.clone(),
        Expr::Compare(..) => JavaType::Int,
        Expr::Assign(_, ty, _) => ty.clone(),
        Expr::StaticCall { descriptor, .. } | Expr::InstanceCall { descriptor, .. } => {
            descriptor.1.as_ref().map(JavaType::from_descriptor).unwrap_or(JavaType::Int)
        }
        Expr::GetStatic { ty, .. } | Expr::GetField { ty, .. } => {
            crate::classfile::descriptor::parse_field_descriptor(ty).map(|d| JavaType::from_descriptor(&d)).unwrap_or(JavaType::Int)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::constant_pool::ConstantPool;
    use crate::classfile::opcode;

    fn new_builder(cp: &mut ConstantPool) -> CodeBuilder<'_> {
        CodeBuilder::new(cp, "m".to_string(), true, false, "Demo", &MethodDescriptor(vec![], Some(crate::classfile::descriptor::DescriptorEntry::Int)))
    }

    #[test]
    fn if_with_equal_int_literals_emits_if_icmpne_and_both_arms() {
        let mut cp = ConstantPool::default();
        let mut b = new_builder(&mut cp);
        let mut visitor = DefaultVisitor;
        let stmt = Stmt::If(
            Cond::IntCompare(ComparisonType::Equal, Expr::IntLit(1), Expr::IntLit(1)),
            vec![Stmt::Return(Some(Expr::IntLit(1)))],
            vec![],
        );
        visitor.visit_stmt(&mut b, &stmt).unwrap();
        visitor.visit_stmt(&mut b, &Stmt::Return(Some(Expr::IntLit(0)))).unwrap();
        let built = b.finish().unwrap();
        let bytes = built.code.bytes();
        assert_eq!(bytes[0], opcode::ICONST_1);
        assert_eq!(bytes[1], opcode::ICONST_1);
        assert_eq!(bytes[2], opcode::IF_ICMPEQ + ComparisonType::NotEqual as u8);
        assert_eq!(bytes[5], opcode::ICONST_1);
        assert_eq!(bytes[6], opcode::IRETURN);
        assert_eq!(bytes[7], opcode::ICONST_0);
        assert_eq!(bytes[8], opcode::IRETURN);
    }

    #[test]
    fn while_loop_marks_condition_label_as_loop_header_and_records_branch_target() {
        let mut cp = ConstantPool::default();
        let mut b = new_builder(&mut cp);
        let mut visitor = DefaultVisitor;
        // int i = 0; while (i < 10) i = i + 1; return i;
        visitor.visit_stmt(&mut b, &Stmt::Expr(Expr::Assign(0, JavaType::Int, Box::new(Expr::IntLit(0))))).unwrap();
        let body = vec![Stmt::Expr(Expr::Assign(
            0,
            JavaType::Int,
            Box::new(Expr::Arith(ArithOp::Add, Box::new(Expr::Var(0, JavaType::Int)), Box::new(Expr::IntLit(1)), JavaType::Int)),
        ))];
        visitor
            .visit_stmt(&mut b, &Stmt::While(Cond::IntCompare(ComparisonType::LessThan, Expr::Var(0, JavaType::Int), Expr::IntLit(10)), body))
            .unwrap();
        visitor.visit_stmt(&mut b, &Stmt::Return(Some(Expr::Var(0, JavaType::Int)))).unwrap();
        let built = b.finish().unwrap();
        assert!(!built.branch_targets.is_empty());
        assert!(built.code.bytes().contains(&opcode::GOTO));
    }

    #[test]
    fn break_inside_while_targets_loop_end() {
        let mut cp = ConstantPool::default();
        let mut b = new_builder(&mut cp);
        let mut visitor = DefaultVisitor;
        let body = vec![Stmt::Break];
        visitor.visit_stmt(&mut b, &Stmt::While(Cond::NonZero(Expr::IntLit(1)), body)).unwrap();
        visitor.visit_stmt(&mut b, &Stmt::Return(Some(Expr::IntLit(0)))).unwrap();
        let built = b.finish().unwrap();
        assert!(built.code.bytes().contains(&opcode::GOTO));
    }

    #[test]
    fn assign_as_statement_does_not_leave_a_residual_value() {
        let mut cp = ConstantPool::default();
        let mut b = new_builder(&mut cp);
        let mut visitor = DefaultVisitor;
        visitor.visit_stmt(&mut b, &Stmt::Expr(Expr::Assign(0, JavaType::Int, Box::new(Expr::IntLit(5))))).unwrap();
        visitor.visit_stmt(&mut b, &Stmt::Return(Some(Expr::IntLit(0)))).unwrap();
        let built = b.finish().unwrap();
        assert_eq!(built.max_stack, 1);
    }
}
