//! IR generation: lowering the typed AST to RSI
//!
//! The generator walks the typed AST in evaluation order, appending
//! instructions to the current function. Every expression leaves its
//! result in `last_result`; statements ignore it. Short-circuit operators
//! and conditional expressions are lowered to explicit branches.

use crate::ir::*;
use hashbrown::HashMap;
use rsharp_common::{RsError, RsResult};
use rsharp_parser::{BinaryOp, UnaryOp};
use rsharp_typechecker::{FuncId, TBlock, TExpr, TExprKind, TFunction, TGlobal, TProgram, TStmt, VarId};

/// Whether an expression should produce its value or the place it lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Value,
    Address,
}

struct LoopLabels {
    skip: LabelId,
    break_: LabelId,
}

/// Lower a validated program into a translation unit
pub fn generate(program: &TProgram) -> RsResult<TranslationUnit> {
    IrGenerator::new(program).generate()
}

struct IrGenerator<'a> {
    program: &'a TProgram,
    tu: TranslationUnit,
    var_operands: HashMap<VarId, Operand>,
    func_labels: HashMap<FuncId, LabelId>,
    last_result: Operand,
    expected: ValueKind,
    loop_stack: Vec<LoopLabels>,
    /// Bytes of the current function's frame already reserved for
    /// address-taken variables
    stack_bytes: u64,
}

impl<'a> IrGenerator<'a> {
    fn new(program: &'a TProgram) -> Self {
        Self {
            program,
            tu: TranslationUnit::default(),
            var_operands: HashMap::new(),
            func_labels: HashMap::new(),
            last_result: Operand::None,
            expected: ValueKind::Value,
            loop_stack: Vec::new(),
            stack_bytes: 0,
        }
    }

    fn generate(mut self) -> RsResult<TranslationUnit> {
        // function labels first, so calls can reference any function.
        // main and extern functions keep their exact name, everything else
        // gets a unique suffix.
        for (func_id, info) in self.program.funcs.iter() {
            let label = if info.is_extern || info.name == "main" {
                self.tu.pool.exact_label(&info.name)
            } else {
                self.tu.pool.new_label(&info.name)
            };
            if info.is_extern {
                self.tu.extern_labels.push(label);
            }
            self.func_labels.insert(func_id, label);
        }

        for global in &self.program.globals {
            self.lower_global(global);
        }

        for function in &self.program.functions {
            self.lower_function(function)?;
        }

        Ok(self.tu)
    }

    fn lower_global(&mut self, global: &TGlobal) {
        let info = self.program.vars.get(global.var);
        let id = self.tu.pool.new_global(&info.name, info.ty.clone());
        self.var_operands.insert(global.var, Operand::Global(id));
        match global.init {
            Some(value) => self.tu.initialized_globals.push((id, value as u64)),
            None => self.tu.uninitialized_globals.push(id),
        }
    }

    fn lower_function(&mut self, function: &TFunction) -> RsResult<()> {
        let info = self.program.funcs.get(function.func);
        let label = self.func_labels[&function.func];
        self.stack_bytes = 0;
        self.expected = ValueKind::Value;

        self.tu.functions.push(Function {
            name: info.name.clone(),
            label,
            return_type: info.return_type.clone(),
            instructions: Vec::new(),
            meta: FunctionMeta::default(),
        });

        self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(label)));
        self.emit(Instruction::new(Opcode::FunctionBegin));

        for (index, var) in function.params.iter().enumerate() {
            let reference = self.reference_for_variable(*var);
            self.emit(
                Instruction::new(Opcode::LoadParameter)
                    .with_result(Operand::Ref(reference))
                    .with_op1(Operand::Constant(index as u64)),
            );
        }

        self.lower_block(&function.body)?;

        // safety fallback if the function body never returns
        self.emit(Instruction::new(Opcode::Return).with_op1(Operand::Constant(0)));
        Ok(())
    }

    /// Create the reference backing a local variable. Address-taken
    /// variables get a stack-slot home so their address exists.
    fn reference_for_variable(&mut self, var: VarId) -> RefId {
        let info = self.program.vars.get(var);
        let reference = if info.address_taken {
            let offset = self.stack_bytes;
            self.stack_bytes += 8;
            self.tu.pool.new_stack_ref(&info.name, offset)
        } else {
            self.tu.pool.new_ref(&info.name)
        };
        self.var_operands.insert(var, Operand::Ref(reference));
        reference
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_block(&mut self, block: &TBlock) -> RsResult<()> {
        for item in &block.items {
            self.lower_stmt(item)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &TStmt) -> RsResult<()> {
        match stmt {
            TStmt::Block(block) => self.lower_block(block)?,
            TStmt::Return(value) => {
                self.expected = ValueKind::Value;
                let operand = match value {
                    Some(expr) => {
                        self.lower_expr(expr)?;
                        self.last_result
                    }
                    None => Operand::Constant(0),
                };
                self.emit(Instruction::new(Opcode::Return).with_op1(operand));
            }
            TStmt::If { condition, then_branch, else_branch } => {
                let else_label = self.tu.pool.new_label(".else");
                let end_label = self.tu.pool.new_label(".end");

                self.expected = ValueKind::Value;
                self.lower_expr(condition)?;
                self.emit(
                    Instruction::new(Opcode::JumpIfZero)
                        .with_op1(self.last_result)
                        .with_op2(Operand::Label(else_label)),
                );
                self.lower_stmt(then_branch)?;
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(end_label)));
                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(else_label)),
                );
                if let Some(else_branch) = else_branch {
                    self.lower_stmt(else_branch)?;
                }
                self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));
            }
            TStmt::While { condition, body } => {
                let start_label = self.tu.pool.new_label(".start");
                let end_label = self.tu.pool.new_label(".end");

                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(start_label)),
                );
                self.expected = ValueKind::Value;
                self.lower_expr(condition)?;
                self.emit(
                    Instruction::new(Opcode::JumpIfZero)
                        .with_op1(self.last_result)
                        .with_op2(Operand::Label(end_label)),
                );
                self.loop_stack.push(LoopLabels { skip: start_label, break_: end_label });
                self.lower_stmt(body)?;
                self.loop_stack.pop();
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(start_label)));
                self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));
            }
            TStmt::DoWhile { body, condition } => {
                let start_label = self.tu.pool.new_label(".start");
                let end_label = self.tu.pool.new_label(".end");

                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(start_label)),
                );
                self.loop_stack.push(LoopLabels { skip: start_label, break_: end_label });
                self.lower_stmt(body)?;
                self.loop_stack.pop();
                self.expected = ValueKind::Value;
                self.lower_expr(condition)?;
                self.emit(
                    Instruction::new(Opcode::JumpIfZero)
                        .with_op1(self.last_result)
                        .with_op2(Operand::Label(end_label)),
                );
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(start_label)));
                self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));
            }
            TStmt::For { init, condition, increment, body } => {
                let start_label = self.tu.pool.new_label(".start");
                let increment_label = self.tu.pool.new_label(".increment");
                let end_label = self.tu.pool.new_label(".end");

                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }
                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(start_label)),
                );
                if let Some(condition) = condition {
                    self.expected = ValueKind::Value;
                    self.lower_expr(condition)?;
                    self.emit(
                        Instruction::new(Opcode::JumpIfZero)
                            .with_op1(self.last_result)
                            .with_op2(Operand::Label(end_label)),
                    );
                }
                self.loop_stack.push(LoopLabels { skip: increment_label, break_: end_label });
                self.lower_stmt(body)?;
                self.loop_stack.pop();
                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(increment_label)),
                );
                if let Some(increment) = increment {
                    self.expected = ValueKind::Value;
                    self.lower_expr(increment)?;
                }
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(start_label)));
                self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));
            }
            TStmt::Break => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| internal("'break' outside of a loop reached IR generation"))?
                    .break_;
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(target)));
            }
            TStmt::Skip => {
                let target = self
                    .loop_stack
                    .last()
                    .ok_or_else(|| internal("'skip' outside of a loop reached IR generation"))?
                    .skip;
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(target)));
            }
            TStmt::VarDecl { var, init } => {
                self.expected = ValueKind::Value;
                let value = match init {
                    Some(expr) => {
                        self.lower_expr(expr)?;
                        self.last_result
                    }
                    None => Operand::Constant(0),
                };
                let reference = self.reference_for_variable(*var);
                self.emit(
                    Instruction::new(Opcode::Move)
                        .with_result(Operand::Ref(reference))
                        .with_op1(value),
                );
            }
            TStmt::Expr(expr) => {
                self.expected = ValueKind::Value;
                self.lower_expr(expr)?;
            }
            TStmt::Empty => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &TExpr) -> RsResult<()> {
        match &expr.kind {
            TExprKind::Number(value) => {
                self.expect_value()?;
                self.last_result = Operand::Constant(*value as u64);
            }
            TExprKind::String(bytes) => {
                self.expect_value()?;
                let label = self.tu.pool.new_label("str");
                self.tu.strings.push((label, bytes.clone()));
                let dest = self.tu.pool.new_ref("tmp");
                self.emit(
                    Instruction::new(Opcode::Move)
                        .with_result(Operand::Ref(dest))
                        .with_op1(Operand::Label(label)),
                );
            }
            TExprKind::Variable(var) => {
                // valid in both value and address position
                self.last_result = self.variable_operand(*var)?;
            }
            TExprKind::Convert(inner) => {
                // all RSI arithmetic is 64-bit; width changes lower to nothing
                self.lower_expr(inner)?;
            }
            TExprKind::Unary { op, operand } => {
                self.expect_value()?;
                self.lower_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Negate => Opcode::Negate,
                    UnaryOp::BinaryNot => Opcode::BinaryNot,
                    UnaryOp::LogicalNot => Opcode::LogicalNot,
                };
                let dest = self.tu.pool.new_ref("tmp");
                let source = self.last_result;
                self.emit(
                    Instruction::new(opcode)
                        .with_result(Operand::Ref(dest))
                        .with_op1(source),
                );
            }
            TExprKind::Binary { op, left, right } => self.lower_binary(*op, left, right)?,
            TExprKind::Conditional { condition, true_expr, false_expr } => {
                self.expect_value()?;
                let false_label = self.tu.pool.new_label(".false_expression");
                let end_label = self.tu.pool.new_label(".end");
                let result = self.tu.pool.new_ref("result");

                self.lower_expr(condition)?;
                self.emit(
                    Instruction::new(Opcode::JumpIfZero)
                        .with_op1(self.last_result)
                        .with_op2(Operand::Label(false_label)),
                );
                self.lower_expr(true_expr)?;
                self.emit(
                    Instruction::new(Opcode::Move)
                        .with_result(Operand::Ref(result))
                        .with_op1(self.last_result),
                );
                self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(end_label)));
                self.emit(
                    Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(false_label)),
                );
                self.lower_expr(false_expr)?;
                self.emit(
                    Instruction::new(Opcode::Move)
                        .with_result(Operand::Ref(result))
                        .with_op1(self.last_result),
                );
                self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));
                self.last_result = Operand::Ref(result);
            }
            TExprKind::Assign { lvalue, rvalue } => {
                self.expect_value()?;
                self.lower_expr(rvalue)?;
                let value = self.last_result;

                match &lvalue.kind {
                    TExprKind::Variable(var) => {
                        let place = self.variable_operand(*var)?;
                        self.emit(Instruction::new(Opcode::Move).with_result(place).with_op1(value));
                    }
                    TExprKind::Dereference(pointer) => {
                        // the address of `*p` is the value of `p`
                        self.expected = ValueKind::Value;
                        self.lower_expr(pointer)?;
                        let address = self.last_result;
                        self.emit(
                            Instruction::new(Opcode::StoreMemory)
                                .with_op1(address)
                                .with_op2(value),
                        );
                        self.last_result = value;
                    }
                    _ => return Err(internal("invalid assignment target reached IR generation")),
                }
            }
            TExprKind::AddressOf(var) => {
                self.expect_value()?;
                let operand = self.variable_operand(*var)?;
                let Operand::Ref(reference) = operand else {
                    return Err(internal("address-of target is not a local reference"));
                };
                if self.tu.pool.stack_slot_of(reference).is_none() {
                    return Err(internal("address-of target has no stack slot"));
                }
                let dest = self.tu.pool.new_ref("tmp");
                self.emit(
                    Instruction::new(Opcode::AddressOf)
                        .with_result(Operand::Ref(dest))
                        .with_op1(operand),
                );
            }
            TExprKind::Dereference(pointer) => {
                if self.expected == ValueKind::Address {
                    // `*p` in address position: the value of `p` is the place
                    self.expected = ValueKind::Value;
                    self.lower_expr(pointer)?;
                } else {
                    self.lower_expr(pointer)?;
                    let address = self.last_result;
                    let dest = self.tu.pool.new_ref("tmp");
                    self.emit(
                        Instruction::new(Opcode::LoadMemory)
                            .with_result(Operand::Ref(dest))
                            .with_op1(address),
                    );
                }
            }
            TExprKind::Call { func, args } => {
                self.expect_value()?;
                for arg in args {
                    self.expected = ValueKind::Value;
                    self.lower_expr(arg)?;
                    let value = self.last_result;
                    self.emit(Instruction::new(Opcode::StoreParameter).with_op1(value));
                }
                let label = *self
                    .func_labels
                    .get(func)
                    .ok_or_else(|| internal("call target never received a label"))?;
                let dest = self.tu.pool.new_ref("tmp");
                self.emit(
                    Instruction::new(Opcode::Call)
                        .with_result(Operand::Ref(dest))
                        .with_op1(Operand::Label(label))
                        .with_op2(Operand::Constant(args.len() as u64)),
                );
            }
        }
        Ok(())
    }

    fn lower_binary(&mut self, op: BinaryOp, left: &TExpr, right: &TExpr) -> RsResult<()> {
        // logical operators short-circuit; the right side only runs when needed
        if op == BinaryOp::LogicalOr {
            self.expect_value()?;
            self.lower_expr(left)?;
            let left_value = self.last_result;
            let end_label = self.tu.pool.new_label(".logical_or_end");
            let right_label = self.tu.pool.new_label(".logical_or_right");
            let result = self.tu.pool.new_ref("result");

            self.emit(
                Instruction::new(Opcode::JumpIfZero)
                    .with_op1(left_value)
                    .with_op2(Operand::Label(right_label)),
            );
            self.emit(
                Instruction::new(Opcode::Move)
                    .with_result(Operand::Ref(result))
                    .with_op1(Operand::Constant(1)),
            );
            self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(end_label)));

            self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(right_label)));
            self.lower_expr(right)?;
            let right_value = self.last_result;
            self.emit(
                Instruction::new(Opcode::NotEqual)
                    .with_result(Operand::Ref(result))
                    .with_op1(right_value)
                    .with_op2(Operand::Constant(0)),
            );
            self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));

            self.last_result = Operand::Ref(result);
            return Ok(());
        }

        if op == BinaryOp::LogicalAnd {
            self.expect_value()?;
            self.lower_expr(left)?;
            let left_value = self.last_result;
            let end_label = self.tu.pool.new_label(".logical_and_end");
            let right_label = self.tu.pool.new_label(".logical_and_right");
            let result = self.tu.pool.new_ref("result");
            let is_zero = self.tu.pool.new_ref("tmp");

            self.emit(
                Instruction::new(Opcode::Equal)
                    .with_result(Operand::Ref(is_zero))
                    .with_op1(left_value)
                    .with_op2(Operand::Constant(0)),
            );
            self.emit(
                Instruction::new(Opcode::JumpIfZero)
                    .with_op1(Operand::Ref(is_zero))
                    .with_op2(Operand::Label(right_label)),
            );
            self.emit(
                Instruction::new(Opcode::Move)
                    .with_result(Operand::Ref(result))
                    .with_op1(Operand::Constant(0)),
            );
            self.emit(Instruction::new(Opcode::Jump).with_op1(Operand::Label(end_label)));

            self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(right_label)));
            self.lower_expr(right)?;
            let right_value = self.last_result;
            self.emit(
                Instruction::new(Opcode::NotEqual)
                    .with_result(Operand::Ref(result))
                    .with_op1(right_value)
                    .with_op2(Operand::Constant(0)),
            );
            self.emit(Instruction::new(Opcode::DefineLabel).with_op1(Operand::Label(end_label)));

            self.last_result = Operand::Ref(result);
            return Ok(());
        }

        self.expect_value()?;
        self.lower_expr(left)?;
        let left_value = self.last_result;
        self.lower_expr(right)?;
        let right_value = self.last_result;

        // pointer arithmetic scales the integer side by the pointee size
        if matches!(op, BinaryOp::Add | BinaryOp::Subtract)
            && (left.ty.is_pointer() || right.ty.is_pointer())
        {
            let (pointer_value, integer_value, pointer_ty) = if left.ty.is_pointer() {
                (left_value, right_value, &left.ty)
            } else {
                (right_value, left_value, &right.ty)
            };
            let scale = pointer_ty
                .pointee()
                .and_then(|p| p.size_of())
                .ok_or_else(|| internal("pointer arithmetic on an unsized pointee"))?;

            let scaled = self.tu.pool.new_ref("tmp");
            self.emit(
                Instruction::new(Opcode::Multiply)
                    .with_result(Operand::Ref(scaled))
                    .with_op1(integer_value)
                    .with_op2(Operand::Constant(scale)),
            );
            let opcode = if op == BinaryOp::Add { Opcode::Add } else { Opcode::Subtract };
            let dest = self.tu.pool.new_ref("tmp");
            self.emit(
                Instruction::new(opcode)
                    .with_result(Operand::Ref(dest))
                    .with_op1(pointer_value)
                    .with_op2(Operand::Ref(scaled)),
            );
            return Ok(());
        }

        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Subtract => Opcode::Subtract,
            BinaryOp::Multiply => Opcode::Multiply,
            BinaryOp::Divide => Opcode::Divide,
            BinaryOp::Modulo => Opcode::Modulo,
            BinaryOp::Equal => Opcode::Equal,
            BinaryOp::NotEqual => Opcode::NotEqual,
            BinaryOp::LessThan => Opcode::LessThan,
            BinaryOp::LessThanOrEqual => Opcode::LessThanOrEqual,
            BinaryOp::GreaterThan => Opcode::GreaterThan,
            BinaryOp::GreaterThanOrEqual => Opcode::GreaterThanOrEqual,
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => unreachable!("handled above"),
        };
        let dest = self.tu.pool.new_ref("tmp");
        self.emit(
            Instruction::new(opcode)
                .with_result(Operand::Ref(dest))
                .with_op1(left_value)
                .with_op2(right_value),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn emit(&mut self, instr: Instruction) {
        self.last_result = instr.result;
        self.tu
            .functions
            .last_mut()
            .expect("emit outside of a function")
            .instructions
            .push(instr);
    }

    fn variable_operand(&self, var: VarId) -> RsResult<Operand> {
        self.var_operands
            .get(&var)
            .copied()
            .ok_or_else(|| internal("variable was never given a reference"))
    }

    fn expect_value(&self) -> RsResult<()> {
        if self.expected != ValueKind::Value {
            return Err(internal("expected an address-producing expression"));
        }
        Ok(())
    }
}

fn internal(message: &str) -> RsError {
    RsError::codegen_error(format!("Internal error: {}", message))
}
