use crate::bytecode::op::OperandKind;
use crate::bytecode::{Instruction, OpCode, Program};
use crate::lang::{SymbolId, SymbolKind, SymbolTable, Value};
use std::fmt::Write;

/// Render a program one instruction per line, operands inline.
pub fn disassemble(program: &Program, symbols: &SymbolTable) -> String {
    let code = program.code();
    let targets = collect_branch_targets(code);
    let mut out = String::new();

    let mut pc = 0;
    while pc < code.len() {
        if targets.contains(&pc) {
            out.push_str("      ┌──────────────────────────────────\n");
        }

        let marker = if targets.contains(&pc) { "► " } else { "  " };
        let _ = write!(out, "{:04} {}", pc, marker);

        match code[pc] {
            Instruction::Op(op) => {
                let line = format_op(code, pc, op, symbols);
                let _ = writeln!(out, "{}", line.trim_end());
                pc += 1 + op.operand_count();
            }
            stray => {
                let _ = writeln!(out, "??          stray operand {:?}", stray);
                pc += 1;
            }
        }
    }

    if targets.contains(&code.len()) {
        let _ = writeln!(out, "{:04} ► <end>", code.len());
    }

    out
}

fn collect_branch_targets(code: &[Instruction]) -> Vec<usize> {
    let mut targets = Vec::new();

    let mut pc = 0;
    while pc < code.len() {
        let Instruction::Op(op) = code[pc] else {
            pc += 1;
            continue;
        };

        for (k, kind) in op.operands().iter().enumerate() {
            if *kind != OperandKind::BranchOffset {
                continue;
            }
            let site = pc + 1 + k;
            if let Some(target) = branch_target(code, site) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        pc += 1 + op.operand_count();
    }

    targets
}

fn branch_target(code: &[Instruction], site: usize) -> Option<usize> {
    match code.get(site) {
        Some(Instruction::Immediate(offset)) => usize::try_from(site as i64 + offset).ok(),
        _ => None,
    }
}

fn format_op(code: &[Instruction], pc: usize, op: OpCode, symbols: &SymbolTable) -> String {
    let operand = |k: usize| code.get(pc + 1 + k).copied();
    let sym = |k: usize| match operand(k) {
        Some(Instruction::Symbol(id)) => format_symbol(id, symbols),
        other => format!("<bad operand {:?}>", other),
    };
    let imm = |k: usize| match operand(k) {
        Some(Instruction::Immediate(n)) => n.to_string(),
        other => format!("<bad operand {:?}>", other),
    };
    let branch = |k: usize| match branch_target(code, pc + 1 + k) {
        Some(target) => format!("-> {:04}", target),
        None => "-> <bad offset>".to_string(),
    };

    let name = op.name();
    match op {
        OpCode::PushSym | OpCode::Assign => format!("{:<12}{}", name, sym(0)),
        OpCode::BeginArrayIter => format!("{:<12}{}", name, sym(0)),
        OpCode::SubrCall => format!("{:<12}{} ({} args)", name, sym(0), imm(1)),
        OpCode::PushArraySym => format!("{:<12}{} makeEmpty={}", name, sym(0), imm(1)),

        OpCode::Branch | OpCode::BranchTrue | OpCode::BranchFalse | OpCode::BranchNever => {
            format!("{:<12}{}", name, branch(0))
        }

        OpCode::ArrayRef | OpCode::ArrayAssign | OpCode::ArrayDelete => {
            format!("{:<12}nDim={}", name, imm(0))
        }
        OpCode::ArrayRefAssignSetup => {
            format!("{:<12}binOp={} nDim={}", name, imm(0), imm(1))
        }
        OpCode::ArrayIter => format!("{:<12}{} in {} else {}", name, sym(0), sym(1), branch(2)),

        OpCode::Return => format!("{:<12}; ( value -- )", name),
        OpCode::FetchRetVal => format!("{:<12}; result of preceding call", name),

        _ => name.to_string(),
    }
}

fn format_symbol(id: SymbolId, symbols: &SymbolTable) -> String {
    let Some(sym) = symbols.get(id) else {
        return format!("<sym {}>", id.0);
    };

    match (sym.kind, &sym.value) {
        (SymbolKind::Const, Value::String(s)) => format!("{:?}", s),
        (SymbolKind::Const, Value::Int(n)) => n.to_string(),
        (SymbolKind::Local, Value::Int(offset)) => format!("{} [local {}]", sym.name, offset),
        (SymbolKind::Argument, _) => format!("{} [arg]", sym.name),
        (SymbolKind::NativeFunction, _) => format!("{} [native]", sym.name),
        (SymbolKind::ComputedProperty, _) => format!("{} [property]", sym.name),
        (SymbolKind::MacroFunction, _) => format!("{} [macro]", sym.name),
        _ => sym.name.clone(),
    }
}
