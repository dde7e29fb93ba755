use std::{env, rc::Rc};

use macro_vm::bytecode::disasm::disassemble;
use macro_vm::bytecode::{AssembleError, Assembler, OpCode, Program};
use macro_vm::lang::{SymbolId, SymbolKind, SymbolTable, Value};
use macro_vm::runtime::native::{NativeSubroutine, string_arg};
use macro_vm::runtime::{Interpreter, MacroStatus, VmConfig};
use tracing::debug;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let show_bytecode = args.contains(&"--bc".to_string());
    let no_preempt = args.contains(&"--no-preempt".to_string());
    let budget = match args.iter().position(|a| a == "--budget") {
        Some(i) => match args.get(i + 1).and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => Some(n),
            _ => {
                eprintln!("Error: --budget expects a positive instruction count");
                std::process::exit(1);
            }
        },
        None => VmConfig::default().instruction_limit,
    };

    let mut interp = Interpreter::with_config(VmConfig {
        instruction_limit: if no_preempt { None } else { budget },
        ..VmConfig::default()
    });

    let print = interp.symbols_mut().define_native(
        "t_print",
        NativeSubroutine::new(|_, args| {
            let parts = args.iter().map(string_arg).collect::<Result<Vec<_>, _>>()?;
            println!("{}", parts.join(" "));
            Ok(Value::Unset)
        }),
    );

    let program = match build_demo(interp.symbols_mut(), print, 100) {
        Ok(program) => Rc::new(program),
        Err(e) => {
            eprintln!("Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    if show_bytecode {
        print_bytecode("demo", &program, interp.symbols());
    }

    run_demo(&mut interp, &program);
}

fn print_usage() {
    println!("MACRO VM - Preemptible bytecode interpreter for editor macros");
    println!();
    println!("Usage:");
    println!("  macro_vm                  Run the demo macro");
    println!("  macro_vm --bc             Print the demo's bytecode before running it");
    println!("  macro_vm --budget <n>     Preempt every <n> instructions");
    println!("  macro_vm --no-preempt     Run to completion in one slice");
    println!("  macro_vm --help, -h       Show this help");
    println!();
    println!("Set RUST_LOG=macro_vm=debug (or trace) to follow execution.");
}

fn print_bytecode(name: &str, program: &Program, symbols: &SymbolTable) {
    println!("════════════════════════════════════════");
    println!(" {}", name);
    println!(
        " {} slots, {} locals",
        program.code().len(),
        program.locals().len()
    );
    println!("════════════════════════════════════════");
    print!("{}", disassemble(program, symbols));
    println!();
}

/// Drive the macro the way an editor's event loop would: run a slice, then
/// come back for the next one until it finishes.
fn run_demo(interp: &mut Interpreter, program: &Rc<Program>) {
    let mut slices = 1;
    let mut status = interp.execute_macro(program, &[], None);

    loop {
        match status {
            MacroStatus::Done(value) => {
                println!("result: {}", value);
                break;
            }
            MacroStatus::Error(e) => {
                eprintln!("Runtime error: {}", e);
                std::process::exit(1);
            }
            MacroStatus::Preempted {
                continuation,
                reason,
            } => {
                debug!(slices, ?reason, "host resuming macro");
                slices += 1;
                status = interp.continue_macro(continuation);
            }
        }
    }

    println!("finished in {} slice(s)", slices);
}

fn int_const(symbols: &mut SymbolTable, n: i32) -> SymbolId {
    symbols.install(n.to_string(), SymbolKind::Const, Value::Int(n))
}

/// Hand-assembled equivalent of
///
/// ```text
/// total = 0
/// for (i = 1; i <= limit; i++)
///     total += i
/// table["sum"] = total
/// t_print("sum", table["sum"])
/// return table["sum"]
/// ```
fn build_demo(
    symbols: &mut SymbolTable,
    print: SymbolId,
    limit: i32,
) -> Result<Program, AssembleError> {
    let mut asm = Assembler::new();
    asm.begin_program(symbols);

    let total = symbols.install("total", SymbolKind::Local, Value::Unset);
    let i = symbols.install("i", SymbolKind::Local, Value::Unset);
    let table = symbols.install("table", SymbolKind::Local, Value::Unset);
    let zero = int_const(symbols, 0);
    let one = int_const(symbols, 1);
    let bound = int_const(symbols, limit);
    let key = symbols.install_string_const("sum");

    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(zero)?;
    asm.add_op(OpCode::Assign)?;
    asm.add_symbol(total)?;

    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(one)?;
    asm.add_op(OpCode::Assign)?;
    asm.add_symbol(i)?;

    // condition
    asm.start_loop()?;
    let top = asm.pc();
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(i)?;
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(bound)?;
    asm.add_op(OpCode::Le)?;
    asm.add_op(OpCode::BranchFalse)?;
    let exit = asm.add_branch_offset(None)?;
    asm.add_break_addr(exit)?;

    // body
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(total)?;
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(i)?;
    asm.add_op(OpCode::Add)?;
    asm.add_op(OpCode::Assign)?;
    asm.add_symbol(total)?;

    // increment
    let next = asm.pc();
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(i)?;
    asm.add_op(OpCode::Incr)?;
    asm.add_op(OpCode::Assign)?;
    asm.add_symbol(i)?;
    asm.add_op(OpCode::Branch)?;
    asm.add_branch_offset(Some(top))?;
    let after = asm.pc();
    asm.fill_loop_addrs(after, next)?;

    asm.add_op(OpCode::PushArraySym)?;
    asm.add_symbol(table)?;
    asm.add_immediate(1)?;
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(key)?;
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(total)?;
    asm.add_op(OpCode::ArrayAssign)?;
    asm.add_immediate(1)?;

    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(key)?;
    push_element(&mut asm, table, key)?;
    asm.add_op(OpCode::SubrCall)?;
    asm.add_symbol(print)?;
    asm.add_immediate(2)?;

    push_element(&mut asm, table, key)?;
    asm.add_op(OpCode::Return)?;

    Ok(asm.finish_program(symbols))
}

/// `array[key]`
fn push_element(asm: &mut Assembler, array: SymbolId, key: SymbolId) -> Result<(), AssembleError> {
    asm.add_op(OpCode::PushArraySym)?;
    asm.add_symbol(array)?;
    asm.add_immediate(0)?;
    asm.add_op(OpCode::PushSym)?;
    asm.add_symbol(key)?;
    asm.add_op(OpCode::ArrayRef)?;
    asm.add_immediate(1)?;
    Ok(())
}
