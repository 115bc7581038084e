use colour::{e_green_ln_bold, e_grey_ln, e_red_ln, green_ln_bold, grey_ln, red_ln};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use std::{env, fs};
use vetch::settings::Config;
use vetch::{print_formatted_error, run_program, Compiler, Flag};

fn main() -> ExitCode {
    let compiler_args: Vec<String> = env::args().collect();

    if compiler_args.len() < 2 {
        print_help();
        return ExitCode::SUCCESS;
    }

    let source_file = PathBuf::from(&compiler_args[1]);
    let flags = get_flags(&compiler_args[2..]);

    let config = Config {
        debug: flags.contains(&Flag::Debug),
    };
    let compiler = Compiler::new(&config);

    // Extra stage output for debugging the compiler itself
    if flags.contains(&Flag::ShowTokens) || flags.contains(&Flag::ShowAst) {
        match fs::read_to_string(&source_file) {
            Ok(source_code) => {
                if let Err(e) = show_stages(&compiler, &source_code, &flags) {
                    print_formatted_error(&e);
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                e_red_ln!("Could not read {}: {}", source_file.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    let start = Instant::now();
    let program = match compiler.compile_file(&source_file) {
        Ok(program) => program,
        Err(e) => {
            print_formatted_error(&e);
            return ExitCode::FAILURE;
        }
    };

    if flags.contains(&Flag::ShowBytecode) {
        print!("{}", program.disassemble());
    }

    // Timing goes to stderr so program output stays clean
    if !flags.contains(&Flag::DisableTimers) {
        e_grey_ln!("------------------------------------");
        eprint!("Compiled in: ");
        e_green_ln_bold!("{:?}", start.elapsed());
    }

    let mut stdout = io::stdout();
    match run_program(&program, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_formatted_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn show_stages(
    compiler: &Compiler,
    source_code: &str,
    flags: &[Flag],
) -> Result<(), vetch::CompileError> {
    let mut tokens = compiler.source_to_tokens(source_code)?;
    if flags.contains(&Flag::ShowTokens) {
        for token in &tokens.tokens {
            println!("{:?}", token.kind);
        }
    }
    if flags.contains(&Flag::ShowAst) {
        let ast = compiler.tokens_to_ast(&mut tokens)?;
        for statement in &ast.statements {
            println!("{:#?}", statement.kind);
        }
    }
    Ok(())
}

fn get_flags(args: &[String]) -> Vec<Flag> {
    let mut flags = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--tokens" => flags.push(Flag::ShowTokens),
            "--ast" => flags.push(Flag::ShowAst),
            "--bytecode" => flags.push(Flag::ShowBytecode),
            "--hide-timers" => flags.push(Flag::DisableTimers),
            "--debug" => flags.push(Flag::Debug),
            other => {
                red_ln!("Unknown flag '{}' (ignored)", other);
            }
        }
    }

    flags
}

fn print_help() {
    grey_ln!("------------------------------------");
    green_ln_bold!("The Vetch compiler!");
    println!("Usage: vetch <source-file> [flags]");
    println!("Flags:");
    println!("  --debug        - Enable array bounds checks");
    println!("  --bytecode     - Print the compiled bytecode before running");
    println!("  --tokens       - Print the token stream for the entry file");
    println!("  --ast          - Print the parsed AST for the entry file");
    println!("  --hide-timers  - Do not print compile timing");
}
