//! Sinter Compiler CLI
//!
//! Command-line driver: compiles a Sinter source file to LLVM IR and,
//! unless told to stop there, hands the IR to `clang` to produce a
//! native executable.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "sinterc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sinter compiler - compile .sin programs to executables", long_about = None)]
struct Cli {
    /// Input .sin source file
    input: PathBuf,

    /// Output path (defaults to input filename without its extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after emitting LLVM IR; don't invoke clang
    #[arg(long, conflicts_with = "compile_only")]
    emit_llvm: bool,

    /// Stop after compiling to an object file; don't link
    #[arg(short = 'c', long = "compile-only")]
    compile_only: bool,

    /// Keep the intermediate .ll file even when producing an executable
    #[arg(long)]
    keep_ir: bool,

    /// Print the parsed AST instead of compiling
    #[arg(long)]
    ast: bool,

    /// Print the token stream instead of compiling
    #[arg(long)]
    tokens: bool,

    /// Verbose diagnostic output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let output = cli.output.clone().unwrap_or_else(|| {
        let stem = cli.input.file_stem().unwrap_or_default();
        PathBuf::from(stem)
    });

    if cli.tokens {
        run_tokens(&cli);
        return;
    }
    if cli.ast {
        run_ast(&cli);
        return;
    }
    if cli.emit_llvm {
        run_emit_ir(&cli, &output);
        return;
    }
    run_build(&cli, &output);
}

fn read_source(cli: &Cli) -> String {
    std::fs::read_to_string(&cli.input).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", cli.input.display(), e);
        process::exit(1);
    })
}

fn run_tokens(cli: &Cli) {
    let source = read_source(cli);
    match sinterc::lexer::lex(&source) {
        Ok(tokens) => {
            for tok in tokens {
                println!("{:?}", tok);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_ast(cli: &Cli) {
    let source = read_source(cli);
    let tokens = match sinterc::lexer::lex(&source) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    match sinterc::parser::parse(tokens) {
        Ok(program) => println!("{:#?}", program),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_emit_ir(cli: &Cli, output: &std::path::Path) {
    let source = read_source(cli);
    match sinterc::compile_to_ir(&source) {
        Ok(result) => {
            if cli.verbose {
                for w in &result.warnings {
                    eprintln!("{}", w);
                }
            }
            let ir_path = output.with_extension("ll");
            if let Err(e) = std::fs::write(&ir_path, &result.ir) {
                eprintln!("Error writing {}: {}", ir_path.display(), e);
                process::exit(1);
            }
            println!("Wrote {}", ir_path.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_build(cli: &Cli, output: &std::path::Path) {
    match sinterc::compile_file(&cli.input, output, cli.keep_ir || cli.compile_only) {
        Ok(()) => {
            println!("Compiled {} -> {}", cli.input.display(), output.display());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
