use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};

use jvcodegen::ast::{Cond, Expr, Stmt};
use jvcodegen::classfile::descriptor::MethodDescriptor;
use jvcodegen::classfile::opcode::ComparisonType;
use jvcodegen::classfile::{ACC_PUBLIC, ACC_STATIC};
use jvcodegen::error::DriverError;
use jvcodegen::{compile_and_write, ClassDef, CompilationContext, FunctionDef};

/// Compiles one or more C-dialect translation units to JVM class files.
///
/// There is no lexer/parser in this crate (out of scope — see the crate
/// docs); each input is compiled from a small placeholder AST standing in
/// for a real front end's output, so the class-file pipeline can be driven
/// end to end from the command line.
#[derive(Parser)]
#[command(name = "codegen")]
struct Cli {
    /// Source file paths. Only their names are used to derive output class
    /// names; a real front end would parse their contents.
    sources: Vec<PathBuf>,

    /// Raises the log level: unset is `warn`, `-v` is `info`, `-vv` is `debug`.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output directory for generated `.class` files.
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), DriverError> {
    if cli.sources.is_empty() {
        return Err(DriverError::NoInputFiles);
    }

    let mut classes = Vec::new();
    for source in &cli.sources {
        if !source.exists() {
            return Err(DriverError::BadPath(source.display().to_string()));
        }
        classes.push(placeholder_class_for(source));
    }

    let ctx = CompilationContext::new();
    compile_and_write(&classes, &ctx, &cli.out_dir)?;
    info!("compiled {} class(es) into {}", classes.len(), cli.out_dir.display());
    Ok(())
}

/// Builds the class that stands in for `source`'s real compiled output: a
/// single public class named after the file stem, with one static `main`
/// method exercising a branch so every run produces a non-trivial,
/// verifiable class file. A real front end would replace this with a parsed
/// and type-checked AST for the file's actual contents.
fn placeholder_class_for(source: &Path) -> ClassDef {
    let class_name = class_name_for(source);
    let body = vec![Stmt::If(
        Cond::IntCompare(ComparisonType::Equal, Expr::IntLit(1), Expr::IntLit(1)),
        vec![Stmt::Return(Some(Expr::IntLit(1)))],
        vec![Stmt::Return(Some(Expr::IntLit(0)))],
    )];

    ClassDef {
        name: class_name,
        super_name: "java/lang/Object".to_string(),
        source_file: source.file_name().map(|n| n.to_string_lossy().into_owned()),
        fields: vec![],
        methods: vec![FunctionDef {
            name: "main".to_string(),
            descriptor: MethodDescriptor(vec![], Some(jvcodegen::classfile::descriptor::DescriptorEntry::Int)),
            is_static: true,
            is_constructor: false,
            access_flags: ACC_PUBLIC | ACC_STATIC,
            body,
        }],
        static_init: vec![],
    }
}

fn class_name_for(source: &Path) -> String {
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("Main");
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => "Main".to_string(),
    }
}

