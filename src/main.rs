use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{arg, command, value_parser, ArgAction, Command};
use colored::Colorize;
use hostflow::config::EngineConfig;
use hostflow::encoding;
use hostflow::program::types::Type;
use hostflow::runtime::value::{AsyncValue, Payload};
use hostflow::runtime::Executor;
use hostflow::spawn::TokioSpawn;
use hostflow::test_runner;
use hostflow::Program;
use tracing::Level;

fn main() {
    let matches = command!()
        .subcommand_required(true)
        .arg(arg!(-v --verbose ... "Log more; repeat for more detail").global(true))
        .arg(
            arg!(--workers <N> "Number of worker threads")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run a function of a program")
                .arg(arg!(<file> "The program document").value_parser(value_parser!(PathBuf)))
                .arg(arg!([function] "The function to run").default_value("main"))
                .arg(
                    arg!(--arg <ARG> "An argument, written as <type>:<literal>")
                        .action(ArgAction::Append),
                )
                .arg(arg!(--stats "Print execution statistics")),
        )
        .subcommand(
            Command::new("check")
                .about("Load and verify a program without running it")
                .arg(arg!(<file> "The program document").value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("dump")
                .about("Print a program in canonical form")
                .arg(arg!(<file> "The program document").value_parser(value_parser!(PathBuf))),
        )
        .subcommand(
            Command::new("test")
                .about("Run the test_* functions of program documents")
                .arg(
                    arg!([file] "The program document; defaults to every .json file here")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(--filter <FILTER> "Only run tests whose name contains this")),
        )
        .get_matches();

    let mut config = EngineConfig::from_env().with_verbosity(matches.get_count("verbose"));
    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.worker_threads = (*workers).max(1);
    }
    init_logging(config.log_level);
    set_miette_hook();

    let ok = match matches.subcommand() {
        Some(("run", args)) => {
            let file = args.get_one::<PathBuf>("file").unwrap().clone();
            let function = args.get_one::<String>("function").unwrap().clone();
            let arguments: Vec<String> = args
                .get_many::<String>("arg")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            if args.get_flag("stats") {
                config.print_stats = true;
            }
            run_function(&file, &function, &arguments, &config)
        }
        Some(("check", args)) => {
            let file = args.get_one::<PathBuf>("file").unwrap();
            check(file)
        }
        Some(("dump", args)) => {
            let file = args.get_one::<PathBuf>("file").unwrap();
            dump(file)
        }
        Some(("test", args)) => {
            let file = args.get_one::<PathBuf>("file").cloned();
            let filter = args.get_one::<String>("filter").cloned();
            test_runner::run_tests(file, filter, config.worker_threads)
        }
        _ => unreachable!(),
    };
    if !ok {
        std::process::exit(1);
    }
}

fn init_logging(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn set_miette_hook() {
    let _ = miette::set_hook(Box::new(|_| {
        Box::new(miette::MietteHandlerOpts::new().context_lines(2).build())
    }));
}

fn load(file: &Path) -> Option<Program> {
    match encoding::load(file) {
        Ok(program) => Some(program),
        Err(error) => {
            eprintln!("{:?}", miette::Report::new(error));
            None
        }
    }
}

fn parse_argument(text: &str) -> Result<AsyncValue, String> {
    let (ty, literal) = text
        .split_once(':')
        .ok_or_else(|| format!("argument `{}` is not <type>:<literal>", text))?;
    let ty: Type = ty.trim().parse()?;
    Payload::parse_literal(&ty, literal).map(AsyncValue::ready)
}

fn run_function(file: &Path, function: &str, arguments: &[String], config: &EngineConfig) -> bool {
    let Some(program) = load(file) else {
        return false;
    };
    let args = match arguments
        .iter()
        .map(|text| parse_argument(text))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message.bright_red());
            return false;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("{}: {}", "Could not start the worker pool".bright_red(), error);
            return false;
        }
    };

    runtime.block_on(async {
        let executor = Executor::new(Arc::new(program), Arc::new(TokioSpawn::new()));
        let start = Instant::now();
        let execution = match executor.run(function, args).await {
            Ok(execution) => execution,
            Err(error) => {
                eprintln!("{:?}", miette::Report::new(error));
                return false;
            }
        };
        let elapsed = start.elapsed();

        for (position, outcome) in execution.outcomes.iter().enumerate() {
            match outcome {
                Ok(payload) => println!("{} {}", format!("#{}", position).dimmed(), payload),
                Err(error) => println!(
                    "{} {}",
                    format!("#{}", position).dimmed(),
                    error.to_string().bright_red()
                ),
            }
        }
        if config.print_stats {
            eprintln!("{}", "Statistics".bright_blue());
            eprint!("{}", executor.stats().show(elapsed));
        }
        execution.is_success()
    })
}

fn check(file: &Path) -> bool {
    let Some(program) = load(file) else {
        return false;
    };
    for (name, body) in program.functions() {
        println!("{} @{} {}", "✓".green(), name, body.signature);
    }
    true
}

fn dump(file: &Path) -> bool {
    let Some(program) = load(file) else {
        return false;
    };
    println!("{}", encoding::to_string(&program));
    true
}
