use cachepack::cli::CliArgs;
use cachepack::engine::{Engine, EngineConfig};
use cachepack::rules::Ruleset;
use cachepack::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("cachepack v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let rules = match &args.rules {
        Some(path) => Ruleset::load(path),
        None => Ruleset::builtin(),
    };
    let rules = match rules {
        Ok(rules) => rules,
        Err(err) => {
            error!("failed to load rule table: {}", err);
            std::process::exit(1);
        }
    };

    let config = EngineConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        suffix: args.suffix.clone(),
        show_stats: args.stats,
        fail_file: args.fail_file.clone(),
        remove_with_true: !args.delete_removed,
    };

    let mut engine = Engine::new(config, rules);
    let exit_code = match engine.run() {
        Ok(()) => {
            if engine.failures().is_empty() {
                0
            } else {
                2
            }
        }
        Err(err) => {
            error!("{:#}", err);
            1
        }
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str = env::var("CACHEPACK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            filter = filter.add_directive(format!("cachepack={}", level).parse().unwrap());
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
