use clap::Parser;
use std::path::PathBuf;

/// Dockerfile optimizer that adds BuildKit cache mounts for package managers
#[derive(Parser, Debug)]
#[command(
    name = "cachepack",
    about = "Dockerfile optimizer that adds BuildKit cache mounts for package managers",
    version,
    long_about = "cachepack rewrites Dockerfiles so package-manager downloads persist across \
                  rebuilds: it adds --mount=type=cache options to recognized RUN instructions, \
                  inserts required setup commands, and removes cache-defeating commands, \
                  without changing the build's observable behavior.\n\n\
                  Examples:\n  \
                  cachepack Dockerfile\n  \
                  cachepack Dockerfile -o Dockerfile.cached\n  \
                  cachepack ./dockerfiles -o ./optimized -S\n  \
                  cachepack Dockerfile --rules my-rules.yaml"
)]
pub struct CliArgs {
    #[arg(
        value_name = "INPUT",
        help = "Dockerfile to optimize, or a directory of them (processed recursively)"
    )]
    pub input: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_name = "PATH",
        help = "Output file (or directory when INPUT is a directory); defaults to INPUT plus the suffix"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        value_name = "SUFFIX",
        default_value = ".optimized",
        help = "Suffix for side-by-side output files; ignored when --output names a directory"
    )]
    pub suffix: String,

    #[arg(short = 'S', long, help = "Show optimization statistics")]
    pub stats: bool,

    #[arg(
        short = 'f',
        long,
        value_name = "FILE",
        default_value = "./cachepack-failures.txt",
        help = "Write the paths of files that failed to optimize to FILE"
    )]
    pub fail_file: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Load the package-manager rule table from FILE instead of the built-in one"
    )]
    pub rules: Option<PathBuf>,

    #[arg(
        long,
        help = "Delete cache-defeating commands outright instead of replacing them with 'true'"
    )]
    pub delete_removed: bool,

    #[arg(long, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}
