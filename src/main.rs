use anyhow::Result;
use clap::Parser;
use lm_finetune::cli::Cli;

fn main() -> Result<()> {
    // Results go to stdout as JSON, logs to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lm_finetune=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.run()
}
