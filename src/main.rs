use testforge::cli::commands::{CliArgs, Commands};
use testforge::cli::handlers::{handle_cleanup, handle_generate, handle_health};
use testforge::{TestforgeConfig, VERSION};

use clap::Parser;
use std::env;
use tracing::{debug, error, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Credentials and table locations come from the environment; a local
    // .env is the supported way to provide them
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("testforge v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let config = TestforgeConfig::default();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }

    let exit_code = match &args.command {
        Commands::Generate(generate_args) => handle_generate(generate_args, config).await,
        Commands::Cleanup => handle_cleanup(config).await,
        Commands::Health => handle_health(config).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            testforge::util::parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str =
                env::var("TESTFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            testforge::util::parse_level(&level_str)
        };

        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            filter = filter
                .add_directive(format!("testforge={}", level).parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap());
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}
