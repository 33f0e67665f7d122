//! Aurelia cart CLI - Drive the storefront cart from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Store a session token and load the cart
//! aurelia-cart login --token <TOKEN>
//!
//! # Show the cart
//! aurelia-cart show
//!
//! # Add two units of product 42
//! aurelia-cart add 42 -q 2
//!
//! # Type 3, 4, 5 into line 7's quantity field; only 5 is sent
//! aurelia-cart set 7 3 4 5
//!
//! # Remove a line, or everything
//! aurelia-cart remove 7
//! aurelia-cart clear
//! ```
//!
//! # Commands
//!
//! - `login` / `logout` - Manage the stored session token
//! - `show` - Print lines, subtotals, total and item count
//! - `add`, `set`, `remove`, `clear` - Cart mutations
//!
//! Notices raised by the cart are printed to stderr.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aurelia_core::{CartLineId, ProductId, Quantity};
use aurelia_storefront::StorefrontConfig;

mod commands;

use commands::{CliError, Context};

#[derive(Parser)]
#[command(name = "aurelia-cart")]
#[command(author, version, about = "Aurelia storefront cart client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a session token and load its cart
    Login {
        /// Bearer token issued by the storefront backend
        #[arg(short, long)]
        token: String,
    },
    /// Forget the session token and the local cart
    Logout,
    /// Print the cart
    Show,
    /// Add a product to the cart
    Add {
        /// Product ID
        product_id: ProductId,

        /// Units to add
        #[arg(short, long, default_value = "1")]
        quantity: Quantity,
    },
    /// Set a line's quantity, one value per keystroke
    Set {
        /// Cart line ID
        line_id: CartLineId,

        /// Values as typed; invalid ones are ignored
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },
    /// Remove a line from the cart
    Remove {
        /// Cart line ID
        line_id: CartLineId,
    },
    /// Remove everything from the cart
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::debug!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aurelia_storefront=info,aurelia_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    let ctx = Context::new(config)?;
    let notices = ctx.notifier().subscribe();

    let result = match cli.command {
        Commands::Login { token } => commands::session::login(&ctx, &token).await,
        Commands::Logout => commands::session::logout(&ctx).await,
        Commands::Show => commands::cart::show(&ctx).await,
        Commands::Add {
            product_id,
            quantity,
        } => commands::cart::add(&ctx, product_id, quantity).await,
        Commands::Set { line_id, values } => commands::cart::set(&ctx, line_id, &values).await,
        Commands::Remove { line_id } => commands::cart::remove(&ctx, line_id).await,
        Commands::Clear => commands::cart::clear(&ctx).await,
    };

    commands::print_notices(notices);
    ctx.shutdown().await;
    result
}
