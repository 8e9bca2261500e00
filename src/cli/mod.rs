use std::{
    io::{self, Write},
    path::PathBuf,
};

use cart_store::{
    carts::UserId,
    clock::SystemClock,
    config::StoreConfig,
    persistence::{FileStorage, RestoreOutcome},
    receipt::write_receipt,
    session::CartSession,
    store::Change,
};
use clap::{Args, Parser, Subcommand};
use rusty_money::iso::Currency;
use tracing::warn;

mod coupon;
mod items;

type Session = CartSession<FileStorage, SystemClock>;

#[derive(Debug, Parser)]
#[command(name = "cart-store", about = "Cart Store CLI", long_about = None)]
pub(crate) struct Cli {
    /// Directory holding the cart snapshot
    #[arg(long, global = true, env = "CART_STORE_DATA_DIR", default_value = ".cart-store")]
    data_dir: PathBuf,

    /// YAML store configuration
    #[arg(long, global = true, env = "CART_STORE_CONFIG")]
    config: Option<PathBuf>,

    /// Cart to operate on; defaults to the logged-in user, then the guest
    #[arg(long, global = true)]
    user: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "warn")]
    pub(crate) log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print a cart
    Show,
    /// Add an item, summing quantities for a known id
    Add(items::AddArgs),
    /// Set an item's quantity; zero removes it
    Update(items::UpdateArgs),
    /// Remove an item
    Remove(items::ItemArgs),
    /// Take one unit off an item
    Decrease(items::ItemArgs),
    /// Empty a cart
    Clear,
    /// Drop every cart and the stored snapshot
    ClearAll,
    /// Log a user in, merging the guest cart into theirs
    Login(LoginArgs),
    /// Log the current user out
    Logout,
    /// Apply or remove a coupon
    Coupon(coupon::CouponCommand),
}

#[derive(Debug, Args)]
struct LoginArgs {
    /// User id
    user: String,
}

impl Cli {
    pub(crate) fn run(self) -> Result<(), String> {
        let config = match &self.config {
            Some(path) => StoreConfig::load(path)
                .map_err(|error| format!("failed to load config {}: {error}", path.display()))?,
            None => StoreConfig::default(),
        };

        let mut session = CartSession::start(
            &config,
            FileStorage::new(&self.data_dir),
            SystemClock,
        );

        if let RestoreOutcome::Discarded(reason) = session.restore_outcome() {
            warn!(%reason, "stored cart could not be used, starting empty");
        }

        let user = self
            .user
            .map_or_else(|| session.store().active_user().clone(), UserId::new);

        let change = match self.command {
            Commands::Show => Change::Unchanged,
            Commands::Add(args) => items::add(&mut session, &user, args)?,
            Commands::Update(args) => items::update(&mut session, &user, &args)?,
            Commands::Remove(args) => items::remove(&mut session, &user, &args)?,
            Commands::Decrease(args) => items::decrease(&mut session, &user, &args)?,
            Commands::Clear => session
                .apply(|store| Ok(store.clear_cart(&user)))
                .map_err(|error| format!("failed to clear cart: {error}"))?,
            Commands::ClearAll => session
                .reset()
                .map_err(|error| format!("failed to remove stored cart: {error}"))?,
            Commands::Login(args) => {
                let change = session
                    .apply(|store| store.login(UserId::new(args.user)))
                    .map_err(|error| format!("failed to log in: {error}"))?;

                let active = session.store().active_user().clone();

                return finish(session, &config, &active, change);
            }
            Commands::Logout => session
                .apply(|store| Ok(store.logout()))
                .map_err(|error| format!("failed to log out: {error}"))?,
            Commands::Coupon(command) => coupon::run(&mut session, &user, command)?,
        };

        finish(session, &config, &user, change)
    }
}

fn finish(
    session: Session,
    config: &StoreConfig,
    user: &UserId,
    change: Change,
) -> Result<(), String> {
    let currency = config
        .currency()
        .map_err(|error| format!("invalid config: {error}"))?;

    let mut out = io::stdout().lock();

    let result = print_cart(&mut out, &session, user, change, currency);

    session.shutdown();

    result
}

fn print_cart(
    out: &mut impl Write,
    session: &Session,
    user: &UserId,
    change: Change,
    currency: &'static Currency,
) -> Result<(), String> {
    let version = session.store().version(user.as_str());

    let status = match change {
        Change::Applied => "updated",
        Change::Unchanged => "unchanged",
    };

    writeln!(out, "cart: {user} (version {version}, {status})")
        .map_err(|error| format!("failed to write output: {error}"))?;

    match session.store().cart(user.as_str()) {
        Some(cart) => write_receipt(out, cart, currency)
            .map_err(|error| format!("failed to render cart: {error}")),
        None => writeln!(out, "Cart is empty")
            .map_err(|error| format!("failed to write output: {error}")),
    }
}
