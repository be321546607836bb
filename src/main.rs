mod api;
mod app;
mod cache;
mod cli;
mod commands;
mod config;
mod event;
mod forms;
mod logging;
mod query;
mod session;
mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use api::{InventoryClient, ProductForm};
use app::{App, ExitReason};
use cache::{CacheStorage, NoopStorage, PersistentCache, SqliteStorage};
use logging::LogTarget;
use session::{Access, Role, SessionContext};
use ui::view::ViewContext;

#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(about = "A terminal client for warehouse inventory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/stockroom/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// API base url, overrides the config file
  #[arg(long, global = true)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Browse warehouses, stock and orders (default)
  Tui,
  /// Sign in; the password is read from STOCKROOM_PASSWORD
  Login {
    #[arg(short, long)]
    username: String,
  },
  /// Forget the stored session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Create an account (managers); the password is read from STOCKROOM_PASSWORD
  Register {
    #[arg(short, long)]
    username: String,
    #[arg(short, long, value_enum, default_value_t = RoleArg::Employee)]
    role: RoleArg,
  },
  /// Stock change history of a warehouse
  Logs {
    #[arg(short, long)]
    warehouse: String,
    /// Only entries whose username contains this text
    #[arg(short, long)]
    employee: Option<String>,
  },
  /// Download the product report (managers)
  Report {
    #[arg(short, long, default_value = "products_report.xlsx")]
    output: PathBuf,
  },
  /// Manage the products of a warehouse (managers)
  Product {
    #[command(subcommand)]
    action: ProductCmd,
  },
}

#[derive(Subcommand, Debug)]
enum ProductCmd {
  /// Create a product
  Add {
    #[arg(short, long)]
    warehouse: String,
    #[arg(short, long)]
    name: String,
    #[arg(short, long, default_value_t = 0)]
    quantity: u32,
    /// Quantity at or below which stock is critical
    #[arg(long, default_value_t = 0)]
    critical: u32,
    /// Defaults to "Общая"
    #[arg(long, default_value = "")]
    category: String,
    /// Image uploaded with the product
    #[arg(long)]
    photo: Option<PathBuf>,
  },
  /// Change some fields of a product
  Edit {
    #[arg(short, long)]
    warehouse: String,
    /// Product id
    id: String,
    #[arg(short, long)]
    name: Option<String>,
    #[arg(short, long)]
    quantity: Option<u32>,
    #[arg(long)]
    critical: Option<u32>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    photo: Option<PathBuf>,
  },
  /// Delete a product
  Rm {
    #[arg(short, long)]
    warehouse: String,
    /// Product id
    id: String,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RoleArg {
  Employee,
  Manager,
}

impl From<RoleArg> for Role {
  fn from(role: RoleArg) -> Self {
    match role {
      RoleArg::Employee => Role::Employee,
      RoleArg::Manager => Role::Manager,
    }
  }
}

/// Open the configured store, falling back to no caching at all.
fn open_storage(config: &config::Config) -> Arc<dyn CacheStorage> {
  let opened = match &config.cache.path {
    Some(path) => SqliteStorage::open(path),
    None => SqliteStorage::open_default(),
  };
  match opened {
    Ok(storage) => Arc::new(storage),
    Err(e) => {
      warn!(error = %e, "cache unavailable, continuing without it");
      Arc::new(NoopStorage)
    }
  }
}

async fn run_product(client: &InventoryClient, action: ProductCmd) -> Result<()> {
  match action {
    ProductCmd::Add {
      warehouse,
      name,
      quantity,
      critical,
      category,
      photo,
    } => {
      let form = ProductForm {
        name,
        quantity,
        critical_value: critical,
        category,
        photo,
      };
      cli::product_add(client, &warehouse, form).await
    }
    ProductCmd::Edit {
      warehouse,
      id,
      name,
      quantity,
      critical,
      category,
      photo,
    } => {
      let edit = cli::ProductEdit {
        name,
        quantity,
        critical_value: critical,
        category,
        photo,
      };
      cli::product_edit(client, &warehouse, &id, edit).await
    }
    ProductCmd::Rm { warehouse, id } => cli::product_rm(client, &warehouse, &id).await,
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let command = args.command.unwrap_or(Cmd::Tui);

  // The TUI owns the terminal, so it logs to a file
  let target = match command {
    Cmd::Tui => LogTarget::default_file()?,
    _ => LogTarget::Stderr,
  };
  let _log_guard = logging::init(target)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?.with_api_url(args.api_url);

  let storage = open_storage(&config);
  let session = SessionContext::persisted(PersistentCache::from_shared(storage.clone()));
  let cache = PersistentCache::from_shared(storage).with_ttl(config.cache_ttl());

  let client = InventoryClient::builder(config.api.url.clone())
    .session(session.clone())
    .timeout(config.timeout())
    .build()?;

  match command {
    Cmd::Tui => {
      cli::require(&session, Access::Authenticated)?;
      let ctx = ViewContext {
        client,
        cache,
        debounce: config.debounce(),
      };
      let mut app = App::new(config, ctx);
      if app.run().await? == ExitReason::SessionExpired {
        eprintln!("Session expired. {}", cli::LOGIN_HINT);
      }
    }
    Cmd::Login { username } => cli::login(&client, &username).await?,
    Cmd::Logout => cli::logout(&session),
    Cmd::Whoami => cli::whoami(&session),
    Cmd::Register { username, role } => cli::register(&client, &username, role.into()).await?,
    Cmd::Logs {
      warehouse,
      employee,
    } => cli::logs(&client, &warehouse, employee.as_deref()).await?,
    Cmd::Report { output } => cli::report(&client, &output).await?,
    Cmd::Product { action } => run_product(&client, action).await?,
  }

  Ok(())
}
