//! Non-interactive subcommands.

use color_eyre::{eyre::eyre, Report, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::{ApiError, InventoryClient, LogAction, LogEntry, Product, ProductForm};
use crate::config::Config;
use crate::forms::{
  apply_server_errors, normalize_product, password_strength, Credentials, FieldErrors, RegisterForm,
};
use crate::session::{Access, Redirect, Role, Session, SessionContext};

pub const LOGIN_HINT: &str = "Run `stockroom login` to sign in.";

fn api_error(err: ApiError) -> Report {
  if err.is_auth_failure() {
    return eyre!("Session expired. {}", LOGIN_HINT);
  }
  eyre!("{}", err.user_message())
}

fn form_error(errors: &FieldErrors) -> Report {
  eyre!("{}", errors.messages().join("\n"))
}

/// Field errors for rejected form submissions, plain messages otherwise.
fn submit_error(err: ApiError) -> Report {
  match err {
    ApiError::Validation { .. } => form_error(&apply_server_errors(&err)),
    other => api_error(other),
  }
}

/// Fail unless the stored session grants `access`.
pub fn require(session: &SessionContext, access: Access) -> Result<()> {
  session.authorize(access).map_err(|redirect| match redirect {
    Redirect::Login {
      session_expired: true,
    } => eyre!("Session expired. {}", LOGIN_HINT),
    Redirect::Login { .. } => eyre!("Not logged in. {}", LOGIN_HINT),
    Redirect::Forbidden => eyre!("This command is available to managers only."),
  })
}

pub async fn login(client: &InventoryClient, username: &str) -> Result<()> {
  let credentials = Credentials::new(username, Config::get_password()?);
  let errors = credentials.validate();
  if !errors.is_empty() {
    return Err(form_error(&errors));
  }

  let (username, password) = credentials.trimmed();
  match client.login(username, password).await {
    Ok(session) => {
      println!("Logged in as {}", describe(&session));
      Ok(())
    }
    Err(e) => Err(form_error(&apply_server_errors(&e))),
  }
}

pub fn logout(session: &SessionContext) {
  session.logout();
  println!("Logged out.");
}

pub fn whoami(session: &SessionContext) {
  match session.current() {
    Some(current) => println!("{}", describe(&current)),
    None => println!("Not logged in. {}", LOGIN_HINT),
  }
}

fn describe(session: &Session) -> String {
  format!(
    "{} ({})",
    session.username.as_deref().unwrap_or("unknown user"),
    session.role.map(Role::label).unwrap_or("unknown role")
  )
}

/// Strength meter line, e.g. `Password strength: [###-] 3/4`.
pub fn strength_meter(password: &str) -> String {
  let level = password_strength(password) as usize;
  format!(
    "Password strength: [{}{}] {}/4",
    "#".repeat(level),
    "-".repeat(4 - level),
    level
  )
}

pub async fn register(client: &InventoryClient, username: &str, role: Role) -> Result<()> {
  require(client.session(), Access::Manager)?;

  let form = RegisterForm::new(Credentials::new(username, Config::get_password()?)).with_role(role);
  let errors = form.validate();
  if !errors.is_empty() {
    return Err(form_error(&errors));
  }

  let (username, password) = form.credentials.trimmed();
  println!("{}", strength_meter(password));
  client
    .register_employee(username, password, form.role)
    .await
    .map_err(submit_error)?;

  info!(username, role = form.role.label(), "account registered");
  println!("Registered {} as {}", username, form.role.label());
  Ok(())
}

/// Entries `viewer` may see, narrowed to usernames containing `employee`.
///
/// Managers see everything; everyone else only their own entries.
pub fn visible_logs(entries: Vec<LogEntry>, viewer: &Session, employee: Option<&str>) -> Vec<LogEntry> {
  let needle = employee
    .map(|e| e.trim().to_lowercase())
    .filter(|e| !e.is_empty());

  entries
    .into_iter()
    .filter(|entry| {
      viewer.is_manager() || viewer.username.as_deref() == Some(entry.user.username.as_str())
    })
    .filter(|entry| match &needle {
      Some(needle) => entry.user.username.to_lowercase().contains(needle),
      None => true,
    })
    .collect()
}

fn action_label(action: LogAction) -> &'static str {
  match action {
    LogAction::Set => "set",
    LogAction::Add => "add",
    LogAction::Sub => "sub",
  }
}

pub async fn logs(client: &InventoryClient, warehouse_id: &str, employee: Option<&str>) -> Result<()> {
  require(client.session(), Access::Authenticated)?;
  let viewer = client
    .session()
    .current()
    .ok_or_else(|| eyre!("Not logged in. {}", LOGIN_HINT))?;

  let entries = client.list_logs(warehouse_id).await.map_err(api_error)?;
  let entries = visible_logs(entries, &viewer, employee);

  if entries.is_empty() {
    println!("No log entries.");
    return Ok(());
  }
  for entry in &entries {
    println!(
      "{}  {:<4} {:>6} -> {:<6} product {}  by {} ({})",
      entry.timestamp,
      action_label(entry.action),
      entry.old_quantity,
      entry.new_quantity,
      entry.product_id,
      entry.user.username,
      entry.user.role,
    );
  }
  Ok(())
}

pub async fn report(client: &InventoryClient, output: &Path) -> Result<()> {
  require(client.session(), Access::Manager)?;

  let bytes = client.export_report().await.map_err(api_error)?;
  tokio::fs::write(output, &bytes)
    .await
    .map_err(|e| eyre!("Failed to write report to {}: {}", output.display(), e))?;

  info!(path = %output.display(), size = bytes.len(), "report saved");
  println!("Report saved to {}", output.display());
  Ok(())
}

/// Fields changed by `product edit`; everything else keeps its value.
#[derive(Debug, Clone, Default)]
pub struct ProductEdit {
  pub name: Option<String>,
  pub quantity: Option<u32>,
  pub critical_value: Option<u32>,
  pub category: Option<String>,
  pub photo: Option<PathBuf>,
}

impl ProductEdit {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.quantity.is_none()
      && self.critical_value.is_none()
      && self.category.is_none()
      && self.photo.is_none()
  }

  /// Full form for `product` with this edit applied.
  pub fn apply_to(self, product: &Product) -> ProductForm {
    ProductForm {
      name: self.name.unwrap_or_else(|| product.name.clone()),
      quantity: self.quantity.unwrap_or(product.quantity),
      critical_value: self.critical_value.unwrap_or(product.critical_value),
      category: self.category.unwrap_or_else(|| product.category.clone()),
      photo: self.photo,
    }
  }
}

fn print_product(verb: &str, product: &Product) {
  println!(
    "{} {} [{}]: {} in stock, critical at {}",
    verb, product.name, product.id, product.quantity, product.critical_value
  );
}

pub async fn product_add(client: &InventoryClient, warehouse_id: &str, form: ProductForm) -> Result<()> {
  require(client.session(), Access::Manager)?;
  let form = normalize_product(form).map_err(|e| form_error(&e))?;

  let product = client
    .create_product(warehouse_id, &form)
    .await
    .map_err(submit_error)?;
  info!(warehouse = warehouse_id, product = %product.id, "product created");
  print_product("Created", &product);
  Ok(())
}

pub async fn product_edit(
  client: &InventoryClient,
  warehouse_id: &str,
  product_id: &str,
  edit: ProductEdit,
) -> Result<()> {
  require(client.session(), Access::Manager)?;
  if edit.is_empty() {
    return Err(eyre!("Nothing to change."));
  }

  // PUT replaces the whole product, so start from the current values
  let products = client
    .list_products(warehouse_id, "")
    .await
    .map_err(api_error)?;
  let current = products
    .iter()
    .find(|p| p.id == product_id)
    .ok_or_else(|| eyre!("No product {} in warehouse {}", product_id, warehouse_id))?;
  let form = normalize_product(edit.apply_to(current)).map_err(|e| form_error(&e))?;

  let product = client
    .update_product(warehouse_id, product_id, &form)
    .await
    .map_err(submit_error)?;
  info!(warehouse = warehouse_id, product = %product.id, "product updated");
  print_product("Updated", &product);
  Ok(())
}

pub async fn product_rm(client: &InventoryClient, warehouse_id: &str, product_id: &str) -> Result<()> {
  require(client.session(), Access::Manager)?;
  client
    .delete_product(warehouse_id, product_id)
    .await
    .map_err(api_error)?;
  info!(warehouse = warehouse_id, product = product_id, "product deleted");
  println!("Deleted product {}", product_id);
  Ok(())
}
