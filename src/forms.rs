//! Credential forms and their client-side validation.

use std::collections::BTreeMap;

use crate::api::{ApiError, ProductForm};
use crate::session::Role;

/// Category given to products created without one.
pub const DEFAULT_CATEGORY: &str = "Общая";

const PASSWORD_SPECIALS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

/// Validation errors keyed by field name, plus a form-level message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
  fields: BTreeMap<&'static str, String>,
  form: Option<String>,
}

impl FieldErrors {
  pub fn is_empty(&self) -> bool {
    self.fields.is_empty() && self.form.is_none()
  }

  #[cfg(test)]
  pub fn field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(String::as_str)
  }

  #[cfg(test)]
  pub fn form(&self) -> Option<&str> {
    self.form.as_deref()
  }

  fn set(&mut self, name: &'static str, error: Option<String>) {
    match error {
      Some(error) => {
        self.fields.insert(name, error);
      }
      None => {
        self.fields.remove(name);
      }
    }
  }

  /// Every error as `field: message` lines, form-level message first.
  pub fn messages(&self) -> Vec<String> {
    self
      .form
      .iter()
      .cloned()
      .chain(self.fields.iter().map(|(k, v)| format!("{}: {}", k, v)))
      .collect()
  }
}

pub fn validate_username(value: &str) -> Option<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Some("Username is required".to_string());
  }
  if trimmed.chars().count() < 3 {
    return Some("At least 3 characters".to_string());
  }
  let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '.');
  if !trimmed.chars().all(allowed) {
    return Some("Allowed: letters, digits, -, _, @, .".to_string());
  }
  None
}

pub fn validate_password(value: &str) -> Option<String> {
  let pwd = value.trim();
  if pwd.is_empty() {
    return Some("Password is required".to_string());
  }
  if pwd.chars().count() < 8 {
    return Some("At least 8 characters".to_string());
  }
  if !pwd.chars().any(|c| c.is_ascii_uppercase()) {
    return Some("Must contain an uppercase letter".to_string());
  }
  if !pwd.chars().any(|c| c.is_ascii_digit()) {
    return Some("Must contain a digit".to_string());
  }
  if !pwd.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
    return Some("Add a special character".to_string());
  }
  None
}

/// Strength meter level from 0 to 4: one level per two characters.
pub fn password_strength(value: &str) -> u8 {
  (value.chars().count() / 2).min(4) as u8
}

/// Username and password pair, shared by login and registration.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
  pub username: String,
  pub password: String,
}

impl Credentials {
  pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      password: password.into(),
    }
  }

  /// Check both fields. An empty result means the form may be submitted.
  pub fn validate(&self) -> FieldErrors {
    let mut errors = FieldErrors::default();
    errors.set("username", validate_username(&self.username));
    errors.set("password", validate_password(&self.password));
    errors
  }

  /// Values as sent to the server.
  pub fn trimmed(&self) -> (&str, &str) {
    (self.username.trim(), self.password.trim())
  }
}

/// Registration of a new account by a manager.
#[derive(Debug, Clone)]
pub struct RegisterForm {
  pub credentials: Credentials,
  pub role: Role,
}

impl RegisterForm {
  pub fn new(credentials: Credentials) -> Self {
    Self {
      credentials,
      role: Role::Employee,
    }
  }

  pub fn with_role(mut self, role: Role) -> Self {
    self.role = role;
    self
  }

  pub fn validate(&self) -> FieldErrors {
    self.credentials.validate()
  }
}

/// Map a failed submission onto the form.
///
/// Validation responses fill the matching fields and keep the server
/// message as a form-level error; anything else is form-level only.
pub fn apply_server_errors(err: &ApiError) -> FieldErrors {
  let mut errors = FieldErrors::default();
  if let ApiError::Validation { .. } = err {
    for field in ["username", "password"] {
      errors.set(field, err.field_error(field).map(str::to_string));
    }
  }
  let message = err.user_message();
  if !message.is_empty() {
    errors.form = Some(message);
  }
  errors
}

/// Trim a product form and fill in the default category.
pub fn normalize_product(mut form: ProductForm) -> Result<ProductForm, FieldErrors> {
  let mut errors = FieldErrors::default();

  form.name = form.name.trim().to_string();
  if form.name.is_empty() {
    errors.set("name", Some("Name is required".to_string()));
  }

  form.category = form.category.trim().to_string();
  if form.category.is_empty() {
    form.category = DEFAULT_CATEGORY.to_string();
  }

  if let Some(photo) = &form.photo {
    if !photo.is_file() {
      errors.set("photo", Some(format!("File not found: {}", photo.display())));
    }
  }

  if errors.is_empty() {
    Ok(form)
  } else {
    Err(errors)
  }
}
