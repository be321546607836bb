use crate::api::ListItem;

/// Category selection for a list. Applied locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
  #[default]
  All,
  Only(String),
}

impl CategoryFilter {
  pub fn label(&self) -> &str {
    match self {
      Self::All => "All",
      Self::Only(category) => category,
    }
  }
}

/// Filter state owned by a list page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
  /// Raw search text as typed
  pub text: String,
  pub category: CategoryFilter,
}

impl ListFilter {
  /// Category match plus a case-insensitive name substring match.
  pub fn matches<T: ListItem>(&self, item: &T) -> bool {
    let category_ok = match &self.category {
      CategoryFilter::All => true,
      CategoryFilter::Only(wanted) => item.category().is_some_and(|c| c.trim() == wanted),
    };
    if !category_ok {
      return false;
    }

    let needle = self.text.trim().to_lowercase();
    needle.is_empty() || item.display_name().to_lowercase().contains(&needle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Warehouse;

  fn warehouse(name: &str, category: Option<&str>) -> Warehouse {
    Warehouse {
      id: name.to_string(),
      name: name.to_string(),
      address: None,
      category: category.map(str::to_string),
    }
  }

  #[test]
  fn test_name_match_is_case_insensitive() {
    let filter = ListFilter {
      text: "  main ".to_string(),
      category: CategoryFilter::All,
    };
    assert!(filter.matches(&warehouse("Main St", None)));
    assert!(!filter.matches(&warehouse("Harbor", None)));
  }

  #[test]
  fn test_category_excludes_uncategorized() {
    let filter = ListFilter {
      text: String::new(),
      category: CategoryFilter::Only("B".to_string()),
    };
    assert!(filter.matches(&warehouse("Harbor", Some("B"))));
    assert!(!filter.matches(&warehouse("Main St", Some("A"))));
    assert!(!filter.matches(&warehouse("Depot", None)));
  }
}
