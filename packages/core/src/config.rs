/// Configuration for the nested-set engine and its storage adapters
use serde::{Deserialize, Serialize};

/// Upper bound on attempts to lock a tree whose id keeps changing under us
const MAX_SUPPORTED_LOCK_ATTEMPTS: u32 = 32;

/// Table and column names holding the nested-set attributes
///
/// Storage adapters build their statements from these names instead of
/// hard-coding them, so an existing table can be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestedSetColumns {
    pub table: String,
    pub id: String,
    pub tree: String,
    pub left: String,
    pub right: String,
    pub depth: String,
    pub name: String,
    pub properties: String,
}

impl Default for NestedSetColumns {
    fn default() -> Self {
        Self {
            table: "tree_nodes".to_string(),
            id: "id".to_string(),
            tree: "tree_id".to_string(),
            left: "lft".to_string(),
            right: "rgt".to_string(),
            depth: "depth".to_string(),
            name: "name".to_string(),
            properties: "properties".to_string(),
        }
    }
}

impl NestedSetColumns {
    /// Every configured name must be a plain SQL identifier
    pub fn validate(&self) -> Result<(), String> {
        let named = [
            ("table", &self.table),
            ("id", &self.id),
            ("tree", &self.tree),
            ("left", &self.left),
            ("right", &self.right),
            ("depth", &self.depth),
            ("name", &self.name),
            ("properties", &self.properties),
        ];

        for (attribute, value) in named {
            if !is_sql_identifier(value) {
                return Err(format!(
                    "column '{}' must be a plain identifier, got '{}'",
                    attribute, value
                ));
            }
        }

        let columns = &named[1..];
        for (index, (attribute, value)) in columns.iter().enumerate() {
            if let Some((other, _)) = columns[index + 1..].iter().find(|(_, v)| v == value) {
                return Err(format!(
                    "columns '{}' and '{}' both map to '{}'",
                    attribute, other, value
                ));
            }
        }
        Ok(())
    }
}

fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Attribute names of the nested-set table
    pub columns: NestedSetColumns,

    /// Whether a node may be detached into a new independent tree
    pub rootable: bool,

    /// Attempts at locking a node's tree before giving up
    pub max_lock_attempts: u32,

    /// Attribute used as the display label by default
    pub label_attribute: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            columns: NestedSetColumns::default(),
            rootable: true,
            max_lock_attempts: 3,
            label_attribute: "name".to_string(),
        }
    }
}

impl TreeConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| format!("invalid tree config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.columns.validate()?;

        if self.max_lock_attempts == 0 {
            return Err("max_lock_attempts must be greater than 0".to_string());
        }

        if self.max_lock_attempts > MAX_SUPPORTED_LOCK_ATTEMPTS {
            return Err(format!(
                "max_lock_attempts cannot exceed {}",
                MAX_SUPPORTED_LOCK_ATTEMPTS
            ));
        }

        if self.label_attribute.is_empty() {
            return Err("label_attribute cannot be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TreeConfig::default();
        assert!(config.rootable);
        assert_eq!(config.max_lock_attempts, 3);
        assert_eq!(config.columns.left, "lft");
        assert_eq!(config.columns.right, "rgt");
        assert_eq!(config.label_attribute, "name");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreeConfig::default();

        // Invalid: zero attempts
        config.max_lock_attempts = 0;
        assert!(config.validate().is_err());

        // Invalid: excessive attempts
        config.max_lock_attempts = 100;
        assert!(config.validate().is_err());

        // Invalid: empty label attribute
        config.max_lock_attempts = 3;
        config.label_attribute = String::new();
        assert!(config.validate().is_err());

        // Invalid: column name with SQL in it
        config.label_attribute = "name".to_string();
        config.columns.left = "lft; DROP TABLE x".to_string();
        assert!(config.validate().is_err());

        // Invalid: two attributes on one column
        config.columns.left = "rgt".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = TreeConfig::from_json_str(
            r#"{"rootable": false, "columns": {"left": "left_bound", "right": "right_bound"}}"#,
        )
        .unwrap();
        assert!(!config.rootable);
        assert_eq!(config.columns.left, "left_bound");
        assert_eq!(config.columns.depth, "depth");
        assert_eq!(config.max_lock_attempts, 3);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(TreeConfig::from_json_str("{not json").is_err());
        assert!(TreeConfig::from_json_str(r#"{"max_lock_attempts": 0}"#).is_err());
    }
}
