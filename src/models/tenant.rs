use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Tenant alias used to namespace every index directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id, rejecting anything that could escape its directory
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidTenantId> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(InvalidTenantId(value));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(InvalidTenantId(value));
        }
        if trimmed
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control())
        {
            return Err(InvalidTenantId(value));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = InvalidTenantId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = InvalidTenantId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.0
    }
}

/// Rejected tenant alias
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid tenant id: {0:?}")]
pub struct InvalidTenantId(pub String);

/// Deployment environment an index belongs to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    /// All environments in the order they are regenerated
    pub fn all() -> Vec<Environment> {
        Environment::iter().collect()
    }
}

/// Business entity kind that owns a separate index
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EntityKind {
    Policy,
    Quote,
}

impl EntityKind {
    pub fn all() -> Vec<EntityKind> {
        EntityKind::iter().collect()
    }
}

/// The (tenant, environment, kind) triple every index operation is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    pub tenant: TenantId,
    pub environment: Environment,
    pub kind: EntityKind,
}

impl IndexKey {
    pub fn new(tenant: TenantId, environment: Environment, kind: EntityKind) -> Self {
        Self {
            tenant,
            environment,
            kind,
        }
    }

    /// Directory of this triple relative to the index root
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.tenant.as_str())
            .join(self.environment.to_string())
            .join(self.kind.to_string())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.environment, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_validation() {
        assert!(TenantId::new("carl").is_ok());
        assert_eq!(TenantId::new("  acme ").unwrap().as_str(), "acme");
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("..").is_err());
        assert!(TenantId::new("a/b").is_err());
        assert!(TenantId::new("a\\b").is_err());
    }

    #[test]
    fn test_environment_round_trip() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(
            "Staging".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(Environment::all().len(), 3);
    }

    #[test]
    fn test_index_key_relative_path() {
        let key = IndexKey::new(
            TenantId::new("acme").unwrap(),
            Environment::Staging,
            EntityKind::Quote,
        );
        assert_eq!(key.relative_path(), PathBuf::from("acme/staging/quote"));
        assert_eq!(key.to_string(), "acme/staging/quote");
    }
}
