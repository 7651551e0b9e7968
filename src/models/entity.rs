use crate::models::tenant::{EntityKind, Environment, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the policy/quote read model, as handed out by an `EntityBatchSource`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity identifier (policy id or quote id)
    pub id: Uuid,

    /// Owning tenant
    pub tenant: TenantId,

    /// Environment the entity lives in
    pub environment: Environment,

    /// Policy or quote
    pub kind: EntityKind,

    /// Policy number or quote number
    pub reference_number: String,

    /// Customer display name
    #[serde(default)]
    pub customer_name: Option<String>,

    /// Customer email address
    #[serde(default)]
    pub customer_email: Option<String>,

    /// Lifecycle status (e.g. "Active", "Cancelled", "Incomplete")
    pub status: String,

    /// Organisation that owns the entity
    #[serde(default)]
    pub organisation_id: Option<Uuid>,

    /// Product reference; the display name is joined in at enrichment time
    #[serde(default)]
    pub product_id: Option<String>,

    /// Whether the entity was created as test data
    #[serde(default)]
    pub is_test_data: bool,

    /// Creation time in ticks since the Unix epoch
    pub created_ticks: i64,

    /// Last modification time in ticks since the Unix epoch
    pub last_modified_ticks: i64,

    /// Last modification made by a user (as opposed to a system process)
    #[serde(default)]
    pub last_modified_by_user_ticks: Option<i64>,
}

impl EntityRecord {
    /// Create a minimal record; remaining fields default to empty
    pub fn new(
        id: Uuid,
        tenant: TenantId,
        environment: Environment,
        kind: EntityKind,
        reference_number: impl Into<String>,
        created_ticks: i64,
        last_modified_ticks: i64,
    ) -> Self {
        Self {
            id,
            tenant,
            environment,
            kind,
            reference_number: reference_number.into(),
            customer_name: None,
            customer_email: None,
            status: "Active".to_string(),
            organisation_id: None,
            product_id: None,
            is_test_data: false,
            created_ticks,
            last_modified_ticks,
            last_modified_by_user_ticks: None,
        }
    }

    pub fn with_customer(mut self, name: impl Into<String>, email: Option<String>) -> Self {
        self.customer_name = Some(name.into());
        self.customer_email = email;
        self
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_organisation(mut self, organisation_id: Uuid) -> Self {
        self.organisation_id = Some(organisation_id);
        self
    }

    pub fn as_test_data(mut self) -> Self {
        self.is_test_data = true;
        self
    }

    /// Record a modification at the given tick
    pub fn touch(&mut self, ticks: i64, by_user: bool) {
        self.last_modified_ticks = ticks;
        if by_user {
            self.last_modified_by_user_ticks = Some(ticks);
        }
    }
}
