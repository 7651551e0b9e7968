//! Search document structures and indexing

use crate::models::{EntityKind, EntityRecord, Environment, TenantId};
use serde::{Deserialize, Serialize};
use tantivy::schema::*;
use tantivy::schema::Value;
use tantivy::TantivyDocument;
use uuid::Uuid;

pub(crate) const ID: &str = "id";
pub(crate) const TENANT: &str = "tenant";
pub(crate) const ENVIRONMENT: &str = "environment";
pub(crate) const KIND: &str = "kind";
pub(crate) const REFERENCE_NUMBER: &str = "reference_number";
pub(crate) const CUSTOMER_NAME: &str = "customer_name";
pub(crate) const CUSTOMER_EMAIL: &str = "customer_email";
pub(crate) const STATUS: &str = "status";
pub(crate) const ORGANISATION_ID: &str = "organisation_id";
pub(crate) const PRODUCT_ID: &str = "product_id";
pub(crate) const PRODUCT_NAME: &str = "product_name";
pub(crate) const IS_TEST_DATA: &str = "is_test_data";
pub(crate) const CREATED_TICKS: &str = "created_ticks";
pub(crate) const LAST_MODIFIED_TICKS: &str = "last_modified_ticks";
pub(crate) const LAST_MODIFIED_BY_USER_TICKS: &str = "last_modified_by_user_ticks";

/// Denormalized projection of a policy or quote, ready to be written to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: Uuid,
    pub tenant: TenantId,
    pub environment: Environment,
    pub kind: EntityKind,
    pub reference_number: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub status: String,
    pub organisation_id: Option<Uuid>,
    pub product_id: Option<String>,

    /// Joined in from the product lookup; the read model does not carry it
    pub product_name: Option<String>,

    pub is_test_data: bool,
    pub created_ticks: i64,
    pub last_modified_ticks: i64,
    pub last_modified_by_user_ticks: Option<i64>,
}

impl IndexDocument {
    /// Project a read-model record; `product_name` is filled in by enrichment
    pub fn from_record(record: EntityRecord, product_name: Option<String>) -> Self {
        Self {
            id: record.id,
            tenant: record.tenant,
            environment: record.environment,
            kind: record.kind,
            reference_number: record.reference_number,
            customer_name: record.customer_name,
            customer_email: record.customer_email,
            status: record.status,
            organisation_id: record.organisation_id,
            product_id: record.product_id,
            product_name,
            is_test_data: record.is_test_data,
            created_ticks: record.created_ticks,
            last_modified_ticks: record.last_modified_ticks,
            last_modified_by_user_ticks: record.last_modified_by_user_ticks,
        }
    }

    /// Term value used for replace-by-id upserts
    pub fn document_id(&self) -> String {
        self.id.to_string()
    }

    /// Convert to a Tantivy document
    pub fn to_tantivy_doc(&self, fields: &IndexFields) -> TantivyDocument {
        let mut doc = TantivyDocument::new();

        doc.add_text(fields.id, self.id.to_string());
        doc.add_text(fields.tenant, self.tenant.as_str());
        doc.add_text(fields.environment, self.environment.to_string());
        doc.add_text(fields.kind, self.kind.to_string());
        doc.add_text(fields.reference_number, &self.reference_number);
        if let Some(ref name) = self.customer_name {
            doc.add_text(fields.customer_name, name);
        }
        if let Some(ref email) = self.customer_email {
            doc.add_text(fields.customer_email, email);
        }
        doc.add_text(fields.status, &self.status);
        if let Some(organisation_id) = self.organisation_id {
            doc.add_text(fields.organisation_id, organisation_id.to_string());
        }
        if let Some(ref product_id) = self.product_id {
            doc.add_text(fields.product_id, product_id);
        }
        if let Some(ref product_name) = self.product_name {
            doc.add_text(fields.product_name, product_name);
        }
        doc.add_bool(fields.is_test_data, self.is_test_data);
        doc.add_i64(fields.created_ticks, self.created_ticks);
        doc.add_i64(fields.last_modified_ticks, self.last_modified_ticks);
        if let Some(ticks) = self.last_modified_by_user_ticks {
            doc.add_i64(fields.last_modified_by_user_ticks, ticks);
        }

        doc
    }

    /// Rebuild a document from its stored fields; `None` if identity fields are missing
    pub fn from_tantivy_doc(doc: &TantivyDocument, fields: &IndexFields) -> Option<Self> {
        let text = |field: Field| -> Option<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        let int = |field: Field| -> Option<i64> { doc.get_first(field).and_then(|v| v.as_i64()) };

        Some(Self {
            id: text(fields.id)?.parse().ok()?,
            tenant: TenantId::new(text(fields.tenant)?).ok()?,
            environment: text(fields.environment)?.parse().ok()?,
            kind: text(fields.kind)?.parse().ok()?,
            reference_number: text(fields.reference_number).unwrap_or_default(),
            customer_name: text(fields.customer_name),
            customer_email: text(fields.customer_email),
            status: text(fields.status).unwrap_or_default(),
            organisation_id: text(fields.organisation_id).and_then(|s| s.parse().ok()),
            product_id: text(fields.product_id),
            product_name: text(fields.product_name),
            is_test_data: doc
                .get_first(fields.is_test_data)
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            created_ticks: int(fields.created_ticks).unwrap_or_default(),
            last_modified_ticks: int(fields.last_modified_ticks)?,
            last_modified_by_user_ticks: int(fields.last_modified_by_user_ticks),
        })
    }
}

/// Resolved field handles of the entity schema
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub id: Field,
    pub tenant: Field,
    pub environment: Field,
    pub kind: Field,
    pub reference_number: Field,
    pub customer_name: Field,
    pub customer_email: Field,
    pub status: Field,
    pub organisation_id: Field,
    pub product_id: Field,
    pub product_name: Field,
    pub is_test_data: Field,
    pub created_ticks: Field,
    pub last_modified_ticks: Field,
    pub last_modified_by_user_ticks: Field,
}

impl IndexFields {
    /// Resolve every field; fails if the index was built with a different schema
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            id: schema.get_field(ID)?,
            tenant: schema.get_field(TENANT)?,
            environment: schema.get_field(ENVIRONMENT)?,
            kind: schema.get_field(KIND)?,
            reference_number: schema.get_field(REFERENCE_NUMBER)?,
            customer_name: schema.get_field(CUSTOMER_NAME)?,
            customer_email: schema.get_field(CUSTOMER_EMAIL)?,
            status: schema.get_field(STATUS)?,
            organisation_id: schema.get_field(ORGANISATION_ID)?,
            product_id: schema.get_field(PRODUCT_ID)?,
            product_name: schema.get_field(PRODUCT_NAME)?,
            is_test_data: schema.get_field(IS_TEST_DATA)?,
            created_ticks: schema.get_field(CREATED_TICKS)?,
            last_modified_ticks: schema.get_field(LAST_MODIFIED_TICKS)?,
            last_modified_by_user_ticks: schema.get_field(LAST_MODIFIED_BY_USER_TICKS)?,
        })
    }

    /// Fields searched by free-text queries
    pub fn text_fields(&self) -> Vec<Field> {
        vec![
            self.reference_number,
            self.customer_name,
            self.customer_email,
            self.product_name,
        ]
    }
}

/// Build the search schema shared by policy and quote indexes
pub fn build_entity_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    // Identity - exact match, used as the upsert key
    schema_builder.add_text_field(ID, STRING | STORED);
    schema_builder.add_text_field(TENANT, STRING | STORED);
    schema_builder.add_text_field(ENVIRONMENT, STRING | STORED);
    schema_builder.add_text_field(KIND, STRING | STORED);

    // Searchable fields
    schema_builder.add_text_field(REFERENCE_NUMBER, TEXT | STORED);
    schema_builder.add_text_field(CUSTOMER_NAME, TEXT | STORED);
    schema_builder.add_text_field(CUSTOMER_EMAIL, TEXT | STORED);
    schema_builder.add_text_field(PRODUCT_NAME, TEXT | STORED);

    // Filterable fields
    schema_builder.add_text_field(STATUS, STRING | STORED);
    schema_builder.add_text_field(ORGANISATION_ID, STRING | STORED);
    schema_builder.add_text_field(PRODUCT_ID, STRING | STORED);
    schema_builder.add_bool_field(IS_TEST_DATA, INDEXED | STORED);

    // Timestamps in ticks, fast for range filters and watermark lookups
    schema_builder.add_i64_field(CREATED_TICKS, INDEXED | STORED | FAST);
    schema_builder.add_i64_field(LAST_MODIFIED_TICKS, INDEXED | STORED | FAST);
    schema_builder.add_i64_field(LAST_MODIFIED_BY_USER_TICKS, STORED | FAST);

    schema_builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> EntityRecord {
        EntityRecord::new(
            Uuid::new_v4(),
            TenantId::new("acme").unwrap(),
            Environment::Production,
            EntityKind::Policy,
            "P-0001",
            100,
            200,
        )
        .with_customer("Jane Citizen", Some("jane@example.com".to_string()))
        .with_product("motor")
    }

    #[test]
    fn test_record_to_document() {
        let record = sample_record();
        let doc = IndexDocument::from_record(record.clone(), Some("Motor Cover".to_string()));
        assert_eq!(doc.id, record.id);
        assert_eq!(doc.product_name.as_deref(), Some("Motor Cover"));
        assert_eq!(doc.last_modified_ticks, 200);
    }

    #[test]
    fn test_tantivy_document_preserves_stored_fields() {
        let schema = build_entity_schema();
        let fields = IndexFields::from_schema(&schema).unwrap();
        let doc = IndexDocument::from_record(sample_record(), Some("Motor Cover".to_string()));

        let tantivy_doc = doc.to_tantivy_doc(&fields);
        let restored = IndexDocument::from_tantivy_doc(&tantivy_doc, &fields).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_schema_building() {
        let schema = build_entity_schema();
        assert!(schema.get_field(ID).is_ok());
        assert!(schema.get_field(LAST_MODIFIED_TICKS).is_ok());
        assert!(schema.get_field(PRODUCT_NAME).is_ok());
        assert!(IndexFields::from_schema(&schema).is_ok());
    }
}
