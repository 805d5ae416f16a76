use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use parking_lot::RwLock;

use crate::repositories::errors::identity_directory_errors::IdentityDirectoryError;

#[cfg(test)]
use mockall::automock;

/// Lookup between verified identities and public display handles. Handle
/// registration lives outside this crate; the directory only reads.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn display_handle(&self, identity: &str)
        -> Result<Option<String>, IdentityDirectoryError>;

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, IdentityDirectoryError>;
}

/// Reads the users table: `id` is the identity, `handle` the display handle,
/// with a `GSI_UserByHandle` index for reverse lookups.
pub struct DynamoDbIdentityDirectory {
    pub client: Client,
    pub table_name: String,
}

impl DynamoDbIdentityDirectory {
    pub fn new(client: Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

fn string_attribute(
    item: &HashMap<String, AttributeValue>,
    name: &str,
) -> Result<Option<String>, IdentityDirectoryError> {
    match item.get(name) {
        Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
        Some(_) => Err(IdentityDirectoryError::Serialization(format!(
            "attribute {} is not a string",
            name
        ))),
        None => Ok(None),
    }
}

#[async_trait]
impl IdentityDirectory for DynamoDbIdentityDirectory {
    async fn display_handle(
        &self,
        identity: &str,
    ) -> Result<Option<String>, IdentityDirectoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(identity.to_string()))
            .projection_expression("handle")
            .send()
            .await
            .map_err(|e| IdentityDirectoryError::DynamoDb(e.to_string()))?;

        match output.item {
            Some(item) => string_attribute(&item, "handle"),
            None => Ok(None),
        }
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, IdentityDirectoryError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name("GSI_UserByHandle")
            .key_condition_expression("handle = :handle")
            .expression_attribute_values(":handle", AttributeValue::S(handle.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| IdentityDirectoryError::DynamoDb(e.to_string()))?;

        match output.items.unwrap_or_default().into_iter().next() {
            Some(item) => string_attribute(&item, "id"),
            None => Ok(None),
        }
    }
}

/// Fixed directory for local runs and tests. Handle lookups ignore ASCII case.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    handles: RwLock<HashMap<String, String>>,
}

impl InMemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player(self, identity: &str, handle: &str) -> Self {
        self.insert(identity, handle);
        self
    }

    pub fn insert(&self, identity: &str, handle: &str) {
        self.handles
            .write()
            .insert(identity.to_string(), handle.to_string());
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn display_handle(
        &self,
        identity: &str,
    ) -> Result<Option<String>, IdentityDirectoryError> {
        Ok(self.handles.read().get(identity).cloned())
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, IdentityDirectoryError> {
        Ok(self
            .handles
            .read()
            .iter()
            .find(|(_, known)| known.eq_ignore_ascii_case(handle))
            .map(|(identity, _)| identity.clone()))
    }
}
