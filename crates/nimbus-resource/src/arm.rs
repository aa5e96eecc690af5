//! Typed and generic ARM resource envelopes.
//!
//! [`ArmResource<P>`] is the persisted unit for top-level resources,
//! [`ArmSubresource<P>`] for resources nested under a parent (which
//! inherit location/tags/sku/kind conceptually from that parent and so
//! do not carry them). [`GenericResource`] keeps the properties as raw
//! JSON and converts to a concrete type on demand.
//!
//! Stored documents are camelCase on the wire; each envelope field
//! also accepts its PascalCase spelling on read, so documents written
//! by older tooling still parse.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ResourceId;

/// Failure to convert a [`GenericResource`] into a typed resource.
#[derive(Debug, Error)]
#[error("cannot convert resource '{id}' to {target}: {source}")]
pub struct ConversionError {
    /// Id of the resource that failed to convert.
    pub id: String,
    /// The Rust type the properties were deserialized into.
    pub target: &'static str,
    #[source]
    source: serde_json::Error,
}

/// SKU descriptor carried by some resource kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    /// SKU name, e.g. `Standard`.
    #[serde(alias = "Name")]
    pub name: String,
    /// Optional tier, e.g. `Basic`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Tier")]
    pub tier: Option<String>,
    /// Optional capacity units.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Capacity")]
    pub capacity: Option<i32>,
}

/// A top-level ARM resource with typed properties.
///
/// The id is the single source of truth for the resource's place in
/// the hierarchy: `name` and `resource_type` are derived from it at
/// construction time and scope predicates delegate to it. Ids must
/// only ever be produced through [`ResourceId`] constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmResource<P> {
    /// Canonical resource id.
    #[serde(alias = "Id")]
    pub id: ResourceId,
    /// Resource name (last id segment).
    #[serde(alias = "Name")]
    pub name: String,
    /// Fully qualified type, e.g. `Microsoft.EventHub/namespaces`.
    #[serde(rename = "type", alias = "Type")]
    pub resource_type: String,
    /// Region, e.g. `westeurope`.
    #[serde(alias = "Location")]
    pub location: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", alias = "Tags")]
    pub tags: BTreeMap<String, String>,
    /// Optional SKU.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Sku")]
    pub sku: Option<Sku>,
    /// Optional kind discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "Kind")]
    pub kind: Option<String>,
    /// Service-specific properties.
    #[serde(alias = "Properties")]
    pub properties: P,
}

impl<P> ArmResource<P> {
    /// Creates a resource whose name and type are derived from `id`.
    #[must_use]
    pub fn new(id: ResourceId, location: impl Into<String>, properties: P) -> Self {
        Self {
            name: id.name().to_owned(),
            resource_type: id.full_type(),
            id,
            location: location.into(),
            tags: BTreeMap::new(),
            sku: None,
            kind: None,
            properties,
        }
    }

    /// Adds tags, consuming and returning the resource.
    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the SKU, consuming and returning the resource.
    #[must_use]
    pub fn with_sku(mut self, sku: Sku) -> Self {
        self.sku = Some(sku);
        self
    }

    /// The subscription segment of the resource's id.
    #[must_use]
    pub fn subscription(&self) -> Option<&str> {
        self.id.subscription()
    }

    /// The resource-group segment of the resource's id.
    #[must_use]
    pub fn resource_group(&self) -> Option<&str> {
        self.id.resource_group()
    }

    /// Returns `true` iff the resource lives in subscription `sub`.
    #[must_use]
    pub fn is_in_subscription(&self, sub: &str) -> bool {
        self.id.is_in_subscription(sub)
    }

    /// Returns `true` iff the resource lives in resource group `rg`.
    #[must_use]
    pub fn is_in_resource_group(&self, rg: &str) -> bool {
        self.id.is_in_resource_group(rg)
    }
}

/// A resource with untyped (raw JSON) properties.
///
/// Structurally identical to [`ArmResource`]; used wherever the
/// concrete property type is only known at dispatch time, e.g. the
/// declared resource list of a deployment.
pub type GenericResource = ArmResource<serde_json::Value>;

impl GenericResource {
    /// Converts into a typed resource by deserializing the raw
    /// properties as `P`.
    ///
    /// The envelope fields are moved as-is; only the properties pass
    /// through serde. The round-trip is semantically lossless for any
    /// properties type whose serialization is.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the stored properties do not
    /// match the shape of `P`.
    pub fn into_typed<P: DeserializeOwned>(self) -> Result<ArmResource<P>, ConversionError> {
        let properties =
            serde_json::from_value(self.properties).map_err(|source| ConversionError {
                id: self.id.as_str().to_owned(),
                target: std::any::type_name::<P>(),
                source,
            })?;
        Ok(ArmResource {
            id: self.id,
            name: self.name,
            resource_type: self.resource_type,
            location: self.location,
            tags: self.tags,
            sku: self.sku,
            kind: self.kind,
            properties,
        })
    }
}

/// A resource nested under another resource's id.
///
/// Carries no location/tags/sku/kind of its own; those are the
/// parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmSubresource<P> {
    /// Canonical subresource id (parent id plus `/{type}/{name}`).
    #[serde(alias = "Id")]
    pub id: ResourceId,
    /// Subresource name (last id segment).
    #[serde(alias = "Name")]
    pub name: String,
    /// Fully qualified type, e.g. `Microsoft.ServiceBus/namespaces/queues`.
    #[serde(rename = "type", alias = "Type")]
    pub resource_type: String,
    /// Service-specific properties.
    #[serde(alias = "Properties")]
    pub properties: P,
}

impl<P> ArmSubresource<P> {
    /// Creates a subresource whose name and type are derived from `id`.
    #[must_use]
    pub fn new(id: ResourceId, properties: P) -> Self {
        Self {
            name: id.name().to_owned(),
            resource_type: id.full_type(),
            id,
            properties,
        }
    }

    /// Returns `true` iff the subresource lives in subscription `sub`.
    #[must_use]
    pub fn is_in_subscription(&self, sub: &str) -> bool {
        self.id.is_in_subscription(sub)
    }

    /// Returns `true` iff the subresource lives in resource group `rg`.
    #[must_use]
    pub fn is_in_resource_group(&self, rg: &str) -> bool {
        self.id.is_in_resource_group(rg)
    }
}
