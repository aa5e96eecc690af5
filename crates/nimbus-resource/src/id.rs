//! Canonical ARM resource identifiers.
//!
//! An ARM id is a `/`-separated path whose segment positions carry
//! meaning. That positional convention is defined exactly once, here:
//! constructors produce well-formed ids, [`ResourceId::parse`] reads
//! them back, and named accessors replace segment indexing everywhere
//! else in the workspace.
//!
//! Supported shapes:
//!
//! - subscription: `/subscriptions/{sub}`
//! - resource group: `/subscriptions/{sub}/resourceGroups/{rg}`
//! - regional resource:
//!   `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`
//! - subscription-scoped resource:
//!   `/subscriptions/{sub}/providers/{ns}/{type}/{name}`
//! - global resource: `/providers/{ns}/{type}/{name}`
//!
//! Nested subresource ids append `/{subresourceType}/{subresourceName}`
//! pairs after the resource name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while building or parsing a [`ResourceId`].
#[derive(Debug, Error)]
pub enum IdError {
    /// The id string does not follow any supported ARM id shape.
    #[error("malformed resource id '{id}': {reason}")]
    Malformed {
        /// The offending id string.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl IdError {
    fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// The ownership scope an id is rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    /// `/providers/...` — no subscription segment at all.
    Global,
    /// `/subscriptions/{sub}/...` without a resource group.
    Subscription,
    /// `/subscriptions/{sub}/resourceGroups/{rg}/...`.
    ResourceGroup,
}

/// A parsed, canonical ARM resource identifier.
///
/// `ResourceId` is the only type allowed to produce or interpret the
/// positional segment layout of an id. It is immutable once built and
/// serializes as its raw string form.
///
/// # Example
///
/// ```rust
/// use nimbus_resource::{ResourceId, ResourceScope};
///
/// let id = ResourceId::regional("sub1", "rg1", "Microsoft.ServiceBus", "namespaces", "ns1");
/// assert_eq!(id.subscription(), Some("sub1"));
/// assert_eq!(id.resource_group(), Some("rg1"));
/// assert_eq!(id.provider_namespace(), Some("Microsoft.ServiceBus"));
/// assert_eq!(id.name(), "ns1");
/// assert_eq!(id.scope(), ResourceScope::ResourceGroup);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    raw: String,
    subscription: Option<String>,
    resource_group: Option<String>,
    provider_namespace: Option<String>,
    /// Alternating (type, name) pairs after the provider namespace.
    /// The first pair is the top-level resource, later pairs are
    /// nested subresources.
    type_chain: Vec<(String, String)>,
}

impl ResourceId {
    /// Builds a regional resource id:
    /// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
    #[must_use]
    pub fn regional(sub: &str, rg: &str, ns: &str, resource_type: &str, name: &str) -> Self {
        Self {
            raw: format!(
                "/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{resource_type}/{name}"
            ),
            subscription: Some(sub.to_owned()),
            resource_group: Some(rg.to_owned()),
            provider_namespace: Some(ns.to_owned()),
            type_chain: vec![(resource_type.to_owned(), name.to_owned())],
        }
    }

    /// Builds a subscription-scoped resource id:
    /// `/subscriptions/{sub}/providers/{ns}/{type}/{name}`.
    #[must_use]
    pub fn subscription_scoped(sub: &str, ns: &str, resource_type: &str, name: &str) -> Self {
        Self {
            raw: format!("/subscriptions/{sub}/providers/{ns}/{resource_type}/{name}"),
            subscription: Some(sub.to_owned()),
            resource_group: None,
            provider_namespace: Some(ns.to_owned()),
            type_chain: vec![(resource_type.to_owned(), name.to_owned())],
        }
    }

    /// Builds a global resource id: `/providers/{ns}/{type}/{name}`.
    #[must_use]
    pub fn global(ns: &str, resource_type: &str, name: &str) -> Self {
        Self {
            raw: format!("/providers/{ns}/{resource_type}/{name}"),
            subscription: None,
            resource_group: None,
            provider_namespace: Some(ns.to_owned()),
            type_chain: vec![(resource_type.to_owned(), name.to_owned())],
        }
    }

    /// Builds a subscription id: `/subscriptions/{sub}`.
    #[must_use]
    pub fn subscription_id(sub: &str) -> Self {
        Self {
            raw: format!("/subscriptions/{sub}"),
            subscription: Some(sub.to_owned()),
            resource_group: None,
            provider_namespace: None,
            type_chain: Vec::new(),
        }
    }

    /// Builds a resource-group id: `/subscriptions/{sub}/resourceGroups/{rg}`.
    #[must_use]
    pub fn resource_group_id(sub: &str, rg: &str) -> Self {
        Self {
            raw: format!("/subscriptions/{sub}/resourceGroups/{rg}"),
            subscription: Some(sub.to_owned()),
            resource_group: Some(rg.to_owned()),
            provider_namespace: None,
            type_chain: Vec::new(),
        }
    }

    /// Returns the id of a subresource nested directly under this id.
    #[must_use]
    pub fn subresource(&self, subresource_type: &str, name: &str) -> Self {
        let mut child = self.clone();
        child.raw = format!("{}/{subresource_type}/{name}", self.raw);
        child
            .type_chain
            .push((subresource_type.to_owned(), name.to_owned()));
        child
    }

    /// Parses an id string into its canonical parts.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Malformed`] when the string does not follow
    /// any supported id shape (missing segments, dangling type without
    /// a name, unknown root segment).
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(IdError::malformed(raw, "empty id"));
        }

        let mut subscription = None;
        let mut resource_group = None;
        let mut provider_namespace = None;
        let mut type_chain = Vec::new();

        let mut i = 0;
        while i < segments.len() {
            match segments[i] {
                "subscriptions" if subscription.is_none() && provider_namespace.is_none() => {
                    let sub = segments
                        .get(i + 1)
                        .ok_or_else(|| IdError::malformed(raw, "missing subscription id"))?;
                    subscription = Some((*sub).to_owned());
                    i += 2;
                }
                "resourceGroups" if resource_group.is_none() && provider_namespace.is_none() => {
                    if subscription.is_none() {
                        return Err(IdError::malformed(raw, "resource group without subscription"));
                    }
                    let rg = segments
                        .get(i + 1)
                        .ok_or_else(|| IdError::malformed(raw, "missing resource group name"))?;
                    resource_group = Some((*rg).to_owned());
                    i += 2;
                }
                "providers" if provider_namespace.is_none() => {
                    let ns = segments
                        .get(i + 1)
                        .ok_or_else(|| IdError::malformed(raw, "missing provider namespace"))?;
                    provider_namespace = Some((*ns).to_owned());
                    i += 2;
                    // The remainder alternates (type, name) pairs.
                    while i < segments.len() {
                        let ty = segments[i];
                        let name = segments.get(i + 1).ok_or_else(|| {
                            IdError::malformed(raw, format!("type '{ty}' has no name segment"))
                        })?;
                        type_chain.push(((*ty).to_owned(), (*name).to_owned()));
                        i += 2;
                    }
                }
                other => {
                    return Err(IdError::malformed(raw, format!("unexpected segment '{other}'")));
                }
            }
        }

        if subscription.is_none() && provider_namespace.is_none() {
            return Err(IdError::malformed(raw, "neither subscription nor provider rooted"));
        }

        Ok(Self {
            raw: raw.to_owned(),
            subscription,
            resource_group,
            provider_namespace,
            type_chain,
        })
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The subscription segment, if the id is subscription rooted.
    #[must_use]
    pub fn subscription(&self) -> Option<&str> {
        self.subscription.as_deref()
    }

    /// The resource-group segment, if present.
    #[must_use]
    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    /// The provider namespace (e.g. `Microsoft.EventHub`), if present.
    #[must_use]
    pub fn provider_namespace(&self) -> Option<&str> {
        self.provider_namespace.as_deref()
    }

    /// The top-level resource type under the provider namespace.
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.type_chain.first().map(|(ty, _)| ty.as_str())
    }

    /// The fully qualified type string, `{namespace}/{type}[/{subtype}...]`.
    ///
    /// Subscription and resource-group ids map to their well-known
    /// `Microsoft.Resources` types.
    #[must_use]
    pub fn full_type(&self) -> String {
        let Some(ns) = self.provider_namespace.as_deref() else {
            return if self.resource_group.is_some() {
                "Microsoft.Resources/resourceGroups".to_owned()
            } else {
                "Microsoft.Resources/subscriptions".to_owned()
            };
        };
        let mut out = ns.to_owned();
        for (ty, _) in &self.type_chain {
            out.push('/');
            out.push_str(ty);
        }
        out
    }

    /// The resource name: the last name segment of the id.
    ///
    /// For subscription and resource-group ids this is the subscription
    /// or group name respectively.
    #[must_use]
    pub fn name(&self) -> &str {
        if let Some((_, name)) = self.type_chain.last() {
            return name;
        }
        if let Some(rg) = &self.resource_group {
            return rg;
        }
        self.subscription.as_deref().unwrap_or(&self.raw)
    }

    /// The scope kind this id is rooted at.
    #[must_use]
    pub fn scope(&self) -> ResourceScope {
        match (&self.subscription, &self.resource_group) {
            (None, _) => ResourceScope::Global,
            (Some(_), None) => ResourceScope::Subscription,
            (Some(_), Some(_)) => ResourceScope::ResourceGroup,
        }
    }

    /// Returns `true` iff the id's subscription segment equals `sub`.
    #[must_use]
    pub fn is_in_subscription(&self, sub: &str) -> bool {
        self.subscription.as_deref() == Some(sub)
    }

    /// Returns `true` iff the id's resource-group segment equals `rg`.
    #[must_use]
    pub fn is_in_resource_group(&self, rg: &str) -> bool {
        self.resource_group.as_deref() == Some(rg)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regional_id_round_trip() {
        let id = ResourceId::regional("sub1", "rg1", "Microsoft.EventHub", "namespaces", "ns1");
        assert_eq!(
            id.as_str(),
            "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.EventHub/namespaces/ns1"
        );

        let parsed = ResourceId::parse(id.as_str()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.subscription(), Some("sub1"));
        assert_eq!(parsed.resource_group(), Some("rg1"));
        assert_eq!(parsed.provider_namespace(), Some("Microsoft.EventHub"));
        assert_eq!(parsed.resource_type(), Some("namespaces"));
        assert_eq!(parsed.name(), "ns1");
        assert_eq!(parsed.scope(), ResourceScope::ResourceGroup);
    }

    #[test]
    fn test_subscription_scoped_id() {
        let id = ResourceId::subscription_scoped("sub1", "Microsoft.Resources", "deployments", "d1");
        assert_eq!(
            id.as_str(),
            "/subscriptions/sub1/providers/Microsoft.Resources/deployments/d1"
        );
        assert_eq!(id.scope(), ResourceScope::Subscription);
        assert_eq!(id.resource_group(), None);
        assert_eq!(id.name(), "d1");
    }

    #[test]
    fn test_global_id() {
        let id = ResourceId::global("Microsoft.KeyVault", "deletedVaults", "v1");
        assert_eq!(id.as_str(), "/providers/Microsoft.KeyVault/deletedVaults/v1");
        assert_eq!(id.scope(), ResourceScope::Global);
        assert_eq!(id.subscription(), None);
    }

    #[test]
    fn test_resource_group_id() {
        let id = ResourceId::resource_group_id("sub1", "rg1");
        assert_eq!(id.as_str(), "/subscriptions/sub1/resourceGroups/rg1");
        assert_eq!(id.name(), "rg1");
        assert_eq!(id.scope(), ResourceScope::ResourceGroup);
        assert_eq!(id.resource_type(), None);
    }

    #[test]
    fn test_subresource_id() {
        let parent = ResourceId::regional("s", "g", "Microsoft.ServiceBus", "namespaces", "ns1");
        let child = parent.subresource("queues", "q1");
        assert_eq!(
            child.as_str(),
            "/subscriptions/s/resourceGroups/g/providers/Microsoft.ServiceBus/namespaces/ns1/queues/q1"
        );
        assert_eq!(child.name(), "q1");
        assert_eq!(child.full_type(), "Microsoft.ServiceBus/namespaces/queues");

        let parsed = ResourceId::parse(child.as_str()).unwrap();
        assert_eq!(parsed, child);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("/foo/bar").is_err());
        assert!(ResourceId::parse("/subscriptions").is_err());
        assert!(ResourceId::parse("/resourceGroups/rg1").is_err());
        // Dangling type with no name segment.
        assert!(ResourceId::parse("/subscriptions/s/providers/Microsoft.X/things").is_err());
    }

    #[test]
    fn test_scope_membership_is_exact() {
        let id = ResourceId::regional("sub1", "rg1", "Microsoft.X", "things", "t1");
        assert!(id.is_in_subscription("sub1"));
        assert!(!id.is_in_subscription("sub2"));
        assert!(id.is_in_resource_group("rg1"));
        assert!(!id.is_in_resource_group("RG1"));
        assert!(!id.is_in_resource_group("rg2"));
    }

    #[test]
    fn test_scope_membership_over_generated_triples() {
        // Splitmix-style generator; the fixed seed keeps failures
        // reproducible.
        let mut state = 0x9e37_79b9_7f4a_7c15_u64;
        let mut next = move || {
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        };

        for _ in 0..64 {
            let sub = format!("sub-{:08x}", next() & 0xffff_ffff);
            let rg = format!("rg-{:08x}", next() & 0xffff_ffff);
            let name = format!("res-{:08x}", next() & 0xffff_ffff);
            let id = ResourceId::regional(&sub, &rg, "Microsoft.X", "things", &name);

            assert_eq!(id.subscription(), Some(sub.as_str()));
            assert_eq!(id.resource_group(), Some(rg.as_str()));
            assert_eq!(id.name(), name);
            assert!(id.is_in_subscription(&sub));
            assert!(id.is_in_resource_group(&rg));
            assert!(!id.is_in_subscription(&format!("{sub}-other")));
            assert!(!id.is_in_resource_group(&format!("{rg}-other")));

            let parsed = ResourceId::parse(id.as_str()).unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn test_serde_as_string() {
        let id = ResourceId::regional("s", "g", "Microsoft.X", "things", "t1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_str()));

        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_full_type() {
        let id = ResourceId::regional("s", "g", "Microsoft.EventHub", "namespaces", "n");
        assert_eq!(id.full_type(), "Microsoft.EventHub/namespaces");

        let rg = ResourceId::resource_group_id("s", "g");
        assert_eq!(rg.full_type(), "Microsoft.Resources/resourceGroups");

        let sub = ResourceId::subscription_id("s");
        assert_eq!(sub.full_type(), "Microsoft.Resources/subscriptions");
    }
}
