use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::errors::{Result, StoreError};

/// Provider namespace of the types that live outside any `providers/` segment
/// (subscriptions, resource groups, ...).
pub const BUILTIN_NAMESPACE: &str = "Microsoft.Resources";

const SUBSCRIPTIONS_KEY: &str = "subscriptions";
const RESOURCE_GROUPS_KEY: &str = "resourceGroups";
const PROVIDERS_KEY: &str = "providers";

/// Provider namespace plus the chain of type names, e.g.
/// `Microsoft.Network/virtualNetworks/subnets`.
///
/// The original spelling is kept for display, but equality, hashing and
/// [`ResourceType::key`] ignore ASCII case: the upstream APIs hand out the same
/// type in different casings depending on the endpoint.
#[derive(Debug, Clone)]
pub struct ResourceType {
    namespace: String,
    types: Vec<String>,
    key: String,
}

impl ResourceType {
    pub fn new(namespace: impl Into<String>, types: Vec<String>) -> Self {
        let namespace = namespace.into();
        let key = render(&namespace, &types).to_ascii_lowercase();
        ResourceType {
            namespace,
            types,
            key,
        }
    }

    /// Parses either a literal resource type or a full resource ID.
    ///
    /// - `virtualMachines` (single segment) is a built-in type of
    ///   [`BUILTIN_NAMESPACE`];
    /// - `Microsoft.Compute/virtualMachines` is taken literally;
    /// - anything starting with `/` is parsed as a [`ResourceId`].
    pub fn parse(id_or_type: &str) -> Result<Self> {
        if id_or_type.starts_with('/') {
            return ResourceId::parse(id_or_type).map(ResourceId::into_resource_type);
        }

        let parts: Vec<&str> = id_or_type.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [] => Err(StoreError::invalid_type(id_or_type, "empty resource type")),
            [single] => Ok(ResourceType::new(
                BUILTIN_NAMESPACE,
                vec![single.to_string()],
            )),
            [namespace, types @ ..] => Ok(ResourceType::new(
                *namespace,
                types.iter().map(|t| t.to_string()).collect(),
            )),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    /// Case-folded canonical form, used as the store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// True when `other` (a type or an ID) parses to this same type.
    pub fn matches(&self, other: &str) -> bool {
        ResourceType::parse(other)
            .map(|t| t == *self)
            .unwrap_or(false)
    }
}

fn render(namespace: &str, types: &[String]) -> String {
    let mut out = String::from(namespace);
    for t in types {
        out.push('/');
        out.push_str(t);
    }
    out
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ResourceType {}

impl Hash for ResourceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.namespace, &self.types))
    }
}

impl FromStr for ResourceType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceType::parse(s)
    }
}

/// A parsed fully-qualified resource identifier such as
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    raw: String,
    subscription_id: Option<String>,
    resource_group: Option<String>,
    resource_type: ResourceType,
    name: String,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self> {
        if !id.starts_with('/') {
            return Err(StoreError::invalid_type(id, "resource ID must start with '/'"));
        }

        let parts: Vec<&str> = id.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            return Err(StoreError::invalid_type(id, "resource ID is too short"));
        }

        let mut subscription_id = None;
        let mut resource_group = None;
        let mut namespace: Option<&str> = None;
        let mut types: Vec<String> = Vec::new();
        let mut name: Option<&str> = None;

        let mut i = 0;
        while i < parts.len() {
            let key = parts[i];
            let value = parts.get(i + 1).copied().ok_or_else(|| {
                StoreError::invalid_type(id, format!("segment '{}' has no value", key))
            })?;

            if key.eq_ignore_ascii_case(PROVIDERS_KEY) {
                // extension resources restart the type chain under a new provider
                namespace = Some(value);
                types.clear();
                name = None;
                i += 2;
                continue;
            }

            match namespace {
                None if key.eq_ignore_ascii_case(SUBSCRIPTIONS_KEY) && subscription_id.is_none() => {
                    subscription_id = Some(value.to_string());
                    types = vec![SUBSCRIPTIONS_KEY.to_string()];
                }
                None if key.eq_ignore_ascii_case(RESOURCE_GROUPS_KEY) && resource_group.is_none() => {
                    resource_group = Some(value.to_string());
                    types = vec![RESOURCE_GROUPS_KEY.to_string()];
                }
                _ => types.push(key.to_string()),
            }
            name = Some(value);
            i += 2;
        }

        let name = match name {
            Some(name) if !types.is_empty() => name.to_string(),
            _ => {
                return Err(StoreError::invalid_type(
                    id,
                    "provider namespace without a resource type",
                ))
            }
        };

        Ok(ResourceId {
            raw: id.to_string(),
            subscription_id,
            resource_group,
            resource_type: ResourceType::new(namespace.unwrap_or(BUILTIN_NAMESPACE), types),
            name,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn into_resource_type(self) -> ResourceType {
        self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ResourceId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_ID: &str = "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/vm-1";

    #[test]
    fn test_parse_resource_id() {
        let id = ResourceId::parse(VM_ID).unwrap();
        assert_eq!(id.subscription_id(), Some("sub-1"));
        assert_eq!(id.resource_group(), Some("rg-1"));
        assert_eq!(id.name(), "vm-1");
        assert_eq!(
            id.resource_type().to_string(),
            "Microsoft.Compute/virtualMachines"
        );
    }

    #[test]
    fn test_parse_child_resource() {
        let id = ResourceId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/default",
        )
        .unwrap();
        assert_eq!(
            id.resource_type().to_string(),
            "Microsoft.Network/virtualNetworks/subnets"
        );
        assert_eq!(id.name(), "default");
    }

    #[test]
    fn test_parse_extension_resource() {
        let id = ResourceId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm/providers/Microsoft.Insights/diagnosticSettings/ds",
        )
        .unwrap();
        assert_eq!(
            id.resource_type().to_string(),
            "Microsoft.Insights/diagnosticSettings"
        );
    }

    #[test]
    fn test_parse_builtin_scopes() {
        let sub = ResourceId::parse("/subscriptions/s").unwrap();
        assert_eq!(
            sub.resource_type().to_string(),
            "Microsoft.Resources/subscriptions"
        );
        let rg = ResourceId::parse("/subscriptions/s/resourceGroups/rg").unwrap();
        assert_eq!(
            rg.resource_type().to_string(),
            "Microsoft.Resources/resourceGroups"
        );
    }

    #[test]
    fn test_parse_resource_id_errors() {
        assert!(matches!(
            ResourceId::parse("subscriptions/s"),
            Err(StoreError::InvalidResourceType { .. })
        ));
        assert!(ResourceId::parse("/").is_err());
        assert!(ResourceId::parse("/subscriptions").is_err());
        // provider type without a name
        assert!(ResourceId::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines"
        )
        .is_err());
        // provider without any type
        assert!(ResourceId::parse("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute").is_err());
    }

    #[test]
    fn test_parse_resource_type_forms() {
        let literal = ResourceType::parse("Microsoft.Compute/virtualMachines").unwrap();
        let from_id = ResourceType::parse(VM_ID).unwrap();
        assert_eq!(literal, from_id);

        let builtin = ResourceType::parse("subscriptions").unwrap();
        assert_eq!(builtin.namespace(), BUILTIN_NAMESPACE);

        assert!(ResourceType::parse("").is_err());
        assert!(ResourceType::parse("///").is_err());
    }

    #[test]
    fn test_resource_type_is_case_insensitive() {
        let a = ResourceType::parse("Microsoft.Compute/virtualMachines").unwrap();
        let b = ResourceType::parse(
            "/subscriptions/s/resourcegroups/rg/providers/microsoft.compute/virtualmachines/vm",
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key(), "microsoft.compute/virtualmachines");
        // display keeps the original spelling
        assert_eq!(a.to_string(), "Microsoft.Compute/virtualMachines");
        assert!(a.matches(VM_ID));
        assert!(!a.matches("Microsoft.Storage/storageAccounts"));
    }
}
