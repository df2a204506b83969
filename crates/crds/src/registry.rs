//! Registry CRD
//!
//! Describes a container registry endpoint that cluster container runtimes
//! are allowed to pull from. Clusters reference registries by name, or carry
//! literal insecure hosts inline (see [`CriRegistry`]).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Plain HTTP scheme
pub const SCHEME_HTTP: &str = "http";

/// HTTPS scheme
pub const SCHEME_HTTPS: &str = "https";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "nodesmith.io",
    version = "v1",
    kind = "Registry"
)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySpec {
    /// "http" or "https"
    pub scheme: String,

    /// Registry host, with optional port (e.g. "harbor.local:5000")
    pub host: String,

    /// Skip TLS verification of the registry certificate
    #[serde(default)]
    pub skip_verify: bool,

    /// PEM encoded CA bundle trusted for this registry
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca: String,

    /// Credentials used by the container runtime when pulling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_auth: Option<RegistryAuth>,
}

impl RegistrySpec {
    /// Plain HTTP endpoint for an insecure host
    pub fn http(host: impl Into<String>) -> Self {
        Self {
            scheme: SCHEME_HTTP.to_string(),
            host: host.into(),
            ..Default::default()
        }
    }

    /// HTTPS endpoint for an insecure host (certificate verification disabled)
    pub fn https_insecure(host: impl Into<String>) -> Self {
        Self {
            scheme: SCHEME_HTTPS.to_string(),
            host: host.into(),
            skip_verify: true,
            ..Default::default()
        }
    }

    /// Both endpoints an insecure host expands to: `http` first, then `https` with
    /// verification disabled.
    pub fn insecure_pair(host: &str) -> [Self; 2] {
        [Self::http(host), Self::https_insecure(host)]
    }

    /// Identity key used for deduplication and ordering: `scheme + host`
    pub fn identity_key(&self) -> String {
        format!("{}{}", self.scheme, self.host)
    }
}

/// Username/password credentials for a registry
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAuth {
    /// Username
    pub username: String,

    /// Password
    pub password: String,
}

/// A registry entry declared on a cluster's container runtime.
///
/// Either `registry_ref` names a [`Registry`] resource, or `insecure_registry`
/// carries a literal host that is trusted over both http and https.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CriRegistry {
    /// Literal insecure host (used when `registry_ref` is empty)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub insecure_registry: String,

    /// Name of a `Registry` resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_ref: Option<String>,
}

impl CriRegistry {
    /// Referenced registry name, treating an empty string as no reference
    pub fn reference(&self) -> Option<&str> {
        self.registry_ref.as_deref().filter(|r| !r.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_concatenates_scheme_and_host() {
        let spec = RegistrySpec::https_insecure("harbor.local:5000");
        assert_eq!(spec.identity_key(), "httpsharbor.local:5000");
        assert!(spec.skip_verify);
    }

    #[test]
    fn test_insecure_pair_order() {
        let [http, https] = RegistrySpec::insecure_pair("mirror.local");
        assert_eq!(http.scheme, SCHEME_HTTP);
        assert!(!http.skip_verify);
        assert_eq!(https.scheme, SCHEME_HTTPS);
        assert!(https.skip_verify);
    }

    #[test]
    fn test_empty_reference_is_none() {
        let entry = CriRegistry {
            insecure_registry: "10.0.0.1:5000".to_string(),
            registry_ref: Some(String::new()),
        };
        assert_eq!(entry.reference(), None);
    }

    #[test]
    fn test_registry_spec_serializes_camel_case() {
        let spec = RegistrySpec {
            registry_auth: Some(RegistryAuth {
                username: "admin".to_string(),
                password: "secret".to_string(),
            }),
            ..RegistrySpec::https_insecure("harbor.local")
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["skipVerify"], true);
        assert_eq!(value["registryAuth"]["username"], "admin");
        assert!(value.get("ca").is_none());
    }
}
