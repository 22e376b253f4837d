//! DID Document data model consumed by the envelope engine.
//!
//! Only the parts of a DID Document the engine reads are modelled:
//! verification methods, the `authentication` and `keyAgreement`
//! relationships, and service entries used to find DIDComm messaging
//! endpoints and mediator routing keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Service type of DIDComm v2 messaging endpoints.
pub const DIDCOMM_MESSAGING: &str = "DIDCommMessaging";

/// Profile a DIDComm v2 endpoint lists in `accept`.
pub const DIDCOMM_V2_PROFILE: &str = "didcomm/v2";

/// A resolved DID Document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDoc {
    /// The DID this document describes
    pub id: String,
    /// Verification methods declared by the document
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    /// Methods usable for authentication (and thus signing)
    #[serde(default)]
    pub authentication: Vec<VerificationRelationship>,
    /// Methods usable for key agreement (encryption)
    #[serde(default)]
    pub key_agreement: Vec<VerificationRelationship>,
    /// Service entries
    #[serde(default)]
    pub service: Vec<Service>,
}

/// An entry of a verification relationship: a reference or an embedded method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationRelationship {
    /// Reference to a method by its DID URL
    Reference(String),
    /// Method embedded in the relationship
    Embedded(VerificationMethod),
}

impl VerificationRelationship {
    /// The DID URL of the referenced or embedded method.
    pub fn id(&self) -> &str {
        match self {
            VerificationRelationship::Reference(id) => id,
            VerificationRelationship::Embedded(method) => &method.id,
        }
    }
}

impl From<&str> for VerificationRelationship {
    fn from(id: &str) -> Self {
        VerificationRelationship::Reference(id.to_string())
    }
}

/// A verification method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// DID URL of the method
    pub id: String,
    /// Method type
    #[serde(rename = "type")]
    pub type_: VerificationMethodType,
    /// DID of the controller
    pub controller: String,
    /// Public key material
    #[serde(flatten)]
    pub verification_material: VerificationMaterial,
}

/// Verification method types understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationMethodType {
    /// JsonWebKey2020
    JsonWebKey2020,
    /// JsonWebKey
    JsonWebKey,
    /// X25519KeyAgreementKey2019
    X25519KeyAgreementKey2019,
    /// X25519KeyAgreementKey2020
    X25519KeyAgreementKey2020,
    /// Ed25519VerificationKey2018
    Ed25519VerificationKey2018,
    /// Ed25519VerificationKey2020
    Ed25519VerificationKey2020,
    /// EcdsaSecp256k1VerificationKey2019
    EcdsaSecp256k1VerificationKey2019,
    /// Multikey
    Multikey,
    /// Any other type
    #[serde(other)]
    Other,
}

/// Public key material of a verification method, by format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationMaterial {
    /// `publicKeyJwk`
    Jwk {
        /// The JWK object
        #[serde(rename = "publicKeyJwk")]
        public_key_jwk: Value,
    },
    /// `publicKeyMultibase`
    Multibase {
        /// Multibase-encoded key with multicodec prefix
        #[serde(rename = "publicKeyMultibase")]
        public_key_multibase: String,
    },
    /// `publicKeyBase58`
    Base58 {
        /// Base58-encoded raw key
        #[serde(rename = "publicKeyBase58")]
        public_key_base58: String,
    },
    /// Any other representation
    Other(Map<String, Value>),
}

/// A service entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service id
    pub id: String,
    /// Service type
    #[serde(rename = "type")]
    pub type_: String,
    /// Endpoint: a URI string, an object with `uri`, or a list of either
    pub service_endpoint: Value,
    /// Other service properties (legacy `accept` and `routingKeys` live here)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A DIDComm messaging endpoint extracted from a [`Service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCommMessagingService {
    /// Service id
    pub id: String,
    /// Endpoint URI, or the DID of a mediator
    pub uri: String,
    /// Accepted profiles
    pub accept: Vec<String>,
    /// Mediator routing keys, first hop first
    pub routing_keys: Vec<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Service {
    /// Reads this entry as a DIDComm v2 messaging service.
    ///
    /// Returns `None` unless the type is `DIDCommMessaging` and the endpoint has a URI.
    pub fn didcomm_messaging(&self) -> Option<DidCommMessagingService> {
        if self.type_ != DIDCOMM_MESSAGING {
            return None;
        }
        let endpoint = match &self.service_endpoint {
            Value::Array(items) => items.first()?,
            other => other,
        };
        match endpoint {
            Value::String(uri) => Some(DidCommMessagingService {
                id: self.id.clone(),
                uri: uri.clone(),
                accept: string_list(self.extra.get("accept")),
                routing_keys: string_list(self.extra.get("routingKeys")),
            }),
            Value::Object(map) => Some(DidCommMessagingService {
                id: self.id.clone(),
                uri: map.get("uri")?.as_str()?.to_string(),
                accept: string_list(map.get("accept")),
                routing_keys: string_list(map.get("routingKeys")),
            }),
            _ => None,
        }
    }
}

impl DidCommMessagingService {
    /// True when the endpoint accepts DIDComm v2 (an empty list accepts everything).
    pub fn accepts_didcomm_v2(&self) -> bool {
        self.accept.is_empty() || self.accept.iter().any(|a| a == DIDCOMM_V2_PROFILE)
    }
}

impl DidDoc {
    /// Creates an empty document for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            verification_method: Vec::new(),
            authentication: Vec::new(),
            key_agreement: Vec::new(),
            service: Vec::new(),
        }
    }

    /// Finds a method by DID URL, including methods embedded in relationships.
    pub fn find_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method
            .iter()
            .find(|method| method.id == id)
            .or_else(|| {
                self.authentication
                    .iter()
                    .chain(self.key_agreement.iter())
                    .find_map(|relationship| match relationship {
                        VerificationRelationship::Embedded(method) if method.id == id => {
                            Some(method)
                        }
                        _ => None,
                    })
            })
    }

    /// DID URLs listed under `authentication`, in document order.
    pub fn authentication_ids(&self) -> Vec<&str> {
        self.authentication.iter().map(VerificationRelationship::id).collect()
    }

    /// DID URLs listed under `keyAgreement`, in document order.
    pub fn key_agreement_ids(&self) -> Vec<&str> {
        self.key_agreement.iter().map(VerificationRelationship::id).collect()
    }

    /// Finds the DIDComm messaging service to use.
    ///
    /// With `service_id`, that service is returned if it is a DIDComm messaging
    /// service. Otherwise the first service accepting `didcomm/v2` is returned.
    pub fn find_didcomm_service(&self, service_id: Option<&str>) -> Option<DidCommMessagingService> {
        match service_id {
            Some(id) => self
                .service
                .iter()
                .find(|service| service.id == id)
                .and_then(Service::didcomm_messaging),
            None => self
                .service
                .iter()
                .filter_map(Service::didcomm_messaging)
                .find(DidCommMessagingService::accepts_didcomm_v2),
        }
    }
}
