//! Shared fixtures and end-to-end pack/unpack tests.

/// Deterministic DID documents and secrets for the parties used in tests.
pub(crate) mod fixtures {
    use std::sync::Arc;

    use serde_json::json;
    use zeroize::Zeroizing;

    use crate::did::{
        DidDoc, Service, VerificationMaterial, VerificationMethod, VerificationMethodType,
        VerificationRelationship, DIDCOMM_MESSAGING,
    };
    use crate::keys::{public_key_multibase, KeyCurve, KeyMaterial};
    use crate::resolvers::{InMemoryDidResolver, InMemorySecretsResolver, ResolversConfig};
    use crate::secrets::{Secret, SecretMaterial};
    use crate::utils::did_from_did_url;

    pub(crate) const ALICE_DID: &str = "did:example:alice";
    pub(crate) const ALICE_ED25519_KID: &str = "did:example:alice#key-1";
    pub(crate) const ALICE_SECP256K1_KID: &str = "did:example:alice#key-3";
    pub(crate) const ALICE_X25519_KID: &str = "did:example:alice#key-x25519-1";
    pub(crate) const ALICE_P256_KID: &str = "did:example:alice#key-p256-1";

    pub(crate) const BOB_DID: &str = "did:example:bob";
    pub(crate) const BOB_ED25519_KID: &str = "did:example:bob#key-1";
    pub(crate) const BOB_X25519_KID: &str = "did:example:bob#key-x25519-1";
    pub(crate) const BOB_P256_KID: &str = "did:example:bob#key-p256-1";
    pub(crate) const BOB_P384_KID: &str = "did:example:bob#key-p384-1";

    pub(crate) const CHARLIE_DID: &str = "did:example:charlie";
    pub(crate) const CHARLIE_AUTH_KID: &str = "did:example:charlie#key-1";

    pub(crate) const DAVE_DID: &str = "did:example:dave";
    pub(crate) const DAVE_X25519_KID: &str = "did:example:dave#key-x25519-1";

    pub(crate) const MEDIATOR1_DID: &str = "did:example:mediator1";
    pub(crate) const MEDIATOR1_X25519_KID: &str = "did:example:mediator1#key-x25519-1";
    pub(crate) const MEDIATOR2_DID: &str = "did:example:mediator2";
    pub(crate) const MEDIATOR2_X25519_KID: &str = "did:example:mediator2#key-x25519-1";

    #[derive(Clone, Copy, PartialEq)]
    enum Purpose {
        Authentication,
        KeyAgreement,
    }

    struct FixtureKey {
        kid: &'static str,
        curve: KeyCurve,
        seed: u8,
        purpose: Purpose,
    }

    const fn fixture(kid: &'static str, curve: KeyCurve, seed: u8, purpose: Purpose) -> FixtureKey {
        FixtureKey {
            kid,
            curve,
            seed,
            purpose,
        }
    }

    const KEYS: &[FixtureKey] = &[
        fixture(ALICE_ED25519_KID, KeyCurve::Ed25519, 1, Purpose::Authentication),
        fixture(ALICE_SECP256K1_KID, KeyCurve::Secp256k1, 2, Purpose::Authentication),
        fixture(ALICE_X25519_KID, KeyCurve::X25519, 3, Purpose::KeyAgreement),
        fixture(ALICE_P256_KID, KeyCurve::P256, 4, Purpose::KeyAgreement),
        fixture(BOB_ED25519_KID, KeyCurve::Ed25519, 5, Purpose::Authentication),
        fixture(BOB_X25519_KID, KeyCurve::X25519, 6, Purpose::KeyAgreement),
        fixture(BOB_P256_KID, KeyCurve::P256, 7, Purpose::KeyAgreement),
        fixture(BOB_P384_KID, KeyCurve::P384, 8, Purpose::KeyAgreement),
        fixture(CHARLIE_AUTH_KID, KeyCurve::Ed25519, 9, Purpose::Authentication),
        fixture(DAVE_X25519_KID, KeyCurve::X25519, 10, Purpose::KeyAgreement),
        fixture(MEDIATOR1_X25519_KID, KeyCurve::X25519, 11, Purpose::KeyAgreement),
        fixture(MEDIATOR2_X25519_KID, KeyCurve::X25519, 12, Purpose::KeyAgreement),
    ];

    fn key_material(key: &FixtureKey) -> KeyMaterial {
        let len = if key.curve == KeyCurve::P384 { 48 } else { 32 };
        KeyMaterial::from_private(key.curve, Zeroizing::new(vec![key.seed; len]))
            .expect("fixture seeds are valid private keys")
    }

    fn method(key: &FixtureKey, material: &KeyMaterial) -> VerificationMethod {
        // Ed25519 keys are published as multibase, everything else as JWK.
        let (type_, verification_material) = if key.curve == KeyCurve::Ed25519 {
            (
                VerificationMethodType::Ed25519VerificationKey2020,
                VerificationMaterial::Multibase {
                    public_key_multibase: public_key_multibase(material)
                        .expect("Ed25519 keys encode as multibase"),
                },
            )
        } else {
            (
                VerificationMethodType::JsonWebKey2020,
                VerificationMaterial::Jwk {
                    public_key_jwk: material.public_jwk(),
                },
            )
        };
        VerificationMethod {
            id: key.kid.to_string(),
            type_,
            controller: did_from_did_url(key.kid).to_string(),
            verification_material,
        }
    }

    fn messaging_service(did: &str, routing_keys: &[&str]) -> Service {
        serde_json::from_value(json!({
            "id": format!("{did}#didcomm-1"),
            "type": DIDCOMM_MESSAGING,
            "serviceEndpoint": {
                "uri": "https://example.com/didcomm",
                "accept": ["didcomm/v2"],
                "routingKeys": routing_keys,
            }
        }))
        .expect("valid service entry")
    }

    /// DID documents of every fixture party.
    pub(crate) fn did_docs() -> Vec<DidDoc> {
        let mut docs: Vec<DidDoc> = [
            ALICE_DID,
            BOB_DID,
            CHARLIE_DID,
            DAVE_DID,
            MEDIATOR1_DID,
            MEDIATOR2_DID,
        ]
        .into_iter()
        .map(DidDoc::new)
        .collect();

        for key in KEYS {
            let material = key_material(key);
            let Some(doc) = docs.iter_mut().find(|doc| doc.id == did_from_did_url(key.kid)) else {
                continue;
            };
            doc.verification_method.push(method(key, &material));
            let reference = VerificationRelationship::from(key.kid);
            match key.purpose {
                Purpose::Authentication => doc.authentication.push(reference),
                Purpose::KeyAgreement => doc.key_agreement.push(reference),
            }
        }

        for doc in &mut docs {
            match doc.id.as_str() {
                BOB_DID => doc
                    .service
                    .push(messaging_service(BOB_DID, &[MEDIATOR1_X25519_KID])),
                DAVE_DID => doc.service.push(messaging_service(
                    DAVE_DID,
                    &[MEDIATOR1_X25519_KID, MEDIATOR2_X25519_KID],
                )),
                // Charlie lists its signing key for key agreement by mistake.
                CHARLIE_DID => doc
                    .key_agreement
                    .push(VerificationRelationship::from(CHARLIE_AUTH_KID)),
                _ => {}
            }
        }
        docs
    }

    /// Secrets of every fixture party.
    pub(crate) fn secrets() -> Vec<Secret> {
        KEYS.iter()
            .map(|key| Secret {
                id: key.kid.to_string(),
                type_: VerificationMethodType::JsonWebKey2020,
                secret_material: SecretMaterial::Jwk {
                    private_key_jwk: key_material(key).private_jwk(),
                },
            })
            .collect()
    }

    /// Resolvers that know every fixture party and every secret.
    pub(crate) fn resolvers() -> ResolversConfig {
        ResolversConfig::new(
            Arc::new(InMemoryDidResolver::new(did_docs())),
            Arc::new(InMemorySecretsResolver::new(secrets())),
        )
    }

    /// Resolvers holding only the secrets of `kids`.
    pub(crate) fn resolvers_with_secrets(kids: &[&str]) -> ResolversConfig {
        ResolversConfig::new(
            Arc::new(InMemoryDidResolver::new(did_docs())),
            Arc::new(InMemorySecretsResolver::new(
                secrets()
                    .into_iter()
                    .filter(|secret| kids.contains(&secret.id.as_str()))
                    .collect(),
            )),
        )
    }
}

mod round_trip {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::fixtures;
    use crate::error::{Error, MalformedKind};
    use crate::from_prior::FromPrior;
    use crate::jwe::{
        derive_authcrypt_cek, AnonCryptAlg, AuthCryptAlg, JweHeader, JweMessage,
        KeyAgreementAlgorithm,
    };
    use crate::keys::SignAlg;
    use crate::pack::{pack_encrypted, pack_plaintext, pack_signed, PackEncryptedConfig};
    use crate::types::{Attachment, FromPriorField, Message};
    use crate::unpack::unpack;
    use crate::utils::{b64_decode, b64_encode};

    fn message_to(to: &str) -> Message {
        Message::new(
            "https://example.com/protocols/lets_do_lunch/1.0/proposal",
            json!({"messagespecificattribute": "and its value"}),
        )
        .from(fixtures::ALICE_DID)
        .to([to])
        .thid("thread-1")
    }

    fn message() -> Message {
        message_to(fixtures::BOB_DID)
    }

    fn direct() -> PackEncryptedConfig {
        PackEncryptedConfig {
            forward: false,
            ..PackEncryptedConfig::default()
        }
    }

    fn protected_header(packed: &str) -> Value {
        let value: Value = serde_json::from_str(packed).unwrap();
        let protected = b64_decode(value["protected"].as_str().unwrap()).unwrap();
        serde_json::from_slice(&protected).unwrap()
    }

    #[tokio::test]
    async fn test_anoncrypt_round_trip() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (packed, pack_metadata) =
            pack_encrypted(&message, fixtures::BOB_DID, None, None, &resolvers, &direct())
                .await
                .unwrap();
        assert_eq!(pack_metadata.from_kid, None);
        assert_eq!(pack_metadata.to_kids, vec![fixtures::BOB_X25519_KID.to_string()]);

        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(metadata.encrypted);
        assert!(metadata.anonymous_sender);
        assert!(!metadata.authenticated);
        assert!(!metadata.non_repudiation);
        assert_eq!(metadata.enc_alg_anon, Some(AnonCryptAlg::Xc20pEcdhEsA256kw));
        assert_eq!(
            metadata.encrypted_to_kids,
            Some(vec![fixtures::BOB_X25519_KID.to_string()])
        );
    }

    #[tokio::test]
    async fn test_anoncrypt_content_algorithms() {
        let resolvers = fixtures::resolvers();
        for (to, alg) in [
            (fixtures::BOB_P256_KID, AnonCryptAlg::A256cbcHs512EcdhEsA256kw),
            (fixtures::BOB_P384_KID, AnonCryptAlg::A256gcmEcdhEsA256kw),
            (fixtures::BOB_X25519_KID, AnonCryptAlg::Xc20pEcdhEsA256kw),
        ] {
            let config = PackEncryptedConfig {
                enc_alg_anon: alg,
                ..direct()
            };
            let message = message();
            let (packed, _) = pack_encrypted(&message, to, None, None, &resolvers, &config)
                .await
                .unwrap();
            assert_eq!(protected_header(&packed)["enc"], json!(alg.algs().enc));

            let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
            assert_eq!(unpacked, message);
            assert_eq!(metadata.enc_alg_anon, Some(alg));
            assert_eq!(metadata.encrypted_to_kids, Some(vec![to.to_string()]));
        }
    }

    #[tokio::test]
    async fn test_authcrypt_round_trip() {
        let resolvers = fixtures::resolvers();
        let message = message();
        for (to, sender_kid) in [
            (fixtures::BOB_DID, fixtures::ALICE_X25519_KID),
            (fixtures::BOB_P256_KID, fixtures::ALICE_P256_KID),
        ] {
            let (packed, pack_metadata) = pack_encrypted(
                &message,
                to,
                Some(fixtures::ALICE_DID),
                None,
                &resolvers,
                &direct(),
            )
            .await
            .unwrap();
            assert_eq!(pack_metadata.from_kid.as_deref(), Some(sender_kid));
            assert_eq!(protected_header(&packed)["skid"], sender_kid);

            let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
            assert_eq!(unpacked, message);
            assert!(metadata.encrypted);
            assert!(metadata.authenticated);
            assert!(!metadata.anonymous_sender);
            assert_eq!(metadata.encrypted_from_kid.as_deref(), Some(sender_kid));
            assert_eq!(metadata.enc_alg_auth, Some(AuthCryptAlg::A256cbcHs512Ecdh1puA256kw));
        }
    }

    #[tokio::test]
    async fn test_signed_then_encrypted() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (packed, pack_metadata) = pack_encrypted(
            &message,
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            Some(fixtures::ALICE_DID),
            &resolvers,
            &direct(),
        )
        .await
        .unwrap();
        assert_eq!(pack_metadata.sign_from_kid.as_deref(), Some(fixtures::ALICE_ED25519_KID));

        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(metadata.encrypted);
        assert!(metadata.non_repudiation);
        assert_eq!(metadata.sign_from.as_deref(), Some(fixtures::ALICE_ED25519_KID));
        assert_eq!(
            metadata.signed_by_kids,
            Some(vec![fixtures::ALICE_ED25519_KID.to_string()])
        );
        assert_eq!(metadata.sign_alg, Some(SignAlg::EdDsa));
        assert!(metadata.signed_message.is_some());
    }

    #[tokio::test]
    async fn test_protect_sender_id() {
        let resolvers = fixtures::resolvers();
        let config = PackEncryptedConfig {
            protect_sender_id: true,
            ..direct()
        };
        let message = message();
        let (packed, _) = pack_encrypted(
            &message,
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &config,
        )
        .await
        .unwrap();

        let outer = protected_header(&packed);
        assert_eq!(outer["alg"], json!(KeyAgreementAlgorithm::EcdhEsA256kw));
        assert!(outer.get("skid").is_none());
        assert!(!packed.contains(fixtures::ALICE_X25519_KID));

        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(metadata.anonymous_sender);
        assert!(metadata.authenticated);
        assert_eq!(metadata.encrypted_from_kid.as_deref(), Some(fixtures::ALICE_X25519_KID));
    }

    #[tokio::test]
    async fn test_signed_round_trip() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (packed, pack_metadata) =
            pack_signed(&message, fixtures::ALICE_SECP256K1_KID, &resolvers)
                .await
                .unwrap();
        assert_eq!(pack_metadata.sign_from_kid, fixtures::ALICE_SECP256K1_KID);

        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(!metadata.encrypted);
        assert!(metadata.authenticated);
        assert!(metadata.non_repudiation);
        assert_eq!(metadata.sign_alg, Some(SignAlg::Es256K));
    }

    #[tokio::test]
    async fn test_signed_tamper_rejected() {
        let resolvers = fixtures::resolvers();
        let (packed, _) = pack_signed(&message(), fixtures::ALICE_DID, &resolvers)
            .await
            .unwrap();
        let jws: Value = serde_json::from_str(&packed).unwrap();

        let mut forged_payload = jws.clone();
        let mut payload: Value =
            serde_json::from_slice(&b64_decode(jws["payload"].as_str().unwrap()).unwrap()).unwrap();
        payload["body"] = json!({"messagespecificattribute": "another value"});
        forged_payload["payload"] = json!(b64_encode(serde_json::to_vec(&payload).unwrap()));

        let mut forged_signature = jws.clone();
        let mut signature =
            b64_decode(jws["signatures"][0]["signature"].as_str().unwrap()).unwrap();
        signature[0] ^= 0x01;
        forged_signature["signatures"][0]["signature"] = json!(b64_encode(signature));

        let mut garbled_payload = jws.clone();
        let mut encoded = jws["payload"].as_str().unwrap().to_string();
        encoded.insert(4, '*');
        garbled_payload["payload"] = json!(encoded);

        for forged in [forged_payload, forged_signature, garbled_payload] {
            let err = unpack(&forged.to_string(), &resolvers).await.unwrap_err();
            assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidSignature));
        }
    }

    #[tokio::test]
    async fn test_tampered_ciphertext() {
        let resolvers = fixtures::resolvers();
        let (packed, _) = pack_encrypted(
            &message(),
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &direct(),
        )
        .await
        .unwrap();
        let mut jwe: Value = serde_json::from_str(&packed).unwrap();
        let mut ciphertext = b64_decode(jwe["ciphertext"].as_str().unwrap()).unwrap();
        ciphertext[0] ^= 0x80;
        jwe["ciphertext"] = json!(b64_encode(ciphertext));

        let err = unpack(&jwe.to_string(), &resolvers).await.unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::CanNotDecrypt));
    }

    #[tokio::test]
    async fn test_apv_mismatch_rejected() {
        let resolvers = fixtures::resolvers();
        let (packed, _) =
            pack_encrypted(&message(), fixtures::BOB_DID, None, None, &resolvers, &direct())
                .await
                .unwrap();
        let mut jwe: Value = serde_json::from_str(&packed).unwrap();
        let mut header = protected_header(&packed);
        header["apv"] = json!(b64_encode([0u8; 32]));
        jwe["protected"] = json!(b64_encode(serde_json::to_vec(&header).unwrap()));

        let err = unpack(&jwe.to_string(), &resolvers).await.unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidMessage));
    }

    #[tokio::test]
    async fn test_missing_recipient_secret() {
        let resolvers = fixtures::resolvers();
        let (packed, _) =
            pack_encrypted(&message(), fixtures::BOB_DID, None, None, &resolvers, &direct())
                .await
                .unwrap();

        let receiver = fixtures::resolvers_with_secrets(&[fixtures::BOB_P256_KID]);
        let err = unpack(&packed, &receiver).await.unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(_)));
    }

    #[tokio::test]
    async fn test_authcrypt_sender_must_match_from() {
        let resolvers = fixtures::resolvers();
        let sender = resolvers
            .get_secret_key(fixtures::ALICE_X25519_KID)
            .await
            .unwrap();
        let recipient = resolvers
            .resolve_public_key(fixtures::BOB_X25519_KID)
            .await
            .unwrap();
        let derivation = derive_authcrypt_cek(
            AuthCryptAlg::default(),
            fixtures::ALICE_X25519_KID,
            &sender,
            &[(fixtures::BOB_X25519_KID, &recipient)],
        )
        .unwrap();
        let header = JweHeader::new_authcrypt(
            AuthCryptAlg::default().algs().enc,
            derivation.epk.clone(),
            fixtures::ALICE_X25519_KID.to_string(),
            derivation.apu.clone().unwrap(),
            derivation.apv.clone(),
        );
        let impersonated = message().from(fixtures::CHARLIE_DID);
        let jwe = JweMessage::build(
            &header,
            &derivation.cek,
            &derivation.encrypted_keys,
            &serde_json::to_vec(&impersonated).unwrap(),
        )
        .unwrap();

        let err = unpack(&serde_json::to_string(&jwe).unwrap(), &resolvers)
            .await
            .unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidMessage));
    }

    #[tokio::test]
    async fn test_signing_key_as_key_agreement_key() {
        let resolvers = fixtures::resolvers();
        let message = message_to(fixtures::CHARLIE_DID);
        for to in [fixtures::CHARLIE_AUTH_KID, fixtures::CHARLIE_DID] {
            let err = pack_encrypted(&message, to, None, None, &resolvers, &direct())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::IncompatibleCrypto(_)), "{to}: {err}");
        }
    }

    #[tokio::test]
    async fn test_key_selection_precedes_signing() {
        // No signing secret: an incompatible recipient must fail before signing.
        let resolvers = fixtures::resolvers_with_secrets(&[]);
        let message = message_to(fixtures::CHARLIE_DID);
        let err = pack_encrypted(
            &message,
            fixtures::CHARLIE_DID,
            None,
            Some(fixtures::ALICE_DID),
            &resolvers,
            &direct(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::IncompatibleCrypto(_)), "{err}");
    }

    #[tokio::test]
    async fn test_forward_surfaced_in_metadata() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (packed, pack_metadata) = pack_encrypted(
            &message,
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &PackEncryptedConfig::default(),
        )
        .await
        .unwrap();
        let service = pack_metadata.messaging_service.unwrap();
        assert_eq!(service.id, "did:example:bob#didcomm-1");
        assert_eq!(service.service_endpoint, "https://example.com/didcomm");

        let mediator = fixtures::resolvers_with_secrets(&[fixtures::MEDIATOR1_X25519_KID]);
        let (forward, metadata) = unpack(&packed, &mediator).await.unwrap();
        assert_eq!(forward.type_, crate::forward::FORWARD_MSG_TYPE);
        assert_eq!(forward.body["next"], fixtures::BOB_DID);
        assert!(metadata.anonymous_sender);
        let forwarded = metadata.forwarded_msg.unwrap();

        let (unpacked, metadata) = unpack(&forwarded.to_string(), &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(metadata.forwarded_msg.is_none());
        assert_eq!(metadata.encrypted_from_kid.as_deref(), Some(fixtures::ALICE_X25519_KID));
    }

    #[tokio::test]
    async fn test_forward_through_two_mediators() {
        let resolvers = fixtures::resolvers();
        let message = message_to(fixtures::DAVE_DID);
        let (packed, _) = pack_encrypted(
            &message,
            fixtures::DAVE_DID,
            None,
            None,
            &resolvers,
            &PackEncryptedConfig::default(),
        )
        .await
        .unwrap();

        let (first, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(first.body["next"], fixtures::MEDIATOR2_X25519_KID);
        assert_eq!(
            metadata.encrypted_to_kids,
            Some(vec![fixtures::MEDIATOR1_X25519_KID.to_string()])
        );

        let hop = metadata.forwarded_msg.unwrap().to_string();
        let (second, metadata) = unpack(&hop, &resolvers).await.unwrap();
        assert_eq!(second.body["next"], fixtures::DAVE_DID);

        let hop = metadata.forwarded_msg.unwrap().to_string();
        let (unpacked, metadata) = unpack(&hop, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert_eq!(
            metadata.encrypted_to_kids,
            Some(vec![fixtures::DAVE_X25519_KID.to_string()])
        );
    }

    #[tokio::test]
    async fn test_unsupported_forward_version() {
        let resolvers = fixtures::resolvers();
        let forward = Message::new(
            "https://didcomm.org/routing/3.0/forward",
            json!({"next": fixtures::BOB_DID}),
        )
        .attachment(Attachment::json(json!({"ciphertext": "AA"})));
        let (packed, _) = pack_plaintext(&forward, &resolvers).await.unwrap();

        let err = unpack(&packed, &resolvers).await.unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::NotSupportedFwdProtocol));
    }

    #[tokio::test]
    async fn test_from_prior_round_trip() {
        let resolvers = fixtures::resolvers();
        let claim = FromPrior::new(fixtures::CHARLIE_DID, fixtures::ALICE_DID);
        let message = message().from_prior(claim.clone());
        let (packed, pack_metadata) = pack_encrypted(
            &message,
            fixtures::BOB_DID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &direct(),
        )
        .await
        .unwrap();
        assert_eq!(
            pack_metadata.from_prior_issuer_kid.as_deref(),
            Some(fixtures::CHARLIE_AUTH_KID)
        );

        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked.from_prior, Some(FromPriorField::Claim(claim.clone())));
        assert_eq!(metadata.from_prior, Some(claim));
        assert_eq!(
            metadata.from_prior_issuer_kid.as_deref(),
            Some(fixtures::CHARLIE_AUTH_KID)
        );
    }

    #[tokio::test]
    async fn test_plaintext_round_trip_and_rejections() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (packed, _) = pack_plaintext(&message, &resolvers).await.unwrap();
        let (unpacked, metadata) = unpack(&packed, &resolvers).await.unwrap();
        assert_eq!(unpacked, message);
        assert!(!metadata.encrypted && !metadata.authenticated);

        let no_body = json!({"id": "1", "type": "https://example.com/t"}).to_string();
        let err = unpack(&no_body, &resolvers).await.unwrap_err();
        assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidPlaintext));

        let short_typ = json!({
            "id": "1",
            "type": "https://example.com/t",
            "typ": "didcomm-plain+json",
            "body": {}
        });
        assert!(unpack(&short_typ.to_string(), &resolvers).await.is_ok());

        for garbage in ["not json", "[1, 2, 3]"] {
            let err = unpack(garbage, &resolvers).await.unwrap_err();
            assert_eq!(err.malformed_kind(), Some(MalformedKind::InvalidMessage));
        }
    }

    #[tokio::test]
    async fn test_concurrent_unpack() {
        let resolvers = fixtures::resolvers();
        let message = message();
        let (anon, _) =
            pack_encrypted(&message, fixtures::BOB_DID, None, None, &resolvers, &direct())
                .await
                .unwrap();
        let (auth, _) = pack_encrypted(
            &message,
            fixtures::BOB_P256_KID,
            Some(fixtures::ALICE_DID),
            None,
            &resolvers,
            &direct(),
        )
        .await
        .unwrap();
        let (signed, _) = pack_signed(&message, fixtures::ALICE_DID, &resolvers)
            .await
            .unwrap();

        let (first, second, third) = tokio::join!(
            unpack(&anon, &resolvers),
            unpack(&auth, &resolvers),
            unpack(&signed, &resolvers),
        );
        for result in [first, second, third] {
            assert_eq!(result.unwrap().0, message);
        }
    }
}
