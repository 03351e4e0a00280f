use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use serde_json::json;
use tokio::io::duplex;
use tokio::time::timeout;
use tokio_util::compat::TokioAsyncReadCompatExt;

use signing_bridge::protocol::{BridgeMessage, RequestEnvelope, read_message, write_message};
use signing_bridge::{
    BridgeConfig, Eip191Encoder, EthereumSecp256k1Signer, Host, JsonEncoder, PayloadEncoder,
    PayloadSigner, Relay, RemoteAuthority, Secp256k1Signer, SignerAuthority, serve_authority,
};

fn ethereum_authority(seed: &str) -> (SignerAuthority, Vec<u8>) {
    let signer = EthereumSecp256k1Signer::from_seed(seed).unwrap();
    let public_key = signer.public_key_bytes();
    (
        SignerAuthority::new(Arc::new(signer), Arc::new(Eip191Encoder)),
        public_key,
    )
}

// ── Full pipeline: page → relay → remote authority → page ────────────

#[tokio::test]
async fn page_signature_recovers_authority_key() {
    let (relay_io, authority_io) = duplex(16384);
    let (authority, public_key) = ethereum_authority("pipeline-seed");

    let server = tokio::spawn(async move {
        serve_authority(authority_io.compat(), &authority).await.unwrap();
    });

    let host = Host::new(BridgeConfig::default());
    let relay = Relay::attach(
        host.channel().clone(),
        Arc::new(RemoteAuthority::new(relay_io.compat())),
    );
    host.inject().unwrap();
    timeout(Duration::from_secs(1), host.readiness().wait_until_ready())
        .await
        .unwrap();

    let payload = json!({"domain": {"name": "Demo"}, "message": {"amount": 42}});
    let signature = timeout(Duration::from_secs(5), host.sign_structured_data(payload.clone()))
        .await
        .expect("timeout")
        .unwrap();

    let sig_bytes = hex::decode(signature.strip_prefix("0x").unwrap()).unwrap();
    assert_eq!(sig_bytes.len(), 65);
    let digest = Eip191Encoder.encode(&payload).unwrap().digest;
    let recovered = VerifyingKey::recover_from_prehash(
        &digest,
        &Signature::from_slice(&sig_bytes[..64]).unwrap(),
        RecoveryId::from_byte(sig_bytes[64]).unwrap(),
    )
    .unwrap();
    assert_eq!(recovered.to_encoded_point(false).as_bytes(), public_key.as_slice());

    drop(relay);
    drop(host);
    server.await.unwrap();
}

#[tokio::test]
async fn concurrent_page_calls_share_one_authority_stream() {
    let (relay_io, authority_io) = duplex(16384);
    let authority = SignerAuthority::new(
        Arc::new(Secp256k1Signer::from_seed("shared-stream").unwrap()),
        Arc::new(JsonEncoder),
    );
    tokio::spawn(async move {
        let _ = serve_authority(authority_io.compat(), &authority).await;
    });

    let host = Host::new(BridgeConfig::default());
    let _relay = Relay::attach(
        host.channel().clone(),
        Arc::new(RemoteAuthority::new(relay_io.compat())),
    );
    host.inject().unwrap();

    let (a, b, c) = tokio::join!(
        host.sign_structured_data(json!({"n": 1})),
        host.sign_structured_data(json!({"n": 2})),
        host.sign_structured_data(json!({"n": 1})),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_ne!(a, b);
    assert_eq!(a, c, "same payload signs identically");
}

// ── Authority server over a raw stream ───────────────────────────────

#[tokio::test]
async fn server_answers_each_request_under_its_own_id() {
    let (relay_io, authority_io) = duplex(16384);
    let (authority, _) = ethereum_authority("server-seed");
    let server = tokio::spawn(async move {
        serve_authority(authority_io.compat(), &authority).await.unwrap();
    });

    let mut io = relay_io.compat();
    for id in ["one", "two"] {
        write_message(&mut io, &RequestEnvelope::new(id, json!({"id": id})).into_message())
            .await
            .unwrap();
        let reply: BridgeMessage = read_message(&mut io).await.unwrap();
        match reply {
            BridgeMessage::SignResult(response) => {
                assert_eq!(response.id, id);
                assert!(response.result.success);
                assert!(response.result.signature.unwrap().starts_with("0x"));
            }
            other => panic!("expected SignResult, got {other:?}"),
        }
    }

    drop(io);
    server.await.unwrap();
}

#[tokio::test]
async fn server_skips_non_request_messages() {
    let (relay_io, authority_io) = duplex(16384);
    let (authority, _) = ethereum_authority("skip-seed");
    tokio::spawn(async move {
        let _ = serve_authority(authority_io.compat(), &authority).await;
    });

    let mut io = relay_io.compat();
    write_message(
        &mut io,
        &BridgeMessage::Ready(signing_bridge::protocol::ReadyEvent { version: "x".into() }),
    )
    .await
    .unwrap();
    write_message(&mut io, &RequestEnvelope::new("real", json!(1)).into_message())
        .await
        .unwrap();

    let reply: BridgeMessage = read_message(&mut io).await.unwrap();
    assert!(matches!(reply, BridgeMessage::SignResult(ref r) if r.id == "real"));
}
