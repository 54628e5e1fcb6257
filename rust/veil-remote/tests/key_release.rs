//! Key release against an in-memory ledger: policy, session certificates and
//! committee thresholds.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use testresult::TestResult;
use veil_common::time::{now, to_unix_millis};
use veil_credentials::{Ed25519Signer, KeyWallet, Wallet};
use veil_ledger::{EncryptionId, MemoryLedger, ObjectId, ProofBuilder};
use veil_remote::{
    KeyReleaseError, KeyReleaseService, KeyRequest, KeyServerCommittee, MemoryKeyServer,
    SessionCertificate,
};

struct World {
    ledger: MemoryLedger,
    server: MemoryKeyServer,
    viewer: KeyWallet,
    post: ObjectId,
    encryption_id: EncryptionId,
    ciphertext: Vec<u8>,
}

fn world() -> TestResult<World> {
    let ledger = MemoryLedger::new("0x2a".parse()?);
    let server = MemoryKeyServer::new([3; 32], ledger.clone());
    let viewer = KeyWallet::from_seed(&[7; 32])?;
    let encryption_id = EncryptionId::new(vec![0xde, 0xad, 0x01]);
    let post = ledger.publish_post(
        viewer.address(),
        "sealed",
        None,
        Some(encryption_id.clone()),
        0,
    );
    let ciphertext = server.seal(&encryption_id, b"\x89PNG image")?;
    Ok(World {
        ledger,
        server,
        viewer,
        post,
        encryption_id,
        ciphertext,
    })
}

async fn request(world: &World, issued_at: u64, threshold: usize) -> TestResult<KeyRequest> {
    let credential = world
        .ledger
        .mint_credential(&world.post, &world.viewer.address())?;
    let proof = ProofBuilder::new(world.ledger.package()).approve_access(
        &world.encryption_id,
        &world.post,
        &credential,
    )?;

    let session_key = Ed25519Signer::generate()?;
    let package = *world.ledger.package().id();
    let challenge =
        SessionCertificate::challenge(&package, session_key.verifier(), issued_at, 30);
    let certificate = SessionCertificate {
        user: world.viewer.address(),
        package,
        session_key: *session_key.verifier(),
        issued_at,
        ttl_minutes: 30,
        signature: world.viewer.sign_personal_message(&challenge).await?,
    };

    Ok(KeyRequest::new(&proof, certificate, &session_key, threshold)?)
}

#[tokio::test]
async fn a_credential_holder_can_decrypt() -> TestResult {
    let world = world()?;
    let request = request(&world, to_unix_millis(now()), 1).await?;

    let keys = world.server.fetch_keys(&request).await?;
    let plaintext = world.server.decrypt(&world.ciphertext, &keys)?;

    assert_eq!(plaintext, b"\x89PNG image");
    assert_eq!(world.server.requests(), 1);
    Ok(())
}

#[tokio::test]
async fn expired_sessions_are_refused() -> TestResult {
    let world = world()?;
    let an_hour_ago = to_unix_millis(now()) - 60 * 60_000;
    let request = request(&world, an_hour_ago, 1).await?;

    let result = world.server.fetch_keys(&request).await;
    assert!(matches!(
        result,
        Err(KeyReleaseError::InvalidCertificate(_))
    ));
    Ok(())
}

#[tokio::test]
async fn requests_signed_by_another_key_are_refused() -> TestResult {
    let world = world()?;
    let mut request = request(&world, to_unix_millis(now()), 1).await?;
    request.request_signature = Ed25519Signer::generate()?
        .sign_bytes(&request.tx_bytes)?
        .to_vec();

    assert!(world.server.fetch_keys(&request).await.is_err());
    Ok(())
}

#[tokio::test]
async fn requests_for_other_identifiers_are_denied() -> TestResult {
    let world = world()?;
    let mut request = request(&world, to_unix_millis(now()), 1).await?;
    request.ids = vec![EncryptionId::new(vec![0xff])];

    let result = world.server.fetch_keys(&request).await;
    assert!(matches!(result, Err(KeyReleaseError::Denied(_))));
    Ok(())
}

#[tokio::test]
async fn a_lone_server_cannot_satisfy_a_larger_threshold() -> TestResult {
    let world = world()?;
    let request = request(&world, to_unix_millis(now()), 3).await?;

    let result = world.server.fetch_keys(&request).await;
    assert_eq!(
        result.unwrap_err(),
        KeyReleaseError::ThresholdNotMet {
            required: 3,
            agreed: 1
        }
    );
    Ok(())
}

#[tokio::test]
async fn the_committee_tolerates_servers_below_threshold() -> TestResult {
    let world = world()?;
    let replica = world.server.clone();
    let offline = MemoryKeyServer::new([3; 32], world.ledger.clone());
    offline.set_available(false);

    let committee = KeyServerCommittee::new(vec![
        Arc::new(offline) as Arc<dyn KeyReleaseService>,
        Arc::new(world.server.clone()),
        Arc::new(replica),
    ]);

    let request = request(&world, to_unix_millis(now()), 2).await?;
    let keys = committee.fetch_keys(&request).await?;
    assert_eq!(committee.decrypt(&world.ciphertext, &keys)?, b"\x89PNG image");
    Ok(())
}

#[tokio::test]
async fn the_committee_reports_an_unmet_threshold() -> TestResult {
    let world = world()?;
    let offline = MemoryKeyServer::new([3; 32], world.ledger.clone());
    offline.set_available(false);
    let committee = KeyServerCommittee::new(vec![
        Arc::new(offline) as Arc<dyn KeyReleaseService>,
        Arc::new(world.server.clone()),
    ]);

    let request = request(&world, to_unix_millis(now()), 2).await?;
    let result = committee.fetch_keys(&request).await;
    assert_eq!(
        result.unwrap_err(),
        KeyReleaseError::ThresholdNotMet {
            required: 2,
            agreed: 1
        }
    );
    Ok(())
}
