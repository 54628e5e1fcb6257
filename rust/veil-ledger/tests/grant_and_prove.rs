//! A viewer buys access to an encrypted post, then proves it.

use std::sync::Arc;
use testresult::TestResult;
use veil_credentials::{KeyWallet, Wallet};
use veil_ledger::{
    CredentialStore, EncryptionId, LedgerError, LedgerWriter, MemoryLedger, ProofBuilder,
    find_credential, has_access,
};

#[tokio::test]
async fn granted_credentials_authorize_key_release() -> TestResult {
    let ledger = MemoryLedger::new("0x2a".parse()?);
    let package = ledger.package();
    let author = KeyWallet::from_seed(&[1; 32])?;
    let viewer = KeyWallet::from_seed(&[2; 32])?;
    let stranger = KeyWallet::from_seed(&[3; 32])?;

    let encryption_id = EncryptionId::new(vec![0xaa, 0xbb, 0xcc]);
    let post = ledger.publish_post(
        author.address(),
        "members only",
        Some("blob-1".parse()?),
        Some(encryption_id.clone()),
        2_500_000_000,
    );

    let store = CredentialStore::new(Arc::new(ledger.clone()), package);
    let before = store.list_credentials(Some(&viewer.address())).await?;
    assert!(!has_access(&post, &before));

    ledger.grant_access(&post, &viewer).await?;
    store.invalidate(&viewer.address());

    let after = store.list_credentials(Some(&viewer.address())).await?;
    let credential = find_credential(&post, &after).ok_or("credential missing after grant")?;

    let proof = ProofBuilder::new(package).approve_access(
        &encryption_id,
        &post,
        &credential.credential_id,
    )?;

    assert_eq!(ledger.evaluate(proof.tx_bytes(), &viewer.address())?, encryption_id);
    assert!(matches!(
        ledger.evaluate(proof.tx_bytes(), &stranger.address()),
        Err(LedgerError::Denied(_))
    ));
    Ok(())
}

#[tokio::test]
async fn proofs_bound_to_another_identifier_are_denied() -> TestResult {
    let ledger = MemoryLedger::new("0x2a".parse()?);
    let viewer = KeyWallet::from_seed(&[2; 32])?;
    let post = ledger.publish_post(
        viewer.address(),
        "mine",
        None,
        Some(EncryptionId::new(vec![1, 2, 3])),
        0,
    );
    let credential = ledger.mint_credential(&post, &viewer.address())?;

    let proof = ProofBuilder::new(ledger.package()).approve_access(
        &EncryptionId::new(vec![9, 9, 9]),
        &post,
        &credential,
    )?;

    assert!(ledger.evaluate(proof.tx_bytes(), &viewer.address()).is_err());
    Ok(())
}
