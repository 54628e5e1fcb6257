//! Signatures are bound to the kind of payload they were requested for.

use testresult::TestResult;
use veil_credentials::{Ed25519Signer, IntentScope, KeyWallet, Wallet};

#[tokio::test]
async fn personal_messages_cannot_pass_as_transactions() -> TestResult {
    let wallet = KeyWallet::from_seed(&[11; 32])?;
    let message = b"Accessing keys of package 0x2a";

    let signature = wallet.sign_personal_message(message).await?;

    assert_eq!(signature.signer(), wallet.address());
    signature.verify(IntentScope::PersonalMessage, message)?;
    assert!(
        signature
            .verify(IntentScope::TransactionData, message)
            .is_err()
    );
    Ok(())
}

#[tokio::test]
async fn an_exported_key_keeps_its_address() -> TestResult {
    let signer = Ed25519Signer::generate()?;
    let restored = Ed25519Signer::import(&signer.export())?;

    assert_eq!(signer.address(), restored.address());

    let wallet = KeyWallet::new(restored);
    let signature = wallet.sign_transaction(b"tx").await?;
    assert_eq!(signature.signer(), signer.address());
    assert_eq!(wallet.prompts(), 1);
    Ok(())
}
