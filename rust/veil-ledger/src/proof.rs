//! Unsigned transactions that prove access to a policy evaluator.
//!
//! Key servers never see a credential directly. Instead the viewer hands them
//! the bytes of a transaction that calls the package's approval function with
//! the encryption identifier, the post and the credential. The key server
//! dry-runs that call; if it aborts, no key is released. Nothing here touches
//! the network.

use crate::{EncryptionId, LedgerError, ObjectId, POSTS_MODULE, PostsPackage};
use serde::{Deserialize, Serialize};
use veil_credentials::Address;

/// Policy hook evaluated by key servers before releasing a key.
pub const APPROVE_FUNCTION: &str = "seal_approve_access";
/// Entry point that mints an access credential.
pub const GRANT_FUNCTION: &str = "grant_access";

/// An input to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// A plain value, already serialized.
    Pure(#[serde(with = "serde_bytes")] Vec<u8>),
    /// A reference to a ledger object.
    Object(ObjectId),
}

/// A reference to a transaction input or to the result of a prior command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    /// Index into the transaction's inputs
    Input(u16),
    /// Index of an earlier command whose result is used
    Result(u16),
}

/// A call into a package function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCall {
    /// Package being called
    pub package: ObjectId,
    /// Module within the package
    pub module: String,
    /// Function name
    pub function: String,
    /// Arguments in declaration order
    pub arguments: Vec<Argument>,
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Call a package function.
    MoveCall(MoveCall),
    /// Send objects to an address.
    TransferObjects {
        /// Objects to transfer
        objects: Vec<Argument>,
        /// Input holding the recipient address
        recipient: Argument,
    },
}

/// The kind portion of a transaction: inputs and commands, with no sender,
/// gas or signature attached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionKind {
    /// Inputs referenced by the commands
    pub inputs: Vec<CallArg>,
    /// Commands in execution order
    pub commands: Vec<Command>,
}

impl TransactionKind {
    /// Add an input and return an argument referring to it.
    pub fn input(&mut self, arg: CallArg) -> Argument {
        self.inputs.push(arg);
        Argument::Input((self.inputs.len() - 1) as u16)
    }

    /// Add a command and return an argument referring to its result.
    pub fn command(&mut self, command: Command) -> Argument {
        self.commands.push(command);
        Argument::Result((self.commands.len() - 1) as u16)
    }

    /// Resolve an argument to the input it names.
    pub fn resolve(&self, argument: &Argument) -> Option<&CallArg> {
        match argument {
            Argument::Input(index) => self.inputs.get(*index as usize),
            Argument::Result(_) => None,
        }
    }

    /// Serialize to the canonical byte form handed to key servers and
    /// sponsors.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    /// Parse bytes produced by [`TransactionKind::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| LedgerError::Encoding(e.to_string()))
    }
}

/// Unsigned transaction bytes proving that the caller holds a credential for
/// a post, bound to the post's encryption identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationProof {
    encryption_id: EncryptionId,
    tx_bytes: Vec<u8>,
}

impl AuthorizationProof {
    /// The identifier whose key this proof asks for.
    pub fn encryption_id(&self) -> &EncryptionId {
        &self.encryption_id
    }

    /// The encoded transaction kind.
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }
}

/// Builds the transactions the viewer submits or hands to key servers.
#[derive(Debug, Clone, Copy)]
pub struct ProofBuilder {
    package: PostsPackage,
}

impl ProofBuilder {
    /// A builder targeting `package`.
    pub const fn new(package: PostsPackage) -> Self {
        Self { package }
    }

    /// `seal_approve_access(id, post, credential)`: exactly three
    /// arguments, in that order. `encryption_id` must be the identifier
    /// stored on the post or the policy call aborts.
    pub fn approve_access(
        &self,
        encryption_id: &EncryptionId,
        content_id: &ObjectId,
        credential_id: &ObjectId,
    ) -> Result<AuthorizationProof, LedgerError> {
        let mut tx = TransactionKind::default();
        let id = tx.input(CallArg::Pure(encryption_id.as_bytes().to_vec()));
        let post = tx.input(CallArg::Object(*content_id));
        let credential = tx.input(CallArg::Object(*credential_id));
        tx.command(Command::MoveCall(self.call(APPROVE_FUNCTION, vec![id, post, credential])));

        Ok(AuthorizationProof {
            encryption_id: encryption_id.clone(),
            tx_bytes: tx.encode()?,
        })
    }

    /// `grant_access(post)` followed by a transfer of the returned credential
    /// to `recipient`.
    pub fn grant_access(&self, content_id: &ObjectId, recipient: &Address) -> TransactionKind {
        let mut tx = TransactionKind::default();
        let post = tx.input(CallArg::Object(*content_id));
        let credential = tx.command(Command::MoveCall(self.call(GRANT_FUNCTION, vec![post])));
        let recipient = tx.input(CallArg::Pure(recipient.as_bytes().to_vec()));
        tx.command(Command::TransferObjects {
            objects: vec![credential],
            recipient,
        });
        tx
    }

    fn call(&self, function: &str, arguments: Vec<Argument>) -> MoveCall {
        MoveCall {
            package: *self.package.id(),
            module: POSTS_MODULE.to_string(),
            function: function.to_string(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn builder() -> ProofBuilder {
        ProofBuilder::new(PostsPackage::new("0x2a".parse().unwrap()))
    }

    #[test]
    fn approval_carries_three_arguments_in_order() {
        let encryption_id = EncryptionId::new(vec![0xab, 0x12]);
        let post: ObjectId = "0x1".parse().unwrap();
        let credential: ObjectId = "0x2".parse().unwrap();

        let proof = builder()
            .approve_access(&encryption_id, &post, &credential)
            .unwrap();
        assert_eq!(proof.encryption_id(), &encryption_id);

        let tx = TransactionKind::decode(proof.tx_bytes()).unwrap();
        let [Command::MoveCall(call)] = tx.commands.as_slice() else {
            panic!("expected a single move call, got {:?}", tx.commands);
        };
        assert_eq!(call.function, APPROVE_FUNCTION);
        assert_eq!(call.module, POSTS_MODULE);
        assert_eq!(call.arguments.len(), 3);

        let resolved: Vec<_> = call
            .arguments
            .iter()
            .map(|argument| tx.resolve(argument).cloned())
            .collect();
        assert_eq!(
            resolved,
            vec![
                Some(CallArg::Pure(vec![0xab, 0x12])),
                Some(CallArg::Object(post)),
                Some(CallArg::Object(credential)),
            ]
        );
    }

    #[test]
    fn approval_bytes_are_deterministic() {
        let encryption_id = EncryptionId::new(vec![1, 2, 3]);
        let post: ObjectId = "0x1".parse().unwrap();
        let credential: ObjectId = "0x2".parse().unwrap();

        let first = builder()
            .approve_access(&encryption_id, &post, &credential)
            .unwrap();
        let second = builder()
            .approve_access(&encryption_id, &post, &credential)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn grant_transfers_the_minted_credential() {
        let post: ObjectId = "0x1".parse().unwrap();
        let viewer: Address = "0x77".parse().unwrap();

        let tx = builder().grant_access(&post, &viewer);
        assert_eq!(tx.commands.len(), 2);
        let Command::TransferObjects { objects, recipient } = &tx.commands[1] else {
            panic!("expected a transfer");
        };
        assert_eq!(objects, &vec![Argument::Result(0)]);
        assert_eq!(
            tx.resolve(recipient),
            Some(&CallArg::Pure(viewer.as_bytes().to_vec()))
        );
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(
            TransactionKind::decode(b"not a transaction"),
            Err(LedgerError::Encoding(_))
        ));
    }
}
