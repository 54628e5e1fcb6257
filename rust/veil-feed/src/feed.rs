//! Turning ledger posts into what the feed shows.

use crate::{FailureReason, Renderable, TaskState};
use std::collections::HashMap;
use tracing::warn;
use veil_ledger::{
    AccessCredential, ContentRecord, EncryptionId, LedgerObject, ObjectId, PostsPackage,
    find_credential,
};
use veil_remote::blob_url;

/// A post, classified by what the viewer may see.
#[derive(Debug, Clone, PartialEq)]
pub enum Post {
    /// Not encrypted; the image, if any, is served publicly
    Public {
        /// The ledger record
        record: ContentRecord,
        /// Public image URL
        image_url: Option<String>,
    },
    /// Encrypted and the viewer holds no credential
    Locked {
        /// The ledger record
        record: ContentRecord,
        /// Advisory fee for display
        fee_in_sui: f64,
        /// Identifier the image is sealed under
        encryption_id: EncryptionId,
    },
    /// Encrypted and the viewer holds a credential
    NeedsDecryption {
        /// The ledger record
        record: ContentRecord,
        /// The credential that unlocks it
        credential: AccessCredential,
    },
}

impl Post {
    /// The underlying ledger record.
    pub fn record(&self) -> &ContentRecord {
        match self {
            Post::Public { record, .. }
            | Post::Locked { record, .. }
            | Post::NeedsDecryption { record, .. } => record,
        }
    }

    /// The post's object id.
    pub fn id(&self) -> &ObjectId {
        &self.record().id
    }
}

/// Decryption progress as shown next to a post.
#[derive(Debug, Clone, PartialEq)]
pub enum DecryptionView {
    /// Waiting to be decrypted
    Pending,
    /// Being decrypted
    Decrypting,
    /// Decrypted image
    Ready(Renderable),
    /// Decryption failed; can be retried
    Failed(FailureReason),
}

impl From<&TaskState> for DecryptionView {
    fn from(state: &TaskState) -> Self {
        match state {
            TaskState::Idle => DecryptionView::Pending,
            TaskState::Decrypting => DecryptionView::Decrypting,
            TaskState::Decrypted(renderable) => DecryptionView::Ready(renderable.clone()),
            TaskState::Failed(reason) => DecryptionView::Failed(reason.clone()),
        }
    }
}

/// A post together with its decryption progress, if it needs decrypting.
#[derive(Debug, Clone, PartialEq)]
pub struct PostView {
    /// The classified post
    pub post: Post,
    /// Set for [`Post::NeedsDecryption`] only
    pub decryption: Option<DecryptionView>,
}

/// Apply the post schema to raw objects, dropping any that do not fit.
pub fn parse_records(package: &PostsPackage, objects: &[LedgerObject]) -> Vec<ContentRecord> {
    objects
        .iter()
        .filter_map(|object| match package.parse_post(object) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(%error, "Dropping malformed post");
                None
            }
        })
        .collect()
}

/// Classify records against the viewer's credentials, keeping their order.
pub fn classify(
    records: &[ContentRecord],
    credentials: &[AccessCredential],
    aggregator_url: &str,
) -> Vec<Post> {
    records
        .iter()
        .map(|record| match &record.encryption_id {
            None => Post::Public {
                record: record.clone(),
                image_url: record
                    .image_locator
                    .as_ref()
                    .map(|locator| blob_url(aggregator_url, locator)),
            },
            Some(encryption_id) => match find_credential(&record.id, credentials) {
                Some(credential) => Post::NeedsDecryption {
                    record: record.clone(),
                    credential: credential.clone(),
                },
                None => Post::Locked {
                    record: record.clone(),
                    fee_in_sui: record.fee_in_sui(),
                    encryption_id: encryption_id.clone(),
                },
            },
        })
        .collect()
}

/// Attach decryption progress to posts that need it.
pub fn merge(posts: Vec<Post>, states: &HashMap<ObjectId, TaskState>) -> Vec<PostView> {
    posts
        .into_iter()
        .map(|post| {
            let decryption = match &post {
                Post::NeedsDecryption { record, .. } => Some(
                    states
                        .get(&record.id)
                        .map(DecryptionView::from)
                        .unwrap_or(DecryptionView::Pending),
                ),
                _ => None,
            };
            PostView { post, decryption }
        })
        .collect()
}
