// Admission policy: does this submission wait for a moderator?
//
// Guests are always held. Registered accounts are held only while the site
// has the post queue switched on and the account has neither reputation nor
// any posts yet.

use super::coercion::coerce_int;
use super::queue_models::{SiteConfig, SubmitterId};
use super::queue_store::{ProfileError, ProfileStore};
use std::collections::HashMap;

/// Profile fields the decision reads.
pub const STANDING_FIELDS: [&str; 2] = ["reputation", "postcount"];

/// A submitter's reputation and lifetime post count, already coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserStanding {
    pub reputation: i64,
    pub postcount: i64,
}

impl UserStanding {
    /// Missing or non-numeric fields count as 0.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let number = |name: &str| fields.get(name).map(|v| coerce_int(v)).unwrap_or(0);
        Self {
            reputation: number("reputation"),
            postcount: number("postcount"),
        }
    }

    pub fn is_new_account(&self) -> bool {
        self.reputation <= 0 && self.postcount <= 0
    }
}

/// The pure decision, separated from the profile lookup.
pub fn decide(submitter: SubmitterId, standing: UserStanding, config: &SiteConfig) -> bool {
    submitter.is_guest() || (config.post_queue && standing.is_new_account())
}

pub struct AdmissionPolicy<P: ProfileStore> {
    profiles: P,
}

impl<P: ProfileStore> AdmissionPolicy<P> {
    pub fn new(profiles: P) -> Self {
        Self { profiles }
    }

    /// Look up the submitter's standing and decide.
    ///
    /// The lookup always happens, guests included, and its failure is
    /// returned as-is rather than replaced with a default answer.
    pub async fn should_queue(
        &self,
        submitter: SubmitterId,
        config: &SiteConfig,
    ) -> Result<bool, ProfileError> {
        let fields = self
            .profiles
            .get_user_fields(submitter.get(), &STANDING_FIELDS)
            .await?;
        let standing = UserStanding::from_fields(&fields);

        Ok(decide(submitter, standing, config))
    }
}
