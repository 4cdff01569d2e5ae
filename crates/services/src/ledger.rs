//! # Identity Ledger
//!
//! Owns the per-identity trust record and its transitions:
//!
//! ```text
//! (absent) --verify--> VERIFIED, captcha required
//! UNVERIFIED --verify--> VERIFIED (captcha re-rolled)
//! VERIFIED --verify--> VERIFIED (unchanged)
//! VERIFIED --post--> UNVERIFIED
//! any --moderation--> RESTRICTED (absorbing)
//! ```
//!
//! Verification is single-use: every successful post clears it.

use chrono::{DateTime, TimeDelta, Utc};
use domains::{BoardTx, DomainError, Identity, IdentityKey, Result, TrustState};
use tracing::debug;

use crate::utils::ip_hash;

pub const DEFAULT_POST_COOLDOWN_SECS: i64 = 15;
pub const DEFAULT_CAPTCHA_PROBABILITY: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    pub post_cooldown: TimeDelta,
    /// Chance that a returning identity must solve a CAPTCHA after re-verifying.
    pub captcha_probability: f64,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            post_cooldown: TimeDelta::seconds(DEFAULT_POST_COOLDOWN_SECS),
            captcha_probability: DEFAULT_CAPTCHA_PROBABILITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLedger {
    policy: LedgerPolicy,
}

impl IdentityLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Applies `verify` to an identity that already has a record and returns
    /// whether it must solve a CAPTCHA on its next post. `None` means there is
    /// no record yet: the caller checks reputation with no transaction open
    /// and then calls [`IdentityLedger::record_first_contact`].
    pub async fn verify_known(
        &self,
        tx: &mut dyn BoardTx,
        key: &IdentityKey,
    ) -> Result<Option<bool>> {
        let Some(mut identity) = tx.identity(key).await? else {
            return Ok(None);
        };

        match identity.trust_state() {
            TrustState::Restricted => Err(DomainError::Forbidden(identity.restricted_message)),
            TrustState::Verified | TrustState::VerifiedCaptchaRequired => {
                Ok(Some(identity.captcha_required))
            }
            TrustState::Unverified => {
                identity.verified = true;
                identity.captcha_required = self.roll_captcha();
                tx.save_identity(&identity).await?;
                debug!(
                    ip_hash = %ip_hash(key),
                    captcha_required = identity.captcha_required,
                    "re-verified"
                );
                Ok(Some(identity.captcha_required))
            }
        }
    }

    /// Creates the record of an identity that passed the reputation check.
    /// A record written meanwhile by a concurrent request is verified as
    /// usual instead.
    pub async fn record_first_contact(
        &self,
        tx: &mut dyn BoardTx,
        key: &IdentityKey,
    ) -> Result<bool> {
        if let Some(captcha_required) = self.verify_known(tx, key).await? {
            return Ok(captcha_required);
        }
        let identity = Identity::first_contact(key.clone());
        tx.insert_identity(&identity).await?;
        debug!(ip_hash = %ip_hash(key), "first contact recorded");
        Ok(identity.captcha_required)
    }

    /// Checks that `key` may post at `now`, without writing anything.
    pub async fn check_post(
        &self,
        tx: &mut dyn BoardTx,
        key: &IdentityKey,
        now: DateTime<Utc>,
    ) -> Result<Identity> {
        let identity = tx
            .identity(key)
            .await?
            .ok_or_else(|| DomainError::NotFound("User".into()))?;

        if identity.restricted {
            return Err(DomainError::Forbidden(identity.restricted_message));
        }
        if let Some(last) = identity.last_posted_at {
            if now < last + self.policy.post_cooldown {
                return Err(DomainError::Forbidden(format!(
                    "Please wait {} seconds before posting again.",
                    self.policy.post_cooldown.num_seconds()
                )));
            }
        }
        if !identity.verified {
            return Err(DomainError::Forbidden("Verification required.".into()));
        }
        Ok(identity)
    }

    /// Re-runs [`IdentityLedger::check_post`] and, if it still passes, spends
    /// the verification and starts the cooldown. `captcha_passed` says whether
    /// the caller already checked a CAPTCHA; a record that requires one
    /// without it is refused.
    ///
    /// The returned record is what was persisted; the caller issues the new
    /// ticket in the same transaction.
    pub async fn consume_for_post(
        &self,
        tx: &mut dyn BoardTx,
        key: &IdentityKey,
        now: DateTime<Utc>,
        captcha_passed: bool,
    ) -> Result<Identity> {
        let mut identity = self.check_post(tx, key, now).await?;
        if identity.captcha_required && !captcha_passed {
            return Err(DomainError::Forbidden("Captcha token required.".into()));
        }

        identity.verified = false;
        identity.last_posted_at = Some(now);
        tx.save_identity(&identity).await?;
        Ok(identity)
    }

    fn roll_captcha(&self) -> bool {
        rand::random::<f64>() < self.policy.captcha_probability
    }
}
