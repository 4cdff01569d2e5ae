//! # Reputation Gate
//!
//! Pass/fail wrapper around the remote IP-reputation and CAPTCHA verifiers.
//! Any transport or decoding failure is an `Internal` error: the request is
//! rejected, never silently allowed.

use std::sync::Arc;

use domains::{CaptchaVerifier, DomainError, IdentityKey, ReputationChecker, Result};

pub const DEFAULT_DENY_ABOVE: f64 = 0.90;

pub struct ReputationGate {
    reputation: Arc<dyn ReputationChecker>,
    captcha: Arc<dyn CaptchaVerifier>,
    deny_above: f64,
}

impl ReputationGate {
    pub fn new(
        reputation: Arc<dyn ReputationChecker>,
        captcha: Arc<dyn CaptchaVerifier>,
        deny_above: f64,
    ) -> Self {
        Self { reputation, captcha, deny_above }
    }

    /// Denies addresses scoring strictly above the threshold.
    pub async fn check_reputation(&self, address: &IdentityKey) -> Result<()> {
        let score = self.reputation.score(address).await?;
        // The reputation service reports its own errors as out-of-range scores.
        if !(0.0..=1.0).contains(&score) {
            return Err(DomainError::Internal(format!(
                "reputation score out of range: {score}"
            )));
        }
        if score > self.deny_above {
            return Err(DomainError::Forbidden(
                "Usage through a VPN or proxy is not permitted.".into(),
            ));
        }
        Ok(())
    }

    /// A missing token is refused without contacting the verifier.
    pub async fn check_captcha(&self, token: Option<&str>) -> Result<()> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DomainError::Forbidden("Captcha token required.".into()))?;
        if !self.captcha.verify(token).await? {
            return Err(DomainError::Forbidden("Invalid captcha.".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockCaptchaVerifier, MockReputationChecker};

    fn gate_with_score(score: f64) -> ReputationGate {
        let mut reputation = MockReputationChecker::new();
        reputation.expect_score().returning(move |_| Ok(score));
        ReputationGate::new(
            Arc::new(reputation),
            Arc::new(MockCaptchaVerifier::new()),
            DEFAULT_DENY_ABOVE,
        )
    }

    #[tokio::test]
    async fn threshold_is_exclusive() {
        let address = IdentityKey::new("192.0.2.1");
        assert!(gate_with_score(0.90).check_reputation(&address).await.is_ok());
        assert!(matches!(
            gate_with_score(0.91).check_reputation(&address).await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn service_error_codes_fail_closed() {
        let address = IdentityKey::new("192.0.2.1");
        assert!(matches!(
            gate_with_score(-3.0).check_reputation(&address).await,
            Err(DomainError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn transport_failure_fails_closed() {
        let mut reputation = MockReputationChecker::new();
        reputation
            .expect_score()
            .returning(|_| Err(anyhow::anyhow!("timed out")));
        let gate = ReputationGate::new(
            Arc::new(reputation),
            Arc::new(MockCaptchaVerifier::new()),
            DEFAULT_DENY_ABOVE,
        );
        assert!(matches!(
            gate.check_reputation(&IdentityKey::new("192.0.2.1")).await,
            Err(DomainError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn missing_token_never_reaches_verifier() {
        let mut captcha = MockCaptchaVerifier::new();
        captcha.expect_verify().never();
        let gate = ReputationGate::new(
            Arc::new(MockReputationChecker::new()),
            Arc::new(captcha),
            DEFAULT_DENY_ABOVE,
        );
        assert!(matches!(gate.check_captcha(None).await, Err(DomainError::Forbidden(_))));
        assert!(matches!(gate.check_captcha(Some("  ")).await, Err(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn rejected_token_is_forbidden() {
        let mut captcha = MockCaptchaVerifier::new();
        captcha
            .expect_verify()
            .withf(|token| token == "good")
            .returning(|_| Ok(true));
        captcha
            .expect_verify()
            .withf(|token| token != "good")
            .returning(|_| Ok(false));
        let gate = ReputationGate::new(
            Arc::new(MockReputationChecker::new()),
            Arc::new(captcha),
            DEFAULT_DENY_ABOVE,
        );
        assert!(gate.check_captcha(Some("good")).await.is_ok());
        assert!(matches!(
            gate.check_captcha(Some("bad")).await,
            Err(DomainError::Forbidden(msg)) if msg == "Invalid captcha."
        ));
    }
}
