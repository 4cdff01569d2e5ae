//! HTTP clients for the remote verifiers. Every call is bounded by the
//! client timeout; any transport, status or decoding failure is an error and
//! the caller fails closed.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use domains::{CaptchaVerifier, IdentityKey, ReputationChecker};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

fn client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")
}

/// Queries a getipintel-style endpoint: `GET {url}?ip=..&contact=..`
/// answering with a bare decimal score.
#[derive(Clone)]
pub struct HttpReputationChecker {
    client: Client,
    url: String,
    contact: String,
}

impl HttpReputationChecker {
    pub fn new(url: impl Into<String>, contact: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
            contact: contact.into(),
        })
    }
}

#[async_trait]
impl ReputationChecker for HttpReputationChecker {
    async fn score(&self, address: &IdentityKey) -> anyhow::Result<f64> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("ip", address.as_str()), ("contact", self.contact.as_str())])
            .send()
            .await
            .context("reputation request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("reputation service answered {status}"));
        }
        let body = resp.text().await.context("reading reputation response")?;
        let score: f64 = body
            .trim()
            .parse()
            .with_context(|| format!("unparseable reputation score {:?}", body.trim()))?;
        debug!(score, "reputation score");
        Ok(score)
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
}

/// reCAPTCHA-style `siteverify` client.
pub struct HttpCaptchaVerifier {
    client: Client,
    url: String,
    secret: SecretString,
}

impl HttpCaptchaVerifier {
    pub fn new(url: impl Into<String>, secret: SecretString, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
            secret,
        })
    }
}

#[async_trait]
impl CaptchaVerifier for HttpCaptchaVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<bool> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("secret", self.secret.expose_secret()), ("response", token)])
            .send()
            .await
            .context("captcha request")?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("captcha service answered {status}"));
        }
        let verdict: SiteVerifyResponse = resp.json().await.context("decoding captcha response")?;
        Ok(verdict.success)
    }
}
