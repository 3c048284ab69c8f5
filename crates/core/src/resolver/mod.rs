use crate::config::FallbackDelay;
use crate::credential::CredentialStore;
use crate::poem::{
    Emotion, FallbackPoemBank, InputError, PoemOrigin, PoemRequest, PoemResult, PoemSource,
    RemoteErrorKind,
};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "poem::resolver";

/// Why the remote poem was not used.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advisory {
    pub kind: RemoteErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generated {
    pub result: PoemResult,
    pub advisory: Option<Advisory>,
}

/// Picks a poem source for each request. Without a credential the
/// fallback bank answers directly; with one the remote source is tried
/// first and any failure drops back to the bank.
///
/// Holds no per-call state, so overlapping calls are independent.
pub struct PoemResolver<C, R> {
    credentials: C,
    remote: R,
    bank: FallbackPoemBank,
    fallback_delay: FallbackDelay,
}

impl<C, R> PoemResolver<C, R>
where
    C: CredentialStore,
    R: PoemSource,
{
    pub fn new(credentials: C, remote: R) -> Self {
        Self {
            credentials,
            remote,
            bank: FallbackPoemBank::new(),
            fallback_delay: FallbackDelay::none(),
        }
    }

    pub fn with_fallback_delay(mut self, delay: FallbackDelay) -> Self {
        self.fallback_delay = delay;
        self
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Validates raw input first; only an empty or oversized emotion is
    /// reported back.
    pub async fn generate_text(&self, raw: &str) -> Result<Generated, InputError> {
        let emotion = Emotion::new(raw)?;
        Ok(self.generate(&emotion).await)
    }

    pub async fn generate(&self, emotion: &Emotion) -> Generated {
        let credential = match self.credentials.get() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "credential store unreadable, using fallback");
                None
            }
        };

        let Some(credential) = credential else {
            tracing::debug!(target: LOG_TARGET, "no credential configured");
            return self.fallback(emotion, None).await;
        };

        let request = PoemRequest {
            emotion: emotion.clone(),
            credential: Some(credential),
        };
        match self.remote.compose(request).await {
            Ok(text) => {
                tracing::info!(target: LOG_TARGET, source = %PoemOrigin::Remote, "poem generated");
                Generated {
                    result: PoemResult::new(emotion, text, self.remote.origin()),
                    advisory: None,
                }
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, kind = ?e.kind(), error = %e, "remote generation failed, using fallback");
                let advisory = Advisory {
                    kind: e.kind(),
                    message: e.advisory(),
                };
                self.fallback(emotion, Some(advisory)).await
            }
        }
    }

    async fn fallback(&self, emotion: &Emotion, advisory: Option<Advisory>) -> Generated {
        if !self.fallback_delay.is_zero() {
            tokio::time::sleep(self.fallback_delay.duration()).await;
        }
        let request = PoemRequest {
            emotion: emotion.clone(),
            credential: None,
        };
        // The bank is infallible; the lookup arm only satisfies the signature.
        let text = match self.bank.compose(request).await {
            Ok(text) => text,
            Err(_) => self.bank.lookup(emotion.as_str()),
        };
        tracing::info!(target: LOG_TARGET, source = %self.bank.origin(), "poem generated");
        Generated {
            result: PoemResult::new(emotion, text, self.bank.origin()),
            advisory,
        }
    }
}
