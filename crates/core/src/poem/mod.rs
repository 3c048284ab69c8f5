mod fallback;
mod remote;

use crate::config::ApiKey;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use fallback::FallbackPoemBank;
pub use remote::OpenAiPoemClient;

pub const MAX_EMOTION_CHARS: usize = 200;

/// A validated emotion phrase: trimmed, non-empty and at most
/// [`MAX_EMOTION_CHARS`] characters long.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub struct Emotion(String);

impl Emotion {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, InputError> {
        let v = value.into();
        let trimmed = v.trim();
        if trimmed.is_empty() {
            return Err(InputError::Empty);
        }
        let len = trimmed.chars().count();
        if len > MAX_EMOTION_CHARS {
            return Err(InputError::TooLong {
                len,
                max: MAX_EMOTION_CHARS,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Emotion {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Emotion> for String {
    fn from(value: Emotion) -> Self {
        value.0
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("tell me what's in your heart: the emotion must not be empty")]
    Empty,
    #[error("emotion is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PoemOrigin {
    Remote,
    Fallback,
}

impl PoemOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoemOrigin::Remote => "remote",
            PoemOrigin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PoemOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished poem. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoemResult {
    emotion_label: String,
    poem_text: String,
    source: PoemOrigin,
    generated_at: DateTime<Utc>,
}

impl PoemResult {
    pub fn new(emotion: &Emotion, poem_text: String, source: PoemOrigin) -> Self {
        Self::from_parts(emotion.as_str(), poem_text, source, Utc::now())
    }

    pub fn from_parts(
        emotion_label: &str,
        poem_text: String,
        source: PoemOrigin,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            emotion_label: emotion_label.to_owned(),
            poem_text,
            source,
            generated_at,
        }
    }

    pub fn emotion_label(&self) -> &str {
        &self.emotion_label
    }

    pub fn poem_text(&self) -> &str {
        &self.poem_text
    }

    pub fn source(&self) -> PoemOrigin {
        self.source
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

#[derive(Clone, Debug)]
pub struct PoemRequest {
    pub emotion: Emotion,
    pub credential: Option<ApiKey>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("credential was rejected")]
    Unauthorized,
    #[error("rate limit or quota exceeded")]
    RateLimited,
    #[error("request was rejected as malformed")]
    BadRequest,
    #[error("service error: {0}")]
    Service(String),
    #[error("service returned no poem text")]
    EmptyResponse,
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    Unauthorized,
    RateLimited,
    BadRequest,
    Service,
    EmptyResponse,
    Network,
}

impl RemoteError {
    pub fn kind(&self) -> RemoteErrorKind {
        match self {
            RemoteError::Unauthorized => RemoteErrorKind::Unauthorized,
            RemoteError::RateLimited => RemoteErrorKind::RateLimited,
            RemoteError::BadRequest => RemoteErrorKind::BadRequest,
            RemoteError::Service(_) => RemoteErrorKind::Service,
            RemoteError::EmptyResponse => RemoteErrorKind::EmptyResponse,
            RemoteError::Network(_) => RemoteErrorKind::Network,
        }
    }

    /// Short, non-blocking notice for the person waiting on the poem.
    pub fn advisory(&self) -> String {
        match self {
            RemoteError::Unauthorized => {
                "Your API key was not accepted. Check it and try again; here is a poem from the bank instead.".to_owned()
            }
            RemoteError::RateLimited => {
                "The poetry service is out of breath (rate limit reached). Try again in a moment.".to_owned()
            }
            RemoteError::BadRequest => {
                "The poetry service could not read that feeling. Try different words.".to_owned()
            }
            RemoteError::Service(message) => {
                format!("The poetry service stumbled: {message}")
            }
            RemoteError::EmptyResponse => {
                "The poetry service returned an empty page. Here is a poem from the bank instead.".to_owned()
            }
            RemoteError::Network(_) => {
                "Could not reach the poetry service. Check your connection.".to_owned()
            }
        }
    }
}

/// Anything that can turn an emotion into poem text.
pub trait PoemSource: Send + Sync {
    fn origin(&self) -> PoemOrigin;

    fn compose(&self, request: PoemRequest) -> BoxFuture<'_, Result<String, RemoteError>>;
}
