//! Opaque page tokens: protobuf messages encoded as unpadded URL-safe
//! base64.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use prost::Message;

use crate::slug::{self, ResourceKind};

#[derive(Debug, thiserror::Error)]
#[error("invalid pagination token")]
pub struct TokenError(#[source] TokenCause);

#[derive(Debug, thiserror::Error)]
pub enum TokenCause {
    #[error("decode base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decode message: {0}")]
    Message(#[from] prost::DecodeError),
    #[error("{0}")]
    Invalid(String),
}

impl From<base64::DecodeError> for TokenError {
    fn from(err: base64::DecodeError) -> Self {
        Self(err.into())
    }
}

impl From<prost::DecodeError> for TokenError {
    fn from(err: prost::DecodeError) -> Self {
        Self(err.into())
    }
}

impl From<TokenCause> for TokenError {
    fn from(cause: TokenCause) -> Self {
        Self(cause)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ListCategoriesPageToken {
    #[prost(string, tag = "1")]
    pub after_category: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListEntriesPageToken {
    /// Upstream listing page, starting at 1.
    #[prost(uint32, tag = "1")]
    pub page: u32,
    /// Path of the last entry already returned; empty when the page starts
    /// fresh.
    #[prost(string, tag = "2")]
    pub after_entry: String,
    #[prost(message, optional, tag = "3")]
    pub start_update_time: Option<prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListChaptersPageToken {
    #[prost(string, tag = "1")]
    pub after_chapter: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListUsersPageToken {
    #[prost(string, tag = "1")]
    pub after_user: String,
}

pub trait PageToken: Message + Default + Sized {
    fn validate(&self) -> Result<(), String>;
}

impl PageToken for ListCategoriesPageToken {
    fn validate(&self) -> Result<(), String> {
        if !slug::is_path(ResourceKind::Category, &self.after_category) {
            return Err(format!("after_category {:?} is not a category path", self.after_category));
        }
        Ok(())
    }
}

impl PageToken for ListEntriesPageToken {
    fn validate(&self) -> Result<(), String> {
        if self.page < 1 {
            return Err("page must be at least 1".to_owned());
        }
        if self.after_entry.is_empty() {
            return Ok(());
        }
        if !slug::is_path(ResourceKind::Entry, &self.after_entry) {
            return Err(format!("after_entry {:?} is not an entry path", self.after_entry));
        }
        match &self.start_update_time {
            None => Err("start_update_time is required with after_entry".to_owned()),
            Some(ts) if from_timestamp(ts).is_none() => {
                Err("start_update_time is out of range".to_owned())
            }
            Some(_) => Ok(()),
        }
    }
}

impl PageToken for ListChaptersPageToken {
    fn validate(&self) -> Result<(), String> {
        if !slug::is_path(ResourceKind::Chapter, &self.after_chapter) {
            return Err(format!("after_chapter {:?} is not a chapter path", self.after_chapter));
        }
        Ok(())
    }
}

impl PageToken for ListUsersPageToken {
    fn validate(&self) -> Result<(), String> {
        if !slug::is_user_path(&self.after_user) {
            return Err(format!("after_user {:?} is not a user path", self.after_user));
        }
        Ok(())
    }
}

pub fn encode<T: PageToken>(token: &T) -> Result<String, TokenError> {
    token.validate().map_err(TokenCause::Invalid)?;
    Ok(URL_SAFE_NO_PAD.encode(token.encode_to_vec()))
}

pub fn decode<T: PageToken>(token: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(token)?;
    let message = T::decode(bytes.as_slice())?;
    message.validate().map_err(TokenCause::Invalid)?;
    Ok(message)
}

/// Decodes `token` unless it is empty.
pub fn decode_optional<T: PageToken>(token: &str) -> Result<Option<T>, TokenError> {
    if token.is_empty() {
        return Ok(None);
    }
    decode(token).map(Some)
}

pub fn to_timestamp(time: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: time.timestamp(),
        nanos: time.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}
