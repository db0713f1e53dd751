use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A UUID-based identifier that serializes to its hyphenated string form,
/// both in the database and in any JSON output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Id(Uuid);

impl Id {
    /// Generate a fresh random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero ID, used for requests that do not come from a person.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Parse a user-supplied identifier. Empty and malformed input are both
    /// rejected as validation errors, before anything touches the database.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::Validation("id can not be empty".to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::Validation(format!("invalid id \"{s}\"")))
    }

    /// A filter document matching this ID as the primary key.
    pub fn as_doc(&self) -> Document {
        doc! { "_id": *self }
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Id {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.to_string()
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<Id> for Bson {
    fn from(id: Id) -> Self {
        Bson::String(id.to_string())
    }
}
