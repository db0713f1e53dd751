use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// The voting scheme of an election. Stored as its integer discriminant.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ElectionType {
    /// Who voted for what is public.
    PublicVoters = 0,
    /// Only the results are visible.
    PrivateVoters = 1,
    /// A single yes/no question.
    SimpleYesNo = 2,
    /// Each candidate may only be picked a limited number of times; voters are private.
    PrivateLimitedCount = 3,
    /// As `PrivateLimitedCount`, but voters are public.
    PublicLimitedCount = 4,
}

impl Display for ElectionType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::PublicVoters => "public voters",
                Self::PrivateVoters => "private voters",
                Self::SimpleYesNo => "simple yes/no",
                Self::PrivateLimitedCount => "private limited count",
                Self::PublicLimitedCount => "public limited count",
            }
        )
    }
}

impl From<ElectionType> for Bson {
    fn from(election_type: ElectionType) -> Self {
        Bson::Int32(election_type as i32)
    }
}
