use serde_repr::{Deserialize_repr, Serialize_repr};

/// What a candidate stands for.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CandidateType {
    Person = 0,
    Problem = 1,
}
