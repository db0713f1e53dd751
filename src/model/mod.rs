//! Data types shared by the storage layer and the reconciliation logic.

pub mod common;
pub mod db;
pub mod mongodb;
