//! Keyed anonymization of the player-identifier column.
//!
//! The digest input is `"{pepper}:{raw_id}"` — pepper first, joined with a
//! colon. That order is the contract; changing it silently breaks joins
//! between snapshots anonymized by different builds.

use std::env;

use md5::Md5;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::table::{Cell, Table, TableError, ID_COLUMN};

/// Environment variable holding the hashing pepper.
pub const PEPPER_ENV_VAR: &str = "CHURNPREP_PEPPER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Md5,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnonymizeError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("missing required secret: {0} is not set or empty")]
    MissingSecret(&'static str),
}

pub fn parse_hash_algorithm(input: &str) -> Result<HashAlgorithm, AnonymizeError> {
    match input.trim().to_ascii_lowercase().as_str() {
        "sha256" => Ok(HashAlgorithm::Sha256),
        "md5" => Ok(HashAlgorithm::Md5),
        other => Err(AnonymizeError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Loads the pepper from the process environment.
///
/// This is the only place the secret touches ambient state; the transforms
/// below take the pepper as an explicit argument.
pub fn pepper_from_env() -> Result<String, SecretError> {
    match env::var(PEPPER_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SecretError::MissingSecret(PEPPER_ENV_VAR)),
    }
}

/// Replaces every `UUID` cell with the hex digest of `"{pepper}:{id}"`.
///
/// Missing identifier cells stay missing; a missing column is an error.
pub fn hash_player_ids(
    table: &mut Table,
    pepper: &str,
    algorithm: HashAlgorithm,
) -> Result<(), AnonymizeError> {
    let col = table.require_column(ID_COLUMN)?;

    for row in 0..table.row_count() {
        let digest = match table.cell(row, col) {
            Cell::Missing => continue,
            Cell::Text(raw) => digest_id(pepper, raw, algorithm),
            // Identifier columns are textual, but a numeric-looking UUID that
            // was sniffed into a number still has to hash to something stable.
            Cell::Number(v) => digest_id(pepper, &format_number(*v), algorithm),
        };
        table.set_cell(row, col, Cell::Text(digest));
    }

    info!(
        component = "anonymize",
        event = "anonymize.hash.applied",
        algorithm = algorithm.as_str(),
        rows = table.row_count()
    );
    Ok(())
}

/// Drops the `UUID` column entirely (the public-artifact variant).
pub fn clear_player_ids(table: &mut Table) -> Result<(), AnonymizeError> {
    table.drop_column(ID_COLUMN)?;
    Ok(())
}

fn digest_id(pepper: &str, raw_id: &str, algorithm: HashAlgorithm) -> String {
    let material = format!("{pepper}:{raw_id}");
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(material.as_bytes());
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(material.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
