// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Argon2id password hashing and the password strength policy.
//!
//! Encoded form: `$argon2id$v=19$t=<t>,m=<m>,p=<p>$<salt>$<hash>` with
//! no-padding standard base64 for salt and hash and memory in KiB.  Fields
//! are positional and mandatory; `Verify` re-derives with the parameters
//! found in the encoded string, so parameter changes never invalidate
//! existing hashes.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct PasswordParams {
    pub time_cost: u32,
    /// Memory in KiB.
    pub memory_kib: u32,
    pub parallelism: u32,
    pub key_len: usize,
    pub salt_len: usize,
}

impl Default for PasswordParams {
    fn default() -> Self {
        Self { time_cost: 3, memory_kib: 64 * 1024, parallelism: 4, key_len: 32, salt_len: 16 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordService {
    params: PasswordParams,
}

impl PasswordService {
    pub fn new(params: PasswordParams) -> Self {
        Self { params }
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let mut salt = vec![0u8; self.params.salt_len];
        OsRng.fill_bytes(&mut salt);
        let key = self.derive(
            password,
            &salt,
            self.params.time_cost,
            self.params.memory_kib,
            self.params.parallelism,
            self.params.key_len,
        )?;
        Ok(format!(
            "$argon2id$v=19$t={},m={},p={}${}${}",
            self.params.time_cost,
            self.params.memory_kib,
            self.params.parallelism,
            STANDARD_NO_PAD.encode(&salt),
            STANDARD_NO_PAD.encode(&key),
        ))
    }

    /// Verify `password` against an encoded hash in constant time.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, AuthError> {
        let parsed = parse_encoded(encoded)?;
        let key = self.derive(
            password,
            &parsed.salt,
            parsed.time_cost,
            parsed.memory_kib,
            parsed.parallelism,
            parsed.hash.len(),
        )?;
        Ok(bool::from(key.ct_eq(&parsed.hash)))
    }

    /// Enforce the strength policy: length within bounds and at least one
    /// uppercase letter, one lowercase letter, and one digit.
    pub fn validate_strength(&self, password: &str) -> Result<(), AuthError> {
        let len = password.chars().count();
        if len < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if len > MAX_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at most {MAX_PASSWORD_LEN} characters"
            )));
        }
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(AuthError::InvalidInput(
                "password must contain an uppercase letter".into(),
            ));
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(AuthError::InvalidInput(
                "password must contain a lowercase letter".into(),
            ));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidInput("password must contain a digit".into()));
        }
        Ok(())
    }

    /// Generate a random password of `len` characters (clamped to the policy
    /// bounds) that satisfies [`Self::validate_strength`].
    ///
    /// Character selection uses rejection sampling over the OS CSPRNG, so
    /// the distribution over the alphabet is uniform.
    pub fn generate(&self, len: usize) -> String {
        const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
        const DIGIT: &[u8] = b"0123456789";
        const ALL: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

        let len = len.clamp(MIN_PASSWORD_LEN, MAX_PASSWORD_LEN);
        let mut chars: Vec<u8> = Vec::with_capacity(len);
        // One of each required class, then fill from the full alphabet.
        chars.push(UPPER[random_index(UPPER.len())]);
        chars.push(LOWER[random_index(LOWER.len())]);
        chars.push(DIGIT[random_index(DIGIT.len())]);
        while chars.len() < len {
            chars.push(ALL[random_index(ALL.len())]);
        }
        // Fisher-Yates so the class-guaranteed characters are not pinned to
        // the front.
        for i in (1..chars.len()).rev() {
            chars.swap(i, random_index(i + 1));
        }
        String::from_utf8(chars).unwrap_or_default()
    }

    fn derive(
        &self,
        password: &str,
        salt: &[u8],
        time_cost: u32,
        memory_kib: u32,
        parallelism: u32,
        key_len: usize,
    ) -> Result<Vec<u8>, AuthError> {
        let params = Params::new(memory_kib, time_cost, parallelism, Some(key_len))
            .map_err(|e| AuthError::InvalidInput(format!("bad argon2 parameters: {e}")))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut out = vec![0u8; key_len];
        argon
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(|e| AuthError::InvalidInput(format!("argon2 derivation failed: {e}")))?;
        Ok(out)
    }
}

struct ParsedHash {
    time_cost: u32,
    memory_kib: u32,
    parallelism: u32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

/// Parse the positional `$argon2id$v=19$t=..,m=..,p=..$salt$hash` form.
fn parse_encoded(encoded: &str) -> Result<ParsedHash, AuthError> {
    let parts: Vec<&str> = encoded.split('$').collect();
    if parts.len() != 6 || !parts[0].is_empty() {
        return Err(AuthError::InvalidInput("malformed password hash".into()));
    }
    if parts[1] != "argon2id" {
        return Err(AuthError::InvalidInput(format!(
            "unsupported hash algorithm {:?}",
            parts[1]
        )));
    }
    if parts[2] != "v=19" {
        return Err(AuthError::InvalidInput(format!("unsupported argon2 version {:?}", parts[2])));
    }

    let fields: Vec<&str> = parts[3].split(',').collect();
    if fields.len() != 3 {
        return Err(AuthError::InvalidInput("malformed argon2 parameters".into()));
    }
    let time_cost = parse_field(fields[0], "t")?;
    let memory_kib = parse_field(fields[1], "m")?;
    let parallelism = parse_field(fields[2], "p")?;

    let salt = STANDARD_NO_PAD
        .decode(parts[4])
        .map_err(|_| AuthError::InvalidInput("malformed salt encoding".into()))?;
    let hash = STANDARD_NO_PAD
        .decode(parts[5])
        .map_err(|_| AuthError::InvalidInput("malformed hash encoding".into()))?;

    Ok(ParsedHash { time_cost, memory_kib, parallelism, salt, hash })
}

fn parse_field(field: &str, key: &str) -> Result<u32, AuthError> {
    field
        .strip_prefix(key)
        .and_then(|rest| rest.strip_prefix('='))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| AuthError::InvalidInput(format!("malformed argon2 parameter {field:?}")))
}

/// Uniform index in `0..n` by rejection sampling over `u32`.
fn random_index(n: usize) -> usize {
    debug_assert!(n > 0 && n <= u32::MAX as usize);
    let n = n as u32;
    let limit = u32::MAX - (u32::MAX % n);
    loop {
        let v = OsRng.next_u32();
        if v < limit {
            return (v % n) as usize;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
