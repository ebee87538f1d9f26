// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Email address validation and generation helpers.

use std::sync::LazyLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

use dripmail_core::DripmailError;

/// Pragmatic address shape: one `@`, non-empty local part, dotted domain.
/// Full RFC 5321 grammar is deliberately out of scope; this is a gate for
/// user-typed forwarding targets, not an MTA.
static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._%+-]*@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("address regex is valid")
});

/// Length of generated mailbox local parts.
const LOCAL_PART_LEN: usize = 10;

/// Validates an address syntactically, before any backend call.
pub fn validate(address: &str) -> Result<(), DripmailError> {
    if ADDRESS_RE.is_match(address) {
        Ok(())
    } else {
        Err(DripmailError::InvalidAddress(address.to_string()))
    }
}

/// Extracts the domain of an address, lowercased.
pub fn domain_of(address: &str) -> Option<String> {
    address.rsplit_once('@').map(|(_, d)| d.to_ascii_lowercase())
}

/// Generates a random lowercase alphanumeric local part for a new mailbox.
pub fn random_local_part() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LOCAL_PART_LEN)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate("user@example.com").is_ok());
        assert!(validate("a.b+tag@mail.drip.example").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(validate("not-an-email").is_err());
        assert!(validate("@example.com").is_err());
        assert!(validate("user@").is_err());
        assert!(validate("user@nodot").is_err());
        assert!(validate("user@@example.com").is_err());
    }

    #[test]
    fn rejection_carries_the_input() {
        match validate("not-an-email") {
            Err(DripmailError::InvalidAddress(a)) => assert_eq!(a, "not-an-email"),
            other => panic!("expected InvalidAddress, got {other:?}"),
        }
    }

    #[test]
    fn domain_extraction_lowercases() {
        assert_eq!(
            domain_of("User@Drip.EXAMPLE"),
            Some("drip.example".to_string())
        );
        assert_eq!(domain_of("no-at-sign"), None);
    }

    #[test]
    fn random_local_parts_are_well_formed_and_distinct() {
        let a = random_local_part();
        let b = random_local_part();
        assert_eq!(a.len(), LOCAL_PART_LEN);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(a, b, "two draws should essentially never collide");
        assert!(validate(&format!("{a}@drip.example")).is_ok());
    }
}
