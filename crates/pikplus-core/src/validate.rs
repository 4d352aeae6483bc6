//! Input checks that run before anything is sent to the backend.

use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;

const BTIH_PREFIX: &str = "xt=urn:btih:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("link is empty")]
    Empty,
    #[error("not a magnet link: {0}")]
    NotMagnet(String),
    #[error("magnet link has no valid btih info-hash: {0}")]
    MissingInfoHash(String),
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
    #[error("passwords do not match")]
    PasswordMismatch,
}

/// Returns the trimmed link when it is a usable magnet URI.
pub fn validate_magnet_link(raw: &str) -> Result<String, ValidationError> {
    let link = raw.trim();
    if link.is_empty() {
        return Err(ValidationError::Empty);
    }

    let Some(query) = link
        .get(..8)
        .filter(|prefix| prefix.eq_ignore_ascii_case("magnet:?"))
        .map(|_| &link[8..])
    else {
        return Err(ValidationError::NotMagnet(link.to_string()));
    };

    let has_hash = query.split('&').any(|part| {
        part.get(..BTIH_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(BTIH_PREFIX))
            && is_info_hash(&part[BTIH_PREFIX.len()..])
    });
    if !has_hash {
        return Err(ValidationError::MissingInfoHash(link.to_string()));
    }

    Ok(link.to_string())
}

/// 40 hex digits or 32 base32 characters.
fn is_info_hash(hash: &str) -> bool {
    match hash.len() {
        40 => hash.chars().all(|ch| ch.is_ascii_hexdigit()),
        32 => hash
            .chars()
            .all(|ch| matches!(ch.to_ascii_lowercase(), 'a'..='z' | '2'..='7')),
        _ => false,
    }
}

/// The add form takes one link per line.
pub fn split_magnet_links(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn validate_password_pair(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn accepts_hex_and_base32_hashes() {
        let hex = format!("  magnet:?xt=urn:btih:{HEX}&dn=ubuntu \n");
        assert_eq!(
            validate_magnet_link(&hex).unwrap(),
            format!("magnet:?xt=urn:btih:{HEX}&dn=ubuntu")
        );

        let b32 = "magnet:?dn=x&xt=urn:btih:ZOCMZQIPFFW7OLLMIC5HUB6BPCSDEOQU";
        assert!(validate_magnet_link(b32).is_ok());
    }

    #[test]
    fn rejects_bad_links() {
        assert_eq!(validate_magnet_link("   "), Err(ValidationError::Empty));
        assert!(matches!(
            validate_magnet_link("https://example.com/file.torrent"),
            Err(ValidationError::NotMagnet(_))
        ));
        assert!(matches!(
            validate_magnet_link("magnet:?xt=urn:btih:1234"),
            Err(ValidationError::MissingInfoHash(_))
        ));
        assert!(matches!(
            validate_magnet_link("磁力"),
            Err(ValidationError::NotMagnet(_))
        ));
    }

    #[test]
    fn splits_multi_line_input() {
        let links = split_magnet_links("a\n\n  b  \r\nc");
        assert_eq!(links, vec!["a", "b", "c"]);
    }

    #[test]
    fn password_checks() {
        assert_eq!(
            validate_password_pair("abc", "abc"),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        assert_eq!(
            validate_password_pair("secret1", "secret2"),
            Err(ValidationError::PasswordMismatch)
        );
        assert!(validate_password_pair("secret1", "secret1").is_ok());
    }

    #[test]
    fn errors_render_readable_messages() {
        assert_eq!(
            ValidationError::PasswordTooShort { min: 6 }.to_string(),
            "password must be at least 6 characters"
        );
        let err: anyhow::Error = ValidationError::NotMagnet("ftp://x".into()).into();
        assert_eq!(format!("{err:#}"), "not a magnet link: ftp://x");
    }
}
