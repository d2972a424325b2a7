use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

use crate::{
    error::{Error, Result},
    types::{CountRange, Image},
};

/// Widest image still considered a thumbnail.
pub const MEDIUM_IMAGE_MAX_WIDTH: u32 = 300;

/// Generates a PKCE code verifier for the authorization-code flow.
///
/// The verifier is kept server-side until the callback and sent with the code
/// exchange; only its S256 challenge leaves the service.
///
/// # Returns
///
/// A random string of 128 ASCII alphanumeric characters, the maximum length
/// RFC 7636 allows.
///
/// # Example
///
/// ```
/// let verifier = generate_code_verifier();
/// let challenge = generate_code_challenge(&verifier);
/// assert_eq!(verifier.len(), 128);
/// ```
pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

/// Derives the S256 code challenge for `verifier`.
///
/// # Arguments
///
/// * `verifier` - The code verifier produced by [`generate_code_verifier`]
///
/// # Returns
///
/// The SHA-256 digest of the verifier, base64url-encoded without padding
/// (always 43 characters).
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Opaque value tying an OAuth callback to its login.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Picks a "medium" image from a set ordered largest to smallest.
///
/// Images without a width never qualify as medium.
///
/// # Arguments
///
/// * `images` - Image variants as the provider lists them, largest first
///
/// # Returns
///
/// The URL of:
/// - the last image no wider than [`MEDIUM_IMAGE_MAX_WIDTH`], or
/// - the last image when none is narrow enough, or
/// - an empty string for an empty set.
///
/// # Example
///
/// ```
/// let images = vec![
///     Image { url: "l".into(), width: Some(640), height: Some(640) },
///     Image { url: "m".into(), width: Some(300), height: Some(300) },
/// ];
/// assert_eq!(select_image(&images), "m");
/// ```
pub fn select_image(images: &[Image]) -> String {
    images
        .iter()
        .rev()
        .find(|image| image.width.is_some_and(|w| w <= MEDIUM_IMAGE_MAX_WIDTH))
        .or_else(|| images.last())
        .map(|image| image.url.clone())
        .unwrap_or_default()
}

/// Parses an optional non-negative count query parameter; absent means 0.
pub fn parse_count(name: &str, raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(0);
    };

    raw.parse::<u32>().map_err(|_| {
        Error::ValidationFailed(format!("{} must be a non-negative integer, got '{}'", name, raw))
    })
}

/// Builds a [`CountRange`] from raw `min`/`max` query values.
pub fn parse_count_range(min: Option<&str>, max: Option<&str>) -> Result<CountRange> {
    let range = CountRange::new(parse_count("min", min)?, parse_count("max", max)?);
    if range.min != 0 && range.max != 0 && range.min > range.max {
        return Err(Error::ValidationFailed(format!(
            "min ({}) must not exceed max ({})",
            range.min, range.max
        )));
    }
    Ok(range)
}
