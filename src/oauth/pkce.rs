//! PKCE verifier/challenge and CSRF state generation for the login flow.
//!
//! Uses `oauth2`'s own PKCE types purely as value-generators — exchange itself is
//! hand-rolled in `flow.rs` (see DESIGN.md §B for why).

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use rand::RngCore;

/// 96 random bytes, base64url-no-pad, per spec's login protocol.
pub fn generate_verifier() -> PkceCodeVerifier {
    let mut bytes = [0u8; 96];
    rand::rng().fill_bytes(&mut bytes);
    PkceCodeVerifier::new(base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        bytes,
    ))
}

pub fn challenge_for(verifier: &PkceCodeVerifier) -> PkceCodeChallenge {
    PkceCodeChallenge::from_code_verifier_sha256(verifier)
}

/// 16 random bytes, hex-encoded, used as the CSRF `state` token.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_32_hex_chars() {
        let s = generate_state();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verifier_challenge_roundtrip_is_s256() {
        let verifier = generate_verifier();
        let challenge = challenge_for(&verifier);
        assert_eq!(challenge.as_str().len(), 43);
    }
}
