//! Display masking for the stored token.

const MIDDLE_MASK: &str = "••••";
const FULL_MASK: &str = "••••••••";

/// Shortest secret that shows its first and last four characters.
const REVEAL_MIN_LEN: usize = 8;

/// Masks a secret for display: `ghp_••••wxyz`, or a constant mask when the
/// secret is too short to reveal any of it.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < REVEAL_MIN_LEN {
        return FULL_MASK.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{MIDDLE_MASK}{tail}")
}
