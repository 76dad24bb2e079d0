//! Deterministic placeholder references.
//!
//! A placeholder is a pure function of the slot's identity, so re-running
//! enrichment over the same content yields the same URL and the tree stays
//! byte-identical.

use sha2::{Digest, Sha256};
use url::form_urlencoded;

use pagekit_shared::Orientation;

const SCENERY_BASE: &str = "https://placehold.co";
const AVATAR_BASE: &str = "https://ui-avatars.com/api/";
const AVATAR_SIZE: u32 = 256;

/// What kind of image the slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Photo-like slot rendered as a tinted box with a caption.
    Scenery(Orientation),
    /// Person slot rendered as an initials avatar.
    Avatar,
}

/// Placeholder URL for `identity` (e.g. `"hero+bakery"`, a feature title, a
/// person's name).
pub fn placeholder_url(identity: &str, style: PlaceholderStyle) -> String {
    let identity = identity.trim();
    let color = color_for(identity);

    match style {
        PlaceholderStyle::Scenery(orientation) => {
            let (w, h) = orientation.dimensions();
            let text: String = form_urlencoded::byte_serialize(label_for(identity).as_bytes())
                .collect();
            format!("{SCENERY_BASE}/{w}x{h}/{color}/ffffff?text={text}")
        }
        PlaceholderStyle::Avatar => {
            let name: String = form_urlencoded::byte_serialize(identity.as_bytes()).collect();
            format!("{AVATAR_BASE}?name={name}&background={color}&color=fff&size={AVATAR_SIZE}")
        }
    }
}

/// Six hex digits taken from the identity's hash.
fn color_for(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    digest[..3].iter().map(|b| format!("{b:02x}")).collect()
}

/// Human-readable caption: `"hero+bakery"` → `"hero bakery"`.
fn label_for(identity: &str) -> String {
    let label = identity.replace('+', " ");
    if label.trim().is_empty() {
        "image".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagekit_shared::is_valid_image_ref;

    #[test]
    fn same_identity_same_url() {
        let a = placeholder_url("hero+bakery", PlaceholderStyle::Scenery(Orientation::Landscape));
        let b = placeholder_url("hero+bakery", PlaceholderStyle::Scenery(Orientation::Landscape));
        assert_eq!(a, b);
        assert!(a.starts_with("https://placehold.co/1536x1024/"));
        assert!(a.ends_with("?text=hero+bakery"));
    }

    #[test]
    fn different_identities_differ() {
        let a = placeholder_url("hero+bakery", PlaceholderStyle::Scenery(Orientation::Landscape));
        let b = placeholder_url("hero+florist", PlaceholderStyle::Scenery(Orientation::Landscape));
        assert_ne!(a, b);
    }

    #[test]
    fn avatar_encodes_name() {
        let url = placeholder_url("María José", PlaceholderStyle::Avatar);
        assert!(url.starts_with("https://ui-avatars.com/api/?name=Mar%C3%ADa+Jos%C3%A9&background="));
        assert!(url.ends_with("&color=fff&size=256"));
    }

    #[test]
    fn placeholders_count_as_valid_refs() {
        for url in [
            placeholder_url("Fresh Bread Daily", PlaceholderStyle::Scenery(Orientation::Squarish)),
            placeholder_url("Ana", PlaceholderStyle::Avatar),
            placeholder_url("", PlaceholderStyle::Scenery(Orientation::Portrait)),
        ] {
            assert!(is_valid_image_ref(&url), "{url}");
        }
    }
}
