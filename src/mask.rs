//! Output field masks.

use crate::types::{Bundle, BundleMask};

/// Clears every field of `bundle` that `mask` does not select.
///
/// A `None` mask selects everything and leaves the bundle untouched. The trust domain is
/// never cleared.
pub fn apply_bundle_mask(bundle: &mut Bundle, mask: Option<&BundleMask>) {
    let Some(mask) = mask else {
        return;
    };

    if !mask.refresh_hint {
        bundle.refresh_hint = 0;
    }

    if !mask.sequence_number {
        bundle.sequence_number = 0;
    }

    if !mask.x509_authorities {
        bundle.x509_authorities = Vec::new();
    }

    if !mask.jwt_authorities {
        bundle.jwt_authorities = Vec::new();
    }
}

/// Returns `bundle` with [`apply_bundle_mask`] applied.
#[must_use]
pub fn project(mut bundle: Bundle, mask: Option<&BundleMask>) -> Bundle {
    apply_bundle_mask(&mut bundle, mask);
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JwtAuthority, X509Authority};

    fn full_bundle() -> Bundle {
        Bundle {
            trust_domain: "example.org".to_owned(),
            x509_authorities: vec![X509Authority {
                asn1: vec![1, 2, 3],
                tainted: false,
            }],
            jwt_authorities: vec![JwtAuthority {
                public_key: vec![4, 5, 6],
                key_id: "kid".to_owned(),
                expires_at: 10,
                tainted: false,
            }],
            refresh_hint: 60,
            sequence_number: 7,
        }
    }

    #[test]
    fn test_no_mask_keeps_everything() {
        assert_eq!(project(full_bundle(), None), full_bundle());
    }

    #[test]
    fn test_all_mask_keeps_everything() {
        assert_eq!(project(full_bundle(), Some(&BundleMask::all())), full_bundle());
    }

    #[test]
    fn test_empty_mask_clears_everything_but_trust_domain() {
        let masked = project(full_bundle(), Some(&BundleMask::default()));
        assert_eq!(
            masked,
            Bundle {
                trust_domain: "example.org".to_owned(),
                ..Bundle::default()
            }
        );
    }

    #[test]
    fn test_every_unset_selector_is_cleared() {
        // All 16 selector combinations.
        for bits in 0u8..16 {
            let mask = BundleMask {
                refresh_hint: bits & 1 != 0,
                sequence_number: bits & 2 != 0,
                x509_authorities: bits & 4 != 0,
                jwt_authorities: bits & 8 != 0,
            };
            let full = full_bundle();
            let masked = project(full.clone(), Some(&mask));

            let expect_refresh = if mask.refresh_hint { full.refresh_hint } else { 0 };
            let expect_seq = if mask.sequence_number { full.sequence_number } else { 0 };
            assert_eq!(masked.refresh_hint, expect_refresh, "mask {mask:?}");
            assert_eq!(masked.sequence_number, expect_seq, "mask {mask:?}");
            assert_eq!(
                masked.x509_authorities.is_empty(),
                !mask.x509_authorities,
                "mask {mask:?}"
            );
            assert_eq!(
                masked.jwt_authorities.is_empty(),
                !mask.jwt_authorities,
                "mask {mask:?}"
            );

            // Projection is idempotent.
            assert_eq!(project(masked.clone(), Some(&mask)), masked);
        }
    }
}
