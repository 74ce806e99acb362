//! Conversions between API bundles and stored bundles.
//!
//! Authorities coming from callers are parsed structurally (DER certificates, PKIX public
//! keys) before they reach the data store. No chain or signature validation happens here.

use thiserror::Error;
use x509_parser::error::X509Error;
use x509_parser::nom::Err;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::datastore::{StoredBundle, StoredBundleMask, StoredCertificate, StoredPublicKey};
use crate::trust_domain::{TrustDomain, TrustDomainError};
use crate::types::{Bundle, BundleMask, JwtAuthority, X509Authority};

/// An error that can arise converting authorities or bundles.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    /// The trust domain of the bundle is not valid.
    #[error("invalid trust domain id: {0}")]
    TrustDomain(#[from] TrustDomainError),

    /// An X.509 authority carries no bytes.
    #[error("X.509 authority is empty")]
    EmptyX509Authority,

    /// An X.509 authority is not a sequence of DER certificates.
    #[error("unable to parse X.509 authority: {0}")]
    X509Authority(#[source] X509Error),

    /// A JWT authority has no key ID.
    #[error("missing key ID")]
    MissingKeyId,

    /// A JWT authority has no public key.
    #[error("missing public key")]
    MissingPublicKey,

    /// A JWT authority's public key is not a PKIX encoded key.
    #[error("unable to parse public key: {0}")]
    PublicKey(#[source] X509Error),
}

/// Converts a stored bundle into its API form.
///
/// # Errors
///
/// Fails with [`ConversionError::TrustDomain`] if the stored trust domain id is invalid.
pub fn bundle_to_api(bundle: &StoredBundle) -> Result<Bundle, ConversionError> {
    let trust_domain = TrustDomain::new(&bundle.trust_domain_id)?;

    Ok(Bundle {
        trust_domain: trust_domain.to_string(),
        x509_authorities: bundle
            .root_cas
            .iter()
            .map(|ca| X509Authority {
                asn1: ca.der_bytes.clone(),
                tainted: ca.tainted_key,
            })
            .collect(),
        jwt_authorities: public_keys_to_api(&bundle.jwt_signing_keys),
        refresh_hint: bundle.refresh_hint,
        sequence_number: bundle.sequence_number,
    })
}

/// Converts an API bundle into the stored form, parsing every authority.
///
/// # Errors
///
/// Fails if the trust domain or any authority is invalid.
pub fn api_to_bundle(bundle: &Bundle) -> Result<StoredBundle, ConversionError> {
    let trust_domain = TrustDomain::new(&bundle.trust_domain)?;

    Ok(StoredBundle {
        trust_domain_id: trust_domain.id_string(),
        root_cas: parse_x509_authorities(&bundle.x509_authorities)?,
        jwt_signing_keys: parse_jwt_authorities(&bundle.jwt_authorities)?,
        refresh_hint: bundle.refresh_hint,
        sequence_number: bundle.sequence_number,
    })
}

/// Parses X.509 authorities into root certificates.
///
/// An authority may hold several concatenated DER certificates; each one becomes its own
/// root, in order, inheriting the authority's taint.
///
/// # Errors
///
/// Fails on an empty authority or on bytes that are not DER certificates.
pub fn parse_x509_authorities(
    authorities: &[X509Authority],
) -> Result<Vec<StoredCertificate>, ConversionError> {
    let mut roots = Vec::with_capacity(authorities.len());

    for authority in authorities {
        if authority.asn1.is_empty() {
            return Err(ConversionError::EmptyX509Authority);
        }

        let mut rest = authority.asn1.as_slice();
        while !rest.is_empty() {
            let (next, _cert) = x509_parser::parse_x509_certificate(rest).map_err(|e| match e {
                Err::Incomplete(_) => {
                    ConversionError::X509Authority(X509Error::InvalidCertificate)
                }
                Err::Error(err) | Err::Failure(err) => ConversionError::X509Authority(err),
            })?;

            let len = rest.len() - next.len();
            roots.push(StoredCertificate {
                der_bytes: rest[..len].to_vec(),
                tainted_key: authority.tainted,
            });
            rest = next;
        }
    }

    Ok(roots)
}

/// Parses JWT authorities into signing keys.
///
/// # Errors
///
/// Fails if an authority has no key ID, no public key, or a key that is not PKIX encoded.
pub fn parse_jwt_authorities(
    authorities: &[JwtAuthority],
) -> Result<Vec<StoredPublicKey>, ConversionError> {
    authorities.iter().map(parse_jwt_authority).collect()
}

/// Parses a single JWT authority into a signing key.
///
/// # Errors
///
/// See [`parse_jwt_authorities`].
pub fn parse_jwt_authority(authority: &JwtAuthority) -> Result<StoredPublicKey, ConversionError> {
    if authority.key_id.is_empty() {
        return Err(ConversionError::MissingKeyId);
    }
    if authority.public_key.is_empty() {
        return Err(ConversionError::MissingPublicKey);
    }
    parse_pkix_public_key(&authority.public_key)?;

    Ok(StoredPublicKey {
        pkix_bytes: authority.public_key.clone(),
        kid: authority.key_id.clone(),
        not_after: authority.expires_at,
        tainted_key: authority.tainted,
    })
}

/// Converts stored signing keys into API JWT authorities.
pub fn public_keys_to_api(keys: &[StoredPublicKey]) -> Vec<JwtAuthority> {
    keys.iter()
        .map(|key| JwtAuthority {
            public_key: key.pkix_bytes.clone(),
            key_id: key.kid.clone(),
            expires_at: key.not_after,
            tainted: key.tainted_key,
        })
        .collect()
}

/// Converts an API input mask into the data store mask. `None` stays `None`.
pub fn mask_to_stored(mask: Option<&BundleMask>) -> Option<StoredBundleMask> {
    mask.map(|m| StoredBundleMask {
        root_cas: m.x509_authorities,
        jwt_signing_keys: m.jwt_authorities,
        refresh_hint: m.refresh_hint,
        sequence_number: m.sequence_number,
    })
}

fn parse_pkix_public_key(der: &[u8]) -> Result<(), ConversionError> {
    let (rest, _spki) = SubjectPublicKeyInfo::from_der(der).map_err(|e| match e {
        Err::Incomplete(_) => ConversionError::PublicKey(X509Error::InvalidSPKI),
        Err::Error(err) | Err::Failure(err) => ConversionError::PublicKey(err),
    })?;

    if rest.is_empty() {
        Ok(())
    } else {
        Err(ConversionError::PublicKey(X509Error::InvalidSPKI))
    }
}
