// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-wise Shamir secret sharing over GF(256).
//!
//! Each secret byte is protected by its own random polynomial of degree
//! `threshold - 1`. A raw share is `[index ‖ y-bytes]` where `index` is
//! the non-zero x-coordinate and the y-bytes have the same length as the
//! secret. Combining interpolates at x = 0; deriving a replacement share
//! interpolates at x = index.

use rand::RngCore;
use thiserror::Error;

use crate::field::FieldElement;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SecretSharingError {
    #[error("threshold must be nonzero and no larger than the share count")]
    InvalidThreshold,

    #[error("not enough shares")]
    NotEnoughShares,

    #[error("duplicate share index")]
    DuplicateShareIndex,

    #[error("shares have inconsistent lengths")]
    InconsistentShares,

    #[error("malformed share")]
    InvalidShare,
}

/// Split `secret` into `total` raw shares with reconstruction threshold
/// `threshold`. Share indices are 1..=total.
pub(crate) fn split(
    secret: &[u8],
    threshold: u8,
    total: u8,
    rng: &mut dyn RngCore,
) -> Result<Vec<Vec<u8>>, SecretSharingError> {
    if secret.is_empty() {
        return Err(SecretSharingError::InvalidShare);
    }
    if threshold == 0 || threshold > total {
        return Err(SecretSharingError::InvalidThreshold);
    }

    let mut shares: Vec<Vec<u8>> = (1..=total)
        .map(|index| {
            let mut share = Vec::with_capacity(1 + secret.len());
            share.push(index);
            share
        })
        .collect();

    let mut coeffs = vec![FieldElement::ZERO; threshold as usize];
    for &secret_byte in secret {
        coeffs[0] = FieldElement::from_byte(secret_byte);
        for c in coeffs.iter_mut().skip(1) {
            let mut b = [0u8; 1];
            rng.fill_bytes(&mut b);
            *c = FieldElement::from_byte(b[0]);
        }
        for share in shares.iter_mut() {
            let x = FieldElement::from_byte(share[0]);
            share.push(FieldElement::eval_polynomial(&coeffs, x).into_byte());
        }
    }

    Ok(shares)
}

/// Interpolate the shared polynomials at `x` and return the resulting
/// y-bytes (without an index prefix). `x = 0` recovers the secret.
pub(crate) fn interpolate(
    shares: &[Vec<u8>],
    x: u8,
) -> Result<Vec<u8>, SecretSharingError> {
    if shares.is_empty() {
        return Err(SecretSharingError::NotEnoughShares);
    }

    let data_len = shares[0].len().saturating_sub(1);
    if data_len == 0 {
        return Err(SecretSharingError::InvalidShare);
    }

    let mut seen = [false; 256];
    for share in shares {
        let index = share[0];
        if index == 0 {
            return Err(SecretSharingError::InvalidShare);
        }
        if seen[index as usize] {
            return Err(SecretSharingError::DuplicateShareIndex);
        }
        seen[index as usize] = true;
        if share.len() != data_len + 1 {
            return Err(SecretSharingError::InconsistentShares);
        }
    }

    let at = FieldElement::from_byte(x);
    let mut out = vec![0u8; data_len];
    let mut points = Vec::with_capacity(shares.len());
    for (byte_index, slot) in out.iter_mut().enumerate() {
        points.clear();
        for share in shares {
            points.push((
                FieldElement::from_byte(share[0]),
                FieldElement::from_byte(share[1 + byte_index]),
            ));
        }
        *slot = FieldElement::lagrange(&points, at).into_byte();
    }

    Ok(out)
}

/// Derive the raw share at `index` from a reconstructing set of shares,
/// without recovering the secret at x = 0 along the way.
pub(crate) fn derive_share(
    index: u8,
    shares: &[Vec<u8>],
) -> Result<Vec<u8>, SecretSharingError> {
    if index == 0 {
        return Err(SecretSharingError::InvalidShare);
    }
    let data = interpolate(shares, index)?;
    let mut share = Vec::with_capacity(1 + data.len());
    share.push(index);
    share.extend_from_slice(&data);
    Ok(share)
}
