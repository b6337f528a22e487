// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GF(256) arithmetic backing the Shamir scheme.
//!
//! Field elements are single bytes; addition is XOR, multiplication is
//! polynomial multiplication reduced modulo the AES polynomial
//! x^8 + x^4 + x^3 + x + 1 (0x11B). Kept private to the crate so all
//! higher-level code goes through the validated share APIs.

use std::ops::{Add, Div, Mul};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FieldElement(u8);

impl FieldElement {
    pub(crate) const ZERO: Self = FieldElement(0);
    pub(crate) const ONE: Self = FieldElement(1);

    #[inline]
    pub(crate) fn from_byte(b: u8) -> Self {
        FieldElement(b)
    }

    #[inline]
    pub(crate) fn into_byte(self) -> u8 {
        self.0
    }

    /// Multiplicative inverse via a^254, square-and-multiply.
    ///
    /// Zero has no inverse; callers must reject duplicate x-coordinates
    /// before dividing. For zero input this returns zero rather than
    /// panicking.
    fn invert(self) -> Self {
        let mut result = FieldElement::ONE;
        let mut base = self;
        let mut exp = 254u8;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result * base;
            }
            base = base * base;
            exp >>= 1;
        }
        result
    }

    /// Evaluate a polynomial (coefficients in increasing degree order)
    /// at `x` using Horner's method.
    pub(crate) fn eval_polynomial(coeffs: &[Self], x: Self) -> Self {
        let mut acc = FieldElement::ZERO;
        for &c in coeffs.iter().rev() {
            acc = acc * x + c;
        }
        acc
    }

    /// Lagrange-interpolate the polynomial through `points` and evaluate
    /// it at `x`, without materializing the polynomial.
    ///
    /// `x = 0` recovers the secret byte; any other `x` yields the byte
    /// of a share at that index. All point x-coordinates must be
    /// distinct.
    pub(crate) fn lagrange(points: &[(Self, Self)], x: Self) -> Self {
        let mut acc = FieldElement::ZERO;
        for (i, &(xi, yi)) in points.iter().enumerate() {
            let mut num = FieldElement::ONE;
            let mut den = FieldElement::ONE;
            for (j, &(xj, _)) in points.iter().enumerate() {
                if i != j {
                    // Subtraction is XOR in GF(2^8), so x - xj == x + xj.
                    num = num * (x + xj);
                    den = den * (xi + xj);
                }
            }
            acc = acc + yi * (num / den);
        }
        acc
    }
}

impl Add for FieldElement {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn add(self, rhs: Self) -> Self {
        FieldElement(self.0 ^ rhs.0)
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(mut self, mut rhs: Self) -> Self {
        let mut res = 0u8;
        while rhs.0 != 0 {
            if rhs.0 & 1 != 0 {
                res ^= self.0;
            }
            let carry = self.0 & 0x80;
            self.0 <<= 1;
            if carry != 0 {
                self.0 ^= 0x1B;
            }
            rhs.0 >>= 1;
        }
        FieldElement(res)
    }
}

impl Div for FieldElement {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn div(self, rhs: Self) -> Self {
        self * rhs.invert()
    }
}
