// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-secret authentication for the webhook ingress.
//!
//! Two header forms are accepted: `Authorization: Bearer <secret>` and
//! `X-Bridge-Secret: <secret>`. Comparison is constant-time in the secret
//! bytes (length mismatches short-circuit, which leaks only the length).

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// True iff the request carries the shared secret in either header form.
pub fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    if secret.is_empty() {
        // Fail-closed: a missing secret authorizes nothing.
        return false;
    }

    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        if secret_eq(token, secret) {
            return true;
        }
    }

    let header = headers.get("x-bridge-secret").and_then(|v| v.to_str().ok());
    if let Some(token) = header {
        if secret_eq(token, secret) {
            return true;
        }
    }

    false
}

fn secret_eq(candidate: &str, secret: &str) -> bool {
    candidate.as_bytes().ct_eq(secret.as_bytes()).into()
}
