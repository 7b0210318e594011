// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition of agent input from inbound text and media.

/// Builds the agent input for an inbound message.
///
/// Text-only messages pass through untouched. A media URL gets a fetch
/// instruction appended, below the user's text when both are present.
/// Returns an empty string when there is nothing to say.
pub fn compose_inbound_text(text: &str, media_url: Option<&str>) -> String {
    let text = text.trim();
    let media_url = media_url.map(str::trim).filter(|u| !u.is_empty());

    match (text.is_empty(), media_url) {
        (true, None) => String::new(),
        (false, None) => text.to_string(),
        (true, Some(url)) => format!(
            "User attached media URL: {url}\nFetch and inspect this attachment URL as needed."
        ),
        (false, Some(url)) => format!(
            "User message: {text}\nUser attached media URL: {url}\n\
             Fetch and inspect this attachment URL as needed."
        ),
    }
}
