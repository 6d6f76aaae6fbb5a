/* crates/herald-server/src/slug.rs */

//! Conversion between display names ("United States") and URL path segments
//! ("united-states").
//!
//! `decode` is lossy: punctuation stripped by `encode` cannot come back, and
//! casing is reconstructed by title-casing each word. Treat its output as a
//! lookup key for the gateway, never as the name to display.

/// Encode a display name into a slug.
///
/// Lowercases, collapses each whitespace run into a single `-`, and strips
/// everything that is not alphanumeric, `-` or `_`. A non-empty input never
/// produces an empty slug: when nothing survives stripping, the slug is the
/// hex encoding of the input bytes.
pub fn encode(display_name: &str) -> String {
  if display_name.is_empty() {
    return String::new();
  }

  let mut slug = String::with_capacity(display_name.len());
  let mut in_whitespace = false;
  for ch in display_name.chars() {
    if ch.is_whitespace() {
      if !in_whitespace {
        slug.push('-');
      }
      in_whitespace = true;
      continue;
    }
    in_whitespace = false;
    if ch.is_alphanumeric() {
      slug.extend(ch.to_lowercase());
    } else if ch == '-' || ch == '_' {
      slug.push(ch);
    }
  }

  if slug.is_empty() { hex::encode(display_name.as_bytes()) } else { slug }
}

/// Decode a slug back into a best-effort display name: hyphens become spaces
/// and every word is title-cased.
pub fn decode(slug: &str) -> String {
  slug.split('-').map(title_case).collect::<Vec<_>>().join(" ")
}

/// `decode` for optional input (a route param that may be absent).
pub fn decode_opt(slug: Option<&str>) -> String {
  slug.map(decode).unwrap_or_default()
}

fn title_case(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => {
      let mut out: String = first.to_uppercase().collect();
      out.extend(chars.flat_map(char::to_lowercase));
      out
    }
    None => String::new(),
  }
}
