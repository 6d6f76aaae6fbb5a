/* crates/herald-server/src/escape.rs */

/// Escape text for HTML element content and double-quoted attribute values.
pub fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      _ => out.push(ch),
    }
  }
  out
}

/// XML needs the same five entities; `&apos;` is not used so the output
/// stays valid HTML too.
pub fn escape_xml(s: &str) -> String {
  escape_html(s)
}

/// Make serialized JSON safe to embed in a `<script type="application/json">`
/// element: markup characters and everything outside ASCII become `\uXXXX`.
///
/// Outside of strings JSON only contains ASCII punctuation, digits and
/// literals, so the replacement can run over the whole text.
pub fn escape_json_for_script(json: &str) -> String {
  let mut out = String::with_capacity(json.len());
  let mut units = [0u16; 2];
  for ch in json.chars() {
    if matches!(ch, '<' | '>' | '&') || !ch.is_ascii() {
      for unit in ch.encode_utf16(&mut units) {
        out.push_str(&format!("\\u{unit:04x}"));
      }
    } else {
      out.push(ch);
    }
  }
  out
}
