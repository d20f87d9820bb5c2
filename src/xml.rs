// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Small XML helpers shared by the wire formats.
//!
//! Reading goes through `quick-xml`; writing is plain string building
//! with a single, minimal escaping policy: only the characters that XML
//! text-node and attribute rules actually require are escaped.

use quick_xml::events::BytesStart;

use crate::error::FormatError;

/// Escape a string for use in an XML text node.
///
/// Only `&`, `<` and `>` are escaped; everything else is copied
/// verbatim so that translated text survives byte-for-byte.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape a string for use in a double-quoted XML attribute value.
pub fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Decode entity references in a pure text node that was captured raw.
///
/// Needed for notes and context elements, which are read as raw inner
/// text like source fragments but hold no markup.
pub(crate) fn unescape_text(raw: &str) -> String {
    match quick_xml::escape::unescape(raw) {
        Ok(text) => text.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Read an attribute value from a start or empty element.
pub(crate) fn attribute(element: &BytesStart, name: &str) -> Option<String> {
    match element.try_get_attribute(name) {
        Ok(Some(attr)) => attr.unescape_value().ok().map(|value| value.into_owned()),
        _ => None,
    }
}

/// Validate a `beautify` indent string.
///
/// The indent is inserted into serialized documents, so anything other
/// than whitespace would corrupt the output.
pub fn validate_indent(indent: &str) -> Result<(), FormatError> {
    if indent.chars().all(char::is_whitespace) {
        Ok(())
    } else {
        Err(FormatError::InvalidIndent(indent.to_string()))
    }
}

/// Helper for building indented XML documents line by line.
///
/// With an empty indent the output still places one element per line
/// but without leading whitespace, which keeps diffs stable.
pub(crate) struct DocumentBuilder {
    out: String,
    indent: String,
    depth: usize,
}

impl DocumentBuilder {
    pub(crate) fn new(indent: &str) -> Self {
        DocumentBuilder {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            indent: indent.to_string(),
            depth: 0,
        }
    }

    /// Append one line at the current depth.
    pub(crate) fn line(&mut self, content: &str) {
        for _ in 0..self.depth {
            self.out.push_str(&self.indent);
        }
        self.out.push_str(content);
        self.out.push('\n');
    }

    /// Append an opening tag and increase the depth.
    pub(crate) fn open(&mut self, tag: &str) {
        self.line(tag);
        self.depth += 1;
    }

    /// Decrease the depth and append a closing tag.
    pub(crate) fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(tag);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_text_minimal() {
        assert_eq!(escape_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        // Quotes are legal in text nodes and stay as they are.
        assert_eq!(escape_text("say \"hi\""), "say \"hi\"");
    }

    #[test]
    fn test_escape_attribute_quotes() {
        assert_eq!(escape_attribute("a \"b\" <c>"), "a &quot;b&quot; &lt;c&gt;");
    }

    #[test]
    fn test_validate_indent() {
        assert!(validate_indent("").is_ok());
        assert!(validate_indent("  ").is_ok());
        assert!(validate_indent("\t").is_ok());
        assert!(validate_indent("ab").is_err());
    }

    #[test]
    fn test_document_builder_nesting() {
        let mut builder = DocumentBuilder::new("  ");
        builder.open("<a>");
        builder.line("<b/>");
        builder.close("</a>");
        assert_eq!(
            builder.finish(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n  <b/>\n</a>\n"
        );
    }
}
