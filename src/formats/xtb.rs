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

//! XTB support.
//!
//! The XML Translation Bundle carries only translations and must be
//! read together with its XMB master, which provides sources, notes
//! and source references. Inline markup follows the XMB conventions
//! ([`super::xmb`]). XTB has no state attribute on the wire: a unit
//! with a non-empty translation reads as translated, everything else
//! as new.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FormatError;
use crate::file::{TargetState, TranslationFile};
use crate::xml::{attribute, escape_attribute, DocumentBuilder};

use super::{RawFile, RawUnit};

const FORMAT: &str = "xtb";

fn map_error(error: quick_xml::Error) -> FormatError {
    FormatError::MalformedFile {
        format: FORMAT,
        detail: error.to_string(),
    }
}

/// Parse a whole XTB document. The returned units carry targets only;
/// the file layer joins them with the master's sources by id.
pub(crate) fn parse_document(text: &str) -> Result<RawFile, FormatError> {
    let mut reader = Reader::from_str(text);
    let mut file = RawFile::default();
    let mut saw_bundle = false;

    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(element) if element.name().as_ref() == b"translationbundle" => {
                saw_bundle = true;
                file.target_language = attribute(&element, "lang");
            }
            Event::Start(element) if element.name().as_ref() == b"translation" => {
                let mut unit = translation_unit(&element)?;
                unit.target = Some(
                    reader
                        .read_text(element.name().to_owned())
                        .map_err(map_error)?
                        .into_owned(),
                );
                file.units.push(unit);
            }
            Event::Empty(element) if element.name().as_ref() == b"translation" => {
                let mut unit = translation_unit(&element)?;
                unit.target = Some(String::new());
                file.units.push(unit);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_bundle {
        return Err(FormatError::MalformedFile {
            format: FORMAT,
            detail: "no <translationbundle> element found".to_string(),
        });
    }
    Ok(file)
}

fn translation_unit(element: &quick_xml::events::BytesStart) -> Result<RawUnit, FormatError> {
    let id = attribute(element, "id").ok_or_else(|| FormatError::MalformedFile {
        format: FORMAT,
        detail: "<translation> without id attribute".to_string(),
    })?;
    Ok(RawUnit {
        id,
        ..RawUnit::default()
    })
}

/// The emulated state of an XTB translation.
pub(crate) fn state_from_wire(target: Option<&str>) -> TargetState {
    match target {
        Some(content) if !content.is_empty() => TargetState::Translated,
        _ => TargetState::New,
    }
}

/// Serialize a translation file as an XTB document.
pub(crate) fn write_document(file: &TranslationFile, indent: &str) -> String {
    let mut doc = DocumentBuilder::new(indent);
    let mut bundle = String::from("<translationbundle");
    if let Some(language) = file.target_language() {
        bundle.push_str(&format!(" lang=\"{}\"", escape_attribute(language)));
    }
    bundle.push('>');
    doc.open(&bundle);
    for unit in file.units() {
        doc.line(&format!(
            "<translation id=\"{}\">{}</translation>",
            escape_attribute(unit.id()),
            unit.target_content().unwrap_or_default()
        ));
    }
    doc.close("</translationbundle>");
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_document() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<translationbundle lang="de">
  <translation id="greeting">Hallo</translation>
  <translation id="untranslated"></translation>
</translationbundle>"#;
        let file = parse_document(text).unwrap();
        assert_eq!(file.target_language.as_deref(), Some("de"));
        assert_eq!(file.units.len(), 2);
        assert_eq!(file.units[0].target.as_deref(), Some("Hallo"));
        assert_eq!(file.units[1].target.as_deref(), Some(""));
    }

    #[test]
    fn test_state_emulation() {
        assert_eq!(state_from_wire(Some("Hallo")), TargetState::Translated);
        assert_eq!(state_from_wire(Some("")), TargetState::New);
        assert_eq!(state_from_wire(None), TargetState::New);
    }

    #[test]
    fn test_missing_bundle_element() {
        assert!(parse_document("<foo/>").is_err());
    }
}
