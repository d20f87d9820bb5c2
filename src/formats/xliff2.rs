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

//! XLIFF 2.0 support.
//!
//! Inline markup uses `<ph/>` for childless placeholders and nested
//! `<pc>` elements for tag spans; `<ph equiv="ICU"/>` marks an
//! embedded ICU reference. Unlike XLIFF 1.2 the span structure is real
//! XML nesting, so no id pairing is needed.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FormatError;
use crate::file::{TargetState, TranslationFile};
use crate::message::{parse_tag_name, split_ordinal, MessagePart, Placeholder, TagNameRole, TagSpan};
use crate::xml::{attribute, escape_attribute, escape_text, unescape_text, DocumentBuilder};

use super::{RawFile, RawUnit};

const FORMAT: &str = "xlf2";

struct Frame {
    tag: String,
    ordinal: usize,
    parts: Vec<MessagePart>,
}

/// Parse the inline markup of a `<source>` or `<target>` fragment.
pub(crate) fn parse_inline(fragment: &str) -> Result<Vec<MessagePart>, String> {
    let mut reader = Reader::from_str(fragment);
    let mut stack = vec![Frame {
        tag: String::new(),
        ordinal: 0,
        parts: Vec::new(),
    }];
    let mut icu_refs = 0;

    loop {
        let event = reader.read_event().map_err(|error| error.to_string())?;
        match event {
            Event::Text(text) => {
                let value = text.unescape().map_err(|error| error.to_string())?;
                stack
                    .last_mut()
                    .unwrap()
                    .parts
                    .push(MessagePart::Text(value.into_owned()));
            }
            Event::CData(data) => {
                stack.last_mut().unwrap().parts.push(MessagePart::Text(
                    String::from_utf8_lossy(&data).into_owned(),
                ));
            }
            Event::Empty(element) if element.name().as_ref() == b"ph" => {
                let name =
                    attribute(&element, "equiv").ok_or("<ph> without equiv attribute")?;
                let (base, named_ordinal) = split_ordinal(&name);
                if base == "ICU" {
                    let ordinal = if named_ordinal > 0 {
                        named_ordinal
                    } else {
                        let next = icu_refs;
                        icu_refs += 1;
                        next
                    };
                    stack
                        .last_mut()
                        .unwrap()
                        .parts
                        .push(MessagePart::IcuRef(ordinal));
                } else {
                    let disp = attribute(&element, "disp");
                    stack
                        .last_mut()
                        .unwrap()
                        .parts
                        .push(MessagePart::Placeholder(Placeholder::from_name(
                            &name, disp,
                        )));
                }
            }
            Event::Start(element) if element.name().as_ref() == b"pc" => {
                let start_name = attribute(&element, "equivStart")
                    .ok_or("<pc> without equivStart attribute")?;
                let (tag, ordinal) = match parse_tag_name(&start_name) {
                    Some(TagNameRole::Start { tag, ordinal }) => (tag, ordinal),
                    _ => {
                        return Err(format!(
                            "equivStart {start_name:?} is not a START_ marker"
                        ))
                    }
                };
                stack.push(Frame {
                    tag,
                    ordinal,
                    parts: Vec::new(),
                });
            }
            Event::End(element) if element.name().as_ref() == b"pc" => {
                if stack.len() < 2 {
                    return Err("</pc> without matching <pc>".to_string());
                }
                let frame = stack.pop().unwrap();
                stack.last_mut().unwrap().parts.push(MessagePart::TagSpan(TagSpan {
                    tag: frame.tag,
                    ordinal: frame.ordinal,
                    children: frame.parts,
                }));
            }
            Event::Start(element) | Event::Empty(element) => {
                return Err(format!(
                    "unexpected element <{}>",
                    String::from_utf8_lossy(element.name().as_ref())
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err("<pc> without matching </pc>".to_string());
    }
    Ok(stack.pop().unwrap().parts)
}

/// Serialize one non-ICU part. `recurse` serializes child parts with
/// the shared id counter.
pub(crate) fn write_part(
    part: &MessagePart,
    id: usize,
    out: &mut String,
    recurse: &mut dyn FnMut(&[MessagePart], &mut String),
) {
    match part {
        MessagePart::Text(text) => out.push_str(&escape_text(text)),
        MessagePart::Placeholder(ph) => {
            out.push_str(&format!("<ph id=\"{id}\" equiv=\"{}\"", ph.name()));
            if let Some(disp) = &ph.disp {
                out.push_str(&format!(" disp=\"{}\"", escape_attribute(disp)));
            }
            out.push_str("/>");
        }
        MessagePart::IcuRef(_) => {
            out.push_str(&format!("<ph id=\"{id}\" equiv=\"ICU\"/>"));
        }
        MessagePart::TagSpan(span) => {
            out.push_str(&format!(
                "<pc id=\"{id}\" equivStart=\"{start}\" equivEnd=\"{end}\" \
                 dispStart=\"{disp_start}\" dispEnd=\"{disp_end}\">",
                start = span.start_name(),
                end = span.close_name(),
                disp_start = escape_attribute(&format!("<{}>", span.tag)),
                disp_end = escape_attribute(&format!("</{}>", span.tag)),
            ));
            recurse(&span.children, out);
            out.push_str("</pc>");
        }
        MessagePart::Icu(_) => {}
    }
}

fn map_error(error: quick_xml::Error) -> FormatError {
    FormatError::MalformedFile {
        format: FORMAT,
        detail: error.to_string(),
    }
}

/// Parse a whole XLIFF 2.0 document into its raw units.
pub(crate) fn parse_document(text: &str) -> Result<RawFile, FormatError> {
    let mut reader = Reader::from_str(text);
    let mut file = RawFile::default();
    let mut saw_xliff = false;

    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(element) if element.name().as_ref() == b"xliff" => {
                if let Some(version) = attribute(&element, "version") {
                    if version != "2.0" {
                        return Err(FormatError::MalformedFile {
                            format: FORMAT,
                            detail: format!("expected version 2.0, got {version}"),
                        });
                    }
                }
                saw_xliff = true;
                file.source_language = attribute(&element, "srcLang");
                file.target_language = attribute(&element, "trgLang");
            }
            Event::Start(element) if element.name().as_ref() == b"unit" => {
                let unit = parse_unit(&mut reader, &element)?;
                file.units.push(unit);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_xliff {
        return Err(FormatError::MalformedFile {
            format: FORMAT,
            detail: "no <xliff> element found".to_string(),
        });
    }
    Ok(file)
}

fn parse_unit(
    reader: &mut Reader<&[u8]>,
    element: &quick_xml::events::BytesStart,
) -> Result<RawUnit, FormatError> {
    let id = attribute(element, "id").ok_or_else(|| FormatError::MalformedFile {
        format: FORMAT,
        detail: "<unit> without id attribute".to_string(),
    })?;
    let mut unit = RawUnit {
        id,
        ..RawUnit::default()
    };

    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(inner) if inner.name().as_ref() == b"segment" => {
                unit.target_state = attribute(&inner, "state");
            }
            Event::Start(inner) if inner.name().as_ref() == b"source" => {
                unit.source = reader
                    .read_text(inner.name().to_owned())
                    .map_err(map_error)?
                    .into_owned();
            }
            Event::Empty(inner) if inner.name().as_ref() == b"source" => {
                unit.source = String::new();
            }
            Event::Start(inner) if inner.name().as_ref() == b"target" => {
                unit.target = Some(
                    reader
                        .read_text(inner.name().to_owned())
                        .map_err(map_error)?
                        .into_owned(),
                );
            }
            Event::Empty(inner) if inner.name().as_ref() == b"target" => {
                unit.target = Some(String::new());
            }
            Event::Start(inner) if inner.name().as_ref() == b"note" => {
                let category = attribute(&inner, "category");
                let content = reader
                    .read_text(inner.name().to_owned())
                    .map_err(map_error)?
                    .into_owned();
                match category.as_deref() {
                    Some("description") => unit.description = Some(unescape_text(&content)),
                    Some("meaning") => unit.meaning = Some(unescape_text(&content)),
                    Some("location") => {
                        if let Some(reference) = parse_location(&unescape_text(&content)) {
                            unit.source_refs.push(reference);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(inner) if inner.name().as_ref() == b"unit" => break,
            Event::Eof => {
                return Err(FormatError::MalformedFile {
                    format: FORMAT,
                    detail: format!("unterminated <unit id=\"{}\">", unit.id),
                });
            }
            _ => {}
        }
    }
    Ok(unit)
}

/// Split a `path/to/file.ts:12` location note.
pub(crate) fn parse_location(content: &str) -> Option<(String, u32)> {
    let trimmed = content.trim();
    match trimmed.rsplit_once(':') {
        Some((file, line)) => {
            let line = line.trim().parse::<u32>().ok()?;
            Some((file.to_string(), line))
        }
        None if !trimmed.is_empty() => Some((trimmed.to_string(), 0)),
        None => None,
    }
}

fn state_to_wire(state: TargetState) -> &'static str {
    match state {
        TargetState::New => "initial",
        TargetState::Translated => "translated",
        TargetState::Final => "final",
    }
}

pub(crate) fn state_from_wire(state: Option<&str>, has_target: bool) -> TargetState {
    match state {
        Some("initial") => TargetState::New,
        Some("final") => TargetState::Final,
        Some(_) => TargetState::Translated,
        None if has_target => TargetState::Translated,
        None => TargetState::New,
    }
}

/// Serialize a translation file as an XLIFF 2.0 document.
pub(crate) fn write_document(file: &TranslationFile, indent: &str) -> String {
    let mut doc = DocumentBuilder::new(indent);
    let mut xliff = String::from(
        "<xliff version=\"2.0\" xmlns=\"urn:oasis:names:tc:xliff:document:2.0\"",
    );
    if let Some(language) = file.source_language() {
        xliff.push_str(&format!(" srcLang=\"{}\"", escape_attribute(language)));
    }
    if let Some(language) = file.target_language() {
        xliff.push_str(&format!(" trgLang=\"{}\"", escape_attribute(language)));
    }
    xliff.push('>');
    doc.open(&xliff);
    doc.open("<file id=\"ngi18n\" original=\"ng.template\">");

    for unit in file.units() {
        doc.open(&format!("<unit id=\"{}\">", escape_attribute(unit.id())));
        let notes: Vec<String> = unit_notes(unit);
        if !notes.is_empty() {
            doc.open("<notes>");
            for note in notes {
                doc.line(&note);
            }
            doc.close("</notes>");
        }
        doc.open(&format!(
            "<segment state=\"{}\">",
            state_to_wire(unit.target_state())
        ));
        doc.line(&format!("<source>{}</source>", unit.source_content()));
        if let Some(target) = unit.target_content() {
            doc.line(&format!("<target>{target}</target>"));
        }
        doc.close("</segment>");
        doc.close("</unit>");
    }

    doc.close("</file>");
    doc.close("</xliff>");
    doc.finish()
}

fn unit_notes(unit: &crate::file::TranslationUnit) -> Vec<String> {
    let mut notes = Vec::new();
    if let Some(description) = unit.description() {
        notes.push(format!(
            "<note category=\"description\">{}</note>",
            escape_text(description)
        ));
    }
    if let Some(meaning) = unit.meaning() {
        notes.push(format!(
            "<note category=\"meaning\">{}</note>",
            escape_text(meaning)
        ));
    }
    for reference in unit.source_references() {
        notes.push(format!(
            "<note category=\"location\">{}:{}</note>",
            escape_text(&reference.sourcefile),
            reference.line_number
        ));
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PlaceholderKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_inline_placeholder_and_icu_ref() {
        let parts = parse_inline(
            "value: <ph id=\"0\" equiv=\"INTERPOLATION\" disp=\"{{amount}}\"/> \
             <ph id=\"1\" equiv=\"ICU\"/>",
        )
        .unwrap();
        match &parts[1] {
            MessagePart::Placeholder(ph) => {
                assert_eq!(ph.kind, PlaceholderKind::Interpolation);
                assert_eq!(ph.disp.as_deref(), Some("{{amount}}"));
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
        assert_eq!(parts[3], MessagePart::IcuRef(0));
    }

    #[test]
    fn test_parse_inline_nested_pc() {
        let parts = parse_inline(
            "<pc id=\"0\" equivStart=\"START_BOLD_TEXT\" equivEnd=\"CLOSE_BOLD_TEXT\" \
             dispStart=\"&lt;b&gt;\" dispEnd=\"&lt;/b&gt;\">bold \
             <pc id=\"1\" equivStart=\"START_ITALIC_TEXT\" equivEnd=\"CLOSE_ITALIC_TEXT\" \
             dispStart=\"&lt;i&gt;\" dispEnd=\"&lt;/i&gt;\">both</pc></pc>",
        )
        .unwrap();
        match &parts[0] {
            MessagePart::TagSpan(span) => {
                assert_eq!(span.tag, "b");
                match span.children.last().unwrap() {
                    MessagePart::TagSpan(inner) => assert_eq!(inner.tag, "i"),
                    other => panic!("expected inner span, got {other:?}"),
                }
            }
            other => panic!("expected tag span, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_inline_unclosed_pc() {
        assert!(parse_inline(
            "<pc id=\"0\" equivStart=\"START_BOLD_TEXT\" equivEnd=\"CLOSE_BOLD_TEXT\">open"
        )
        .is_err());
    }

    #[test]
    fn test_write_tag_span() {
        let parts = crate::message::parse_display("a <b>bold</b> word");
        let wire = super::super::to_wire(crate::formats::FileFormat::Xliff2, &parts);
        assert_eq!(
            wire,
            "a <pc id=\"0\" equivStart=\"START_BOLD_TEXT\" equivEnd=\"CLOSE_BOLD_TEXT\" \
             dispStart=\"&lt;b&gt;\" dispEnd=\"&lt;/b&gt;\">bold</pc> word"
        );
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(
            parse_location("app/app.ts:12"),
            Some(("app/app.ts".to_string(), 12))
        );
        assert_eq!(parse_location("app/app.ts"), Some(("app/app.ts".to_string(), 0)));
        assert_eq!(parse_location("  "), None);
    }

    #[test]
    fn test_parse_document() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<xliff version="2.0" xmlns="urn:oasis:names:tc:xliff:document:2.0" srcLang="en" trgLang="de">
  <file id="ngi18n" original="ng.template">
    <unit id="greeting">
      <notes>
        <note category="description">a friendly greeting</note>
        <note category="location">app/app.ts:12</note>
      </notes>
      <segment state="translated">
        <source>Hello</source>
        <target>Hallo</target>
      </segment>
    </unit>
  </file>
</xliff>"#;
        let file = parse_document(text).unwrap();
        assert_eq!(file.source_language.as_deref(), Some("en"));
        assert_eq!(file.target_language.as_deref(), Some("de"));
        let unit = &file.units[0];
        assert_eq!(unit.source, "Hello");
        assert_eq!(unit.target.as_deref(), Some("Hallo"));
        assert_eq!(unit.target_state.as_deref(), Some("translated"));
        assert_eq!(unit.source_refs, vec![("app/app.ts".to_string(), 12)]);
    }

    #[test]
    fn test_note_entities_are_decoded() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<xliff version="2.0" xmlns="urn:oasis:names:tc:xliff:document:2.0" srcLang="en">
  <file id="ngi18n" original="ng.template">
    <unit id="odds">
      <notes>
        <note category="description">bits &amp; pieces</note>
      </notes>
      <segment>
        <source>Hello</source>
      </segment>
    </unit>
  </file>
</xliff>"#;
        let file = parse_document(text).unwrap();
        assert_eq!(file.units[0].description.as_deref(), Some("bits & pieces"));
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(state_from_wire(Some("initial"), true), TargetState::New);
        assert_eq!(state_from_wire(Some("final"), true), TargetState::Final);
        assert_eq!(state_from_wire(None, false), TargetState::New);
    }
}
