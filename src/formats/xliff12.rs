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

//! XLIFF 1.2 support.
//!
//! Inline markup follows the XLIFF 1.2 inline element set: `<x/>` for
//! childless placeholders, `<bpt>`/`<ept>` pairs (flat siblings, paired
//! by id) for tag spans and `<ph equiv="ICU"/>` for embedded ICU
//! references. Legacy Angular files that write flat
//! `<x id="START_BOLD_TEXT"/>`/`<x id="CLOSE_BOLD_TEXT"/>` markers are
//! accepted on read and re-paired into spans.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FormatError;
use crate::file::{TargetState, TranslationFile};
use crate::message::{parse_tag_name, split_ordinal, MessagePart, Placeholder, TagNameRole, TagSpan};
use crate::xml::{attribute, escape_attribute, escape_text, unescape_text, DocumentBuilder};

use super::{RawFile, RawUnit};

const FORMAT: &str = "xlf";

struct Frame {
    /// The `id` attribute of the opening `<bpt>`, if any. Legacy flat
    /// `START_`/`CLOSE_` markers carry no pairing id.
    pair_id: Option<String>,
    tag: String,
    ordinal: usize,
    parts: Vec<MessagePart>,
}

/// Parse the inline markup of a `<source>` or `<target>` fragment.
pub(crate) fn parse_inline(fragment: &str) -> Result<Vec<MessagePart>, String> {
    let mut reader = Reader::from_str(fragment);
    let mut stack = vec![Frame {
        pair_id: None,
        tag: String::new(),
        ordinal: 0,
        parts: Vec::new(),
    }];
    let mut tag_counters: BTreeMap<String, usize> = BTreeMap::new();
    let mut icu_refs = 0;

    loop {
        let event = reader.read_event().map_err(|error| error.to_string())?;
        match event {
            Event::Text(text) => {
                let value = text.unescape().map_err(|error| error.to_string())?;
                push_text(&mut stack, &value);
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                push_text(&mut stack, &value);
            }
            Event::Empty(element) if element.name().as_ref() == b"x" => {
                let name = attribute(&element, "equiv")
                    .or_else(|| attribute(&element, "id").filter(|id| !is_numeric(id)))
                    .ok_or("<x> without equiv attribute")?;
                let disp = attribute(&element, "equiv-text");
                handle_named_marker(
                    &name,
                    disp,
                    &mut stack,
                    &mut tag_counters,
                    &mut icu_refs,
                )?;
            }
            Event::Empty(element) if element.name().as_ref() == b"ph" => {
                handle_ph(&element, &mut stack, &mut icu_refs);
            }
            Event::Start(element) if element.name().as_ref() == b"ph" => {
                reader
                    .read_to_end(element.name().to_owned())
                    .map_err(|error| error.to_string())?;
                handle_ph(&element, &mut stack, &mut icu_refs);
            }
            Event::Start(element) if element.name().as_ref() == b"bpt" => {
                let pair_id = attribute(&element, "id");
                let tag = attribute(&element, "ctype")
                    .and_then(|ctype| ctype.strip_prefix("x-").map(str::to_string))
                    .ok_or("<bpt> without x- ctype attribute")?;
                // The inner content is only the display hint.
                reader
                    .read_to_end(element.name().to_owned())
                    .map_err(|error| error.to_string())?;
                let counter = tag_counters.entry(format!("tag:{tag}")).or_insert(0);
                let ordinal = *counter;
                *counter += 1;
                stack.push(Frame {
                    pair_id,
                    tag,
                    ordinal,
                    parts: Vec::new(),
                });
            }
            Event::Start(element) if element.name().as_ref() == b"ept" => {
                let pair_id = attribute(&element, "id");
                // The inner content is only the display hint.
                reader
                    .read_to_end(element.name().to_owned())
                    .map_err(|error| error.to_string())?;
                close_span(&mut stack, pair_id)?;
            }
            Event::Empty(element) if element.name().as_ref() == b"ept" => {
                let pair_id = attribute(&element, "id");
                close_span(&mut stack, pair_id)?;
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
        return Err("<bpt> without matching <ept>".to_string());
    }
    Ok(stack.pop().unwrap().parts)
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

/// Pop the innermost `<bpt>` frame and turn it into a tag span.
fn close_span(stack: &mut Vec<Frame>, pair_id: Option<String>) -> Result<(), String> {
    if stack.len() < 2 {
        return Err("<ept> without matching <bpt>".to_string());
    }
    let frame = stack.pop().unwrap();
    if frame.pair_id.is_some() && pair_id.is_some() && frame.pair_id != pair_id {
        return Err(format!(
            "<ept id={:?}> does not pair with <bpt id={:?}>",
            pair_id, frame.pair_id
        ));
    }
    stack.last_mut().unwrap().parts.push(MessagePart::TagSpan(TagSpan {
        tag: frame.tag,
        ordinal: frame.ordinal,
        children: frame.parts,
    }));
    Ok(())
}

fn push_text(stack: &mut [Frame], value: &str) {
    if let Some(frame) = stack.last_mut() {
        frame.parts.push(MessagePart::Text(value.to_string()));
    }
}

fn handle_ph(
    element: &quick_xml::events::BytesStart,
    stack: &mut Vec<Frame>,
    icu_refs: &mut usize,
) {
    // <ph equiv="ICU"/> is the normal spelling; a bare <ph id="N"/> is
    // the legacy one. Both mark an embedded ICU message. The counter
    // only advances for refs without an explicit "_N" ordinal.
    let named_ordinal = attribute(element, "equiv")
        .map(|name| split_ordinal(&name).1)
        .unwrap_or(0);
    let ordinal = if named_ordinal > 0 {
        named_ordinal
    } else {
        let next = *icu_refs;
        *icu_refs += 1;
        next
    };
    stack
        .last_mut()
        .unwrap()
        .parts
        .push(MessagePart::IcuRef(ordinal));
}

/// Dispatch a named childless marker: ICU reference, legacy flat tag
/// marker or plain placeholder.
fn handle_named_marker(
    name: &str,
    disp: Option<String>,
    stack: &mut Vec<Frame>,
    tag_counters: &mut BTreeMap<String, usize>,
    icu_refs: &mut usize,
) -> Result<(), String> {
    let (base, named_ordinal) = split_ordinal(name);
    if base == "ICU" {
        // "ICU_1" carries its own ordinal; bare "ICU" refs number
        // themselves, independent of any explicitly numbered ones.
        let ordinal = if named_ordinal > 0 {
            named_ordinal
        } else {
            let next = *icu_refs;
            *icu_refs += 1;
            next
        };
        stack
            .last_mut()
            .unwrap()
            .parts
            .push(MessagePart::IcuRef(ordinal));
        return Ok(());
    }
    match parse_tag_name(name) {
        Some(TagNameRole::Start { tag, ordinal }) => {
            tag_counters
                .entry(format!("tag:{tag}"))
                .and_modify(|counter| *counter = (*counter).max(ordinal + 1))
                .or_insert(ordinal + 1);
            stack.push(Frame {
                pair_id: None,
                tag,
                ordinal,
                parts: Vec::new(),
            });
            Ok(())
        }
        Some(TagNameRole::Close { tag, .. }) => {
            let frame = stack.pop().ok_or("close marker without start marker")?;
            if stack.is_empty() {
                return Err(format!("CLOSE marker for <{tag}> without START marker"));
            }
            if frame.tag != tag {
                return Err(format!(
                    "CLOSE marker for <{tag}> does not pair with START marker for <{}>",
                    frame.tag
                ));
            }
            stack.last_mut().unwrap().parts.push(MessagePart::TagSpan(TagSpan {
                tag: frame.tag,
                ordinal: frame.ordinal,
                children: frame.parts,
            }));
            Ok(())
        }
        None => {
            stack
                .last_mut()
                .unwrap()
                .parts
                .push(MessagePart::Placeholder(Placeholder::from_name(name, disp)));
            Ok(())
        }
    }
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
            out.push_str(&format!("<x id=\"{id}\" equiv=\"{}\"", ph.name()));
            if let Some(disp) = &ph.disp {
                out.push_str(&format!(" equiv-text=\"{}\"", escape_attribute(disp)));
            }
            out.push_str("/>");
        }
        MessagePart::IcuRef(_) => {
            out.push_str(&format!("<ph id=\"{id}\" equiv=\"ICU\"/>"));
        }
        MessagePart::TagSpan(span) => {
            out.push_str(&format!(
                "<bpt id=\"{id}\" ctype=\"x-{tag}\">{hint}</bpt>",
                tag = span.tag,
                hint = escape_text(&format!("<{}>", span.tag)),
            ));
            recurse(&span.children, out);
            out.push_str(&format!(
                "<ept id=\"{id}\">{hint}</ept>",
                hint = escape_text(&format!("</{}>", span.tag)),
            ));
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

/// Parse a whole XLIFF 1.2 document into its raw units.
pub(crate) fn parse_document(text: &str) -> Result<RawFile, FormatError> {
    let mut reader = Reader::from_str(text);
    let mut file = RawFile::default();
    let mut saw_body = false;

    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(element) if element.name().as_ref() == b"xliff" => {
                if let Some(version) = attribute(&element, "version") {
                    if version != "1.2" {
                        return Err(FormatError::MalformedFile {
                            format: FORMAT,
                            detail: format!("expected version 1.2, got {version}"),
                        });
                    }
                }
            }
            Event::Start(element) if element.name().as_ref() == b"file" => {
                file.source_language = attribute(&element, "source-language");
                file.target_language = attribute(&element, "target-language");
            }
            Event::Start(element) if element.name().as_ref() == b"body" => {
                saw_body = true;
            }
            Event::Start(element) if element.name().as_ref() == b"trans-unit" => {
                let unit = parse_trans_unit(&mut reader, &element)?;
                file.units.push(unit);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_body {
        return Err(FormatError::MalformedFile {
            format: FORMAT,
            detail: "no <body> element found".to_string(),
        });
    }
    Ok(file)
}

fn parse_trans_unit(
    reader: &mut Reader<&[u8]>,
    element: &quick_xml::events::BytesStart,
) -> Result<RawUnit, FormatError> {
    let id = attribute(element, "id").ok_or_else(|| FormatError::MalformedFile {
        format: FORMAT,
        detail: "<trans-unit> without id attribute".to_string(),
    })?;
    let mut unit = RawUnit {
        id,
        ..RawUnit::default()
    };

    loop {
        match reader.read_event().map_err(map_error)? {
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
                unit.target_state = attribute(&inner, "state");
                unit.target = Some(
                    reader
                        .read_text(inner.name().to_owned())
                        .map_err(map_error)?
                        .into_owned(),
                );
            }
            Event::Empty(inner) if inner.name().as_ref() == b"target" => {
                unit.target_state = attribute(&inner, "state");
                unit.target = Some(String::new());
            }
            Event::Start(inner) if inner.name().as_ref() == b"note" => {
                let from = attribute(&inner, "from");
                let content = reader
                    .read_text(inner.name().to_owned())
                    .map_err(map_error)?
                    .into_owned();
                match from.as_deref() {
                    Some("description") => unit.description = Some(unescape_text(&content)),
                    Some("meaning") => unit.meaning = Some(unescape_text(&content)),
                    _ => {}
                }
            }
            Event::Start(inner) if inner.name().as_ref() == b"context-group" => {
                if let Some(reference) = parse_context_group(reader)? {
                    unit.source_refs.push(reference);
                }
            }
            Event::End(inner) if inner.name().as_ref() == b"trans-unit" => break,
            Event::Eof => {
                return Err(FormatError::MalformedFile {
                    format: FORMAT,
                    detail: format!("unterminated <trans-unit id=\"{}\">", unit.id),
                });
            }
            _ => {}
        }
    }
    Ok(unit)
}

fn parse_context_group(reader: &mut Reader<&[u8]>) -> Result<Option<(String, u32)>, FormatError> {
    let mut sourcefile = None;
    let mut linenumber = None;
    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(inner) if inner.name().as_ref() == b"context" => {
                let context_type = attribute(&inner, "context-type");
                let content = reader
                    .read_text(inner.name().to_owned())
                    .map_err(map_error)?
                    .into_owned();
                match context_type.as_deref() {
                    Some("sourcefile") => sourcefile = Some(unescape_text(&content)),
                    Some("linenumber") => linenumber = content.trim().parse::<u32>().ok(),
                    _ => {}
                }
            }
            Event::End(inner) if inner.name().as_ref() == b"context-group" => break,
            Event::Eof => {
                return Err(FormatError::MalformedFile {
                    format: FORMAT,
                    detail: "unterminated <context-group>".to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(sourcefile.map(|file| (file, linenumber.unwrap_or(0))))
}

fn state_to_wire(state: TargetState) -> &'static str {
    match state {
        TargetState::New => "new",
        TargetState::Translated => "translated",
        TargetState::Final => "final",
    }
}

pub(crate) fn state_from_wire(state: Option<&str>, has_target: bool) -> TargetState {
    match state {
        Some("new") | Some("needs-translation") => TargetState::New,
        Some("final") | Some("signed-off") => TargetState::Final,
        Some(_) => TargetState::Translated,
        None if has_target => TargetState::Translated,
        None => TargetState::New,
    }
}

/// Serialize a translation file as an XLIFF 1.2 document.
pub(crate) fn write_document(file: &TranslationFile, indent: &str) -> String {
    let mut doc = DocumentBuilder::new(indent);
    doc.open("<xliff version=\"1.2\" xmlns=\"urn:oasis:names:tc:xliff:document:1.2\">");

    let mut file_attrs = String::from("<file");
    if let Some(language) = file.source_language() {
        file_attrs.push_str(&format!(
            " source-language=\"{}\"",
            escape_attribute(language)
        ));
    }
    if let Some(language) = file.target_language() {
        file_attrs.push_str(&format!(
            " target-language=\"{}\"",
            escape_attribute(language)
        ));
    }
    file_attrs.push_str(" datatype=\"plaintext\" original=\"ng2.template\">");
    doc.open(&file_attrs);
    doc.open("<body>");

    for unit in file.units() {
        doc.open(&format!(
            "<trans-unit id=\"{}\" datatype=\"html\">",
            escape_attribute(unit.id())
        ));
        doc.line(&format!("<source>{}</source>", unit.source_content()));
        if let Some(target) = unit.target_content() {
            doc.line(&format!(
                "<target state=\"{}\">{target}</target>",
                state_to_wire(unit.target_state())
            ));
        }
        if let Some(description) = unit.description() {
            doc.line(&format!(
                "<note priority=\"1\" from=\"description\">{}</note>",
                escape_text(description)
            ));
        }
        if let Some(meaning) = unit.meaning() {
            doc.line(&format!(
                "<note priority=\"1\" from=\"meaning\">{}</note>",
                escape_text(meaning)
            ));
        }
        for reference in unit.source_references() {
            doc.open("<context-group purpose=\"location\">");
            doc.line(&format!(
                "<context context-type=\"sourcefile\">{}</context>",
                escape_text(&reference.sourcefile)
            ));
            doc.line(&format!(
                "<context context-type=\"linenumber\">{}</context>",
                reference.line_number
            ));
            doc.close("</context-group>");
        }
        doc.close("</trans-unit>");
    }

    doc.close("</body>");
    doc.close("</file>");
    doc.close("</xliff>");
    doc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PlaceholderKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_inline_text_and_placeholder() {
        let parts =
            parse_inline("value: <x id=\"0\" equiv=\"INTERPOLATION\" equiv-text=\"{{amount}}\"/>")
                .unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], MessagePart::Text("value: ".to_string()));
        match &parts[1] {
            MessagePart::Placeholder(ph) => {
                assert_eq!(ph.kind, PlaceholderKind::Interpolation);
                assert_eq!(ph.ordinal, 0);
                assert_eq!(ph.disp.as_deref(), Some("{{amount}}"));
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_inline_bpt_ept_pair() {
        let parts = parse_inline(
            "a <bpt id=\"0\" ctype=\"x-b\">&lt;b&gt;</bpt>bold<ept id=\"0\">&lt;/b&gt;</ept> word",
        )
        .unwrap();
        assert_eq!(
            parts[1],
            MessagePart::TagSpan(TagSpan {
                tag: "b".to_string(),
                ordinal: 0,
                children: vec![MessagePart::Text("bold".to_string())],
            })
        );
    }

    #[test]
    fn test_parse_inline_legacy_flat_tag_markers() {
        let parts = parse_inline(
            "a <x id=\"START_BOLD_TEXT\" ctype=\"x-b\"/>bold<x id=\"CLOSE_BOLD_TEXT\"/> word",
        )
        .unwrap();
        assert_eq!(
            parts[1],
            MessagePart::TagSpan(TagSpan {
                tag: "b".to_string(),
                ordinal: 0,
                children: vec![MessagePart::Text("bold".to_string())],
            })
        );
    }

    #[test]
    fn test_parse_inline_icu_ref_both_spellings() {
        let parts = parse_inline("new: <ph id=\"0\" equiv=\"ICU\"/> legacy: <ph id=\"1\"/>")
            .unwrap();
        assert_eq!(parts[1], MessagePart::IcuRef(0));
        assert_eq!(parts[3], MessagePart::IcuRef(1));
    }

    #[test]
    fn test_named_icu_ref_does_not_shift_bare_ones() {
        let parts =
            parse_inline("<ph id=\"0\" equiv=\"ICU_1\"/> and <ph id=\"1\" equiv=\"ICU\"/>")
                .unwrap();
        assert_eq!(parts[0], MessagePart::IcuRef(1));
        assert_eq!(parts[2], MessagePart::IcuRef(0));
    }

    #[test]
    fn test_parse_inline_mismatched_ept() {
        let result = parse_inline("<bpt id=\"0\" ctype=\"x-b\">x</bpt><ept id=\"7\">y</ept>");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_inline_unknown_element() {
        assert!(parse_inline("text <g id=\"0\">span</g>").is_err());
    }

    #[test]
    fn test_write_round_trip_dense_ids() {
        let parts = parse_inline(
            "<x id=\"7\" equiv=\"INTERPOLATION_1\"/>: \
             <x id=\"3\" equiv=\"INTERPOLATION\"/>",
        )
        .unwrap();
        let wire = super::super::to_wire(crate::formats::FileFormat::Xliff12, &parts);
        assert_eq!(
            wire,
            "<x id=\"0\" equiv=\"INTERPOLATION_1\"/>: <x id=\"1\" equiv=\"INTERPOLATION\"/>"
        );
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(state_from_wire(Some("new"), true), TargetState::New);
        assert_eq!(state_from_wire(Some("signed-off"), true), TargetState::Final);
        assert_eq!(
            state_from_wire(Some("translated"), true),
            TargetState::Translated
        );
        assert_eq!(state_from_wire(None, true), TargetState::Translated);
        assert_eq!(state_from_wire(None, false), TargetState::New);
    }

    #[test]
    fn test_parse_document() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
  <file source-language="en" target-language="de" datatype="plaintext" original="ng2.template">
    <body>
      <trans-unit id="greeting" datatype="html">
        <source>Hello</source>
        <target state="translated">Hallo</target>
        <note priority="1" from="description">a friendly greeting</note>
        <context-group purpose="location">
          <context context-type="sourcefile">app/app.ts</context>
          <context context-type="linenumber">12</context>
        </context-group>
      </trans-unit>
    </body>
  </file>
</xliff>"#;
        let file = parse_document(text).unwrap();
        assert_eq!(file.source_language.as_deref(), Some("en"));
        assert_eq!(file.target_language.as_deref(), Some("de"));
        assert_eq!(file.units.len(), 1);
        let unit = &file.units[0];
        assert_eq!(unit.id, "greeting");
        assert_eq!(unit.source, "Hello");
        assert_eq!(unit.target.as_deref(), Some("Hallo"));
        assert_eq!(unit.target_state.as_deref(), Some("translated"));
        assert_eq!(unit.description.as_deref(), Some("a friendly greeting"));
        assert_eq!(unit.source_refs, vec![("app/app.ts".to_string(), 12)]);
    }

    #[test]
    fn test_note_entities_survive_rewriting() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
  <file source-language="en" datatype="plaintext" original="ng2.template">
    <body>
      <trans-unit id="odds" datatype="html">
        <source>Hello</source>
        <note priority="1" from="description">bits &amp; pieces</note>
        <context-group purpose="location">
          <context context-type="sourcefile">a&amp;b.ts</context>
          <context context-type="linenumber">3</context>
        </context-group>
      </trans-unit>
    </body>
  </file>
</xliff>"#;
        let first =
            crate::file::TranslationFile::parse(text, crate::formats::FileFormat::Xliff12, None)
                .unwrap();
        assert_eq!(first.units()[0].description(), Some("bits & pieces"));

        let rewritten = first.edited_content(None).unwrap();
        let second = crate::file::TranslationFile::parse(
            &rewritten,
            crate::formats::FileFormat::Xliff12,
            None,
        )
        .unwrap();
        assert_eq!(second.units()[0].description(), Some("bits & pieces"));
        assert_eq!(second.units()[0].source_references()[0].sourcefile, "a&b.ts");
    }

    #[test]
    fn test_parse_document_rejects_version_2() {
        let text = r#"<xliff version="2.0"><file/></xliff>"#;
        assert!(parse_document(text).is_err());
    }
}
