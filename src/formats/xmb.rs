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

//! XMB support.
//!
//! The XML Message Bundle is the untranslated master file. All inline
//! markup is expressed with `<ph name="..."/>` elements; tag spans are
//! flattened into `START_`/`CLOSE_` placeholder pairs and re-paired
//! into spans on read. The optional `<ex>` child carries a display
//! hint. XTB files share these inline conventions.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::FormatError;
use crate::file::TranslationFile;
use crate::message::{parse_tag_name, split_ordinal, MessagePart, Placeholder, TagNameRole, TagSpan};
use crate::xml::{attribute, escape_attribute, escape_text, unescape_text, DocumentBuilder};

use super::{RawFile, RawUnit};

const FORMAT: &str = "xmb";

struct Frame {
    tag: String,
    ordinal: usize,
    parts: Vec<MessagePart>,
}

/// Parse the inline markup of a message fragment.
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
                    attribute(&element, "name").ok_or("<ph> without name attribute")?;
                handle_marker(&name, None, &mut stack, &mut icu_refs)?;
            }
            Event::Start(element) if element.name().as_ref() == b"ph" => {
                let name =
                    attribute(&element, "name").ok_or("<ph> without name attribute")?;
                let disp = read_example(&mut reader)?;
                handle_marker(&name, disp, &mut stack, &mut icu_refs)?;
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
        return Err("START_ marker without CLOSE_ marker".to_string());
    }
    Ok(stack.pop().unwrap().parts)
}

/// Consume the content of a spelled-out `<ph>...</ph>` and return the
/// `<ex>` display hint, if any.
fn read_example(reader: &mut Reader<&[u8]>) -> Result<Option<String>, String> {
    let mut disp = None;
    loop {
        match reader.read_event().map_err(|error| error.to_string())? {
            Event::Start(inner) if inner.name().as_ref() == b"ex" => {
                let content = reader
                    .read_text(inner.name().to_owned())
                    .map_err(|error| error.to_string())?;
                disp = Some(content.into_owned());
            }
            Event::End(inner) if inner.name().as_ref() == b"ph" => break,
            Event::Eof => return Err("unterminated <ph>".to_string()),
            _ => {}
        }
    }
    Ok(disp)
}

fn handle_marker(
    name: &str,
    disp: Option<String>,
    stack: &mut Vec<Frame>,
    icu_refs: &mut usize,
) -> Result<(), String> {
    let (base, named_ordinal) = split_ordinal(name);
    if base == "ICU" {
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
            stack.push(Frame {
                tag,
                ordinal,
                parts: Vec::new(),
            });
            Ok(())
        }
        Some(TagNameRole::Close { tag, .. }) => {
            if stack.len() < 2 {
                return Err(format!("CLOSE_ marker for <{tag}> without START_ marker"));
            }
            let frame = stack.pop().unwrap();
            if frame.tag != tag {
                return Err(format!(
                    "CLOSE_ marker for <{tag}> does not pair with START_ marker for <{}>",
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

/// Serialize one non-ICU part. XMB placeholders carry no numeric ids,
/// so `id` is unused here.
pub(crate) fn write_part(
    part: &MessagePart,
    _id: usize,
    out: &mut String,
    recurse: &mut dyn FnMut(&[MessagePart], &mut String),
) {
    match part {
        MessagePart::Text(text) => out.push_str(&escape_text(text)),
        MessagePart::Placeholder(ph) => match &ph.disp {
            Some(disp) => out.push_str(&format!(
                "<ph name=\"{}\"><ex>{}</ex></ph>",
                ph.name(),
                escape_text(disp)
            )),
            None => out.push_str(&format!("<ph name=\"{}\"/>", ph.name())),
        },
        MessagePart::IcuRef(_) => out.push_str("<ph name=\"ICU\"/>"),
        MessagePart::TagSpan(span) => {
            out.push_str(&format!(
                "<ph name=\"{}\"><ex>{}</ex></ph>",
                span.start_name(),
                escape_text(&format!("<{}>", span.tag))
            ));
            recurse(&span.children, out);
            out.push_str(&format!(
                "<ph name=\"{}\"><ex>{}</ex></ph>",
                span.close_name(),
                escape_text(&format!("</{}>", span.tag))
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

/// Parse a whole XMB document into its raw units.
pub(crate) fn parse_document(text: &str) -> Result<RawFile, FormatError> {
    let mut reader = Reader::from_str(text);
    let mut file = RawFile::default();
    let mut saw_bundle = false;

    loop {
        match reader.read_event().map_err(map_error)? {
            Event::Start(element) if element.name().as_ref() == b"messagebundle" => {
                saw_bundle = true;
            }
            Event::Start(element) if element.name().as_ref() == b"msg" => {
                let mut unit = msg_unit(&element)?;
                let raw = reader
                    .read_text(element.name().to_owned())
                    .map_err(map_error)?;
                let (refs, content) = split_source_refs(&raw);
                unit.source_refs = refs;
                unit.source = content;
                file.units.push(unit);
            }
            Event::Empty(element) if element.name().as_ref() == b"msg" => {
                file.units.push(msg_unit(&element)?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_bundle {
        return Err(FormatError::MalformedFile {
            format: FORMAT,
            detail: "no <messagebundle> element found".to_string(),
        });
    }
    Ok(file)
}

fn msg_unit(element: &quick_xml::events::BytesStart) -> Result<RawUnit, FormatError> {
    let id = attribute(element, "id").ok_or_else(|| FormatError::MalformedFile {
        format: FORMAT,
        detail: "<msg> without id attribute".to_string(),
    })?;
    Ok(RawUnit {
        id,
        description: attribute(element, "desc"),
        meaning: attribute(element, "meaning"),
        ..RawUnit::default()
    })
}

/// Strip the leading `<source>file:line</source>` elements off a raw
/// `<msg>` fragment. The message content starts right after the last
/// one.
fn split_source_refs(raw: &str) -> (Vec<(String, u32)>, String) {
    let mut refs = Vec::new();
    let mut remaining = raw;
    loop {
        let trimmed = remaining.trim_start();
        let Some(rest) = trimmed.strip_prefix("<source>") else {
            break;
        };
        let Some(end) = rest.find("</source>") else {
            break;
        };
        if let Some(reference) = super::xliff2::parse_location(&unescape_text(&rest[..end])) {
            refs.push(reference);
        }
        remaining = &rest[end + "</source>".len()..];
    }
    (refs, remaining.to_string())
}

/// Serialize a translation file as an XMB document. Only sources are
/// written; XMB is the untranslated master.
pub(crate) fn write_document(file: &TranslationFile, indent: &str) -> String {
    let mut doc = DocumentBuilder::new(indent);
    doc.open("<messagebundle>");
    for unit in file.units() {
        let mut msg = format!("<msg id=\"{}\"", escape_attribute(unit.id()));
        if let Some(description) = unit.description() {
            msg.push_str(&format!(" desc=\"{}\"", escape_attribute(description)));
        }
        if let Some(meaning) = unit.meaning() {
            msg.push_str(&format!(" meaning=\"{}\"", escape_attribute(meaning)));
        }
        msg.push('>');
        for reference in unit.source_references() {
            msg.push_str(&format!(
                "<source>{}:{}</source>",
                escape_text(&reference.sourcefile),
                reference.line_number
            ));
        }
        msg.push_str(unit.source_content());
        msg.push_str("</msg>");
        doc.line(&msg);
    }
    doc.close("</messagebundle>");
    doc.finish()
}
