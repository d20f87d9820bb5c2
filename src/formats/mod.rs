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

//! Wire-format support.
//!
//! Each submodule owns one file format: document parsing and
//! serialization plus the inline-markup normalizer that maps the
//! format's placeholder elements to [`MessagePart`] trees and back.
//! XTB shares the XMB inline conventions, so [`xtb`] only handles the
//! document layer.

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;
use crate::icu;
use crate::message::{IcuCategory, IcuMessage, MessagePart, NormalizedMessage};

pub(crate) mod xliff12;
pub(crate) mod xliff2;
pub(crate) mod xmb;
pub(crate) mod xtb;

/// One translation unit as read from a document, before normalization.
///
/// `source` and `target` are raw wire fragments; the file layer turns
/// them into [`NormalizedMessage`]s lazily.
#[derive(Debug, Default, Clone)]
pub(crate) struct RawUnit {
    pub(crate) id: String,
    pub(crate) source: String,
    pub(crate) target: Option<String>,
    pub(crate) target_state: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) meaning: Option<String>,
    pub(crate) source_refs: Vec<(String, u32)>,
}

/// The document-level result of parsing a translation file.
#[derive(Debug, Default)]
pub(crate) struct RawFile {
    pub(crate) source_language: Option<String>,
    pub(crate) target_language: Option<String>,
    pub(crate) units: Vec<RawUnit>,
}

/// The supported translation file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// XLIFF 1.2 (`.xlf`).
    Xliff12,
    /// XLIFF 2.0 (`.xlf`, `<xliff version="2.0">`).
    Xliff2,
    /// XML Message Bundle, the untranslated master (`.xmb`).
    Xmb,
    /// XML Translation Bundle, the translated counterpart of XMB (`.xtb`).
    Xtb,
}

impl FromStr for FileFormat {
    type Err = FormatError;

    fn from_str(value: &str) -> Result<FileFormat, FormatError> {
        match value {
            "xlf" => Ok(FileFormat::Xliff12),
            "xlf2" => Ok(FileFormat::Xliff2),
            "xmb" => Ok(FileFormat::Xmb),
            "xtb" => Ok(FileFormat::Xtb),
            other => Err(FormatError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileFormat::Xliff12 => "xlf",
            FileFormat::Xliff2 => "xlf2",
            FileFormat::Xmb => "xmb",
            FileFormat::Xtb => "xtb",
        };
        f.write_str(name)
    }
}

/// Parse a wire fragment into a normalized message.
///
/// ICU plural/select constructs are recognized at the text level
/// first; their category bodies are wire fragments and run through the
/// same normalizer recursively. Parse problems are recorded on the
/// returned message, not thrown.
pub(crate) fn normalize(format: FileFormat, fragment: &str) -> NormalizedMessage {
    if icu::looks_like_icu(fragment.trim_start()) {
        return normalize_icu(format, fragment);
    }
    let result = match format {
        FileFormat::Xliff12 => xliff12::parse_inline(fragment),
        FileFormat::Xliff2 => xliff2::parse_inline(fragment),
        FileFormat::Xmb | FileFormat::Xtb => xmb::parse_inline(fragment),
    };
    match result {
        Ok(parts) => NormalizedMessage::with_parts(fragment, format, parts),
        Err(error) => NormalizedMessage::parse_failure(fragment, format, error),
    }
}

fn normalize_icu(format: FileFormat, fragment: &str) -> NormalizedMessage {
    let parsed = match icu::parse_icu(fragment.trim()) {
        Ok(parsed) => parsed,
        Err(error) => return NormalizedMessage::parse_failure(fragment, format, error),
    };
    let mut categories = Vec::with_capacity(parsed.cases.len());
    for (key, body) in parsed.cases {
        let message = normalize(format, &body);
        categories.push(IcuCategory { key, message });
    }
    let icu = IcuMessage {
        variable: parsed.variable,
        icu_type: parsed.icu_type,
        categories,
    };
    NormalizedMessage::with_parts(fragment, format, vec![MessagePart::Icu(Box::new(icu))])
}

/// Serialize a part tree back to a wire fragment.
///
/// Inline elements get dense ids `0..n-1` in document order,
/// independent of the ids the fragment originally carried. A paired
/// start/end marker counts once.
pub(crate) fn to_wire(format: FileFormat, parts: &[MessagePart]) -> String {
    let mut out = String::new();
    let mut next_id = 0;
    write_parts(format, parts, &mut out, &mut next_id);
    out
}

fn write_parts(format: FileFormat, parts: &[MessagePart], out: &mut String, next_id: &mut usize) {
    for part in parts {
        match part {
            MessagePart::Icu(icu) => {
                let cases: Vec<(String, String)> = icu
                    .categories
                    .iter()
                    .map(|category| {
                        (category.key.clone(), category.message.native_string())
                    })
                    .collect();
                out.push_str(&icu::render_icu(&icu.variable, icu.icu_type, &cases));
            }
            other => {
                let id = match other {
                    MessagePart::Text(_) => 0,
                    _ => {
                        let id = *next_id;
                        *next_id += 1;
                        id
                    }
                };
                let mut recurse = |children: &[MessagePart], out: &mut String| {
                    write_parts(format, children, out, next_id);
                };
                match format {
                    FileFormat::Xliff12 => xliff12::write_part(other, id, out, &mut recurse),
                    FileFormat::Xliff2 => xliff2::write_part(other, id, out, &mut recurse),
                    FileFormat::Xmb | FileFormat::Xtb => {
                        xmb::write_part(other, id, out, &mut recurse);
                    }
                }
            }
        }
    }
}
