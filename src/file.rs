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

//! Format-independent access to translation files.
//!
//! [`TranslationFile`] hides which of the four wire formats a document
//! uses behind one API: units with ids, source and target fragments,
//! states, notes and source references. Fragments are stored raw and
//! normalized on demand, so a file with one broken unit still loads
//! and every other unit stays editable.

use log::warn;

use crate::error::FormatError;
use crate::formats::{self, FileFormat, RawFile, RawUnit};
use crate::message::NormalizedMessage;
use crate::xml::validate_indent;

const DEFAULT_INDENT: &str = "  ";

/// The translation state of a unit.
///
/// XLIFF 1.2 and 2.0 persist the state on the wire; XTB emulates it
/// from the presence of a translation, so `Final` survives only in
/// memory there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    New,
    Translated,
    Final,
}

/// A `file:line` pointer to where a message was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    pub sourcefile: String,
    pub line_number: u32,
}

/// One translatable unit of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    id: String,
    source: String,
    target: Option<String>,
    target_state: TargetState,
    description: Option<String>,
    meaning: Option<String>,
    source_refs: Vec<SourceReference>,
    format: FileFormat,
}

impl TranslationUnit {
    fn from_raw(raw: RawUnit, format: FileFormat) -> TranslationUnit {
        let target_state = match format {
            FileFormat::Xliff12 => {
                formats::xliff12::state_from_wire(raw.target_state.as_deref(), raw.target.is_some())
            }
            FileFormat::Xliff2 => {
                formats::xliff2::state_from_wire(raw.target_state.as_deref(), raw.target.is_some())
            }
            FileFormat::Xmb => TargetState::New,
            FileFormat::Xtb => formats::xtb::state_from_wire(raw.target.as_deref()),
        };
        TranslationUnit {
            id: raw.id,
            source: raw.source,
            target: raw.target,
            target_state,
            description: raw.description,
            meaning: raw.meaning,
            source_refs: raw
                .source_refs
                .into_iter()
                .map(|(sourcefile, line_number)| SourceReference {
                    sourcefile,
                    line_number,
                })
                .collect(),
            format,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// The raw source fragment as it appears on the wire.
    pub fn source_content(&self) -> &str {
        &self.source
    }

    /// The raw target fragment, if the unit has one.
    pub fn target_content(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn target_state(&self) -> TargetState {
        self.target_state
    }

    pub fn set_target_state(&mut self, state: TargetState) {
        self.target_state = state;
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn meaning(&self) -> Option<&str> {
        self.meaning.as_deref()
    }

    pub fn set_meaning(&mut self, meaning: Option<String>) {
        self.meaning = meaning;
    }

    pub fn source_references(&self) -> &[SourceReference] {
        &self.source_refs
    }

    pub fn set_source_references(&mut self, references: Vec<SourceReference>) {
        self.source_refs = references;
    }

    /// Normalize the source fragment. Parse problems end up on the
    /// returned message, not as errors.
    pub fn source_message(&self) -> NormalizedMessage {
        formats::normalize(self.format, &self.source)
    }

    /// Normalize the target fragment, if the unit has one.
    pub fn target_message(&self) -> Option<NormalizedMessage> {
        self.target
            .as_deref()
            .map(|target| formats::normalize(self.format, target))
    }

    /// Store a normalized message as the new target.
    pub fn set_target(&mut self, message: &NormalizedMessage, state: TargetState) {
        self.target = Some(message.native_string());
        self.target_state = state;
    }

    /// Translate the unit from edited display text.
    pub fn translate(&mut self, display_text: &str) {
        let translated = self.source_message().translate(display_text);
        self.target = Some(translated.native_string());
        self.target_state = TargetState::Translated;
    }

    pub(crate) fn set_target_content(&mut self, target: Option<String>) {
        self.target = target;
    }

    pub(crate) fn set_source_content(&mut self, source: String) {
        self.source = source;
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn with_format(&self, format: FileFormat) -> TranslationUnit {
        let mut unit = self.clone();
        unit.format = format;
        unit
    }
}

/// A parsed translation file of any supported format.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationFile {
    format: FileFormat,
    source_language: Option<String>,
    target_language: Option<String>,
    units: Vec<TranslationUnit>,
}

impl TranslationFile {
    /// Parse a document.
    ///
    /// `master` is the content of the XMB master file and is required
    /// for XTB, which carries no source texts of its own. For the
    /// other formats it is ignored.
    pub fn parse(
        text: &str,
        format: FileFormat,
        master: Option<&str>,
    ) -> Result<TranslationFile, FormatError> {
        let raw = match format {
            FileFormat::Xliff12 => formats::xliff12::parse_document(text)?,
            FileFormat::Xliff2 => formats::xliff2::parse_document(text)?,
            FileFormat::Xmb => formats::xmb::parse_document(text)?,
            FileFormat::Xtb => {
                let master = master.ok_or(FormatError::MissingMaster)?;
                let master = formats::xmb::parse_document(master)?;
                let bundle = formats::xtb::parse_document(text)?;
                join_xtb(master, bundle)
            }
        };
        Ok(TranslationFile {
            format,
            source_language: raw.source_language,
            target_language: raw.target_language,
            units: raw
                .units
                .into_iter()
                .map(|unit| TranslationUnit::from_raw(unit, format))
                .collect(),
        })
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn source_language(&self) -> Option<&str> {
        self.source_language.as_deref()
    }

    pub fn set_source_language(&mut self, language: Option<String>) {
        self.source_language = language;
    }

    pub fn target_language(&self) -> Option<&str> {
        self.target_language.as_deref()
    }

    pub fn set_target_language(&mut self, language: Option<String>) {
        self.target_language = language;
    }

    pub fn units(&self) -> &[TranslationUnit] {
        &self.units
    }

    pub fn units_mut(&mut self) -> &mut [TranslationUnit] {
        &mut self.units
    }

    pub(crate) fn units_vec_mut(&mut self) -> &mut Vec<TranslationUnit> {
        &mut self.units
    }

    pub fn unit_by_id(&self, id: &str) -> Option<&TranslationUnit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    pub fn unit_by_id_mut(&mut self, id: &str) -> Option<&mut TranslationUnit> {
        self.units.iter_mut().find(|unit| unit.id == id)
    }

    pub fn number_of_units(&self) -> usize {
        self.units.len()
    }

    /// Units still waiting for a translation.
    pub fn number_of_untranslated_units(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| unit.target_state == TargetState::New)
            .count()
    }

    /// Units whose source fragment does not parse.
    pub fn number_of_unit_parse_errors(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| unit.source_message().parse_error().is_some())
            .count()
    }

    /// Serialize the file back to its wire format.
    ///
    /// `beautify` overrides the two-space default indent; it must be
    /// whitespace only.
    pub fn edited_content(&self, beautify: Option<&str>) -> Result<String, FormatError> {
        let indent = match beautify {
            Some(indent) => {
                validate_indent(indent)?;
                indent
            }
            None => DEFAULT_INDENT,
        };
        Ok(match self.format {
            FileFormat::Xliff12 => formats::xliff12::write_document(self, indent),
            FileFormat::Xliff2 => formats::xliff2::write_document(self, indent),
            FileFormat::Xmb => formats::xmb::write_document(self, indent),
            FileFormat::Xtb => formats::xtb::write_document(self, indent),
        })
    }

    /// Create the starting point for a new target language.
    ///
    /// Every unit gets the source copied as its target. For the
    /// default language (same as the source language) the copies are
    /// final; for any other language they are new and still need
    /// translation.
    pub fn for_new_language(&self, target_language: &str) -> TranslationFile {
        let is_default = self.source_language() == Some(target_language);
        let state = if is_default {
            TargetState::Final
        } else {
            TargetState::New
        };
        let mut file = self.clone();
        file.target_language = Some(target_language.to_string());
        for unit in &mut file.units {
            unit.target = Some(unit.source.clone());
            unit.target_state = state;
        }
        file
    }
}

/// Join an XTB bundle with its XMB master. Units keep the bundle's
/// order; master units without a translation are not included here,
/// the merge layer adds them.
fn join_xtb(master: RawFile, bundle: RawFile) -> RawFile {
    let mut joined = RawFile {
        source_language: master.source_language,
        target_language: bundle.target_language,
        units: Vec::with_capacity(bundle.units.len()),
    };
    for mut unit in bundle.units {
        match master.units.iter().find(|candidate| candidate.id == unit.id) {
            Some(from_master) => {
                unit.source = from_master.source.clone();
                unit.description = from_master.description.clone();
                unit.meaning = from_master.meaning.clone();
                unit.source_refs = from_master.source_refs.clone();
            }
            None => {
                warn!("translation {:?} has no entry in the master file", unit.id);
            }
        }
        joined.units.push(unit);
    }
    joined
}
