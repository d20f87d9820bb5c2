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

//! Merging a regenerated master file into a language file.
//!
//! After every extraction run the master file has new units, dropped
//! units and units whose source text changed. [`merge_files`] carries
//! those changes into a language file without losing existing
//! translations. Sources are compared ignoring whitespace runs, so a
//! reformatted template does not invalidate its translations.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::file::{TargetState, TranslationFile, TranslationUnit};
use crate::formats::{self, FileFormat};
use crate::message::NormalizedMessage;

/// Knobs for a merge run. All fields have defaults, so a partial JSON
/// configuration like `{"allowIdChange": true}` deserializes cleanly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    /// Prepended to the copied source of newly added plain-text units,
    /// making untranslated texts visible in the running application.
    pub praefix: Option<String>,
    /// Appended counterpart of `praefix`.
    pub suffix: Option<String>,
    /// Recognize units whose id changed but whose source text did not,
    /// and carry their translations over to the new id.
    pub allow_id_change: bool,
    /// Insert new units at their master position instead of appending
    /// them at the end.
    pub preserve_order: bool,
    /// Keep language units that no longer exist in the master.
    pub keep_unused: bool,
}

impl Default for MergeOptions {
    fn default() -> MergeOptions {
        MergeOptions {
            praefix: None,
            suffix: None,
            allow_id_change: false,
            preserve_order: true,
            keep_unused: false,
        }
    }
}

/// A recognized id change, reported on the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdChange {
    pub old_id: String,
    pub new_id: String,
}

/// What one merge run did, unit by unit.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    /// Ids of units added from the master.
    pub added: Vec<String>,
    /// Units found unchanged; their translations were left alone.
    pub unchanged: usize,
    /// Ids of units whose source text changed.
    pub changed_source: Vec<String>,
    /// Units whose source references were corrected from the master.
    pub source_refs_changed: usize,
    /// Units whose description or meaning was corrected from the master.
    pub notes_changed: usize,
    /// Units carried over under a new id.
    pub changed_id: Vec<IdChange>,
    /// Ids of units removed because the master no longer has them.
    pub removed: Vec<String>,
    /// Per-unit problems; the run continues past them.
    pub errors: Vec<MergeError>,
}

impl MergeSummary {
    /// Whether the merge changed the language file at all.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.changed_source.is_empty()
            && self.source_refs_changed == 0
            && self.notes_changed == 0
            && self.changed_id.is_empty()
            && self.removed.is_empty()
    }
}

/// Merge the master file into the language file in place.
pub fn merge_files(
    master: &TranslationFile,
    language: &mut TranslationFile,
    options: &MergeOptions,
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    if language.source_language().is_none() {
        language.set_source_language(master.source_language().map(str::to_string));
    }
    let is_default_language = match (language.target_language(), master.source_language()) {
        (Some(target), Some(source)) => target == source,
        _ => false,
    };

    if options.allow_id_change {
        recognize_id_changes(master, language, &mut summary);
    }

    // Walk the master in order; the cursor tracks where the next new
    // unit belongs so that the language file keeps the master's order.
    let mut insert_at = 0;
    for master_unit in master.units() {
        let found = language
            .units()
            .iter()
            .position(|unit| unit.id() == master_unit.id());
        match found {
            Some(index) => {
                insert_at = index + 1;
                let language_unit = &mut language.units_mut()[index];
                merge_existing_unit(
                    master_unit,
                    language_unit,
                    master.format(),
                    is_default_language,
                    &mut summary,
                );
            }
            None => {
                let position = if options.preserve_order {
                    let position = insert_at;
                    insert_at += 1;
                    position
                } else {
                    language.number_of_units()
                };
                match new_language_unit(
                    master_unit,
                    master.format(),
                    language.format(),
                    is_default_language,
                    options,
                    &mut summary,
                ) {
                    Some(unit) => {
                        debug!("adding unit {:?}", unit.id());
                        summary.added.push(unit.id().to_string());
                        language.units_vec_mut().insert(position, unit);
                    }
                    None => {
                        if options.preserve_order {
                            insert_at -= 1;
                        }
                    }
                }
            }
        }
    }

    // Removal pass: language units the master no longer knows.
    if !options.keep_unused {
        let master_ids: Vec<&str> = master.units().iter().map(|unit| unit.id()).collect();
        let language_units = language.units_vec_mut();
        let mut index = 0;
        while index < language_units.len() {
            if master_ids.contains(&language_units[index].id()) {
                index += 1;
            } else {
                let removed = language_units.remove(index);
                debug!("removing unit {:?}", removed.id());
                summary.removed.push(removed.id().to_string());
            }
        }
    }

    summary
}

/// Re-express a master source fragment in the language file's format.
fn convert_source(
    master_unit: &TranslationUnit,
    master_format: FileFormat,
    language_format: FileFormat,
) -> Result<String, MergeError> {
    if master_format == language_format {
        return Ok(master_unit.source_content().to_string());
    }
    let message = master_unit.source_message();
    match message.parts() {
        Some(parts) => Ok(formats::to_wire(language_format, parts)),
        None => Err(MergeError::UnparsableUnit {
            id: master_unit.id().to_string(),
            detail: message
                .parse_error()
                .unwrap_or("source could not be parsed")
                .to_string(),
        }),
    }
}

fn merge_existing_unit(
    master_unit: &TranslationUnit,
    language_unit: &mut TranslationUnit,
    master_format: FileFormat,
    is_default_language: bool,
    summary: &mut MergeSummary,
) {
    let master_source = master_unit.source_message();
    let language_source = language_unit.source_message();

    // Notes and source references always follow the master.
    if language_unit.description() != master_unit.description()
        || language_unit.meaning() != master_unit.meaning()
    {
        summary.notes_changed += 1;
    }
    language_unit.set_description(master_unit.description().map(str::to_string));
    language_unit.set_meaning(master_unit.meaning().map(str::to_string));
    if language_unit.source_references() != master_unit.source_references() {
        summary.source_refs_changed += 1;
    }
    language_unit.set_source_references(master_unit.source_references().to_vec());

    if near_equal(&master_source, &language_source) {
        summary.unchanged += 1;
        return;
    }

    debug!("source of unit {:?} changed", master_unit.id());
    let source = match convert_source(master_unit, master_format, language_unit.format()) {
        Ok(source) => source,
        Err(error) => {
            summary.errors.push(error);
            return;
        }
    };
    language_unit.set_source_content(source.clone());
    if is_default_language {
        // The default language always shows the current source text.
        language_unit.set_target_content(Some(source));
        language_unit.set_target_state(TargetState::Final);
    } else if language_unit.target_state() == TargetState::Final {
        language_unit.set_target_state(TargetState::Translated);
    }
    summary.changed_source.push(master_unit.id().to_string());
}

fn new_language_unit(
    master_unit: &TranslationUnit,
    master_format: FileFormat,
    language_format: FileFormat,
    is_default_language: bool,
    options: &MergeOptions,
    summary: &mut MergeSummary,
) -> Option<TranslationUnit> {
    let source = match convert_source(master_unit, master_format, language_format) {
        Ok(source) => source,
        Err(error) => {
            warn!("skipping unit {:?}: {error}", master_unit.id());
            summary.errors.push(error);
            return None;
        }
    };

    let mut unit = master_unit.with_format(language_format);
    unit.set_source_content(source.clone());

    let source_message = formats::normalize(language_format, &source);
    if let Some(findings) = source_message.validate() {
        if findings.contains_key("nested-icu") {
            summary.errors.push(MergeError::NestedIcu {
                id: master_unit.id().to_string(),
            });
        }
    }

    if is_default_language {
        unit.set_target_content(Some(source));
        unit.set_target_state(TargetState::Final);
        return Some(unit);
    }

    let decorated = decorate_copied_source(&source_message, options);
    unit.set_target_content(Some(decorated));
    unit.set_target_state(TargetState::New);
    Some(unit)
}

/// The target of a newly added, still untranslated unit: a copy of the
/// source, wrapped in the praefix/suffix markers. ICU units are left
/// undecorated, the markers would end up inside a category body.
fn decorate_copied_source(source: &NormalizedMessage, options: &MergeOptions) -> String {
    let praefix = options.praefix.as_deref().unwrap_or("");
    let suffix = options.suffix.as_deref().unwrap_or("");
    let decoratable =
        source.parts().is_some() && !source.is_icu() && !source.contains_icu_ref();
    if (praefix.is_empty() && suffix.is_empty()) || !decoratable {
        return source.original().to_string();
    }
    source
        .translate(&format!("{praefix}{}{suffix}", source.display_string()))
        .native_string()
}

/// Rename language units whose id changed in the master but whose
/// source text stayed the same (ignoring whitespace).
fn recognize_id_changes(
    master: &TranslationFile,
    language: &mut TranslationFile,
    summary: &mut MergeSummary,
) {
    let new_ids: Vec<String> = master
        .units()
        .iter()
        .filter(|unit| language.unit_by_id(unit.id()).is_none())
        .map(|unit| unit.id().to_string())
        .collect();

    for new_id in new_ids {
        let master_unit = master.unit_by_id(&new_id).unwrap();
        let master_source = master_unit.source_message();

        let orphan = language.units_mut().iter_mut().find(|unit| {
            master.unit_by_id(unit.id()).is_none()
                && near_equal(&master_source, &unit.source_message())
        });
        let Some(orphan) = orphan else {
            continue;
        };

        debug!("unit {:?} is now {:?}", orphan.id(), new_id);
        summary.changed_id.push(IdChange {
            old_id: orphan.id().to_string(),
            new_id: new_id.clone(),
        });
        // The source did not change, so the translation and its state
        // stay valid under the new id.
        orphan.set_id(new_id);
    }
}

/// Compare two sources ignoring whitespace runs.
///
/// Plain messages compare by display string, which is format agnostic.
/// ICU messages and messages with ICU references compare by their wire
/// form, where the category bodies live.
fn near_equal(left: &NormalizedMessage, right: &NormalizedMessage) -> bool {
    comparable(left) == comparable(right)
}

fn comparable(message: &NormalizedMessage) -> String {
    let text = if message.parse_error().is_some() {
        message.original().to_string()
    } else if message.is_icu() || message.contains_icu_ref() {
        message.native_string()
    } else {
        message.display_string()
    };
    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::file::SourceReference;

    fn xlf(units: &[(&str, &str, Option<(&str, &str)>)]) -> String {
        let mut body = String::new();
        for (id, source, target) in units {
            body.push_str(&format!(
                "      <trans-unit id=\"{id}\" datatype=\"html\">\n        <source>{source}</source>\n"
            ));
            if let Some((state, content)) = target {
                body.push_str(&format!(
                    "        <target state=\"{state}\">{content}</target>\n"
                ));
            }
            body.push_str("      </trans-unit>\n");
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
  <file source-language="en" target-language="de" datatype="plaintext" original="ng2.template">
    <body>
{body}    </body>
  </file>
</xliff>"#
        )
    }

    fn parse(text: &str) -> TranslationFile {
        TranslationFile::parse(text, FileFormat::Xliff12, None).unwrap()
    }

    #[test]
    fn test_new_unit_is_added_with_copied_source() {
        let master = parse(&xlf(&[("first", "a text", None), ("second", "another", None)]));
        let mut language = parse(&xlf(&[("first", "a text", Some(("final", "ein Text")))]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.added, vec!["second".to_string()]);
        assert_eq!(summary.unchanged, 1);
        let added = language.unit_by_id("second").unwrap();
        assert_eq!(added.target_content(), Some("another"));
        assert_eq!(added.target_state(), TargetState::New);
    }

    #[test]
    fn test_order_preservation_fixture() {
        let master = parse(&xlf(&[
            ("added1", "one", None),
            ("first", "a text", None),
            ("added2", "two", None),
            ("last", "b text", None),
            ("added3", "three", None),
        ]));
        let mut language = parse(&xlf(&[
            ("first", "a text", Some(("translated", "ein Text"))),
            ("last", "b text", Some(("translated", "be Text"))),
        ]));

        merge_files(&master, &mut language, &MergeOptions::default());

        let order: Vec<&str> = language.units().iter().map(|unit| unit.id()).collect();
        assert_eq!(order, vec!["added1", "first", "added2", "last", "added3"]);
    }

    #[test]
    fn test_append_mode() {
        let master = parse(&xlf(&[
            ("added1", "one", None),
            ("first", "a text", None),
        ]));
        let mut language = parse(&xlf(&[
            ("first", "a text", Some(("translated", "ein Text"))),
        ]));

        let options = MergeOptions {
            preserve_order: false,
            ..MergeOptions::default()
        };
        merge_files(&master, &mut language, &options);

        let order: Vec<&str> = language.units().iter().map(|unit| unit.id()).collect();
        assert_eq!(order, vec!["first", "added1"]);
    }

    #[test]
    fn test_changed_source_downgrades_final() {
        let master = parse(&xlf(&[("greeting", "Hello there", None)]));
        let mut language = parse(&xlf(&[(
            "greeting",
            "Hello",
            Some(("final", "Hallo")),
        )]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.changed_source, vec!["greeting".to_string()]);
        let unit = language.unit_by_id("greeting").unwrap();
        assert_eq!(unit.source_content(), "Hello there");
        assert_eq!(unit.target_content(), Some("Hallo"));
        assert_eq!(unit.target_state(), TargetState::Translated);
    }

    #[test]
    fn test_whitespace_only_change_is_unchanged() {
        let master = parse(&xlf(&[("greeting", "Hello   world", None)]));
        let mut language = parse(&xlf(&[(
            "greeting",
            "Hello world",
            Some(("final", "Hallo Welt")),
        )]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.unchanged, 1);
        assert!(summary.is_noop());
        let unit = language.unit_by_id("greeting").unwrap();
        assert_eq!(unit.source_content(), "Hello world");
        assert_eq!(unit.target_state(), TargetState::Final);
    }

    #[test]
    fn test_removed_units() {
        let master = parse(&xlf(&[("kept", "stay", None)]));
        let mut language = parse(&xlf(&[
            ("kept", "stay", Some(("translated", "bleib"))),
            ("gone", "leave", Some(("translated", "geh"))),
        ]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.removed, vec!["gone".to_string()]);
        assert!(language.unit_by_id("gone").is_none());

        let mut language = parse(&xlf(&[
            ("kept", "stay", Some(("translated", "bleib"))),
            ("gone", "leave", Some(("translated", "geh"))),
        ]));
        let options = MergeOptions {
            keep_unused: true,
            ..MergeOptions::default()
        };
        let summary = merge_files(&master, &mut language, &options);
        assert!(summary.removed.is_empty());
        assert!(language.unit_by_id("gone").is_some());
    }

    #[test]
    fn test_id_change_keeps_translation() {
        let master = parse(&xlf(&[("new-id", "a stable text", None)]));
        let mut language = parse(&xlf(&[(
            "old-id",
            "a stable  text",
            Some(("final", "ein stabiler Text")),
        )]));

        let options = MergeOptions {
            allow_id_change: true,
            ..MergeOptions::default()
        };
        let summary = merge_files(&master, &mut language, &options);

        assert_eq!(
            summary.changed_id,
            vec![IdChange {
                old_id: "old-id".to_string(),
                new_id: "new-id".to_string(),
            }]
        );
        assert!(summary.added.is_empty());
        assert!(summary.removed.is_empty());
        let unit = language.unit_by_id("new-id").unwrap();
        assert_eq!(unit.target_content(), Some("ein stabiler Text"));
        // The source text is the same, so the translation stays final.
        assert_eq!(unit.target_state(), TargetState::Final);
    }

    #[test]
    fn test_without_id_change_units_are_replaced() {
        let master = parse(&xlf(&[("new-id", "a stable text", None)]));
        let mut language = parse(&xlf(&[(
            "old-id",
            "a stable text",
            Some(("final", "ein stabiler Text")),
        )]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());
        assert_eq!(summary.added, vec!["new-id".to_string()]);
        assert_eq!(summary.removed, vec!["old-id".to_string()]);
    }

    #[test]
    fn test_praefix_and_suffix_on_added_units() {
        let master = parse(&xlf(&[
            ("plain", "a text", None),
            ("markup", "a <x id=\"0\" equiv=\"INTERPOLATION\"/>", None),
            ("icu", "{count, plural, other {items}}", None),
        ]));
        let mut language = parse(&xlf(&[]));

        let options = MergeOptions {
            praefix: Some("%%".to_string()),
            suffix: Some("%%".to_string()),
            ..MergeOptions::default()
        };
        merge_files(&master, &mut language, &options);

        assert_eq!(
            language.unit_by_id("plain").unwrap().target_content(),
            Some("%%a text%%")
        );
        // Inline markup does not suppress the decoration.
        assert_eq!(
            language.unit_by_id("markup").unwrap().target_content(),
            Some("%%a <x id=\"0\" equiv=\"INTERPOLATION\"/>%%")
        );
        // ICU units are copied as-is, the markers would land inside a
        // category body.
        assert_eq!(
            language.unit_by_id("icu").unwrap().target_content(),
            Some("{count, plural, other {items}}")
        );
    }

    #[test]
    fn test_default_language_gets_final_copies() {
        let master = parse(&xlf(&[("greeting", "Hello", None)]));
        let mut language = parse(&xlf(&[]));
        language.set_target_language(Some("en".to_string()));

        merge_files(&master, &mut language, &MergeOptions::default());

        let unit = language.unit_by_id("greeting").unwrap();
        assert_eq!(unit.target_content(), Some("Hello"));
        assert_eq!(unit.target_state(), TargetState::Final);
    }

    #[test]
    fn test_default_language_changed_source_copies_target() {
        let master = parse(&xlf(&[("greeting", "Hello there", None)]));
        let mut language = parse(&xlf(&[(
            "greeting",
            "Hello",
            Some(("final", "Hello")),
        )]));
        language.set_target_language(Some("en".to_string()));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.changed_source, vec!["greeting".to_string()]);
        let unit = language.unit_by_id("greeting").unwrap();
        assert_eq!(unit.target_content(), Some("Hello there"));
        assert_eq!(unit.target_state(), TargetState::Final);
    }

    #[test]
    fn test_note_and_source_ref_corrections_are_counted() {
        let mut master = parse(&xlf(&[("greeting", "Hello", None)]));
        {
            let unit = master.unit_by_id_mut("greeting").unwrap();
            unit.set_description(Some("a greeting".to_string()));
            unit.set_source_references(vec![SourceReference {
                sourcefile: "app.html".to_string(),
                line_number: 7,
            }]);
        }
        let mut language = parse(&xlf(&[(
            "greeting",
            "Hello",
            Some(("final", "Hallo")),
        )]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.notes_changed, 1);
        assert_eq!(summary.source_refs_changed, 1);
        assert!(!summary.is_noop());
        let unit = language.unit_by_id("greeting").unwrap();
        assert_eq!(unit.description(), Some("a greeting"));
        assert_eq!(unit.source_references()[0].sourcefile, "app.html");

        // A second run has nothing left to correct.
        let summary = merge_files(&master, &mut language, &MergeOptions::default());
        assert_eq!(summary.notes_changed, 0);
        assert_eq!(summary.source_refs_changed, 0);
        assert!(summary.is_noop());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let master = parse(&xlf(&[
            ("one", "first text", None),
            ("two", "second text", None),
        ]));
        let mut language = parse(&xlf(&[(
            "one",
            "first text",
            Some(("translated", "erster Text")),
        )]));

        let first = merge_files(&master, &mut language, &MergeOptions::default());
        assert!(!first.is_noop());
        let after_first = language.clone();

        let second = merge_files(&master, &mut language, &MergeOptions::default());
        assert!(second.is_noop());
        assert_eq!(second.unchanged, 2);
        assert_eq!(language, after_first);
    }

    #[test]
    fn test_cross_format_merge_xmb_master() {
        let master_text = r#"<?xml version="1.0" encoding="UTF-8"?>
<messagebundle>
  <msg id="amount">value: <ph name="INTERPOLATION"/></msg>
</messagebundle>"#;
        let master = TranslationFile::parse(master_text, FileFormat::Xmb, None).unwrap();
        let mut language = parse(&xlf(&[]));

        merge_files(&master, &mut language, &MergeOptions::default());

        let unit = language.unit_by_id("amount").unwrap();
        assert_eq!(
            unit.source_content(),
            "value: <x id=\"0\" equiv=\"INTERPOLATION\"/>"
        );
    }

    #[test]
    fn test_nested_icu_reported_as_merge_error() {
        let master = parse(&xlf(&[(
            "nested",
            "{count, plural, other {{gender, select, male {he} female {she}}}}",
            None,
        )]));
        let mut language = parse(&xlf(&[]));

        let summary = merge_files(&master, &mut language, &MergeOptions::default());

        assert_eq!(
            summary.errors,
            vec![MergeError::NestedIcu {
                id: "nested".to_string(),
            }]
        );
        // The unit is still added; the error is advisory.
        assert!(language.unit_by_id("nested").is_some());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = MergeSummary {
            added: vec!["a".to_string()],
            unchanged: 2,
            changed_source: vec!["b".to_string()],
            ..MergeSummary::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["changedSource"][0], "b");
        assert_eq!(json["unchanged"], 2);
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: MergeOptions =
            serde_json::from_str(r#"{"allowIdChange": true, "praefix": "!"}"#).unwrap();
        assert!(options.allow_id_change);
        assert_eq!(options.praefix.as_deref(), Some("!"));
        assert!(options.preserve_order);
        assert!(!options.keep_unused);
    }
}
