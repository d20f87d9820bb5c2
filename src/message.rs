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

//! The format-agnostic message model.
//!
//! A [`NormalizedMessage`] wraps the raw wire fragment of one
//! translation unit together with its parsed [`MessagePart`] tree. The
//! tree uses the Angular placeholder vocabulary (`INTERPOLATION`,
//! `LINE_BREAK`, `START_BOLD_TEXT`/`CLOSE_BOLD_TEXT`, ...) so that the
//! same display strings work across all four wire formats.
//!
//! A message is either fully parsed or carries a parse error; never
//! both. Parse errors are data, not panics: callers can always fall
//! back to the original wire text.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use regex::Regex;

use crate::formats::FileFormat;
use crate::icu::IcuType;

/// Tag names with well-known placeholder names in the Angular
/// extraction pipeline. Unknown tags fall back to `TAG_<UPPER>`.
const TAG_PLACEHOLDER_NAMES: &[(&str, &str)] = &[
    ("a", "LINK"),
    ("b", "BOLD_TEXT"),
    ("br", "LINE_BREAK"),
    ("em", "EMPHASISED_TEXT"),
    ("h1", "HEADING_LEVEL1"),
    ("h2", "HEADING_LEVEL2"),
    ("h3", "HEADING_LEVEL3"),
    ("h4", "HEADING_LEVEL4"),
    ("h5", "HEADING_LEVEL5"),
    ("h6", "HEADING_LEVEL6"),
    ("hr", "HORIZONTAL_RULE"),
    ("i", "ITALIC_TEXT"),
    ("li", "LIST_ITEM"),
    ("ol", "ORDERED_LIST"),
    ("p", "PARAGRAPH"),
    ("q", "QUOTATION"),
    ("s", "STRIKETHROUGH_TEXT"),
    ("small", "SMALL_TEXT"),
    ("sub", "SUBSTRIPT"),
    ("sup", "SUPERSCRIPT"),
    ("tbody", "TABLE_BODY"),
    ("td", "TABLE_CELL"),
    ("tfoot", "TABLE_FOOTER"),
    ("th", "TABLE_HEADER_CELL"),
    ("thead", "TABLE_HEADER"),
    ("tr", "TABLE_ROW"),
    ("tt", "MONOSPACED_TEXT"),
    ("u", "UNDERLINED_TEXT"),
    ("ul", "UNORDERED_LIST"),
];

/// Void tags that become childless placeholders instead of tag spans.
const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// The semantic kind of a childless placeholder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlaceholderKind {
    /// An Angular interpolation such as `{{amount}}`.
    Interpolation,
    /// A `<br>` in the original template.
    LineBreak,
    /// An `<img>` in the original template.
    TagImg,
    /// Any other named placeholder (`HORIZONTAL_RULE`, custom names).
    Other(String),
}

impl PlaceholderKind {
    fn base_name(&self) -> &str {
        match self {
            PlaceholderKind::Interpolation => "INTERPOLATION",
            PlaceholderKind::LineBreak => "LINE_BREAK",
            PlaceholderKind::TagImg => "TAG_IMG",
            PlaceholderKind::Other(name) => name,
        }
    }

    fn from_base_name(base: &str) -> PlaceholderKind {
        match base {
            "INTERPOLATION" => PlaceholderKind::Interpolation,
            "LINE_BREAK" => PlaceholderKind::LineBreak,
            "TAG_IMG" => PlaceholderKind::TagImg,
            other => PlaceholderKind::Other(other.to_string()),
        }
    }
}

/// A childless inline marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    /// 0-based occurrence index among placeholders of the same kind.
    /// The second interpolation in a message is `INTERPOLATION_1`.
    pub ordinal: usize,
    /// Human-readable display hint from the wire format, e.g. the
    /// `equiv-text` of an interpolation. Not semantically compared.
    pub disp: Option<String>,
}

/// A paired start/end inline marker wrapping child content.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSpan {
    /// Canonical lower-case HTML tag name, e.g. `b`.
    pub tag: String,
    /// 0-based occurrence index among spans of the same tag.
    pub ordinal: usize,
    pub children: Vec<MessagePart>,
}

/// An ICU plural/select message with its categories.
#[derive(Debug, Clone, PartialEq)]
pub struct IcuMessage {
    pub variable: String,
    pub icu_type: IcuType,
    pub categories: Vec<IcuCategory>,
}

/// One `key {submessage}` pair of an ICU message.
#[derive(Debug, Clone, PartialEq)]
pub struct IcuCategory {
    pub key: String,
    pub message: NormalizedMessage,
}

impl IcuMessage {
    /// Render the ICU message using the categories' display strings.
    pub fn display_string(&self) -> String {
        let cases: Vec<(String, String)> = self
            .categories
            .iter()
            .map(|category| (category.key.clone(), category.message.display_string()))
            .collect();
        crate::icu::render_icu(&self.variable, self.icu_type, &cases)
    }

    /// Render the ICU message using the categories' wire fragments.
    pub fn native_string(&self) -> String {
        let cases: Vec<(String, String)> = self
            .categories
            .iter()
            .map(|category| (category.key.clone(), category.message.native_string()))
            .collect();
        crate::icu::render_icu(&self.variable, self.icu_type, &cases)
    }

    pub fn category(&self, key: &str) -> Option<&IcuCategory> {
        self.categories.iter().find(|category| category.key == key)
    }
}

/// One node of the parsed message tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePart {
    /// Literal text.
    Text(String),
    /// A childless placeholder.
    Placeholder(Placeholder),
    /// A paired tag with child content.
    TagSpan(TagSpan),
    /// A reference to an embedded ICU message; the number is the
    /// 0-based index among ICU references in this message.
    IcuRef(usize),
    /// A whole-message ICU plural/select construct.
    Icu(Box<IcuMessage>),
}

/// Render a placeholder name with its `_1`, `_2`, ... uniquifier.
pub(crate) fn with_ordinal(base: &str, ordinal: usize) -> String {
    if ordinal == 0 {
        base.to_string()
    } else {
        format!("{base}_{ordinal}")
    }
}

/// Split a trailing `_<digits>` uniquifier off a placeholder name.
pub(crate) fn split_ordinal(name: &str) -> (&str, usize) {
    if let Some(pos) = name.rfind('_') {
        let (base, tail) = name.split_at(pos);
        if let Ok(ordinal) = tail[1..].parse::<usize>() {
            return (base, ordinal);
        }
    }
    (name, 0)
}

/// The well-known placeholder base name for a tag.
pub(crate) fn tag_base_name(tag: &str) -> String {
    let lower = tag.to_ascii_lowercase();
    for (known, base) in TAG_PLACEHOLDER_NAMES {
        if *known == lower {
            return (*base).to_string();
        }
    }
    format!("TAG_{}", lower.to_ascii_uppercase())
}

/// The canonical tag for a placeholder base name.
pub(crate) fn tag_from_base_name(base: &str) -> String {
    for (tag, known) in TAG_PLACEHOLDER_NAMES {
        if *known == base {
            return (*tag).to_string();
        }
    }
    base.strip_prefix("TAG_")
        .unwrap_or(base)
        .to_ascii_lowercase()
}

impl Placeholder {
    /// The full wire name, e.g. `INTERPOLATION_1`.
    pub fn name(&self) -> String {
        with_ordinal(self.kind.base_name(), self.ordinal)
    }

    /// Rebuild a placeholder from its wire name.
    pub(crate) fn from_name(name: &str, disp: Option<String>) -> Placeholder {
        let (base, ordinal) = split_ordinal(name);
        Placeholder {
            kind: PlaceholderKind::from_base_name(base),
            ordinal,
            disp,
        }
    }
}

/// Whether a wire name marks the start or end of a tag span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TagNameRole {
    Start { tag: String, ordinal: usize },
    Close { tag: String, ordinal: usize },
}

/// Interpret a wire name like `START_BOLD_TEXT_1` or `CLOSE_TAG_STRONG`.
pub(crate) fn parse_tag_name(name: &str) -> Option<TagNameRole> {
    let (base, ordinal) = split_ordinal(name);
    if let Some(rest) = base.strip_prefix("START_") {
        return Some(TagNameRole::Start {
            tag: tag_from_base_name(rest),
            ordinal,
        });
    }
    if let Some(rest) = base.strip_prefix("CLOSE_") {
        return Some(TagNameRole::Close {
            tag: tag_from_base_name(rest),
            ordinal,
        });
    }
    None
}

impl TagSpan {
    pub(crate) fn start_name(&self) -> String {
        with_ordinal(&format!("START_{}", tag_base_name(&self.tag)), self.ordinal)
    }

    pub(crate) fn close_name(&self) -> String {
        with_ordinal(&format!("CLOSE_{}", tag_base_name(&self.tag)), self.ordinal)
    }
}

/// The parsed, format-agnostic value of one translation unit's content.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    original: String,
    format: FileFormat,
    parts: Option<Vec<MessagePart>>,
    parse_error: Option<String>,
    /// Set when an ICU message was found nested inside another ICU
    /// message's category. Rejected early, at parse time, instead of
    /// surfacing later in translate or merge.
    nested_icu: bool,
    /// For translated messages, the message they were derived from.
    /// `validate` checks the translation against this skeleton.
    source_message: Option<Box<NormalizedMessage>>,
}

impl NormalizedMessage {
    /// A successfully parsed message.
    pub(crate) fn with_parts(
        original: impl Into<String>,
        format: FileFormat,
        parts: Vec<MessagePart>,
    ) -> NormalizedMessage {
        let nested_icu = parts.iter().any(|part| match part {
            MessagePart::Icu(icu) => icu
                .categories
                .iter()
                .any(|category| category.message.is_icu()),
            _ => false,
        });
        NormalizedMessage {
            original: original.into(),
            format,
            parts: Some(parts),
            parse_error: None,
            nested_icu,
            source_message: None,
        }
    }

    /// A message whose wire fragment could not be parsed.
    pub(crate) fn parse_failure(
        original: impl Into<String>,
        format: FileFormat,
        error: impl Into<String>,
    ) -> NormalizedMessage {
        NormalizedMessage {
            original: original.into(),
            format,
            parts: None,
            parse_error: Some(error.into()),
            nested_icu: false,
            source_message: None,
        }
    }

    /// The raw wire fragment this message was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// The parsed tree, or `None` when parsing failed.
    pub fn parts(&self) -> Option<&[MessagePart]> {
        self.parts.as_deref()
    }

    /// The parse error, or `None` when the message parsed cleanly.
    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    /// Whether the whole message is an ICU plural/select construct.
    pub fn is_icu(&self) -> bool {
        self.icu_message().is_some()
    }

    /// The ICU message, for units whose content is one.
    pub fn icu_message(&self) -> Option<&IcuMessage> {
        let parts = self.parts.as_deref()?;
        parts.iter().find_map(|part| match part {
            MessagePart::Icu(icu) => Some(icu.as_ref()),
            _ => None,
        })
    }

    /// Whether the message contains at least one ICU reference.
    pub fn contains_icu_ref(&self) -> bool {
        fn scan(parts: &[MessagePart]) -> bool {
            parts.iter().any(|part| match part {
                MessagePart::IcuRef(_) => true,
                MessagePart::TagSpan(span) => scan(&span.children),
                _ => false,
            })
        }
        self.parts.as_deref().is_some_and(scan)
    }

    /// Render the message for display and editing.
    ///
    /// Interpolations become `{{n}}` markers, tags stay as literal
    /// `<tag>...</tag>` pairs and ICU references render as
    /// `<ICU-Message-Ref_n/>`. Falls back to the original wire text
    /// when the message did not parse.
    pub fn display_string(&self) -> String {
        match self.parts.as_deref() {
            Some(parts) => render_display(parts),
            None => self.original.clone(),
        }
    }

    /// Render the message back to its wire-format fragment.
    pub fn native_string(&self) -> String {
        match self.parts.as_deref() {
            Some(parts) => crate::formats::to_wire(self.format, parts),
            None => self.original.clone(),
        }
    }

    /// Build a translation of this message from edited display text.
    ///
    /// The returned message remembers `self` as its source skeleton;
    /// structural problems (missing or extra placeholders, changed
    /// tags) are reported by [`validate`](Self::validate) on the
    /// result, never thrown here.
    pub fn translate(&self, display_text: &str) -> NormalizedMessage {
        let parts = parse_display(display_text);
        let original = crate::formats::to_wire(self.format, &parts);
        NormalizedMessage {
            original,
            format: self.format,
            parts: Some(parts),
            parse_error: None,
            nested_icu: false,
            source_message: Some(Box::new(self.clone())),
        }
    }

    /// Build a translation of an ICU message, one category at a time.
    ///
    /// `by_category` maps category keys to translated display text.
    /// Categories without an entry keep their current submessage.
    /// Unknown keys and nested ICU constructs are rejected.
    pub fn translate_icu(
        &self,
        by_category: &BTreeMap<String, String>,
    ) -> anyhow::Result<NormalizedMessage> {
        let icu = self
            .icu_message()
            .ok_or_else(|| anyhow!("not an ICU message: {:?}", self.original))?;

        for key in by_category.keys() {
            if icu.category(key).is_none() {
                bail!("unknown ICU category {key:?}");
            }
        }

        let mut categories = Vec::with_capacity(icu.categories.len());
        for category in &icu.categories {
            let message = match by_category.get(&category.key) {
                Some(text) => {
                    if crate::icu::looks_like_icu(text) {
                        bail!(
                            "category {:?}: nested ICU messages are not supported",
                            category.key
                        );
                    }
                    category.message.translate(text)
                }
                None => category.message.clone(),
            };
            categories.push(IcuCategory {
                key: category.key.clone(),
                message,
            });
        }

        let translated = IcuMessage {
            variable: icu.variable.clone(),
            icu_type: icu.icu_type,
            categories,
        };
        let parts = vec![MessagePart::Icu(Box::new(translated))];
        let original = crate::formats::to_wire(self.format, &parts);
        Ok(NormalizedMessage {
            original,
            format: self.format,
            parts: Some(parts),
            parse_error: None,
            nested_icu: false,
            source_message: Some(Box::new(self.clone())),
        })
    }

    /// Check this message against its source skeleton.
    ///
    /// Returns `None` when the message is clean. Otherwise the map
    /// contains one human-readable finding per violated rule. A
    /// validation error blocks committing the translation but the
    /// message itself stays usable.
    pub fn validate(&self) -> Option<BTreeMap<&'static str, String>> {
        let mut findings = BTreeMap::new();

        if self.nested_icu {
            findings.insert(
                "nested-icu",
                "an ICU message inside an ICU message category is not supported".to_string(),
            );
        }

        if let Some(source) = self.source_message.as_deref() {
            let own = Skeleton::of(self);
            let wanted = Skeleton::of(source);

            for name in wanted.missing_placeholders(&own) {
                findings.insert(
                    "placeholders",
                    format!("placeholder {name} from the source message is missing"),
                );
            }
            for name in own.missing_placeholders(&wanted) {
                findings.insert(
                    "placeholders",
                    format!("placeholder {name} is not in the source message"),
                );
            }
            for tag in wanted.missing_tags(&own) {
                findings.insert("tags", format!("tag <{tag}> from the source message is missing"));
            }
            for tag in own.missing_tags(&wanted) {
                findings.insert("tags", format!("tag <{tag}> is not in the source message"));
            }
            if own.icu_refs != wanted.icu_refs {
                findings.insert(
                    "icu-refs",
                    format!(
                        "expected {} ICU references but found {}",
                        wanted.icu_refs.len(),
                        own.icu_refs.len()
                    ),
                );
            }
        }

        if findings.is_empty() {
            None
        } else {
            Some(findings)
        }
    }

    /// Softer checks that do not block a translation.
    pub fn validate_warnings(&self) -> Option<BTreeMap<&'static str, String>> {
        let source = self.source_message.as_deref()?;
        let own = Skeleton::of(self);
        let wanted = Skeleton::of(source);
        let mut findings = BTreeMap::new();

        // Same tags, different order: legitimate in many languages but
        // worth surfacing.
        if own.tags != wanted.tags && sorted(&own.tags) == sorted(&wanted.tags) {
            findings.insert(
                "tags",
                format!(
                    "tag order changed from {} to {}",
                    wanted.tags.join(", "),
                    own.tags.join(", ")
                ),
            );
        }
        if own.placeholders != wanted.placeholders
            && sorted(&own.placeholders) == sorted(&wanted.placeholders)
        {
            findings.insert("placeholders", "placeholder order changed".to_string());
        }

        if findings.is_empty() {
            None
        } else {
            Some(findings)
        }
    }

    /// The flat list of translatable leaf strings.
    ///
    /// Plain text leaves appear in document order; an ICU message
    /// contributes the display string of each category body. This is
    /// the hand-off format for external auto-translation.
    pub fn translatable_strings(&self) -> Vec<String> {
        fn collect(parts: &[MessagePart], out: &mut Vec<String>) {
            for part in parts {
                match part {
                    MessagePart::Text(text) => out.push(text.clone()),
                    MessagePart::TagSpan(span) => collect(&span.children, out),
                    MessagePart::Icu(icu) => {
                        for category in &icu.categories {
                            out.push(category.message.display_string());
                        }
                    }
                    MessagePart::Placeholder(_) | MessagePart::IcuRef(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        if let Some(parts) = self.parts.as_deref() {
            collect(parts, &mut out);
        }
        out
    }

    /// Rebuild the message from a parallel list of translated strings.
    ///
    /// The list must have exactly the length and order produced by
    /// [`translatable_strings`](Self::translatable_strings).
    pub fn with_translated_strings(
        &self,
        translations: &[String],
    ) -> anyhow::Result<NormalizedMessage> {
        let expected = self.translatable_strings().len();
        if translations.len() != expected {
            bail!(
                "expected {expected} translated strings but got {}",
                translations.len()
            );
        }

        fn rebuild(
            parts: &[MessagePart],
            translations: &[String],
            next: &mut usize,
        ) -> anyhow::Result<Vec<MessagePart>> {
            let mut out = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    MessagePart::Text(_) => {
                        out.push(MessagePart::Text(translations[*next].clone()));
                        *next += 1;
                    }
                    MessagePart::TagSpan(span) => {
                        out.push(MessagePart::TagSpan(TagSpan {
                            tag: span.tag.clone(),
                            ordinal: span.ordinal,
                            children: rebuild(&span.children, translations, next)?,
                        }));
                    }
                    MessagePart::Icu(icu) => {
                        let mut categories = Vec::with_capacity(icu.categories.len());
                        for category in &icu.categories {
                            let text = &translations[*next];
                            *next += 1;
                            if crate::icu::looks_like_icu(text) {
                                bail!(
                                    "category {:?}: nested ICU messages are not supported",
                                    category.key
                                );
                            }
                            categories.push(IcuCategory {
                                key: category.key.clone(),
                                message: category.message.translate(text),
                            });
                        }
                        out.push(MessagePart::Icu(Box::new(IcuMessage {
                            variable: icu.variable.clone(),
                            icu_type: icu.icu_type,
                            categories,
                        })));
                    }
                    other => out.push(other.clone()),
                }
            }
            Ok(out)
        }

        let parts = self.parts.as_deref().unwrap_or_default();
        let mut next = 0;
        let parts = rebuild(parts, translations, &mut next)?;
        let original = crate::formats::to_wire(self.format, &parts);
        Ok(NormalizedMessage {
            original,
            format: self.format,
            parts: Some(parts),
            parse_error: None,
            nested_icu: false,
            source_message: Some(Box::new(self.clone())),
        })
    }
}

/// The comparable structure of a message, used by validation.
#[derive(Debug, Default)]
struct Skeleton {
    placeholders: Vec<String>,
    tags: Vec<String>,
    icu_refs: Vec<usize>,
}

impl Skeleton {
    fn of(message: &NormalizedMessage) -> Skeleton {
        fn scan(parts: &[MessagePart], skeleton: &mut Skeleton) {
            for part in parts {
                match part {
                    MessagePart::Placeholder(ph) => skeleton.placeholders.push(ph.name()),
                    MessagePart::TagSpan(span) => {
                        skeleton.tags.push(with_ordinal(&span.tag, span.ordinal));
                        scan(&span.children, skeleton);
                    }
                    MessagePart::IcuRef(ordinal) => skeleton.icu_refs.push(*ordinal),
                    MessagePart::Text(_) | MessagePart::Icu(_) => {}
                }
            }
        }
        let mut skeleton = Skeleton::default();
        if let Some(parts) = message.parts() {
            scan(parts, &mut skeleton);
        }
        skeleton
    }

    fn missing_placeholders(&self, other: &Skeleton) -> Vec<String> {
        missing(&self.placeholders, &other.placeholders)
    }

    fn missing_tags(&self, other: &Skeleton) -> Vec<String> {
        missing(&self.tags, &other.tags)
    }
}

/// The elements of `wanted` that `other` lacks, as multisets.
fn missing(wanted: &[String], other: &[String]) -> Vec<String> {
    let mut remaining: Vec<&String> = other.iter().collect();
    let mut result = Vec::new();
    for item in wanted {
        if let Some(pos) = remaining.iter().position(|found| *found == item) {
            remaining.swap_remove(pos);
        } else {
            result.push(item.clone());
        }
    }
    result
}

fn sorted(items: &[String]) -> Vec<String> {
    let mut copy = items.to_vec();
    copy.sort();
    copy
}

/// Render a part tree as a display string.
fn render_display(parts: &[MessagePart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            MessagePart::Text(text) => out.push_str(text),
            MessagePart::Placeholder(ph) => match &ph.kind {
                PlaceholderKind::Interpolation => {
                    out.push_str(&format!("{{{{{}}}}}", ph.ordinal));
                }
                PlaceholderKind::LineBreak => out.push_str("<br/>"),
                PlaceholderKind::TagImg => out.push_str("<img/>"),
                PlaceholderKind::Other(name) if name == "HORIZONTAL_RULE" => {
                    out.push_str("<hr/>");
                }
                PlaceholderKind::Other(_) => {
                    out.push_str(&format!("{{{{{}}}}}", ph.name()));
                }
            },
            MessagePart::TagSpan(span) => {
                out.push('<');
                out.push_str(&span.tag);
                out.push('>');
                out.push_str(&render_display(&span.children));
                out.push_str(&format!("</{}>", span.tag));
            }
            MessagePart::IcuRef(ordinal) => {
                out.push_str(&format!("<ICU-Message-Ref_{ordinal}/>"));
            }
            MessagePart::Icu(icu) => out.push_str(&icu.display_string()),
        }
    }
    out
}

/// Parse edited display text back into a part tree.
///
/// The display grammar is deliberately small: `{{n}}` and `{{NAME}}`
/// placeholder markers, literal `<tag>...</tag>` pairs, the void tags
/// `<br/>`, `<hr/>` and `<img/>`, and `<ICU-Message-Ref_n/>`. Anything
/// else is plain text. Unmatched closing tags stay literal text so
/// that validation can point at them.
pub(crate) fn parse_display(text: &str) -> Vec<MessagePart> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            (?P<icuref><ICU-Message-Ref_(?P<icunum>[0-9]+)/>)
            | (?P<ph>\{\{\s*(?P<phname>[A-Za-z0-9_]+)\s*\}\})
            | (?P<tag></?(?P<tagname>[A-Za-z][A-Za-z0-9]*)\s*/?>)
            ",
        )
        .unwrap()
    });

    // Stack of open tag spans; the bottom entry collects top-level parts.
    struct Frame {
        tag: Option<(String, usize)>,
        parts: Vec<MessagePart>,
    }
    let mut stack = vec![Frame {
        tag: None,
        parts: Vec::new(),
    }];
    let mut counters: BTreeMap<String, usize> = BTreeMap::new();
    let mut take_ordinal = move |key: &str| -> usize {
        let counter = counters.entry(key.to_string()).or_insert(0);
        let ordinal = *counter;
        *counter += 1;
        ordinal
    };

    let mut cursor = 0;
    for captures in re.captures_iter(text) {
        let found = captures.get(0).unwrap();
        if found.start() > cursor {
            let top = stack.last_mut().unwrap();
            top.parts
                .push(MessagePart::Text(text[cursor..found.start()].to_string()));
        }
        cursor = found.end();

        if captures.name("icuref").is_some() {
            let ordinal: usize = captures["icunum"].parse().unwrap_or(0);
            stack.last_mut().unwrap().parts.push(MessagePart::IcuRef(ordinal));
        } else if captures.name("ph").is_some() {
            let name = &captures["phname"];
            let placeholder = if let Ok(ordinal) = name.parse::<usize>() {
                Placeholder {
                    kind: PlaceholderKind::Interpolation,
                    ordinal,
                    disp: None,
                }
            } else {
                Placeholder::from_name(name, None)
            };
            stack
                .last_mut()
                .unwrap()
                .parts
                .push(MessagePart::Placeholder(placeholder));
        } else {
            let token = found.as_str();
            let tag = captures["tagname"].to_ascii_lowercase();
            let closing = token.starts_with("</");
            if VOID_TAGS.contains(&tag.as_str()) && !closing {
                let kind = match tag.as_str() {
                    "br" => PlaceholderKind::LineBreak,
                    "img" => PlaceholderKind::TagImg,
                    other => PlaceholderKind::Other(tag_base_name(other)),
                };
                let ordinal = take_ordinal(kind.base_name());
                stack.last_mut().unwrap().parts.push(MessagePart::Placeholder(
                    Placeholder {
                        kind,
                        ordinal,
                        disp: None,
                    },
                ));
            } else if closing {
                let matches_open = stack
                    .last()
                    .and_then(|frame| frame.tag.as_ref())
                    .is_some_and(|(open, _)| *open == tag);
                if matches_open {
                    let frame = stack.pop().unwrap();
                    let (tag, ordinal) = frame.tag.unwrap();
                    stack.last_mut().unwrap().parts.push(MessagePart::TagSpan(TagSpan {
                        tag,
                        ordinal,
                        children: frame.parts,
                    }));
                } else {
                    // Leave the stray closing tag as literal text.
                    stack
                        .last_mut()
                        .unwrap()
                        .parts
                        .push(MessagePart::Text(token.to_string()));
                }
            } else {
                let ordinal = take_ordinal(&format!("tag:{tag}"));
                stack.push(Frame {
                    tag: Some((tag, ordinal)),
                    parts: Vec::new(),
                });
            }
        }
    }
    if cursor < text.len() {
        stack
            .last_mut()
            .unwrap()
            .parts
            .push(MessagePart::Text(text[cursor..].to_string()));
    }

    // Close any tags left open.
    while stack.len() > 1 {
        let frame = stack.pop().unwrap();
        let (tag, ordinal) = frame.tag.unwrap();
        stack.last_mut().unwrap().parts.push(MessagePart::TagSpan(TagSpan {
            tag,
            ordinal,
            children: frame.parts,
        }));
    }
    stack.pop().map(|frame| frame.parts).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn interpolation(ordinal: usize) -> MessagePart {
        MessagePart::Placeholder(Placeholder {
            kind: PlaceholderKind::Interpolation,
            ordinal,
            disp: None,
        })
    }

    #[test]
    fn test_parse_display_plain_text() {
        assert_eq!(
            parse_display("just text"),
            vec![MessagePart::Text("just text".to_string())]
        );
    }

    #[test]
    fn test_parse_display_interpolations() {
        assert_eq!(
            parse_display("{{1}}: a placeholder: {{0}}"),
            vec![
                interpolation(1),
                MessagePart::Text(": a placeholder: ".to_string()),
                interpolation(0),
            ]
        );
    }

    #[test]
    fn test_parse_display_tag_span() {
        assert_eq!(
            parse_display("a text <b>with</b> a bold text"),
            vec![
                MessagePart::Text("a text ".to_string()),
                MessagePart::TagSpan(TagSpan {
                    tag: "b".to_string(),
                    ordinal: 0,
                    children: vec![MessagePart::Text("with".to_string())],
                }),
                MessagePart::Text(" a bold text".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_display_nested_tags_and_ordinals() {
        let parts = parse_display("<b>one</b><b><i>two</i></b>");
        match &parts[1] {
            MessagePart::TagSpan(span) => {
                assert_eq!(span.tag, "b");
                assert_eq!(span.ordinal, 1);
                match &span.children[0] {
                    MessagePart::TagSpan(inner) => assert_eq!(inner.tag, "i"),
                    other => panic!("expected inner tag span, got {other:?}"),
                }
            }
            other => panic!("expected tag span, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_display_void_tags() {
        assert_eq!(
            parse_display("line<br/>break <img/>"),
            vec![
                MessagePart::Text("line".to_string()),
                MessagePart::Placeholder(Placeholder {
                    kind: PlaceholderKind::LineBreak,
                    ordinal: 0,
                    disp: None,
                }),
                MessagePart::Text("break ".to_string()),
                MessagePart::Placeholder(Placeholder {
                    kind: PlaceholderKind::TagImg,
                    ordinal: 0,
                    disp: None,
                }),
            ]
        );
    }

    #[test]
    fn test_parse_display_icu_ref() {
        assert_eq!(
            parse_display("a text with <ICU-Message-Ref_0/>"),
            vec![
                MessagePart::Text("a text with ".to_string()),
                MessagePart::IcuRef(0),
            ]
        );
    }

    #[test]
    fn test_parse_display_stray_close_tag_stays_text() {
        assert_eq!(
            parse_display("no opener</b>"),
            vec![
                MessagePart::Text("no opener".to_string()),
                MessagePart::Text("</b>".to_string()),
            ]
        );
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "a text <b>with</b> a bold text",
            "{{1}}: a placeholder: {{0}}",
            "a text with <ICU-Message-Ref_0/>",
            "line<br/>break",
            "above<hr/>below",
        ] {
            assert_eq!(render_display(&parse_display(text)), text);
        }
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(tag_base_name("b"), "BOLD_TEXT");
        assert_eq!(tag_base_name("strong"), "TAG_STRONG");
        assert_eq!(tag_from_base_name("BOLD_TEXT"), "b");
        assert_eq!(tag_from_base_name("TAG_STRONG"), "strong");
        assert_eq!(
            parse_tag_name("START_BOLD_TEXT_1"),
            Some(TagNameRole::Start {
                tag: "b".to_string(),
                ordinal: 1
            })
        );
        assert_eq!(
            parse_tag_name("CLOSE_TAG_STRONG"),
            Some(TagNameRole::Close {
                tag: "strong".to_string(),
                ordinal: 0
            })
        );
        assert_eq!(parse_tag_name("INTERPOLATION"), None);
    }

    #[test]
    fn test_placeholder_names() {
        let ph = Placeholder {
            kind: PlaceholderKind::Interpolation,
            ordinal: 1,
            disp: None,
        };
        assert_eq!(ph.name(), "INTERPOLATION_1");
        assert_eq!(Placeholder::from_name("INTERPOLATION_1", None), ph);
        assert_eq!(
            Placeholder::from_name("LINE_BREAK", None).kind,
            PlaceholderKind::LineBreak
        );
        assert_eq!(split_ordinal("HEADING_LEVEL1"), ("HEADING_LEVEL1", 0));
    }

    #[test]
    fn test_validate_reports_missing_and_extra_placeholders() {
        let source = NormalizedMessage::with_parts(
            "",
            FileFormat::Xliff12,
            parse_display("value: {{0}}"),
        );
        let clean = source.translate("Wert: {{0}}");
        assert_eq!(clean.validate(), None);

        let missing = source.translate("Wert fehlt");
        let findings = missing.validate().unwrap();
        assert!(findings["placeholders"].contains("INTERPOLATION"));

        let extra = source.translate("Wert: {{0}} und {{1}}");
        let findings = extra.validate().unwrap();
        assert!(findings["placeholders"].contains("INTERPOLATION_1"));
    }

    #[test]
    fn test_validate_reports_tag_changes() {
        let source = NormalizedMessage::with_parts(
            "",
            FileFormat::Xliff12,
            parse_display("a <b>bold</b> text"),
        );
        let dropped = source.translate("a bold text");
        let findings = dropped.validate().unwrap();
        assert!(findings["tags"].contains("<b>"));
    }

    #[test]
    fn test_validate_warnings_on_reorder() {
        let source = NormalizedMessage::with_parts(
            "",
            FileFormat::Xliff12,
            parse_display("<b>one</b> and <i>two</i>"),
        );
        let reordered = source.translate("<i>zwei</i> und <b>eins</b>");
        assert_eq!(reordered.validate(), None);
        let warnings = reordered.validate_warnings().unwrap();
        assert!(warnings["tags"].contains("order changed"));
    }

    #[test]
    fn test_translatable_strings_round_trip() {
        let message = NormalizedMessage::with_parts(
            "",
            FileFormat::Xliff12,
            parse_display("Hello <b>world</b>!"),
        );
        assert_eq!(
            message.translatable_strings(),
            vec!["Hello ".to_string(), "world".to_string(), "!".to_string()]
        );
        let translated = message
            .with_translated_strings(&[
                "Hallo ".to_string(),
                "Welt".to_string(),
                "!".to_string(),
            ])
            .unwrap();
        assert_eq!(translated.display_string(), "Hallo <b>Welt</b>!");
    }

    #[test]
    fn test_with_translated_strings_length_mismatch() {
        let message =
            NormalizedMessage::with_parts("", FileFormat::Xliff12, parse_display("one text"));
        assert!(message.with_translated_strings(&[]).is_err());
    }
}
