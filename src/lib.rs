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

//! Reading, translating and merging Angular localization files.
//!
//! The crate speaks four wire formats (XLIFF 1.2, XLIFF 2.0, XMB and
//! XTB) through one abstraction:
//!
//! * [`TranslationFile`] parses a document into translation units with
//!   ids, source and target fragments, states, notes and source
//!   references, and serializes it back.
//! * [`NormalizedMessage`] is the format-agnostic view of one unit's
//!   content. It renders placeholders as `{{0}}` markers and tags as
//!   literal `<b>...</b>` pairs for editing, parses edited text back
//!   and validates translations against their source structure.
//!   ICU plural/select messages are parsed into categories that can be
//!   translated one by one.
//! * [`merge_files`] carries a regenerated master file into a language
//!   file after each extraction run, preserving translations and unit
//!   order.
//!
//! ```
//! use xliff_i18n_helpers::{FileFormat, TranslationFile};
//!
//! let content = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
//!   <file source-language="en" target-language="de" datatype="plaintext" original="ng2.template">
//!     <body>
//!       <trans-unit id="greeting" datatype="html">
//!         <source>Hello, <x id="0" equiv="INTERPOLATION"/>!</source>
//!       </trans-unit>
//!     </body>
//!   </file>
//! </xliff>"#;
//!
//! let mut file = TranslationFile::parse(content, FileFormat::Xliff12, None)?;
//! let unit = file.unit_by_id_mut("greeting").unwrap();
//! assert_eq!(unit.source_message().display_string(), "Hello, {{0}}!");
//! unit.translate("Hallo, {{0}}!");
//! # Ok::<(), xliff_i18n_helpers::FormatError>(())
//! ```

pub mod error;
pub mod file;
pub mod formats;
pub mod icu;
pub mod merge;
pub mod message;
mod xml;

pub use error::{FormatError, MergeError};
pub use file::{SourceReference, TargetState, TranslationFile, TranslationUnit};
pub use formats::FileFormat;
pub use merge::{merge_files, IdChange, MergeOptions, MergeSummary};
pub use message::{
    IcuCategory, IcuMessage, MessagePart, NormalizedMessage, Placeholder, PlaceholderKind, TagSpan,
};
