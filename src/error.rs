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

//! Error taxonomy for the crate.
//!
//! Only file-level format violations are surfaced as errors: a broken
//! file cannot be worked with at all. Problems inside a single message
//! (malformed ICU syntax, unbalanced inline tags) are stored as data on
//! the [`NormalizedMessage`](crate::message::NormalizedMessage) so that
//! callers can still inspect the original wire text.

use thiserror::Error;

/// A translation file could not be read or written.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The format tag was not one of `xlf`, `xlf2`, `xmb` or `xtb`.
    #[error("unsupported translation file format {0:?}")]
    UnsupportedFormat(String),

    /// The XML structure did not match what the format requires.
    #[error("malformed {format} file: {detail}")]
    MalformedFile { format: &'static str, detail: String },

    /// An XTB file was read without the XMB master it was generated from.
    /// XTB carries no source text, so the master is mandatory.
    #[error("an xtb file can only be read together with its master xmb file")]
    MissingMaster,

    /// The `beautify` indent string contained non-whitespace characters.
    #[error("indent must consist of whitespace only, got {0:?}")]
    InvalidIndent(String),
}

/// A problem with a single unit during a merge run.
///
/// Merge errors never abort the run; they are collected on the
/// [`MergeSummary`](crate::merge::MergeSummary) and the remaining units
/// are processed normally.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeError {
    /// An ICU message nested inside another ICU message's category.
    #[error("unit {id}: nested ICU messages are not supported")]
    NestedIcu { id: String },

    /// The source or target fragment of a unit could not be parsed.
    #[error("unit {id}: {detail}")]
    UnparsableUnit { id: String, detail: String },
}
