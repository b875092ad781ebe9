// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
    Error type shared by the whole engine.

    Every failure signalled internally carries a stable code from the
    taxonomy below, a human readable message and an optional list of
    context key/value pairs. The updater never catches: errors propagate
    out of the microtask to the embedder.
*/

#![warn(missing_docs)]

use smol_str::SmolStr;

/// Stable machine-readable error codes.
///
/// The string form (`STC-001`, `BIND-104`, …) is part of the public
/// contract and never changes for a given failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// A property path does not exist on the state target.
    StatePropertyNotFound,
    /// Illegal write or argument on a state proxy surface.
    StateInvalidWrite,
    /// Duplicate parent↔child state path mapping.
    StateDuplicateMapping,
    /// A list index is required but missing.
    ListIndexMissing,
    /// A loop context has no list index assigned.
    ListContextCleared,
    /// List bookkeeping for a path is missing or the path is not a list.
    ListStateMissing,
    /// A template id is not registered.
    BindTemplateMissing,
    /// A binding creator could not be resolved.
    BindCreatorMissing,
    /// Compiled bind metadata is missing for a node.
    BindMetadataMissing,
    /// A declared child node of a bind content is missing.
    BindNodeMissing,
    /// A bound value violates the binding's type contract.
    BindContract,
    /// A binding-node operation is not implemented by this node kind.
    BindNotImplemented,
    /// Template loading failed (single-file-component loader).
    TemplateLoad,
    /// Template or bind-text syntax error.
    TemplateSyntax,
    /// No path tree node exists for a rendered path.
    PathNodeMissing,
    /// The engine behind an updater is gone.
    UpdaterEngineGone,
    /// A render was entered while another render is running.
    UpdaterReentrantRender,
    /// An element write has no parent list ref.
    UpdaterElementParentMissing,
    /// List indexes could not be produced for a list path.
    UpdaterListIndexesMissing,
    /// A bind content has no parent binding where one is required.
    UpdaterParentBindingMissing,
    /// A loop binding lost the bind content for a live list index.
    UpdaterLoopContentMissing,
    /// A component host element could not be identified.
    ComponentIdentification,
    /// A component tag was never defined in the registry.
    ComponentNotDefined,
    /// A filter name could not be resolved.
    FilterNotFound,
    /// Filter options are invalid for the resolved filter.
    FilterBadOptions,
    /// Parent↔child state mapping failed at runtime (parent gone).
    ChildStateParentGone,
    /// Parent↔child state mapping failed at runtime (no mapping).
    ChildStateNoMapping,
}

impl ErrorCode {
    /// The stable string form of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::StatePropertyNotFound => "STC-001",
            ErrorCode::StateInvalidWrite => "STATE-202",
            ErrorCode::StateDuplicateMapping => "STATE-303",
            ErrorCode::ListIndexMissing => "LIST-201",
            ErrorCode::ListContextCleared => "LIST-202",
            ErrorCode::ListStateMissing => "LIST-203",
            ErrorCode::BindTemplateMissing => "BIND-101",
            ErrorCode::BindCreatorMissing => "BIND-102",
            ErrorCode::BindMetadataMissing => "BIND-103",
            ErrorCode::BindNodeMissing => "BIND-104",
            ErrorCode::BindContract => "BIND-201",
            ErrorCode::BindNotImplemented => "BIND-301",
            ErrorCode::TemplateLoad => "TMP-101",
            ErrorCode::TemplateSyntax => "TMP-102",
            ErrorCode::PathNodeMissing => "PATH-101",
            ErrorCode::UpdaterEngineGone => "UPD-001",
            ErrorCode::UpdaterReentrantRender => "UPD-002",
            ErrorCode::UpdaterElementParentMissing => "UPD-003",
            ErrorCode::UpdaterListIndexesMissing => "UPD-004",
            ErrorCode::UpdaterParentBindingMissing => "UPD-005",
            ErrorCode::UpdaterLoopContentMissing => "UPD-006",
            ErrorCode::ComponentIdentification => "COMP-401",
            ErrorCode::ComponentNotDefined => "COMP-402",
            ErrorCode::FilterNotFound => "FLT-201",
            ErrorCode::FilterBadOptions => "FLT-202",
            ErrorCode::ChildStateParentGone => "CSO-101",
            ErrorCode::ChildStateNoMapping => "CSO-102",
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a signalled failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// The operation failed and was not applied.
    #[default]
    Error,
    /// The operation degraded to a no-op.
    Warning,
}

/// The error type of the engine.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct StructiveError {
    code: ErrorCode,
    message: String,
    context: Vec<(&'static str, SmolStr)>,
    severity: Severity,
    #[source]
    cause: Option<Box<StructiveError>>,
}

impl StructiveError {
    /// Create an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), context: Vec::new(), severity: Severity::Error, cause: None }
    }

    /// Attach a context key/value pair.
    #[must_use]
    pub fn with_context(mut self, key: &'static str, value: impl Into<SmolStr>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Attach a causing error.
    #[must_use]
    pub fn with_cause(mut self, cause: StructiveError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Mark the failure as a degraded no-op rather than a hard error.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// The stable code of this error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The attached context key/value pairs.
    pub fn context(&self) -> &[(&'static str, SmolStr)] {
        &self.context
    }

    /// The severity of this error.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Link into the error reference documentation for this code.
    pub fn docs_url(&self) -> String {
        format!("https://structive.dev/docs/errors#{}", self.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let e = StructiveError::new(ErrorCode::StatePropertyNotFound, "no such property: foo")
            .with_context("where", "get_by_ref");
        assert_eq!(e.to_string(), "STC-001: no such property: foo");
        assert_eq!(e.code().as_str(), "STC-001");
        assert_eq!(e.context(), &[("where", smol_str::SmolStr::new("get_by_ref"))]);
        assert_eq!(e.docs_url(), "https://structive.dev/docs/errors#STC-001");
    }

    #[test]
    fn cause_chain_is_exposed_as_source() {
        use std::error::Error;
        let inner = StructiveError::new(ErrorCode::ListIndexMissing, "list index dropped");
        let outer = StructiveError::new(ErrorCode::BindContract, "cannot resolve loop slot").with_cause(inner);
        assert_eq!(outer.source().unwrap().to_string(), "LIST-201: list index dropped");
    }
}
