//! Located objects: the raw inputs handed to the resolution engine
//!
//! A located object is either atomic (a single blob of content with a file
//! extension) or composite (a named collection of child objects). Composite
//! objects carry the reserved multifile pseudo-extension so both shapes go
//! through the same extension-based matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Pseudo-extension carried by composite objects.
pub const MULTIFILE_EXT: &str = "multifile";

/// An object at some location, waiting to be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatedObject {
    /// Where the object lives, used in every diagnostic.
    pub location: String,
    pub kind: LocatedKind,
}

/// The shape of a located object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatedKind {
    Atomic {
        /// Extension including the leading dot, e.g. `.json`.
        extension: String,
        contents: String,
    },
    Composite {
        children: BTreeMap<String, LocatedObject>,
    },
}

impl LocatedObject {
    pub fn atomic(
        location: impl Into<String>,
        extension: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        LocatedObject {
            location: location.into(),
            kind: LocatedKind::Atomic {
                extension: extension.into(),
                contents: contents.into(),
            },
        }
    }

    pub fn composite(
        location: impl Into<String>,
        children: BTreeMap<String, LocatedObject>,
    ) -> Self {
        LocatedObject {
            location: location.into(),
            kind: LocatedKind::Composite { children },
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, LocatedKind::Atomic { .. })
    }

    /// The extension used for capability matching: the declared one for
    /// atomic objects, [`MULTIFILE_EXT`] for composite ones.
    pub fn extension(&self) -> &str {
        match &self.kind {
            LocatedKind::Atomic { extension, .. } => extension,
            LocatedKind::Composite { .. } => MULTIFILE_EXT,
        }
    }

    pub fn contents(&self) -> Option<&str> {
        match &self.kind {
            LocatedKind::Atomic { contents, .. } => Some(contents),
            LocatedKind::Composite { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, LocatedObject>> {
        match &self.kind {
            LocatedKind::Atomic { .. } => None,
            LocatedKind::Composite { children } => Some(children),
        }
    }

    pub fn child(&self, name: &str) -> Option<&LocatedObject> {
        self.children().and_then(|c| c.get(name))
    }
}

/// Validate a declared extension: it must start with a dot and contain
/// exactly one, or be the reserved multifile extension when allowed.
pub fn check_extension(
    capability: &str,
    extension: &str,
    allow_multifile: bool,
) -> Result<(), ChainError> {
    if extension == MULTIFILE_EXT {
        if allow_multifile {
            return Ok(());
        }
        return Err(ChainError::InvalidExtension {
            capability: capability.to_string(),
            extension: extension.to_string(),
        });
    }
    let valid = extension.starts_with('.') && extension.matches('.').count() == 1;
    if valid {
        Ok(())
    } else {
        Err(ChainError::InvalidExtension {
            capability: capability.to_string(),
            extension: extension.to_string(),
        })
    }
}
