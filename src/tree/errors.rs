//! Node tree errors

use crate::path::CloudPath;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("cannot attach {child:?} under {parent:?}: it is an ancestor of the new parent")]
    Cycle { parent: String, child: String },

    #[error("no cached node at {0}")]
    NotFound(CloudPath),

    #[error("tree paths are absolute, got {0}")]
    Relative(CloudPath),

    #[error("the root node cannot be {0}")]
    Root(&'static str),
}
