use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{ElementKind, Node, Selection, TextFormat, VoidNode};

pub type Path = Vec<usize>;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    InsertText {
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        path: Path,
        node: Node,
    },
    RemoveNode {
        path: Path,
    },
    SetTextFormat {
        path: Path,
        format: TextFormat,
    },
    SetElementKind {
        path: Path,
        kind: ElementKind,
    },
    SetVoid {
        path: Path,
        node: VoidNode,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A batch of ops applied as one atomic, undoable document mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub ops: Vec<Op>,
    pub selection_after: Option<Selection>,
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
