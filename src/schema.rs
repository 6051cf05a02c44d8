//! Versioned table of the metadata fields each node kind persists.
//!
//! Stores validate field names against this table and packers read and
//! write exactly these fields, so the two cannot drift apart.  Renaming or
//! adding a field means bumping [`SCHEMA_VERSION`].

use crate::node::NodeKind;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct FieldTable {
    pub kind:    NodeKind,
    pub version: u32,
    /// In write order.
    pub fields:  &'static [&'static str],
}

impl FieldTable {
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }
}

pub static COMMUNITY: FieldTable = FieldTable {
    kind:    NodeKind::Community,
    version: SCHEMA_VERSION,
    fields:  &[
        "name",
        "short_description",
        "introductory_text",
        "copyright_text",
        "side_bar_text",
    ],
};

pub static COLLECTION: FieldTable = FieldTable {
    kind:    NodeKind::Collection,
    version: SCHEMA_VERSION,
    fields:  &[
        "name",
        "short_description",
        "introductory_text",
        "copyright_text",
        "side_bar_text",
        "license",
        "provenance_description",
    ],
};

pub static ITEM: FieldTable = FieldTable {
    kind:    NodeKind::Item,
    version: SCHEMA_VERSION,
    fields:  &[
        "dc.title",
        "dc.contributor.author",
        "dc.date.issued",
        "dc.description.abstract",
        "dc.subject",
    ],
};

pub fn fields_for(kind: NodeKind) -> &'static FieldTable {
    match kind {
        NodeKind::Community  => &COMMUNITY,
        NodeKind::Collection => &COLLECTION,
        NodeKind::Item       => &ITEM,
    }
}

pub fn is_recognized(kind: NodeKind, field: &str) -> bool {
    fields_for(kind).contains(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tables_are_current_and_duplicate_free() {
        for kind in [NodeKind::Community, NodeKind::Collection, NodeKind::Item] {
            let table = fields_for(kind);
            assert_eq!(table.kind, kind);
            assert_eq!(table.version, SCHEMA_VERSION);
            let unique: HashSet<_> = table.fields.iter().collect();
            assert_eq!(unique.len(), table.fields.len(), "{kind} has duplicate fields");
        }
    }
}
