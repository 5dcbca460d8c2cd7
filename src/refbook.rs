//! Reference lists for the editable task attributes.
//!
//! Responsible, source, priority and status values are not hardcoded:
//! they are read from columns F..I of the reference partition at startup
//! and on demand. A loaded snapshot is immutable and carries a generation
//! counter; option keyboards embed the generation they were rendered
//! from, so an index chosen against an older snapshot is rejected instead
//! of silently resolving against shifted lists.

use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::store::StoreClient;

/// Range of the reference partition holding the four option columns.
const OPTION_COLUMNS: &str = "F2:I";

/// An editable task attribute backed by a reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Responsible,
    Source,
    Priority,
    Status,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Responsible,
        Attribute::Source,
        Attribute::Priority,
        Attribute::Status,
    ];

    /// Column of the attribute within a task row.
    pub fn column(self) -> char {
        match self {
            Attribute::Responsible => 'D',
            Attribute::Source => 'E',
            Attribute::Priority => 'F',
            Attribute::Status => 'I',
        }
    }

    /// Stable name used in logs, events and errors.
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Responsible => "responsible",
            Attribute::Source => "source",
            Attribute::Priority => "priority",
            Attribute::Status => "status",
        }
    }

    /// Genitive label for the picker message text.
    pub fn label(self) -> &'static str {
        match self {
            Attribute::Responsible => "исполнителя",
            Attribute::Source => "источника",
            Attribute::Priority => "приоритета",
            Attribute::Status => "статуса",
        }
    }
}

/// One immutable snapshot of the four reference lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLists {
    pub generation: u64,
    pub responsibles: Vec<String>,
    pub sources: Vec<String>,
    pub priorities: Vec<String>,
    pub statuses: Vec<String>,
}

impl ReferenceLists {
    pub fn options(&self, attribute: Attribute) -> &[String] {
        match attribute {
            Attribute::Responsible => &self.responsibles,
            Attribute::Source => &self.sources,
            Attribute::Priority => &self.priorities,
            Attribute::Status => &self.statuses,
        }
    }

    /// Resolve a keyboard-encoded option index against this snapshot.
    ///
    /// Fails when the index was encoded against a different generation
    /// (the lists were reloaded between showing and choosing) or is out
    /// of range.
    pub fn resolve(&self, attribute: Attribute, index: usize, encoded_generation: u64) -> Result<&str> {
        if encoded_generation != self.generation {
            return Err(Error::StaleOptions {
                attribute: attribute.name().to_string(),
                encoded: encoded_generation,
                active: self.generation,
            });
        }
        let options = self.options(attribute);
        options
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| Error::OptionOutOfRange {
                attribute: attribute.name().to_string(),
                index,
                len: options.len(),
            })
    }
}

/// Refreshable holder for the active snapshot.
pub struct ReferenceBook {
    reference_gid: i64,
    snapshot: RwLock<Arc<ReferenceLists>>,
}

impl ReferenceBook {
    /// Load the initial snapshot (generation 1).
    pub async fn load(store: &StoreClient, reference_gid: i64) -> Result<Self> {
        let lists = fetch(store, reference_gid, 1).await?;
        Ok(Self {
            reference_gid,
            snapshot: RwLock::new(Arc::new(lists)),
        })
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<ReferenceLists> {
        self.snapshot.read().expect("refbook lock poisoned").clone()
    }

    /// Re-read the lists from the store, bumping the generation.
    pub async fn reload(&self, store: &StoreClient) -> Result<()> {
        let next_generation = self.current().generation + 1;
        let lists = fetch(store, self.reference_gid, next_generation).await?;
        *self.snapshot.write().expect("refbook lock poisoned") = Arc::new(lists);
        Ok(())
    }
}

async fn fetch(store: &StoreClient, reference_gid: i64, generation: u64) -> Result<ReferenceLists> {
    let title = store.resolve_partition_title(reference_gid).await?;
    let rows = store.read_range(&title, OPTION_COLUMNS).await?;

    let mut lists = ReferenceLists {
        generation,
        responsibles: Vec::new(),
        sources: Vec::new(),
        priorities: Vec::new(),
        statuses: Vec::new(),
    };
    for row in &rows {
        push_cell(&mut lists.responsibles, row, 0);
        push_cell(&mut lists.sources, row, 1);
        push_cell(&mut lists.priorities, row, 2);
        push_cell(&mut lists.statuses, row, 3);
    }
    Ok(lists)
}

fn push_cell(list: &mut Vec<String>, row: &[String], index: usize) {
    if let Some(value) = row.get(index) {
        let value = value.trim();
        if !value.is_empty() {
            list.push(value.to_string());
        }
    }
}
