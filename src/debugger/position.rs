use serde::{Deserialize, Serialize};

use crate::runtime::{CompiledUnit, PositionEntry};

/// Editor range, 1-based, both ends inclusive in the editor's sense.
///
/// Line-only ranges carry no columns; two of them are equal when their
/// lines match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRange {
    pub start_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

impl HighlightRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column: Some(start_column),
            end_line,
            end_column: Some(end_column),
        }
    }

    pub fn line_only(line: u32) -> Self {
        Self {
            start_line: line,
            start_column: None,
            end_line: line,
            end_column: None,
        }
    }

    pub fn is_line_only(&self) -> bool {
        self.start_column.is_none() && self.end_column.is_none()
    }
}

/// Per-offset position lookup for one compiled unit. How offsets map to
/// table entries is up to the implementor.
pub trait PositionTable {
    /// `None` when `offset` is outside the table.
    fn entry_at(&self, offset: usize) -> Option<PositionEntry>;
}

impl PositionTable for CompiledUnit {
    fn entry_at(&self, offset: usize) -> Option<PositionEntry> {
        self.position_at(offset)
    }
}

/// Map an instruction offset to an editor range.
///
/// Missing lines fall back to `frame_line`, missing columns to column 1.
pub fn map_position<T: PositionTable + ?Sized>(
    table: &T,
    offset: usize,
    frame_line: u32,
) -> Option<HighlightRange> {
    let entry = table.entry_at(offset)?;
    let fallback_line = frame_line.max(1);
    Some(HighlightRange {
        start_line: entry.start_line.unwrap_or(fallback_line),
        start_column: Some(entry.start_col.unwrap_or(0) + 1),
        end_line: entry.end_line.unwrap_or(fallback_line),
        end_column: Some(entry.end_col.unwrap_or(0) + 1),
    })
}
