// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cursor resolution: the poll loop's only progress guarantee against an
//! unbounded backlog, so the precedence here is exact and fixed.

use portage_core::{Cursor, Message};

/// Resolve the cursor for the next cycle.
///
/// Precedence, highest first:
/// 1. an explicit cursor supplied by the caller
/// 2. the response-declared cursor (`nextCursor` > `cursor` > `next`)
/// 3. the last normalized message's timestamp, else its id
/// 4. the previous cursor, unchanged
pub fn resolve_cursor(
    explicit: Option<&Cursor>,
    declared: Option<&Cursor>,
    messages: &[Message],
    previous: Option<&Cursor>,
) -> Option<Cursor> {
    if let Some(cursor) = explicit {
        return Some(cursor.clone());
    }
    if let Some(cursor) = declared {
        return Some(cursor.clone());
    }
    if let Some(last) = messages.last() {
        if last.ts > 0 {
            return Some(Cursor::Number(last.ts));
        }
        if !last.id.is_empty() {
            return Some(Cursor::Text(last.id.clone()));
        }
    }
    previous.cloned()
}
