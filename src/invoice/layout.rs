//! Page geometry — fixed US-letter layout, computed top-down.
//!
//! Every block's vertical position derives from the page height minus the
//! cumulative height of the blocks above it. Nothing flows: row height and
//! column widths are constants, and content that would cross the minimum
//! bottom margin is a hard overflow error, never a second page.

use crate::error::RenderError;

/// US letter, in PDF points.
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;

/// Outer margin on all sides.
pub const MARGIN: f32 = 50.0;

/// Content below this line overflows the page.
pub const MIN_BOTTOM_MARGIN: f32 = 50.0;

/// Fixed table row height (header and data rows alike).
pub const ROW_HEIGHT: f32 = 20.0;

/// Fixed column widths: name, quantity, unit price, line total.
pub const COLUMN_WIDTHS: [f32; 4] = [220.0, 80.0, 100.0, 100.0];

/// Branding mark box in the top-right corner.
pub const MARK_WIDTH: f32 = 100.0;
pub const MARK_HEIGHT: f32 = 50.0;

/// Vertical extent of one party block: heading + three lines.
const PARTY_BLOCK_HEIGHT: f32 = 80.0;

/// Gap between stacked blocks.
const BLOCK_GAP: f32 = 20.0;

/// Totals block: three lines plus the gap above it.
const TOTALS_BLOCK_HEIGHT: f32 = 3.0 * ROW_HEIGHT + BLOCK_GAP;

/// Computed vertical positions for one invoice page.
///
/// All values are baselines/top edges in PDF user space (origin at the
/// bottom-left corner of the page).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub title_y: f32,
    pub issuer_y: f32,
    pub issued_to_y: f32,
    pub pay_to_y: f32,
    /// Top edge of the table (header row starts here).
    pub table_top: f32,
    /// Bottom edge of the last data row.
    pub table_bottom: f32,
    /// Baseline of the first totals line.
    pub totals_y: f32,
}

/// Compute block positions for `rows` data rows, or fail on overflow.
pub fn compute(rows: usize) -> Result<Layout, RenderError> {
    let title_y = PAGE_HEIGHT - MARGIN;
    let issuer_y = title_y - 30.0;
    let issued_to_y = issuer_y - BLOCK_GAP - 10.0;
    let pay_to_y = issued_to_y - PARTY_BLOCK_HEIGHT - BLOCK_GAP;
    let table_top = pay_to_y - PARTY_BLOCK_HEIGHT - BLOCK_GAP;

    // Header row + data rows, then the totals block underneath.
    let table_height = (rows as f32 + 1.0) * ROW_HEIGHT;
    let required = table_height + TOTALS_BLOCK_HEIGHT;
    let available = table_top - MIN_BOTTOM_MARGIN;

    if required > available {
        return Err(RenderError::LayoutOverflow {
            rows,
            required,
            available,
        });
    }

    let table_bottom = table_top - table_height;
    let totals_y = table_bottom - BLOCK_GAP - 10.0;

    Ok(Layout {
        title_y,
        issuer_y,
        issued_to_y,
        pay_to_y,
        table_top,
        table_bottom,
        totals_y,
    })
}

/// Largest row count that still fits on the page.
pub fn max_rows() -> usize {
    let table_top = PAGE_HEIGHT - MARGIN - 30.0 - BLOCK_GAP - 10.0
        - (PARTY_BLOCK_HEIGHT + BLOCK_GAP) * 2.0;
    let available = table_top - MIN_BOTTOM_MARGIN - TOTALS_BLOCK_HEIGHT;
    (available / ROW_HEIGHT) as usize - 1
}
